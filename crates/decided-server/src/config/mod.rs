mod server_config;

use std::sync::OnceLock;

use figment::providers::{Env, Format, Toml};
use figment::Figment;

pub use server_config::*;
pub use decided_data::DbConfig;

pub static CONFIG: OnceLock<ServerConfig> = OnceLock::new();

/// Loads configuration the same way the teacher's `config::init` does: a
/// TOML file (path from `DECIDED_CONFIG`, defaulting to `decided.toml`)
/// merged with `DECIDED_`-prefixed environment variables, the latter taking
/// precedence.
pub fn init() {
    let raw_config = Figment::new()
        .merge(Toml::file(Env::var("DECIDED_CONFIG").as_deref().unwrap_or("decided.toml")))
        .merge(Env::prefixed("DECIDED_").global());

    let conf = match raw_config.extract::<ServerConfig>() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("It looks like your config is invalid. The following error occurred: {e}");
            std::process::exit(1);
        }
    };

    CONFIG.set(conf).expect("config should be set once");
}

pub fn get() -> &'static ServerConfig {
    CONFIG.get().expect("config should be initialized before use")
}
