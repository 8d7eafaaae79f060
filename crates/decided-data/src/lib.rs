//! Typed persistence for the decided-together room coordinator: a Diesel
//! schema, row-mapped operations, and the connection pool they run on.
//! Nothing in this crate knows about HTTP; it returns `DataError` and lets
//! `decided-server` decide how to present that to a client.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{self, State};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use scheduled_thread_pool::ScheduledThreadPool;
use url::Url;

#[macro_use]
mod macros;
mod config;
pub use config::DbConfig;

pub mod pool;
pub use pool::{DieselPool, PgPooledConnection, PoolError};

mod error;
pub use error::DataError;

pub mod elo;
pub mod retry;
pub mod room;
pub mod schema;
pub mod watchlist;

pub type DataResult<T> = Result<T, DataError>;

pub static DIESEL_POOL: OnceLock<DieselPool> = OnceLock::new();

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn init(config: &DbConfig) {
    let builder = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .min_idle(config.min_idle)
        .connection_timeout(Duration::from_millis(config.connection_timeout))
        .connection_customizer(Box::new(pool::ConnectionConfig {
            statement_timeout: Duration::from_millis(config.statement_timeout),
        }))
        .thread_pool(Arc::new(ScheduledThreadPool::new(config.helper_threads)));

    let diesel_pool = DieselPool::new(config, builder).expect("diesel pool should be created");
    DIESEL_POOL.set(diesel_pool).expect("diesel pool should be set once");
    migrate();
}

pub fn migrate() {
    let conn = &mut connect().expect("db connect should work before migrating");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("pending migrations should apply cleanly");
}

pub fn connect() -> Result<PgPooledConnection, PoolError> {
    match DIESEL_POOL.get().expect("diesel pool should be initialized").get() {
        Ok(conn) => Ok(conn),
        Err(e) => {
            tracing::error!(error = %e, "db connect failed");
            Err(e)
        }
    }
}

pub fn state() -> State {
    DIESEL_POOL.get().expect("diesel pool should be initialized").state()
}

pub fn connection_url(config: &DbConfig, url: &str) -> String {
    let mut url = Url::parse(url).expect("DATABASE_URL should be a valid URL");

    if config.enforce_tls {
        maybe_append_url_param(&mut url, "sslmode", "require");
    }
    maybe_append_url_param(&mut url, "tcp_user_timeout", &config.tcp_timeout.to_string());

    url.into()
}

fn maybe_append_url_param(url: &mut Url, key: &str, value: &str) {
    if !url.query_pairs().any(|(k, _)| k == key) {
        url.query_pairs_mut().append_pair(key, value);
    }
}
