use serde::Deserialize;

use decided_data::DbConfig;

/// Top-level server configuration, loaded by [`super::init`] via `figment`
/// from a TOML file merged with `DECIDED_`-prefixed environment variables.
/// Fields mirror every key spec.md §6.5 recognizes, plus the ambient
/// listen address, database settings, and logging controls.
#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    pub db: DbConfig,

    #[serde(default = "default_rust_log")]
    pub rust_log: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Connection string for a networked pub/sub transport. Currently
    /// unused: broadcast (§4.2) is an in-process `tokio::sync::broadcast`
    /// registry, so this is accepted for forward compatibility with a
    /// networked transport but not read by anything today.
    pub broadcast_endpoint: Option<String>,

    #[serde(default = "default_waiting_timeout_secs")]
    pub waiting_timeout_secs: u64,

    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,

    #[serde(default = "default_elo_queue_cap")]
    pub elo_queue_cap: usize,

    #[serde(default = "default_false")]
    pub test_mode: bool,

    #[serde(default = "default_snapshot_cache_size")]
    pub snapshot_cache_size: usize,

    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_owned()
}

fn default_rust_log() -> String {
    "decided_server=info,decided_core=info,decided_data=info,salvo=warn".to_owned()
}

fn default_waiting_timeout_secs() -> u64 {
    3600
}

fn default_inactivity_timeout_secs() -> u64 {
    1800
}

fn default_elo_queue_cap() -> usize {
    10_000
}

fn default_snapshot_cache_size() -> usize {
    1024
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_false() -> bool {
    false
}
