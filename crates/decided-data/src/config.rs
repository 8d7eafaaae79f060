//! Configuration for the primary database pool (spec §6.5 ambient config).
//!
//! - `DATABASE_URL`: Postgres connection string.
//! - `DB_POOL_SIZE`: number of pooled connections.
//! - `DB_MIN_IDLE`: connections the pool keeps warm.
//! - `DB_CONNECTION_TIMEOUT_MS` / `DB_STATEMENT_TIMEOUT_MS`: as named.
//! - `DB_HELPER_THREADS`: size of the thread pool used for connection setup.
//! - `DB_ENFORCE_TLS`: require `sslmode=require` on the connection URL.

use std::fmt;

use serde::{Deserialize, Serialize};

fn default_db_pool_size() -> u32 {
    10
}
fn default_tcp_timeout() -> u64 {
    10000
}
fn default_connection_timeout() -> u64 {
    30000
}
fn default_statement_timeout() -> u64 {
    30000
}
fn default_helper_threads() -> usize {
    10
}
fn default_false() -> bool {
    false
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct DbConfig {
    pub url: String,
    #[serde(default = "default_db_pool_size")]
    pub pool_size: u32,
    pub min_idle: Option<u32>,

    /// Seconds to wait for unacknowledged TCP packets before treating the
    /// connection as broken.
    #[serde(default = "default_tcp_timeout")]
    pub tcp_timeout: u64,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout: u64,
    #[serde(default = "default_helper_threads")]
    pub helper_threads: usize,
    #[serde(default = "default_false")]
    pub enforce_tls: bool,
}

impl fmt::Display for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pool_size={} tcp_timeout={}ms enforce_tls={}",
            self.pool_size, self.tcp_timeout, self.enforce_tls
        )
    }
}
