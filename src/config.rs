//! Configuration for the store connection and load runs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_HOST: &str = "localhost";
/// ClickHouse HTTP interface port
pub const DEFAULT_PORT: u16 = 8123;
pub const DEFAULT_USER: &str = "default";
pub const DEFAULT_DATABASE: &str = "solana_analytics";
pub const DEFAULT_TABLE: &str = "trades_raw";
pub const DEFAULT_CSV_PATH: &str = "dbt/seeds/sample_trades.csv";

/// Connection settings for the ClickHouse store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Target table for inserts, counts and optimize
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            database: DEFAULT_DATABASE.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl StoreConfig {
    /// Build from environment variables, falling back to defaults
    ///
    /// Reads:
    /// - `CLICKHOUSE_HOST` (default `localhost`)
    /// - `CLICKHOUSE_PORT` (default `8123`)
    /// - `CLICKHOUSE_USER` (default `default`)
    /// - `CLICKHOUSE_PASSWORD` (default empty)
    /// - `CLICKHOUSE_DATABASE` (default `solana_analytics`)
    /// - `CLICKHOUSE_TABLE` (default `trades_raw`)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();
        let port = match lookup("CLICKHOUSE_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("CLICKHOUSE_PORT={:?} is not a port: {}", raw, e))?,
            None => defaults.port,
        };

        Ok(Self {
            host: lookup("CLICKHOUSE_HOST").unwrap_or(defaults.host),
            port,
            user: lookup("CLICKHOUSE_USER").unwrap_or(defaults.user),
            password: lookup("CLICKHOUSE_PASSWORD").unwrap_or(defaults.password),
            database: lookup("CLICKHOUSE_DATABASE").unwrap_or(defaults.database),
            table: lookup("CLICKHOUSE_TABLE").unwrap_or(defaults.table),
        })
    }

    /// Base URL of the HTTP interface
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.host, self.port)
    }
}

/// How row failures affect the reported result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Succeed as long as the run completes; failures only show in the counts
    #[default]
    BestEffort,
    /// Any failed row fails the run
    Strict,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BestEffort => write!(f, "best-effort"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

/// Options for a single load run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    /// CSV source (`.zst` is decompressed)
    pub source: PathBuf,
    pub policy: FailurePolicy,
    /// Submit in consecutive chunks of this many rows instead of one batch
    pub chunk_size: Option<usize>,
    /// Run `OPTIMIZE TABLE` after the load
    pub optimize: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::from(DEFAULT_CSV_PATH),
            policy: FailurePolicy::BestEffort,
            chunk_size: None,
            optimize: true,
        }
    }
}
