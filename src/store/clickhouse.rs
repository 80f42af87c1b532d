//! ClickHouse store on the `clickhouse` crate
//!
//! Rows go over the HTTP interface (default port 8123) as `RowBinary`.
//! Table names are bound as identifiers, never formatted into SQL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use clickhouse::sql::Identifier;
use clickhouse::Client;
use tracing::debug;

use super::TradeStore;
use crate::config::StoreConfig;
use crate::types::TradeRecord;

/// Store backed by a ClickHouse server.
///
/// An insert is atomic only while it fits in one server block, so every
/// batch insert raises `max_insert_block_size` to at least the batch length.
/// The whole batch is then buffered server-side; set `LoadOptions::chunk_size`
/// to bound that for very large files.
pub struct ClickHouseStore {
    client: Client,
    config: StoreConfig,
}

impl ClickHouseStore {
    pub fn new(config: StoreConfig) -> Self {
        let client = Client::default()
            .with_url(config.base_url())
            .with_user(config.user.clone())
            .with_password(config.password.clone())
            .with_database(config.database.clone());

        Self { client, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Client whose inserts keep `rows` rows in one block
    fn insert_client(&self, rows: usize) -> Client {
        self.client
            .clone()
            .with_option("max_insert_block_size", insert_block_size(rows).to_string())
    }
}

/// Server block size that keeps a batch of `rows` in one atomic insert
pub(crate) fn insert_block_size(rows: usize) -> u64 {
    const SERVER_DEFAULT: u64 = 1_048_449;
    SERVER_DEFAULT.max(rows as u64)
}

#[async_trait]
impl TradeStore for ClickHouseStore {
    fn table(&self) -> &str {
        &self.config.table
    }

    async fn insert_batch(&self, rows: &[TradeRecord]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!("Inserting {} rows into {}", rows.len(), self.config.table);

        let mut insert = self
            .insert_client(rows.len())
            .insert::<TradeRecord>(&self.config.table)
            .context("Failed to start insert")?;
        for row in rows {
            insert
                .write(row)
                .await
                .with_context(|| format!("Failed to write row {}", row.signature))?;
        }
        insert.end().await.context("ClickHouse rejected the insert")?;
        Ok(())
    }

    async fn insert_row(&self, row: &TradeRecord) -> Result<()> {
        self.insert_batch(std::slice::from_ref(row)).await
    }

    async fn count_rows(&self) -> Result<u64> {
        self.client
            .query("SELECT count() FROM ?")
            .bind(Identifier(&self.config.table))
            .fetch_one::<u64>()
            .await
            .with_context(|| format!("Failed to count rows in {}", self.config.table))
    }

    async fn optimize(&self) -> Result<()> {
        self.client
            .query("OPTIMIZE TABLE ?")
            .bind(Identifier(&self.config.table))
            .execute()
            .await
            .with_context(|| format!("Failed to optimize {}", self.config.table))
    }
}
