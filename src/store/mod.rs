//! Store backends for trade records
//!
//! - [`clickhouse`] - ClickHouse via the `clickhouse` crate
//! - [`memory`] - in-process store for dry runs and tests

pub mod clickhouse;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::TradeRecord;

pub use clickhouse::ClickHouseStore;
pub use memory::MemoryStore;

/// The store operations a load run depends on.
///
/// A failed `insert_batch` must leave none of its rows behind, since the
/// caller falls back to `insert_row` for every record of that batch.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Table all operations act on
    fn table(&self) -> &str;

    /// Insert all rows in one operation
    async fn insert_batch(&self, rows: &[TradeRecord]) -> Result<()>;

    /// Insert a single row
    async fn insert_row(&self, row: &TradeRecord) -> Result<()>;

    /// Total rows in the target table
    async fn count_rows(&self) -> Result<u64>;

    /// Ask the store to compact the target table
    async fn optimize(&self) -> Result<()>;
}
