// Library crate - trade ingestion, stores and stack checks

pub mod types;
pub mod config;
pub mod error;
pub mod store;
pub mod ingest;
pub mod checks;

// Re-export commonly used types
pub use types::*;
pub use config::{FailurePolicy, LoadOptions, StoreConfig};
pub use error::{LoadError, RowError};
pub use ingest::{load_trades, IngestionOutcome, LoadReport};
pub use store::{ClickHouseStore, MemoryStore, TradeStore};
