//! Post-load verification: row count and table compaction. Never fatal.

use serde::Serialize;
use tracing::{info, warn};

use crate::store::TradeStore;

/// Result of the verification step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Verification {
    /// Row count after the load, if the count query worked
    pub store_row_count: Option<u64>,
    pub optimized: bool,
    /// Warnings raised by failed verification calls
    pub warnings: Vec<String>,
}

/// Count rows and optionally compact the table.
pub async fn verify<S>(store: &S, optimize: bool) -> Verification
where
    S: TradeStore + ?Sized,
{
    let table = store.table();
    let mut verification = Verification::default();

    match store.count_rows().await {
        Ok(count) => {
            info!("Total records in {}: {}", table, count);
            verification.store_row_count = Some(count);
        }
        Err(e) => {
            warn!("Could not count records: {:#}", e);
            verification.warnings.push(format!("count failed: {:#}", e));
        }
    }

    if optimize {
        match store.optimize().await {
            Ok(()) => {
                info!("Optimized table {}", table);
                verification.optimized = true;
            }
            Err(e) => {
                warn!("Could not optimize table: {:#}", e);
                verification.warnings.push(format!("optimize failed: {:#}", e));
            }
        }
    }

    verification
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::sample_trade;

    #[tokio::test]
    async fn test_verify_counts_and_optimizes() {
        let store = MemoryStore::new();
        store.insert_row(&sample_trade("a")).await.unwrap();

        let v = verify(&store, true).await;
        assert_eq!(v.store_row_count, Some(1));
        assert!(v.optimized);
        assert!(v.warnings.is_empty());
        assert_eq!(store.optimize_calls().await, 1);
    }

    #[tokio::test]
    async fn test_verify_skips_optimize_when_disabled() {
        let store = MemoryStore::new();
        let v = verify(&store, false).await;
        assert!(!v.optimized);
        assert_eq!(store.optimize_calls().await, 0);
    }

    #[tokio::test]
    async fn test_verify_failures_are_warnings() {
        let store = MemoryStore::new().with_failing_maintenance(true, true);
        let v = verify(&store, true).await;
        assert_eq!(v.store_row_count, None);
        assert!(!v.optimized);
        assert_eq!(v.warnings.len(), 2);
    }
}
