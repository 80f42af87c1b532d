//! In-process trade store
//!
//! Used by `load --dry-run` and by tests. Bulk inserts are all-or-nothing,
//! matching what the load path expects from a real store.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;

use super::TradeStore;
use crate::config::DEFAULT_TABLE;
use crate::types::TradeRecord;

type RejectFn = Box<dyn Fn(&TradeRecord) -> Option<String> + Send + Sync>;

#[derive(Default)]
struct Inner {
    rows: Vec<TradeRecord>,
    signatures: HashSet<String>,
    batch_calls: usize,
    row_calls: usize,
    optimize_calls: usize,
}

/// Vec-backed store with optional constraints
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    table: Option<String>,
    unique_signatures: bool,
    reject: Option<RejectFn>,
    fail_count: bool,
    fail_optimize: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name reported as the target table (default `trades_raw`)
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Reject any row whose signature is already stored (upsert-style key)
    pub fn with_unique_signatures(mut self) -> Self {
        self.unique_signatures = true;
        self
    }

    /// Reject rows for which `check` returns a violation message
    pub fn with_constraint<F>(mut self, check: F) -> Self
    where
        F: Fn(&TradeRecord) -> Option<String> + Send + Sync + 'static,
    {
        self.reject = Some(Box::new(check));
        self
    }

    /// Make `count_rows` and/or `optimize` fail
    pub fn with_failing_maintenance(mut self, count: bool, optimize: bool) -> Self {
        self.fail_count = count;
        self.fail_optimize = optimize;
        self
    }

    /// Snapshot of stored rows in insertion order
    pub async fn rows(&self) -> Vec<TradeRecord> {
        self.inner.lock().await.rows.clone()
    }

    /// Number of (bulk, single-row) insert calls seen
    pub async fn insert_calls(&self) -> (usize, usize) {
        let inner = self.inner.lock().await;
        (inner.batch_calls, inner.row_calls)
    }

    pub async fn optimize_calls(&self) -> usize {
        self.inner.lock().await.optimize_calls
    }

    fn violation(&self, inner: &Inner, pending: &HashSet<&str>, row: &TradeRecord) -> Option<String> {
        if self.unique_signatures
            && (inner.signatures.contains(&row.signature) || pending.contains(row.signature.as_str()))
        {
            return Some(format!("duplicate signature {}", row.signature));
        }
        self.reject.as_ref().and_then(|check| check(row))
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    fn table(&self) -> &str {
        self.table.as_deref().unwrap_or(DEFAULT_TABLE)
    }

    async fn insert_batch(&self, rows: &[TradeRecord]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.batch_calls += 1;

        let mut pending = HashSet::new();
        for (i, row) in rows.iter().enumerate() {
            if let Some(reason) = self.violation(&inner, &pending, row) {
                bail!("constraint violation at row {}: {}", i + 1, reason);
            }
            pending.insert(row.signature.as_str());
        }

        for row in rows {
            inner.signatures.insert(row.signature.clone());
            inner.rows.push(row.clone());
        }
        Ok(())
    }

    async fn insert_row(&self, row: &TradeRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.row_calls += 1;

        if let Some(reason) = self.violation(&inner, &HashSet::new(), row) {
            bail!("constraint violation: {}", reason);
        }

        inner.signatures.insert(row.signature.clone());
        inner.rows.push(row.clone());
        Ok(())
    }

    async fn count_rows(&self) -> Result<u64> {
        if self.fail_count {
            bail!("count unavailable");
        }
        Ok(self.inner.lock().await.rows.len() as u64)
    }

    async fn optimize(&self) -> Result<()> {
        if self.fail_optimize {
            bail!("optimize unavailable");
        }
        self.inner.lock().await.optimize_calls += 1;
        Ok(())
    }
}
