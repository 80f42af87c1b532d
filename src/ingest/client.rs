//! Ingestion client: bulk insert with per-row fallback
//!
//! A chunk goes to the store as one bulk insert. If that fails, every row of
//! the chunk is retried on its own, in order, and failures are dropped. The
//! two paths never both run for the same row, so nothing is inserted twice.

use tracing::{debug, error, info};

use super::{LoadContext, RowFailure};
use crate::error::{InsertError, RejectReason};
use crate::store::TradeStore;
use crate::types::TradeRecord;

/// What happened to one submitted chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubmitResult {
    pub succeeded: usize,
    pub failed: usize,
    /// Bulk insert failed and rows were sent one by one
    pub fell_back: bool,
}

/// Submit `rows` and record the result in the context.
///
/// `offset` is the batch position of `rows[0]`; failure positions are
/// reported 1-based within the whole batch. Never returns an error.
pub async fn submit<S>(ctx: &mut LoadContext<'_, S>, offset: usize, rows: &[TradeRecord]) -> SubmitResult
where
    S: TradeStore + ?Sized,
{
    if rows.is_empty() {
        return SubmitResult::default();
    }

    let result = match ctx.store.insert_batch(rows).await {
        Ok(()) => {
            info!("Successfully inserted {} trade records", rows.len());
            SubmitResult {
                succeeded: rows.len(),
                failed: 0,
                fell_back: false,
            }
        }
        Err(e) => {
            error!("Bulk insert of {} rows failed: {:#}", rows.len(), e);
            info!("Attempting to insert rows one by one...");
            insert_individually(ctx, offset, rows).await
        }
    };

    ctx.outcome.rows_succeeded += result.succeeded;
    ctx.outcome.rows_failed += result.failed;
    result
}

async fn insert_individually<S>(ctx: &mut LoadContext<'_, S>, offset: usize, rows: &[TradeRecord]) -> SubmitResult
where
    S: TradeStore + ?Sized,
{
    let mut result = SubmitResult {
        fell_back: true,
        ..Default::default()
    };

    for (i, row) in rows.iter().enumerate() {
        let position = offset + i + 1;
        match ctx.store.insert_row(row).await {
            Ok(()) => result.succeeded += 1,
            Err(e) => {
                debug!("Row {} failed: {:#}", position, e);
                result.failed += 1;
                ctx.outcome.failures.push(RowFailure {
                    row: position,
                    reason: RejectReason::Insert(InsertError::RowInsertFailure(format!("{:#}", e))),
                });
            }
        }
    }

    info!("Successfully inserted {} rows individually", result.succeeded);
    result
}
