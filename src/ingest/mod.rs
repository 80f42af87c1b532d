//! CSV trade ingestion
//!
//! A load run is strictly sequential:
//!
//! - [`source`] opens the CSV and checks the header
//! - [`parser`] turns each record into a [`TradeRecord`](crate::types::TradeRecord)
//! - [`batch`] accumulates parsed rows in input order
//! - [`client`] submits the batch, falling back to per-row inserts
//! - [`verify`] counts and compacts the table afterwards
//!
//! Row-level failures are collected in an [`IngestionOutcome`]; only a fatal
//! [`LoadError`] stops the run.

pub mod batch;
pub mod client;
pub mod parser;
pub mod source;
pub mod verify;

use csv::StringRecord;
use tracing::{info, warn};

use crate::config::{FailurePolicy, LoadOptions};
use crate::error::{LoadError, RejectReason, RowError};
use crate::store::TradeStore;

pub use batch::Batch;
pub use client::{submit, SubmitResult};
pub use parser::{parse_timestamp, RowParser};
pub use source::{RawRecord, ReadFailure, TradeSource};
pub use verify::{verify, Verification};

/// One rejected row.
///
/// For parse failures `row` is the 1-based data row of the source; for insert
/// failures it is the 1-based position in the submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub row: usize,
    pub reason: RejectReason,
}

/// Counts for one load run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionOutcome {
    pub rows_attempted: usize,
    pub rows_succeeded: usize,
    pub rows_failed: usize,
    pub failures: Vec<RowFailure>,
}

impl IngestionOutcome {
    fn reject_row(&mut self, row: usize, error: RowError) {
        warn!("Row {}: {}", row, error);
        self.rows_failed += 1;
        self.failures.push(RowFailure {
            row,
            reason: RejectReason::Parse(error),
        });
    }

    /// Failures raised by the parser
    pub fn parse_failures(&self) -> impl Iterator<Item = &RowFailure> {
        self.failures
            .iter()
            .filter(|f| matches!(f.reason, RejectReason::Parse(_)))
    }

    /// Failures raised by the store during per-row fallback
    pub fn insert_failures(&self) -> impl Iterator<Item = &RowFailure> {
        self.failures
            .iter()
            .filter(|f| matches!(f.reason, RejectReason::Insert(_)))
    }
}

/// Store handle and counters threaded through every stage of a run
pub struct LoadContext<'a, S: TradeStore + ?Sized> {
    pub store: &'a S,
    pub outcome: IngestionOutcome,
}

impl<'a, S: TradeStore + ?Sized> LoadContext<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            outcome: IngestionOutcome::default(),
        }
    }
}

/// Everything a load run reports
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub outcome: IngestionOutcome,
    pub verification: Verification,
    pub policy: FailurePolicy,
}

impl LoadReport {
    /// Overall result under the configured failure policy
    pub fn is_success(&self) -> bool {
        match self.policy {
            FailurePolicy::BestEffort => true,
            FailurePolicy::Strict => self.outcome.rows_failed == 0,
        }
    }
}

/// Parse every record of `source` into a batch.
///
/// Parse failures are counted in `outcome`; only a source I/O failure aborts.
pub fn read_batch(source: &mut TradeSource, outcome: &mut IngestionOutcome) -> Result<Batch, LoadError> {
    let parser = RowParser::new();
    let mut batch = Batch::new();
    let mut record = StringRecord::new();
    let mut row_num = 0usize;

    loop {
        let more = match source.read_record(&mut record) {
            Ok(more) => more,
            Err(ReadFailure::Fatal(e)) => return Err(e),
            Err(ReadFailure::Row(msg)) => {
                row_num += 1;
                outcome.rows_attempted += 1;
                outcome.reject_row(row_num, RowError::Malformed(msg));
                continue;
            }
        };
        if !more {
            break;
        }

        row_num += 1;
        outcome.rows_attempted += 1;

        match parser.parse(&RawRecord::new(source.columns(), &record)) {
            Ok(trade) => batch.push(trade),
            Err(e) => outcome.reject_row(row_num, e),
        }
    }

    Ok(batch)
}

/// Load one CSV source into `store`.
///
/// Returns `Err` only for fatal source problems, before anything is inserted.
pub async fn load_trades<S>(store: &S, options: &LoadOptions) -> Result<LoadReport, LoadError>
where
    S: TradeStore + ?Sized,
{
    info!("Loading data from {} into {}", options.source.display(), store.table());

    let mut ctx = LoadContext::new(store);
    let batch = {
        let mut source = TradeSource::open(&options.source)?;
        read_batch(&mut source, &mut ctx.outcome)?
    };
    info!(
        "Prepared {} rows for insertion ({} errors)",
        batch.len(),
        ctx.outcome.rows_failed
    );

    for (offset, chunk) in batch.into_chunks(options.chunk_size) {
        submit(&mut ctx, offset, &chunk).await;
    }

    info!(
        "Ingestion finished: {} attempted, {} succeeded, {} failed",
        ctx.outcome.rows_attempted, ctx.outcome.rows_succeeded, ctx.outcome.rows_failed
    );

    let verification = verify(store, options.optimize).await;

    Ok(LoadReport {
        outcome: ctx.outcome,
        verification,
        policy: options.policy,
    })
}
