//! Error taxonomy for a load run
//!
//! Row-level errors are recorded in the run outcome and never abort the run.
//! [`LoadError`] is fatal and stops the run before any row is parsed.

use std::path::PathBuf;
use thiserror::Error;

/// Why a single input row was rejected by the parser
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("could not parse timestamp: {0:?}")]
    TimestampUnparseable(String),

    #[error("could not coerce field `{field}` from {value:?}")]
    FieldCoercion { field: &'static str, value: String },

    #[error("field `{field}` is missing from the record")]
    MissingField { field: &'static str },

    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Why a parsed record did not reach the store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InsertError {
    #[error("row insert failed: {0}")]
    RowInsertFailure(String),
}

/// Rejection recorded against one input row or batch position
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error(transparent)]
    Parse(#[from] RowError),

    #[error(transparent)]
    Insert(#[from] InsertError),
}

/// Errors that abort a load run
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read source {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source {path} is missing required columns: {}", missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },

    #[error("cannot read header row of {path}: {source}")]
    BadHeader {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
