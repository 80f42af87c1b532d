//! CSV source access: open the file, check the header, iterate records

use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::types::TRADE_COLUMNS;

/// Header position of every required column
#[derive(Debug, Clone)]
pub struct ColumnMap {
    positions: HashMap<&'static str, usize>,
}

impl ColumnMap {
    /// Resolve required columns against a header row.
    ///
    /// Returns the names of all missing columns on failure. Extra columns are ignored.
    pub fn from_headers(headers: &StringRecord) -> Result<Self, Vec<String>> {
        let mut positions = HashMap::with_capacity(TRADE_COLUMNS.len());
        let mut missing = Vec::new();

        for column in TRADE_COLUMNS {
            match headers.iter().position(|h| h.trim() == column) {
                Some(idx) => {
                    positions.insert(column, idx);
                }
                None => missing.push(column.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(Self { positions })
        } else {
            Err(missing)
        }
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }
}

/// One data record viewed through the column map
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    columns: &'a ColumnMap,
    record: &'a StringRecord,
}

impl<'a> RawRecord<'a> {
    pub fn new(columns: &'a ColumnMap, record: &'a StringRecord) -> Self {
        Self { columns, record }
    }

    /// Raw text of `column`, `None` when the record is too short to hold it
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.columns.position(column).and_then(|idx| self.record.get(idx))
    }
}

/// Open CSV reader with its header already validated
pub struct TradeSource {
    path: PathBuf,
    reader: csv::Reader<Box<dyn Read + Send>>,
    columns: ColumnMap,
}

impl TradeSource {
    /// Open `path`, decompressing `.zst` files, and validate the header.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let inner: Box<dyn Read + Send> = if path.extension().map_or(false, |ext| ext == "zst") {
            let decoder = zstd::stream::Decoder::new(file).map_err(|source| LoadError::SourceUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
            Box::new(BufReader::new(decoder))
        } else {
            Box::new(BufReader::new(file))
        };

        Self::from_reader(path, inner)
    }

    /// Wrap an already-open reader; `path` is only used in messages
    pub fn from_reader(path: &Path, inner: Box<dyn Read + Send>) -> Result<Self, LoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(inner);

        let headers = reader
            .headers()
            .map_err(|source| LoadError::BadHeader {
                path: path.to_path_buf(),
                source,
            })?
            .clone();

        let columns = ColumnMap::from_headers(&headers).map_err(|missing| LoadError::MissingColumns {
            path: path.to_path_buf(),
            missing,
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            columns,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    /// Read the next record into `record`.
    ///
    /// `Ok(false)` at end of input. A record the CSV layer cannot decode is a
    /// row-level [`ReadFailure::Row`]; an I/O failure is fatal.
    pub fn read_record(&mut self, record: &mut StringRecord) -> Result<bool, ReadFailure> {
        match self.reader.read_record(record) {
            Ok(more) => Ok(more),
            Err(e) if e.is_io_error() => Err(ReadFailure::Fatal(LoadError::SourceUnreadable {
                path: self.path.clone(),
                source: match e.into_kind() {
                    csv::ErrorKind::Io(io) => io,
                    other => std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", other)),
                },
            })),
            Err(e) => Err(ReadFailure::Row(e.to_string())),
        }
    }
}

/// Failure while pulling the next record
#[derive(Debug)]
pub enum ReadFailure {
    /// The record is bad; the next one may be fine
    Row(String),
    /// The source itself failed
    Fatal(LoadError),
}
