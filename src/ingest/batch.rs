use crate::types::TradeRecord;

/// Ordered accumulation of parsed trades for one load run.
///
/// Submission order is the order rows land in the store, so the batch only
/// ever appends. No dedup.
#[derive(Debug, Default)]
pub struct Batch {
    rows: Vec<TradeRecord>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: TradeRecord) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[TradeRecord] {
        &self.rows
    }

    /// Consume the batch as consecutive chunks, preserving order.
    ///
    /// `None` (or zero) yields the whole batch as a single chunk. Each chunk
    /// carries the 0-based offset of its first row within the batch.
    pub fn into_chunks(self, chunk_size: Option<usize>) -> Vec<(usize, Vec<TradeRecord>)> {
        let size = match chunk_size {
            Some(n) if n > 0 => n,
            _ => return if self.rows.is_empty() { vec![] } else { vec![(0, self.rows)] },
        };

        let mut chunks = Vec::with_capacity(self.rows.len().div_ceil(size));
        let mut rows = self.rows.into_iter().peekable();
        let mut offset = 0;
        while rows.peek().is_some() {
            let chunk: Vec<TradeRecord> = rows.by_ref().take(size).collect();
            let len = chunk.len();
            chunks.push((offset, chunk));
            offset += len;
        }
        chunks
    }
}
