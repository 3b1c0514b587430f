use super::{BulkReport, RecordStore};
use crate::error::StoreError;
use crate::record::Record;

/// Fixed-capacity buffer of pending record replacements.
///
/// `push` reports when the buffer is full; `commit_if_full` and `commit`
/// hand the buffered records to the store as one unordered bulk operation.
pub struct BulkWriter {
    label: String,
    capacity: usize,
    buffer: Vec<Record>,
    totals: BulkReport,
}

impl BulkWriter {
    pub fn new(label: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            label: label.into(),
            capacity,
            buffer: Vec::with_capacity(capacity),
            totals: BulkReport::default(),
        }
    }

    /// Buffer a record; returns true once the buffer is full
    pub fn push(&mut self, record: Record) -> bool {
        self.buffer.push(record);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn commit_if_full(&mut self, store: &mut dyn RecordStore) -> Result<(), StoreError> {
        if self.is_full() {
            self.commit(store)?;
        }
        Ok(())
    }

    /// Flush whatever is buffered
    pub fn commit(&mut self, store: &mut dyn RecordStore) -> Result<(), StoreError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
        let count = batch.len();
        let last_id = batch.last().map(|r| r.id.to_string()).unwrap_or_default();
        let report = store.bulk_replace(batch)?;

        for (id, reason) in &report.failed {
            log::error!("[{}] write of {} failed: {}", self.label, id, reason);
        }
        self.totals.absorb(report);
        log::info!(
            "[{}] Committing {:7} ops. ({:8}) | {:7} matched | {:7} upserted | {:5} failed (last id: {})",
            self.label,
            count,
            self.totals.total(),
            self.totals.matched,
            self.totals.upserted,
            self.totals.failed.len(),
            last_id
        );
        Ok(())
    }

    pub fn totals(&self) -> &BulkReport {
        &self.totals
    }
}
