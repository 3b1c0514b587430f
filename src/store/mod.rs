// Record store - keyed document collection holding tender records
use crate::error::StoreError;
use crate::id_range::IdRange;
use crate::record::{Partition, Record, RecordId};

mod bulk;
mod jsonl;
mod memory;

pub use bulk::BulkWriter;
pub use jsonl::JsonlRecordStore;
pub use memory::MemoryRecordStore;

/// Outcome of one bulk replace.
///
/// After a flush every buffered record is either counted as matched
/// (replaced an existing id), upserted (new id) or listed as failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub matched: usize,
    pub upserted: usize,
    pub failed: Vec<(RecordId, String)>,
}

impl BulkReport {
    pub fn total(&self) -> usize {
        self.matched + self.upserted + self.failed.len()
    }

    pub fn absorb(&mut self, other: BulkReport) {
        self.matched += other.matched;
        self.upserted += other.upserted;
        self.failed.extend(other.failed);
    }
}

/// Keyed collection of records addressed by id.
///
/// Queries mirror what the batch jobs need: point lookups, id-ordered range
/// scans with skip/limit paging, natural-key grouping and replace-by-id.
pub trait RecordStore {
    fn get(&self, id: &RecordId) -> Result<Option<Record>, StoreError>;

    /// Records in `range` ordered by id, skipping `skip` and returning at most `limit`
    fn scan(&self, range: &IdRange, skip: usize, limit: usize) -> Result<Vec<Record>, StoreError>;

    /// Every record (active or obsolete) sharing a natural key, ordered by id
    fn versions(&self, natural_key: &str) -> Result<Vec<Record>, StoreError>;

    /// Upsert by id
    fn replace(&mut self, record: Record) -> Result<(), StoreError>;

    /// Unordered bulk upsert; individual failures are reported, not raised
    fn bulk_replace(&mut self, records: Vec<Record>) -> Result<BulkReport, StoreError> {
        let mut report = BulkReport::default();
        for record in records {
            let id = record.id.clone();
            let existed = self.get(&id)?.is_some();
            match self.replace(record) {
                Ok(()) if existed => report.matched += 1,
                Ok(()) => report.upserted += 1,
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }
        Ok(report)
    }

    /// Highest id present in a partition
    fn max_id(&self, partition: Partition) -> Result<Option<RecordId>, StoreError>;

    /// Persist pending changes, for stores that buffer them
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Next free id of a partition
pub fn next_id(store: &dyn RecordStore, partition: Partition) -> Result<RecordId, StoreError> {
    Ok(match store.max_id(partition)? {
        Some(id) => RecordId::from_number(id.number() + 1),
        None => partition.first_id(),
    })
}
