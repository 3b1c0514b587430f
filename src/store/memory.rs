use super::RecordStore;
use crate::error::StoreError;
use crate::id_range::IdRange;
use crate::record::{Partition, Record, RecordId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// In-memory record collection with a natural-key index.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecordStore {
    records: BTreeMap<RecordId, Record>,
    by_key: HashMap<String, BTreeSet<RecordId>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    fn insert(&mut self, record: Record) {
        if let Some(old) = self.records.get(&record.id) {
            let old_key = old.natural_key().to_string();
            if let Some(ids) = self.by_key.get_mut(&old_key) {
                ids.remove(&record.id);
                if ids.is_empty() {
                    self.by_key.remove(&old_key);
                }
            }
        }
        self.by_key
            .entry(record.natural_key().to_string())
            .or_default()
            .insert(record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    fn bounds(range: &IdRange) -> (Bound<RecordId>, Bound<RecordId>) {
        let lower = range
            .lower()
            .map_or(Bound::Unbounded, |id| Bound::Included(id.clone()));
        let upper = range
            .upper()
            .map_or(Bound::Unbounded, |id| Bound::Included(id.clone()));
        (lower, upper)
    }
}

impl RecordStore for MemoryRecordStore {
    fn get(&self, id: &RecordId) -> Result<Option<Record>, StoreError> {
        Ok(self.records.get(id).cloned())
    }

    fn scan(&self, range: &IdRange, skip: usize, limit: usize) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .records
            .range(Self::bounds(range))
            .map(|(_, record)| record)
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }

    fn versions(&self, natural_key: &str) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .by_key
            .get(natural_key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.records.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn replace(&mut self, record: Record) -> Result<(), StoreError> {
        self.insert(record);
        Ok(())
    }

    fn max_id(&self, partition: Partition) -> Result<Option<RecordId>, StoreError> {
        Ok(self
            .records
            .range(partition.first_id()..=partition.last_id())
            .next_back()
            .map(|(id, _)| id.clone()))
    }
}
