// Retention: move documents of obsolete records to a backup store, and bring them back
use crate::id_range::IdRange;
use crate::record::object_record_id;
use crate::storage::StorageBackend;
use crate::store::RecordStore;
use anyhow::Result;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct PurgeOptions {
    /// Delete without copying to the backup store
    pub no_backup: bool,
    /// Report what would be purged, change nothing
    pub check_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionSummary {
    pub examined: usize,
    pub purged: usize,
    pub skipped: usize,
    pub backed_up: usize,
    pub deleted: usize,
    pub recovered: usize,
    pub failures: usize,
    /// Objects that would be purged, filled in check-only mode
    pub planned: Vec<String>,
}

pub struct RetentionManager<'a> {
    primary: &'a dyn StorageBackend,
    backup: &'a dyn StorageBackend,
    page_size: usize,
}

impl<'a> RetentionManager<'a> {
    pub fn new(
        primary: &'a dyn StorageBackend,
        backup: &'a dyn StorageBackend,
        page_size: usize,
    ) -> Self {
        Self {
            primary,
            backup,
            page_size: page_size.max(1),
        }
    }

    /// Purge the documents of every obsolete record in `range`.
    ///
    /// Each object is copied to the backup store (unless `no_backup`) and then
    /// deleted from primary. A failed backup copy leaves the primary object in
    /// place and counts as a failure.
    pub async fn purge(
        &self,
        store: &dyn RecordStore,
        range: &IdRange,
        options: &PurgeOptions,
    ) -> Result<RetentionSummary> {
        let mut summary = RetentionSummary::default();

        let mut objects: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in self.primary.list(range).await? {
            if let Some(id) = object_record_id(&name) {
                objects.entry(id.to_string()).or_default().push(name);
            }
        }
        log::debug!("{} records with stored documents in {}", objects.len(), range);

        if let IdRange::Single(id) = range {
            if store.get(id)?.is_none() {
                log::warn!("{} not found", id);
                summary.skipped += 1;
                return Ok(summary);
            }
        }

        let mut skip = 0;
        loop {
            let page = store.scan(range, skip, self.page_size)?;
            let count = page.len();
            skip += count;

            for record in page {
                summary.examined += 1;
                if !record.obsolete {
                    log::warn!("{} is not marked as obsolete", record.id);
                    summary.skipped += 1;
                    continue;
                }
                log::info!("Processing {}", record.id);
                summary.purged += 1;

                let names = objects.remove(record.id.as_str()).unwrap_or_default();
                for name in names {
                    if options.check_only {
                        summary.planned.push(name);
                        continue;
                    }
                    self.purge_object(&name, options, &mut summary).await;
                }
            }

            if count < self.page_size {
                break;
            }
        }
        Ok(summary)
    }

    async fn purge_object(&self, name: &str, options: &PurgeOptions, summary: &mut RetentionSummary) {
        if !options.no_backup {
            let copied = match self.primary.read(name).await {
                Ok(data) => self.backup.store(name, &data).await,
                Err(e) => Err(e),
            };
            if let Err(e) = copied {
                log::error!("Backup of {} failed, keeping it: {}", name, e);
                summary.failures += 1;
                return;
            }
            summary.backed_up += 1;
        }

        match self.primary.delete(name).await {
            Ok(()) => {
                log::info!("Deleted {}", name);
                summary.deleted += 1;
            }
            Err(e) => {
                log::error!("Deletion of {} failed: {}", name, e);
                summary.failures += 1;
            }
        }
    }

    /// Copy every backup object of `range` back into primary, overwriting
    pub async fn recover(&self, range: &IdRange) -> Result<RetentionSummary> {
        let mut summary = RetentionSummary::default();
        for name in self.backup.list(range).await? {
            summary.examined += 1;
            let restored = match self.backup.read(&name).await {
                Ok(data) => self.primary.store(&name, &data).await,
                Err(e) => Err(e),
            };
            match restored {
                Ok(()) => {
                    log::info!("Recovered {}", name);
                    summary.recovered += 1;
                }
                Err(e) => {
                    log::error!("Recovery of {} failed: {}", name, e);
                    summary.failures += 1;
                }
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordId};
    use crate::storage::DiskBackend;
    use crate::store::MemoryRecordStore;

    fn obsolete(n: u64, target: u64) -> Record {
        Record::new(RecordId::from_number(n), "u/T1", None).obsolete_stub(&RecordId::from_number(target))
    }

    #[tokio::test]
    async fn test_purge_moves_objects_of_obsolete_records_only() {
        let dir = tempfile::tempdir().unwrap();
        let primary = DiskBackend::open(dir.path().join("primary")).unwrap();
        let backup = DiskBackend::open(dir.path().join("backup")).unwrap();
        primary.store("ntp00000001_a.pdf", b"old").await.unwrap();
        primary.store("ntp00000002_a.pdf", b"new").await.unwrap();

        let store = MemoryRecordStore::from_records(vec![
            obsolete(1, 2),
            Record::new(RecordId::from_number(2), "u/T1", None),
        ]);

        let retention = RetentionManager::new(&primary, &backup, 10);
        let summary = retention
            .purge(&store, &IdRange::All, &PurgeOptions::default())
            .await
            .unwrap();

        assert_eq!(summary.examined, 2);
        assert_eq!(summary.purged, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(primary.list(&IdRange::All).await.unwrap(), vec!["ntp00000002_a.pdf"]);
        assert_eq!(backup.read("ntp00000001_a.pdf").await.unwrap(), b"old");

        let recovered = retention
            .recover(&IdRange::Single(RecordId::from_number(1)))
            .await
            .unwrap();
        assert_eq!(recovered.recovered, 1);
        assert_eq!(primary.read("ntp00000001_a.pdf").await.unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_check_only_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let primary = DiskBackend::open(dir.path().join("primary")).unwrap();
        let backup = DiskBackend::open(dir.path().join("backup")).unwrap();
        primary.store("ntp00000001_a.pdf", b"old").await.unwrap();
        let store = MemoryRecordStore::from_records(vec![obsolete(1, 2)]);

        let options = PurgeOptions {
            check_only: true,
            ..Default::default()
        };
        let summary = RetentionManager::new(&primary, &backup, 10)
            .purge(&store, &IdRange::All, &options)
            .await
            .unwrap();
        assert_eq!(summary.purged, 1);
        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.planned, vec!["ntp00000001_a.pdf"]);
        assert!(primary.exists("ntp00000001_a.pdf", false).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_single_id_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let primary = DiskBackend::open(dir.path().join("primary")).unwrap();
        let backup = DiskBackend::open(dir.path().join("backup")).unwrap();
        let store = MemoryRecordStore::new();

        let summary = RetentionManager::new(&primary, &backup, 10)
            .purge(&store, &IdRange::Single(RecordId::from_number(9)), &PurgeOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.examined, 0);
    }
}
