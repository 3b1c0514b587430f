use super::{MemoryRecordStore, RecordStore};
use crate::error::StoreError;
use crate::id_range::IdRange;
use crate::record::{Partition, Record, RecordId};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Record collection persisted as one JSON document per line.
///
/// The whole collection is loaded at open; changes are kept in memory and
/// written back atomically (temp file + rename) on `flush`.
pub struct JsonlRecordStore {
    path: PathBuf,
    inner: MemoryRecordStore,
    dirty: bool,
    read_only: bool,
}

impl JsonlRecordStore {
    /// Open an existing collection for reads and writes
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::load(path.as_ref(), false, false)
    }

    /// Open a collection, starting an empty one if the file does not exist
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::load(path.as_ref(), false, true)
    }

    /// Open an existing collection for reads only (legacy/backup stores)
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::load(path.as_ref(), true, false)
    }

    fn load(path: &Path, read_only: bool, create: bool) -> Result<Self, StoreError> {
        let connection_error = |reason: String| StoreError::Connection {
            path: path.display().to_string(),
            reason,
        };

        if !path.exists() {
            if !create {
                return Err(connection_error("file does not exist".to_string()));
            }
            return Ok(Self {
                path: path.to_path_buf(),
                inner: MemoryRecordStore::new(),
                dirty: true,
                read_only,
            });
        }

        let file = std::fs::File::open(path).map_err(|e| connection_error(e.to_string()))?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line).map_err(|e| StoreError::Parse {
                line: idx + 1,
                reason: e.to_string(),
            })?;
            records.push(record);
        }
        log::debug!("Loaded {} records from {}", records.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryRecordStore::from_records(records),
            dirty: false,
            read_only,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let temp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut out = std::io::BufWriter::new(std::fs::File::create(&temp_path)?);
            for record in self.inner.records() {
                serde_json::to_writer(&mut out, record)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl RecordStore for JsonlRecordStore {
    fn get(&self, id: &RecordId) -> Result<Option<Record>, StoreError> {
        self.inner.get(id)
    }

    fn scan(&self, range: &IdRange, skip: usize, limit: usize) -> Result<Vec<Record>, StoreError> {
        self.inner.scan(range, skip, limit)
    }

    fn versions(&self, natural_key: &str) -> Result<Vec<Record>, StoreError> {
        self.inner.versions(natural_key)
    }

    fn replace(&mut self, record: Record) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{} is opened read-only", self.path.display()),
            )));
        }
        self.dirty = true;
        self.inner.replace(record)
    }

    fn max_id(&self, partition: Partition) -> Result<Option<RecordId>, StoreError> {
        self.inner.max_id(partition)
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty && !self.read_only {
            self.save()?;
            self.dirty = false;
        }
        Ok(())
    }
}
