use super::{filter_names, BackendKind, StorageBackend};
use crate::error::StorageError;
use crate::id_range::IdRange;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Flat directory of files named by object name.
pub struct DiskBackend {
    dir: PathBuf,
}

impl DiskBackend {
    /// Open a directory backend, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn names(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl StorageBackend for DiskBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Disk
    }

    fn location(&self) -> String {
        let dir = self.dir.canonicalize().unwrap_or_else(|_| self.dir.clone());
        format!("disk:{}", dir.display())
    }

    async fn store(&self, name: &str, contents: &[u8]) -> Result<(), StorageError> {
        tokio::fs::write(self.dir.join(name), contents).await?;
        Ok(())
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(self.dir.join(name)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str, prefix_only: bool) -> Result<bool, StorageError> {
        if !prefix_only {
            return Ok(tokio::fs::try_exists(self.dir.join(name)).await?);
        }
        Ok(self.names().await?.iter().any(|n| n.starts_with(name)))
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, range: &IdRange) -> Result<Vec<String>, StorageError> {
        Ok(filter_names(self.names().await?, range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let disk = DiskBackend::open(dir.path().join("docs")).unwrap();

        disk.store("ntp00000001_pliego.pdf", b"%PDF-1.4").await.unwrap();
        assert_eq!(disk.read("ntp00000001_pliego.pdf").await.unwrap(), b"%PDF-1.4");
        assert!(disk.exists("ntp00000001_pliego.", true).await.unwrap());
        assert!(!disk.exists("ntp00000001_pliego.", false).await.unwrap());
        assert!(!disk.exists("ntp00000002_", true).await.unwrap());

        disk.delete("ntp00000001_pliego.pdf").await.unwrap();
        disk.delete("ntp00000001_pliego.pdf").await.unwrap();
        assert!(disk.read("ntp00000001_pliego.pdf").await.unwrap_err().is_not_found());
    }
}
