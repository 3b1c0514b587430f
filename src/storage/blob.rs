use super::{filter_names, BackendKind, StorageBackend};
use crate::constants;
use crate::error::StorageError;
use crate::id_range::IdRange;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CatalogEntry {
    digest: String,
    size: u64,
}

/// Name → blob mapping; a name appears at most once.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    objects: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    fn references(&self, digest: &str) -> bool {
        self.objects.values().any(|entry| entry.digest == digest)
    }
}

/// Content-addressed blob store.
///
/// Contents live under `blobs/<sha256>` and are shared between names with
/// identical bytes; `catalog.json` maps object names to digests and is
/// rewritten atomically after every change.
pub struct BlobBackend {
    root: PathBuf,
    catalog: Mutex<Catalog>,
}

fn digest_hex(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    format!("{:x}", hasher.finalize())
}

impl BlobBackend {
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(constants::BLOB_CONTENT_DIR)).await?;

        let catalog_path = root.join(constants::BLOB_CATALOG);
        let catalog = match tokio::fs::read(&catalog_path).await {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| StorageError::Corrupt {
                name: catalog_path.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => Catalog::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            root,
            catalog: Mutex::new(catalog),
        })
    }

    fn blob_path(&self, digest: &str) -> PathBuf {
        self.root.join(constants::BLOB_CONTENT_DIR).join(digest)
    }

    async fn save_catalog(&self, catalog: &Catalog) -> Result<(), StorageError> {
        let catalog_path = self.root.join(constants::BLOB_CATALOG);
        let temp_path = catalog_path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(catalog).map_err(std::io::Error::other)?;
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &catalog_path).await?;
        Ok(())
    }

    /// Drop a name from the catalog and its blob once nothing references it
    async fn unlink(&self, catalog: &mut Catalog, name: &str) -> Result<bool, StorageError> {
        let Some(entry) = catalog.objects.remove(name) else {
            return Ok(false);
        };
        if !catalog.references(&entry.digest) {
            match tokio::fs::remove_file(self.blob_path(&entry.digest)).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    /// Number of distinct content blobs referenced by the catalog
    pub async fn blob_count(&self) -> usize {
        let catalog = self.catalog.lock().await;
        let mut digests: Vec<&str> = catalog.objects.values().map(|e| e.digest.as_str()).collect();
        digests.sort_unstable();
        digests.dedup();
        digests.len()
    }
}

#[async_trait]
impl StorageBackend for BlobBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Blob
    }

    fn location(&self) -> String {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        format!("blob:{}", root.display())
    }

    async fn store(&self, name: &str, contents: &[u8]) -> Result<(), StorageError> {
        let mut catalog = self.catalog.lock().await;
        self.unlink(&mut catalog, name).await?;

        let digest = digest_hex(contents);
        let blob_path = self.blob_path(&digest);
        if !tokio::fs::try_exists(&blob_path).await? {
            let temp_path = blob_path.with_extension("tmp");
            tokio::fs::write(&temp_path, contents).await?;
            tokio::fs::rename(&temp_path, &blob_path).await?;
        }

        catalog.objects.insert(
            name.to_string(),
            CatalogEntry {
                digest,
                size: contents.len() as u64,
            },
        );
        self.save_catalog(&catalog).await
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let entry = {
            let catalog = self.catalog.lock().await;
            catalog
                .objects
                .get(name)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(name.to_string()))?
        };

        let data = match tokio::fs::read(self.blob_path(&entry.digest)).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::Corrupt {
                    name: name.to_string(),
                    reason: format!("blob {} is missing", entry.digest),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if digest_hex(&data) != entry.digest {
            return Err(StorageError::Corrupt {
                name: name.to_string(),
                reason: "content digest mismatch".to_string(),
            });
        }
        Ok(data)
    }

    async fn exists(&self, name: &str, prefix_only: bool) -> Result<bool, StorageError> {
        let catalog = self.catalog.lock().await;
        if prefix_only {
            Ok(catalog
                .objects
                .range(name.to_string()..)
                .next()
                .is_some_and(|(key, _)| key.starts_with(name)))
        } else {
            Ok(catalog.objects.contains_key(name))
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let mut catalog = self.catalog.lock().await;
        if self.unlink(&mut catalog, name).await? {
            self.save_catalog(&catalog).await?;
        }
        Ok(())
    }

    async fn list(&self, range: &IdRange) -> Result<Vec<String>, StorageError> {
        let catalog = self.catalog.lock().await;
        Ok(filter_names(catalog.objects.keys().cloned(), range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_keeps_single_entry_and_collects_blob() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobBackend::open(dir.path()).await.unwrap();

        blob.store("ntp00000001_a.pdf", b"first").await.unwrap();
        blob.store("ntp00000001_a.pdf", b"second").await.unwrap();

        assert_eq!(blob.list(&IdRange::All).await.unwrap(), vec!["ntp00000001_a.pdf"]);
        assert_eq!(blob.read("ntp00000001_a.pdf").await.unwrap(), b"second");
        assert_eq!(blob.blob_count().await, 1);
        assert!(!blob.blob_path(&digest_hex(b"first")).exists());
    }

    #[tokio::test]
    async fn test_shared_content_survives_single_delete() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobBackend::open(dir.path()).await.unwrap();

        blob.store("ntp00000001_a.pdf", b"same").await.unwrap();
        blob.store("ntp00000002_a.pdf", b"same").await.unwrap();
        blob.delete("ntp00000001_a.pdf").await.unwrap();

        assert_eq!(blob.read("ntp00000002_a.pdf").await.unwrap(), b"same");
        assert!(blob.read("ntp00000001_a.pdf").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_tampered_blob_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let blob = BlobBackend::open(dir.path()).await.unwrap();
        blob.store("ntp00000001_a.pdf", b"original").await.unwrap();

        std::fs::write(blob.blob_path(&digest_hex(b"original")), b"tampered").unwrap();
        assert!(matches!(
            blob.read("ntp00000001_a.pdf").await,
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_catalog_persists_and_prefix_lookup() {
        let dir = tempfile::tempdir().unwrap();
        {
            let blob = BlobBackend::open(dir.path()).await.unwrap();
            blob.store("ntp00000005_anexos-2.zip", b"zip").await.unwrap();
        }
        let blob = BlobBackend::open(dir.path()).await.unwrap();
        assert!(blob.exists("ntp00000005_anexos-2.", true).await.unwrap());
        assert!(!blob.exists("ntp00000005_anexos-1.", true).await.unwrap());
        assert!(blob.exists("ntp00000005_anexos-2.zip", false).await.unwrap());
    }
}
