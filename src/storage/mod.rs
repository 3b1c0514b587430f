//! Storage backends for fetched documents.
//!
//! Every physical store (local directory, content-addressed blob store, Swift
//! object container) is reached through [`StorageBackend`], so the fetcher,
//! retention and sync code never touch a store directly. Object names follow
//! `{id}_{field}.{ext}`; the id before the first `_` drives ranged listings.

use crate::config::StorageConfig;
use crate::error::{StorageError, ValidationError};
use crate::id_range::IdRange;
use crate::record::object_record_id;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

mod blob;
mod disk;
mod swift;

pub use blob::BlobBackend;
pub use disk::DiskBackend;
pub use swift::SwiftBackend;

/// Uniform object-store contract.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Backend family
    fn kind(&self) -> BackendKind;

    /// Identity of the physical location (`disk:/path`, `swift:container/prefix`)
    fn location(&self) -> String;

    /// Write an object, overwriting any previous content
    async fn store(&self, name: &str, contents: &[u8]) -> Result<(), StorageError>;

    /// Read an object; [`StorageError::NotFound`] if absent
    async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Whether `name` exists, or with `prefix_only` whether any name starts with it
    async fn exists(&self, name: &str, prefix_only: bool) -> Result<bool, StorageError>;

    /// Remove an object; absent names are not an error
    async fn delete(&self, name: &str) -> Result<(), StorageError>;

    /// Sorted object names whose embedded record id lies in `range`
    async fn list(&self, range: &IdRange) -> Result<Vec<String>, StorageError>;
}

/// Keep names carrying a record id within `range`, sorted.
pub(crate) fn filter_names<I>(names: I, range: &IdRange) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut selected: Vec<String> = names
        .into_iter()
        .filter(|name| object_record_id(name).is_some_and(|id| range.contains_str(id)))
        .collect();
    selected.sort_unstable();
    selected
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Disk,
    Blob,
    Swift,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disk" | "disc" => Ok(BackendKind::Disk),
            "blob" | "gridfs" => Ok(BackendKind::Blob),
            "swift" => Ok(BackendKind::Swift),
            other => Err(format!("unknown storage '{}' (expected disk|blob|swift)", other)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Disk => f.write_str("disk"),
            BackendKind::Blob => f.write_str("blob"),
            BackendKind::Swift => f.write_str("swift"),
        }
    }
}

/// Which backend to open and where.
///
/// `folder` overrides the disk directory, the blob root or the Swift object
/// prefix; `container` overrides the Swift container.
#[derive(Debug, Clone)]
pub struct BackendSelector {
    pub kind: BackendKind,
    pub folder: Option<String>,
    pub container: Option<String>,
    /// Open the backup location of the kind instead of the primary one
    pub backup: bool,
}

impl BackendSelector {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            folder: None,
            container: None,
            backup: false,
        }
    }

    pub fn folder(mut self, folder: Option<String>) -> Self {
        self.folder = folder;
        self
    }

    pub fn container(mut self, container: Option<String>) -> Self {
        self.container = container;
        self
    }

    /// Backup store used by retention: the blob backup root by default
    pub fn backup() -> Self {
        Self {
            kind: BackendKind::Blob,
            folder: None,
            container: None,
            backup: true,
        }
    }
}

/// Build the backend described by `selector` from the storage configuration
pub async fn open_backend(
    selector: &BackendSelector,
    config: &StorageConfig,
) -> anyhow::Result<Box<dyn StorageBackend>> {
    let backend: Box<dyn StorageBackend> = match selector.kind {
        BackendKind::Disk => {
            let dir = selector
                .folder
                .as_ref()
                .map(PathBuf::from)
                .unwrap_or_else(|| config.disk_folder.clone());
            Box::new(DiskBackend::open(dir)?)
        }
        BackendKind::Blob => {
            let root = match (&selector.folder, selector.backup) {
                (Some(folder), _) => PathBuf::from(folder),
                (None, true) => config.backup_blob_root.clone(),
                (None, false) => config.blob_root.clone(),
            };
            Box::new(BlobBackend::open(root).await?)
        }
        BackendKind::Swift => {
            let mut swift = config
                .swift
                .clone()
                .ok_or_else(|| anyhow::anyhow!("storage.swift is not configured"))?;
            if let Some(container) = &selector.container {
                swift.container = container.clone();
            }
            if let Some(prefix) = &selector.folder {
                swift.prefix = prefix.clone();
            }
            Box::new(SwiftBackend::connect(&swift).await?)
        }
    };
    log::debug!("Using {} storage at {}", backend.kind(), backend.location());
    Ok(backend)
}

/// Refuse to pair a backend with itself
pub fn ensure_distinct(
    origin: &dyn StorageBackend,
    destination: &dyn StorageBackend,
) -> Result<(), ValidationError> {
    let location = origin.location();
    if location == destination.location() {
        return Err(ValidationError::SameStorage(location));
    }
    Ok(())
}
