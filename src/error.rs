// Error taxonomy shared by the library components
use std::io;

use thiserror::Error;

/// Malformed input detected before any work begins.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is not a valid record id")]
    InvalidId(String),
    #[error("invalid id range: {min} > {max}")]
    InvertedRange { min: String, max: String },
    #[error("--id cannot be combined with --ini/--fin")]
    ConflictingSelectors,
    #[error("origin and destination are the same storage ({0})")]
    SameStorage(String),
    #[error("unknown partition '{0}' (expected standard|minor)")]
    UnknownPartition(String),
}

/// Failure reported by a storage backend for a single object.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("object {name} is corrupt: {reason}")]
    Corrupt { name: String, reason: String },
    #[error("remote storage returned {status} for {name}")]
    Remote { name: String, status: u16 },
    #[error("remote storage request failed: {0}")]
    Transport(String),
    #[error("storage authentication failed: {0}")]
    Auth(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Transport(err.to_string())
    }
}

/// Failure of the record store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open record store at {path}: {reason}")]
    Connection { path: String, reason: String },
    #[error("malformed record at line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Broken version chains found while resolving.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsistencyError {
    #[error("{id} points to {target}, which exists in neither the primary nor the legacy store")]
    DanglingTarget { id: String, target: String },
    #[error("obsolete chain starting at {id} loops back to {repeated}")]
    Cycle { id: String, repeated: String },
    #[error("obsolete chain starting at {id} exceeds {hops} hops")]
    TooLong { id: String, hops: usize },
    #[error("no active record found for natural key {0}")]
    NoActiveRecord(String),
}
