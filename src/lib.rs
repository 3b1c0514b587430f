//! tenderlake - version resolution and document archiving for public tender records.
//!
//! Tender records arrive as repeated snapshots of the same procurement; the
//! [`resolver`] collapses them to one active record per natural key with
//! obsolete stubs pointing at it. The [`fetcher`] downloads the documents a
//! record links to into one of the [`storage`] backends, and [`retention`] and
//! [`sync`] keep those backends tidy.

pub mod config;
pub mod constants;
pub mod error;
pub mod fetcher;
pub mod format;
pub mod harvest;
pub mod id_range;
pub mod record;
pub mod resolver;
pub mod retention;
pub mod sniff;
pub mod storage;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{ConsistencyError, StorageError, StoreError, ValidationError};
pub use fetcher::{DocumentFetcher, FetchOptions, FetchOutcome, SkipReason};
pub use harvest::{HarvestSummary, Harvester};
pub use id_range::IdRange;
pub use record::{FieldRef, FieldValue, Partition, Record, RecordId, Updated};
pub use resolver::{IngestOutcome, PatchEntry, PatchSink, VersionResolver};
pub use retention::{PurgeOptions, RetentionManager, RetentionSummary};
pub use storage::{open_backend, BackendKind, BackendSelector, StorageBackend};
pub use store::{BulkWriter, JsonlRecordStore, MemoryRecordStore, RecordStore};
pub use sync::{SyncMode, SyncPlan, SyncReconciler, SyncSummary};
