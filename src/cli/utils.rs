// Shared helpers for CLI commands
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tenderlake::constants;
use tenderlake::storage::{open_backend, BackendKind, BackendSelector, StorageBackend};
use tenderlake::{Config, IdRange, JsonlRecordStore};

/// `--id`, `--ini` and `--fin` record selectors
#[derive(Args, Debug, Clone, Default)]
pub struct RangeArgs {
    /// Process a single record id (e.g. ntp00012345)
    #[arg(long, conflicts_with_all = ["ini", "fin"])]
    pub id: Option<String>,

    /// First record id of the range (inclusive)
    #[arg(long)]
    pub ini: Option<String>,

    /// Last record id of the range (inclusive)
    #[arg(long)]
    pub fin: Option<String>,
}

impl RangeArgs {
    pub fn range(&self) -> Result<IdRange> {
        Ok(IdRange::from_selectors(
            self.id.as_deref(),
            self.ini.as_deref(),
            self.fin.as_deref(),
        )?)
    }
}

/// `--where`, `--folder` and `--container` document store selectors
#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Document store: disk, blob or swift
    #[arg(long = "where", default_value = "disk", value_parser = parse_kind)]
    pub kind: BackendKind,

    /// Directory (disk), root (blob) or object prefix (swift)
    #[arg(long)]
    pub folder: Option<String>,

    /// Swift container
    #[arg(long)]
    pub container: Option<String>,
}

impl StorageArgs {
    pub fn selector(&self) -> BackendSelector {
        BackendSelector::new(self.kind)
            .folder(self.folder.clone())
            .container(self.container.clone())
    }
}

pub fn parse_kind(value: &str) -> Result<BackendKind, String> {
    value.parse()
}

/// Load the configuration; an explicit path must exist
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Config::load_or_default(Path::new(constants::DEFAULT_CONFIG_FILE)),
    }
}

/// Single-threaded runtime for the async parts of a command
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

pub fn open_records(config: &Config) -> Result<JsonlRecordStore> {
    let path = &config.store.records;
    JsonlRecordStore::open(path)
        .with_context(|| format!("Failed to open record store {}", display_path(path).display()))
}

/// Record store for commands that may start a new collection
pub fn open_or_create_records(config: &Config) -> Result<JsonlRecordStore> {
    let path = &config.store.records;
    JsonlRecordStore::open_or_create(path)
        .with_context(|| format!("Failed to open record store {}", display_path(path).display()))
}

pub fn open_legacy(config: &Config) -> Result<Option<JsonlRecordStore>> {
    config
        .store
        .legacy
        .as_ref()
        .map(|path| {
            JsonlRecordStore::open_read_only(path).with_context(|| {
                format!("Failed to open legacy store {}", display_path(path).display())
            })
        })
        .transpose()
}

pub async fn open_storage(
    selector: &BackendSelector,
    config: &Config,
) -> Result<Box<dyn StorageBackend>> {
    open_backend(selector, &config.storage)
        .await
        .with_context(|| format!("Failed to open {} storage", selector.kind))
}

/// Display path resolving "." to absolute path
pub fn display_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
