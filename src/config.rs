// Run configuration loaded from YAML; every field has a default
use crate::constants;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fetch: FetchConfig,
    pub store: StoreConfig,
    pub storage: StorageConfig,
    pub resolver: ResolverConfig,
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.timeout_secs == 0 {
            anyhow::bail!("fetch.timeout_secs must be greater than 0");
        }
        if self.store.page_size == 0 || self.store.bulk_size == 0 {
            anyhow::bail!("store.page_size and store.bulk_size must be greater than 0");
        }
        if self.resolver.max_chain_hops == 0 {
            anyhow::bail!("resolver.max_chain_hops must be greater than 0");
        }
        Ok(())
    }
}

// ============================================================================
// Fetch
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    pub accepted_extensions: Vec<String>,
    /// Pause before a request to the same host as the previous one
    pub host_delay_ms: u64,
    pub verify_tls: bool,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: constants::HTTP_TIMEOUT_SECS,
            max_redirects: constants::MAX_REDIRECTS,
            accepted_extensions: constants::ACCEPTED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            host_delay_ms: 0,
            verify_tls: true,
            user_agent: constants::user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn host_delay(&self) -> Option<Duration> {
        (self.host_delay_ms > 0).then(|| Duration::from_millis(self.host_delay_ms))
    }

    pub fn accepts(&self, ext: &str) -> bool {
        self.accepted_extensions.iter().any(|accepted| accepted == ext)
    }
}

// ============================================================================
// Record Store
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Primary record collection (JSON lines)
    pub records: PathBuf,
    /// Older collection consulted for missing ids and dangling pointers
    pub legacy: Option<PathBuf>,
    pub page_size: usize,
    pub bulk_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            records: PathBuf::from("records.jsonl"),
            legacy: None,
            page_size: constants::DEFAULT_PAGE_SIZE,
            bulk_size: constants::DEFAULT_BULK_SIZE,
        }
    }
}

// ============================================================================
// Storage Backends
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub disk_folder: PathBuf,
    pub blob_root: PathBuf,
    pub backup_blob_root: PathBuf,
    pub swift: Option<SwiftConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            disk_folder: PathBuf::from(constants::DEFAULT_DISK_FOLDER),
            blob_root: PathBuf::from(constants::DEFAULT_BLOB_ROOT),
            backup_blob_root: PathBuf::from(constants::DEFAULT_BACKUP_BLOB_ROOT),
            swift: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwiftConfig {
    #[serde(default = "default_swift_container")]
    pub container: String,
    #[serde(default = "default_swift_prefix")]
    pub prefix: String,
    pub auth: SwiftAuth,
}

fn default_swift_container() -> String {
    constants::DEFAULT_SWIFT_CONTAINER.to_string()
}

fn default_swift_prefix() -> String {
    constants::DEFAULT_SWIFT_PREFIX.to_string()
}

/// How the Swift backend obtains its token and storage URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SwiftAuth {
    /// Pre-issued token for a known storage URL
    Token { storage_url: String, token: String },
    /// Keystone v3 application credential
    ApplicationCredential {
        auth_url: String,
        credential_id: String,
        credential_secret: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default = "default_interface")]
        interface: String,
    },
}

fn default_interface() -> String {
    "public".to_string()
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub max_chain_hops: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_chain_hops: constants::MAX_CHAIN_HOPS,
        }
    }
}
