//! Global constants: identifiers, networking defaults, accepted document types and batch sizes

/// Binary name used in user agents
pub const BINARY_NAME: &str = "tenderlake";

/// Package version from Cargo.toml (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the user agent string for HTTP requests
pub fn user_agent() -> String {
    format!("{}/{}", BINARY_NAME, VERSION)
}

// ============================================================================
// Record Identifiers
// ============================================================================

/// Prefix shared by every record id (e.g. "ntp00001234")
pub const ID_PREFIX: &str = "ntp";

/// Number of zero-padded digits following the prefix
pub const ID_DIGITS: usize = 8;

/// First number of the standard partition
pub const STANDARD_PARTITION_START: u64 = 0;

/// First number of the minor-contracts partition
pub const MINOR_PARTITION_START: u64 = 10_000_000;

/// Largest number representable with `ID_DIGITS` digits
pub const MAX_ID_NUMBER: u64 = 99_999_999;

/// Number of characters of a timestamp taken into account (YYYY-MM-DD HH:MM:SS)
pub const TIMESTAMP_PRECISION: usize = 19;

// ============================================================================
// Fetch Defaults
// ============================================================================

/// Default HTTP request timeout
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Redirect status codes followed by the fetcher
pub const REDIRECT_CODES: [u16; 5] = [301, 302, 303, 307, 308];

/// Maximum number of HTTP redirects followed for one document
pub const MAX_REDIRECTS: usize = 30;

/// Document extensions worth archiving
pub const ACCEPTED_EXTENSIONS: [&str; 15] = [
    "7z", "doc", "docx", "dwg", "odg", "odt", "pdf", "rar", "rtf", "tcq", "txt", "xls", "xlsm",
    "xlsx", "zip",
];

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_HTML_PREFIX: &str = "text/html";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// ============================================================================
// Record Store Defaults
// ============================================================================

/// Records fetched per page when scanning the record store
pub const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Buffered writes before a bulk flush
pub const DEFAULT_BULK_SIZE: usize = 1_000;

/// Upper bound on obsolete-chain hops before a chain is reported as broken
pub const MAX_CHAIN_HOPS: usize = 64;

// ============================================================================
// Storage Defaults
// ============================================================================

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "tenderlake.yml";

/// Default folder for the disk backend
pub const DEFAULT_DISK_FOLDER: &str = "documents";

/// Default root for the primary blob store
pub const DEFAULT_BLOB_ROOT: &str = "blobs/documents";

/// Default root for the backup blob store
pub const DEFAULT_BACKUP_BLOB_ROOT: &str = "blobs/documents_backup";

/// Blob store catalog file name
pub const BLOB_CATALOG: &str = "catalog.json";

/// Blob store content subdirectory
pub const BLOB_CONTENT_DIR: &str = "blobs";

/// Default Swift container and object prefix
pub const DEFAULT_SWIFT_CONTAINER: &str = "ESPROC";
pub const DEFAULT_SWIFT_PREFIX: &str = "documentos";

/// Objects requested per Swift container listing page
pub const SWIFT_LISTING_LIMIT: usize = 10_000;

/// Timeout for a single Swift request (uploads can be large)
pub const SWIFT_TIMEOUT_SECS: u64 = 120;
