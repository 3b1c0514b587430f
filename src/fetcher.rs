//! Document acquisition for URL-bearing record fields.
//!
//! One call to [`DocumentFetcher::fetch`] walks the whole state machine for a
//! (record, field) pair: URL normalisation, optional early exit on an existing
//! object, manual redirect following, content sniffing, a single meta-refresh
//! hop, the accepted-type filter and finally the write to storage. Network
//! failures are returned as [`FetchOutcome`] values, never as errors.

use crate::config::FetchConfig;
use crate::record::{decode_url, object_name, object_prefix, FieldRef, Record};
use crate::sniff::{meta_refresh_target, sniff_extension};
use crate::storage::StorageBackend;
use anyhow::Result;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Response, StatusCode, Url};
use std::fmt;
use std::sync::Arc;

/// Behaviour switches for one fetch run.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Overwrite objects that already exist
    pub replace: bool,
    /// Download and classify, but never store
    pub scan_only: bool,
    /// Skip the field without any request when an object for it exists under any extension
    pub skip_early: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Some object for the record field already exists (early exit)
    AlreadyPresent,
    /// The target object exists and replace was not requested
    Exists,
    ScanOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Stored(String),
    Skipped(SkipReason),
    UnwantedType(String),
    SslError(String),
    Timeout,
    HttpError(u16),
    UnknownError(String),
    StorageFailed(String),
}

impl FetchOutcome {
    /// Failures caused by the remote server or the network
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            FetchOutcome::SslError(_)
                | FetchOutcome::Timeout
                | FetchOutcome::HttpError(_)
                | FetchOutcome::UnknownError(_)
        )
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Stored(ext) => write!(f, "stored ({})", ext),
            FetchOutcome::Skipped(SkipReason::AlreadyPresent) => f.write_str("skipped, already present"),
            FetchOutcome::Skipped(SkipReason::Exists) => {
                f.write_str("skipped, file already exists and --replace not set")
            }
            FetchOutcome::Skipped(SkipReason::ScanOnly) => f.write_str("skipped, scan only"),
            FetchOutcome::UnwantedType(ext) if ext.is_empty() => f.write_str("unwanted type (unknown)"),
            FetchOutcome::UnwantedType(ext) => write!(f, "unwanted type ({})", ext),
            FetchOutcome::SslError(detail) => write!(f, "TLS error: {}", detail),
            FetchOutcome::Timeout => f.write_str("timeout"),
            FetchOutcome::HttpError(status) => write!(f, "HTTP {}", status),
            FetchOutcome::UnknownError(detail) => write!(f, "error: {}", detail),
            FetchOutcome::StorageFailed(detail) => write!(f, "storage failure: {}", detail),
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    crate::constants::REDIRECT_CODES.contains(&status.as_u16())
}

/// Whether a transport error was raised by certificate or TLS negotiation
fn is_tls_error(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let text = cause.to_string().to_ascii_lowercase();
        if ["certificate", "tls", "ssl", "handshake"]
            .iter()
            .any(|needle| text.contains(needle))
        {
            return true;
        }
        source = cause.source();
    }
    false
}

fn classify(err: reqwest::Error, url: &Url) -> FetchOutcome {
    if err.is_timeout() {
        log::error!("TimeOut: {}", url);
        FetchOutcome::Timeout
    } else if is_tls_error(&err) {
        log::error!("TLS failure on {}: {}", url, err);
        FetchOutcome::SslError(error_chain(&err))
    } else {
        log::error!("Request to {} failed: {}", url, err);
        FetchOutcome::UnknownError(error_chain(&err))
    }
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

/// HTTP client that fetches record documents into a storage backend.
pub struct DocumentFetcher {
    client: reqwest::Client,
    config: Arc<FetchConfig>,
    last_host: Option<String>,
}

impl DocumentFetcher {
    pub fn new(config: Arc<FetchConfig>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(Policy::none())
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            config,
            last_host: None,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// GET without following redirects, pacing consecutive requests to one host
    async fn get(&mut self, url: &Url) -> Result<Response, FetchOutcome> {
        let host = url.host_str().map(str::to_string);
        if let Some(delay) = self.config.host_delay() {
            if host.is_some() && host == self.last_host {
                tokio::time::sleep(delay).await;
            }
        }
        self.last_host = host;

        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify(e, url))
    }

    async fn body(response: Response, url: &Url) -> Result<Vec<u8>, FetchOutcome> {
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| classify(e, url))
    }

    /// Retrieve the document behind `field` of `record` and store it.
    pub async fn fetch(
        &mut self,
        record: &Record,
        field: &FieldRef,
        storage: &dyn StorageBackend,
        options: &FetchOptions,
    ) -> FetchOutcome {
        match self.fetch_inner(record, field, storage, options).await {
            Ok(outcome) | Err(outcome) => outcome,
        }
    }

    async fn fetch_inner(
        &mut self,
        record: &Record,
        field: &FieldRef,
        storage: &dyn StorageBackend,
        options: &FetchOptions,
    ) -> Result<FetchOutcome, FetchOutcome> {
        let raw = record.field_url(field).ok_or_else(|| {
            FetchOutcome::UnknownError(format!("{} has no value at {}", record.id, field))
        })?;
        let mut url = Url::parse(&decode_url(raw))
            .map_err(|e| FetchOutcome::UnknownError(format!("invalid URL {}: {}", raw, e)))?;

        if options.skip_early {
            let prefix = object_prefix(&record.id, field);
            let present = storage
                .exists(&prefix, true)
                .await
                .map_err(|e| FetchOutcome::StorageFailed(e.to_string()))?;
            if present {
                return Ok(FetchOutcome::Skipped(SkipReason::AlreadyPresent));
            }
        }

        let mut response = self.get(&url).await?;
        let mut hops = 0;
        while is_redirect(response.status()) && hops < self.config.max_redirects {
            let Some(target) = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| url.join(location).ok())
            else {
                log::warn!("{} from {} without a usable Location header", response.status(), url);
                break;
            };
            hops += 1;
            log::warn!("Found {}: Redirecting to {}", response.status().as_u16(), target);
            url = target;
            response = self.get(&url).await?;
        }
        if is_redirect(response.status()) && hops == self.config.max_redirects {
            log::warn!(
                "Max. redirects {} reached for {}, skipping",
                self.config.max_redirects,
                url
            );
        }

        if response.status() != StatusCode::OK {
            log::error!("{}: {}", response.status(), url);
            return Ok(FetchOutcome::HttpError(response.status().as_u16()));
        }

        let mut ext = sniff_extension(response.headers());
        let mut body = Self::body(response, &url).await?;
        if ext.is_empty() {
            log::debug!("Empty document type at {} ({})", record.id, field);
        }

        if ext == "html" {
            let target = meta_refresh_target(&String::from_utf8_lossy(&body), &url);
            if let Some(target) = target {
                log::debug!("Following meta refresh to {}", target);
                let refreshed = self.get(&target).await?;
                if refreshed.status() != StatusCode::OK {
                    log::error!("{} on meta refresh: {}", refreshed.status(), target);
                    return Ok(FetchOutcome::HttpError(refreshed.status().as_u16()));
                }
                ext = sniff_extension(refreshed.headers());
                body = Self::body(refreshed, &target).await?;
                log::debug!("New document type {}", ext);
            }
        }

        if !self.config.accepts(&ext) {
            return Ok(FetchOutcome::UnwantedType(ext));
        }
        if options.scan_only {
            return Ok(FetchOutcome::Skipped(SkipReason::ScanOnly));
        }

        let name = object_name(&record.id, field, &ext);
        if !options.replace {
            let exists = storage
                .exists(&name, false)
                .await
                .map_err(|e| FetchOutcome::StorageFailed(e.to_string()))?;
            if exists {
                return Ok(FetchOutcome::Skipped(SkipReason::Exists));
            }
        }

        storage
            .store(&name, &body)
            .await
            .map_err(|e| FetchOutcome::StorageFailed(e.to_string()))?;
        log::debug!("File stored as {}", name);
        Ok(FetchOutcome::Stored(ext))
    }
}
