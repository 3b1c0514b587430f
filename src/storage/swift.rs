// OpenStack Swift object container addressed as {storage_url}/{container}/{prefix}/{name}
use super::{filter_names, BackendKind, StorageBackend};
use crate::config::{SwiftAuth, SwiftConfig};
use crate::constants;
use crate::error::StorageError;
use crate::id_range::IdRange;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

pub struct SwiftBackend {
    client: reqwest::Client,
    storage_url: String,
    token: String,
    container: String,
    prefix: String,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogService>,
}

#[derive(Debug, Deserialize)]
struct CatalogService {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<Endpoint>,
}

#[derive(Debug, Deserialize)]
struct Endpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

impl SwiftBackend {
    /// Authenticate and bind to the configured container and prefix
    pub async fn connect(config: &SwiftConfig) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(constants::SWIFT_TIMEOUT_SECS))
            .user_agent(constants::user_agent())
            .build()?;

        let (storage_url, token) = match &config.auth {
            SwiftAuth::Token { storage_url, token } => (storage_url.clone(), token.clone()),
            SwiftAuth::ApplicationCredential {
                auth_url,
                credential_id,
                credential_secret,
                region,
                interface,
            } => {
                keystone_login(
                    &client,
                    auth_url,
                    credential_id,
                    credential_secret,
                    region.as_deref(),
                    interface,
                )
                .await?
            }
        };

        Ok(Self {
            client,
            storage_url: storage_url.trim_end_matches('/').to_string(),
            token,
            container: config.container.clone(),
            prefix: config.prefix.trim_matches('/').to_string(),
        })
    }

    fn container_url(&self) -> String {
        format!("{}/{}", self.storage_url, urlencoding::encode(&self.container))
    }

    /// Full object path inside the container
    fn object_path(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.prefix, name)
        }
    }

    fn object_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("{}/{}", self.container_url(), encoded.join("/"))
    }

    /// Every object path in the container starting with `path_prefix`
    async fn list_paths(&self, path_prefix: &str, limit: Option<usize>) -> Result<Vec<String>, StorageError> {
        let page_size = limit.unwrap_or(constants::SWIFT_LISTING_LIMIT);
        let mut paths = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = format!(
                "{}?format=json&limit={}&prefix={}",
                self.container_url(),
                page_size,
                urlencoding::encode(path_prefix)
            );
            if let Some(marker) = &marker {
                url.push_str("&marker=");
                url.push_str(&urlencoding::encode(marker));
            }

            let response = self
                .client
                .get(&url)
                .header(AUTH_TOKEN_HEADER, &self.token)
                .send()
                .await?;
            check_status(response.status(), &self.container)?;

            let body = response.text().await?;
            let page: Vec<ListedObject> = if body.trim().is_empty() {
                Vec::new()
            } else {
                sonic_rs::from_str(&body).map_err(|e| StorageError::Transport(format!(
                    "invalid container listing: {}",
                    e
                )))?
            };

            let count = page.len();
            paths.extend(page.into_iter().map(|o| o.name));
            if count < page_size || limit.is_some() {
                break;
            }
            marker = paths.last().cloned();
        }
        Ok(paths)
    }

    async fn get_path(&self, path: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .client
            .get(self.object_url(path))
            .header(AUTH_TOKEN_HEADER, &self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(name.to_string()));
        }
        check_status(response.status(), name)?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Download every object under `remote_prefix` into flat files in `local_dir`.
    ///
    /// Returns (downloaded, failed) counts; single failures are logged.
    pub async fn fetch_to_local(
        &self,
        remote_prefix: &str,
        local_dir: &Path,
    ) -> Result<(usize, usize), StorageError> {
        let paths = self.list_paths(remote_prefix, None).await?;
        log::debug!("{} objects found under {}", paths.len(), remote_prefix);

        if !local_dir.is_dir() {
            log::debug!("Creating {}", local_dir.display());
            tokio::fs::create_dir_all(local_dir).await?;
        }

        let mut ok = 0;
        let mut failed = 0;
        for path in &paths {
            let base = path.rsplit('/').next().unwrap_or(path);
            let result = match self.get_path(path, base).await {
                Ok(data) => tokio::fs::write(local_dir.join(base), data)
                    .await
                    .map_err(StorageError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => ok += 1,
                Err(e) => {
                    log::error!("Download of {} failed: {}", path, e);
                    failed += 1;
                }
            }
        }
        log::debug!("{} files downloaded and {} failed into {}", ok, failed, local_dir.display());
        Ok((ok, failed))
    }
}

fn check_status(status: StatusCode, name: &str) -> Result<(), StorageError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(StorageError::Auth(format!("{} returned {}", name, status)));
    }
    Err(StorageError::Remote {
        name: name.to_string(),
        status: status.as_u16(),
    })
}

/// Keystone v3 application-credential login returning (storage url, token)
async fn keystone_login(
    client: &reqwest::Client,
    auth_url: &str,
    credential_id: &str,
    credential_secret: &str,
    region: Option<&str>,
    interface: &str,
) -> Result<(String, String), StorageError> {
    let body = serde_json::json!({
        "auth": {
            "identity": {
                "methods": ["application_credential"],
                "application_credential": {
                    "id": credential_id,
                    "secret": credential_secret,
                }
            }
        }
    });

    let url = format!("{}/auth/tokens", auth_url.trim_end_matches('/'));
    let response = client.post(&url).json(&body).send().await?;
    if !response.status().is_success() {
        return Err(StorageError::Auth(format!(
            "keystone returned {}",
            response.status()
        )));
    }

    let token = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| StorageError::Auth("no X-Subject-Token in keystone response".to_string()))?;

    let text = response.text().await?;
    let parsed: TokenResponse = sonic_rs::from_str(&text)
        .map_err(|e| StorageError::Auth(format!("invalid keystone token body: {}", e)))?;

    let endpoint = parsed
        .token
        .catalog
        .iter()
        .filter(|service| service.service_type == "object-store")
        .flat_map(|service| service.endpoints.iter())
        .find(|endpoint| {
            endpoint.interface == interface
                && region.map_or(true, |r| {
                    endpoint.region.as_deref() == Some(r) || endpoint.region_id.as_deref() == Some(r)
                })
        })
        .ok_or_else(|| {
            StorageError::Auth(format!(
                "no object-store endpoint for interface {} in region {}",
                interface,
                region.unwrap_or("*")
            ))
        })?;

    log::debug!("Swift endpoint: {}", endpoint.url);
    Ok((endpoint.url.clone(), token))
}

#[async_trait]
impl StorageBackend for SwiftBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Swift
    }

    fn location(&self) -> String {
        format!("swift:{}/{}", self.container, self.prefix)
    }

    async fn store(&self, name: &str, contents: &[u8]) -> Result<(), StorageError> {
        let response = self
            .client
            .put(self.object_url(&self.object_path(name)))
            .header(AUTH_TOKEN_HEADER, &self.token)
            .body(contents.to_vec())
            .send()
            .await?;
        check_status(response.status(), name)
    }

    async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        self.get_path(&self.object_path(name), name).await
    }

    async fn exists(&self, name: &str, prefix_only: bool) -> Result<bool, StorageError> {
        if prefix_only {
            let found = self.list_paths(&self.object_path(name), Some(1)).await?;
            return Ok(!found.is_empty());
        }

        let response = self
            .client
            .head(self.object_url(&self.object_path(name)))
            .header(AUTH_TOKEN_HEADER, &self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response.status(), name)?;
        Ok(true)
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let response = self
            .client
            .delete(self.object_url(&self.object_path(name)))
            .header(AUTH_TOKEN_HEADER, &self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response.status(), name)
    }

    async fn list(&self, range: &IdRange) -> Result<Vec<String>, StorageError> {
        let listing_prefix = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };
        let paths = self.list_paths(&listing_prefix, None).await?;
        let names = paths
            .into_iter()
            .filter_map(|path| path.strip_prefix(&listing_prefix).map(str::to_string))
            .filter(|name| !name.contains('/'));
        Ok(filter_names(names, range))
    }
}
