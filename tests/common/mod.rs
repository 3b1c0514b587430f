#![allow(dead_code)]

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use tenderlake::config::{FetchConfig, SwiftAuth, SwiftConfig};
use tenderlake::{FieldValue, Record, RecordId, Updated};

pub const PDF_BODY: &[u8] = b"%PDF-1.4 tender specification";
pub const SWIFT_TOKEN: &str = "test-token";

pub fn setup_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(anyhow::Error::from)
}

pub fn id(n: u64) -> RecordId {
    RecordId::from_number(n)
}

/// Record of tender `key` with an optional update timestamp
pub fn record(n: u64, key: &str, updated: Option<&str>) -> Record {
    Record::new(
        id(n),
        format!("https://contrataciondelestado.es/sindicacion/licitacion/{}", key),
        updated.map(|u| Updated::One(u.to_string())),
    )
}

/// Record linking a single document under `pliego`
pub fn record_with_doc(n: u64, url: &str) -> Record {
    record(n, &format!("T{}", n), Some("2024-03-01 10:00:00"))
        .with_field("pliego", FieldValue::Scalar(url.to_string()))
}

/// Fetch settings for local test servers: short timeout, no pacing
pub fn fetch_config() -> FetchConfig {
    FetchConfig {
        timeout_secs: 1,
        max_redirects: 3,
        host_delay_ms: 0,
        ..FetchConfig::default()
    }
}

async fn serve(app: Router) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok(format!("http://{}", addr))
}

// ============================================================================
// Document server
// ============================================================================

/// Running document server and its request counter
pub struct DocServer {
    pub base: String,
    hits: Arc<AtomicUsize>,
}

impl DocServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Serves the shapes a procurement portal returns:
///
/// - `/doc.pdf`: a PDF
/// - `/redirect/{n}`: a chain of `n` 302s ending at `/doc.pdf`
/// - `/page.html`: HTML with a meta refresh to `/doc.pdf`
/// - `/moved`: a 301 to `/page.html`
/// - `/dangling`: a 302 without a Location header
/// - `/attachment`: octet-stream named by Content-Disposition
/// - `/image`: a PNG
/// - `/slow`: answers after 3 seconds
/// - anything else: 404
pub async fn start_doc_server() -> Result<DocServer> {
    let hits = Arc::new(AtomicUsize::new(0));

    async fn pdf() -> Response {
        ([(header::CONTENT_TYPE, "application/pdf")], PDF_BODY).into_response()
    }

    async fn redirect(Path(n): Path<u32>) -> Response {
        let location = if n == 0 {
            "/doc.pdf".to_string()
        } else {
            format!("/redirect/{}", n - 1)
        };
        (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
    }

    async fn page() -> Response {
        let html = r#"<html><head>
<META HTTP-EQUIV="Refresh" CONTENT="0; URL=/doc.pdf">
</head><body>Redirecting</body></html>"#;
        ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
    }

    async fn moved() -> Response {
        (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/page.html")]).into_response()
    }

    async fn dangling() -> Response {
        StatusCode::FOUND.into_response()
    }

    async fn attachment() -> Response {
        (
            [
                (header::CONTENT_TYPE, "application/octet-stream"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"Pliego tecnico.DOCX\""),
            ],
            "PK docx",
        )
            .into_response()
    }

    async fn image() -> Response {
        ([(header::CONTENT_TYPE, "image/png")], "png").into_response()
    }

    async fn slow() -> Response {
        tokio::time::sleep(Duration::from_secs(3)).await;
        pdf().await
    }

    let counter = Arc::clone(&hits);
    let app = Router::new()
        .route("/doc.pdf", get(pdf))
        .route("/redirect/:n", get(redirect))
        .route("/page.html", get(page))
        .route("/moved", get(moved))
        .route("/dangling", get(dangling))
        .route("/attachment", get(attachment))
        .route("/image", get(image))
        .route("/slow", get(slow))
        .layer(axum::middleware::from_fn(
            move |request: axum::extract::Request, next: axum::middleware::Next| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    next.run(request).await
                }
            },
        ));

    let base = serve(app).await?;
    Ok(DocServer { base, hits })
}

// ============================================================================
// Swift-compatible object server
// ============================================================================

type Objects = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// In-memory Swift account with a Keystone token endpoint
pub struct SwiftServer {
    pub base: String,
    objects: Objects,
}

impl SwiftServer {
    pub fn storage_url(&self) -> String {
        format!("{}/v1/AUTH_test", self.base)
    }

    pub fn token_config(&self, container: &str, prefix: &str) -> SwiftConfig {
        SwiftConfig {
            container: container.to_string(),
            prefix: prefix.to_string(),
            auth: SwiftAuth::Token {
                storage_url: self.storage_url(),
                token: SWIFT_TOKEN.to_string(),
            },
        }
    }

    pub fn keystone_config(&self, container: &str, prefix: &str, secret: &str) -> SwiftConfig {
        SwiftConfig {
            container: container.to_string(),
            prefix: prefix.to_string(),
            auth: SwiftAuth::ApplicationCredential {
                auth_url: format!("{}/v3", self.base),
                credential_id: "cred".to_string(),
                credential_secret: secret.to_string(),
                region: Some("RegionOne".to_string()),
                interface: "public".to_string(),
            },
        }
    }

    /// Full object paths (`container/path`) currently stored
    pub fn paths(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn put(&self, container: &str, path: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", container, path), data.to_vec());
    }
}

#[derive(Clone)]
struct SwiftState {
    base: String,
    objects: Objects,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-auth-token").and_then(|v| v.to_str().ok()) == Some(SWIFT_TOKEN)
}

async fn keystone(State(state): State<SwiftState>, Json(body): Json<serde_json::Value>) -> Response {
    let secret = &body["auth"]["identity"]["application_credential"]["secret"];
    if secret.as_str() != Some("s3cret") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let catalog = serde_json::json!({
        "token": {
            "catalog": [
                {"type": "identity", "endpoints": [
                    {"interface": "public", "region": "RegionOne", "url": format!("{}/v3", state.base)}
                ]},
                {"type": "object-store", "endpoints": [
                    {"interface": "internal", "region": "RegionOne", "url": "http://127.0.0.1:1/v1/AUTH_test"},
                    {"interface": "public", "region": "RegionOne", "url": format!("{}/v1/AUTH_test", state.base)}
                ]}
            ]
        }
    });
    (StatusCode::CREATED, [("x-subject-token", SWIFT_TOKEN)], Json(catalog)).into_response()
}

async fn listing(
    State(state): State<SwiftState>,
    Path((_account, container)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let prefix = query.get("prefix").cloned().unwrap_or_default();
    let marker = query.get("marker").cloned().unwrap_or_default();
    let limit: usize = query.get("limit").and_then(|l| l.parse().ok()).unwrap_or(10_000);

    let scope = format!("{}/", container);
    let objects = state.objects.lock().unwrap();
    let names: Vec<serde_json::Value> = objects
        .iter()
        .filter_map(|(key, data)| {
            key.strip_prefix(&scope).map(|name| (name.to_string(), data.len()))
        })
        .filter(|(name, _)| name.starts_with(&prefix) && name.as_str() > marker.as_str())
        .take(limit)
        .map(|(name, bytes)| serde_json::json!({"name": name, "bytes": bytes}))
        .collect();
    Json(names).into_response()
}

async fn object_get(
    State(state): State<SwiftState>,
    Path((_account, container, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let key = format!("{}/{}", container, path);
    match state.objects.lock().unwrap().get(&key) {
        Some(data) => data.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn object_put(
    State(state): State<SwiftState>,
    Path((_account, container, path)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state
        .objects
        .lock()
        .unwrap()
        .insert(format!("{}/{}", container, path), body.to_vec());
    StatusCode::CREATED.into_response()
}

async fn object_delete(
    State(state): State<SwiftState>,
    Path((_account, container, path)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.objects.lock().unwrap().remove(&format!("{}/{}", container, path)) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn start_swift_server() -> Result<SwiftServer> {
    let objects: Objects = Arc::new(Mutex::new(BTreeMap::new()));
    // The catalog must advertise the server's own address, so bind first
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);

    let state = SwiftState {
        base: base.clone(),
        objects: Arc::clone(&objects),
    };
    let app = Router::new()
        .route("/v3/auth/tokens", post(keystone))
        .route("/v1/:account/:container", get(listing))
        .route(
            "/v1/:account/:container/*path",
            get(object_get).put(object_put).delete(object_delete),
        )
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    Ok(SwiftServer { base, objects })
}
