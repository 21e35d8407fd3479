// Shared test doubles: an in-memory store and a Drive-style HTTP upstream over it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use review_sync_engine::config::{ServiceConfig, FOLDER_MIME_TYPE, JSON_MIME_TYPE};
use review_sync_engine::model::RemoteListing;
use review_sync_engine::store::traits::{
    ListPage, ListQuery, NewObject, RawBody, RemoteStore, StoreError,
};

pub const MARKDOWN_ROOT: &str = "md-root";
pub const JSON_ROOT: &str = "json-root";
pub const RESULT_ROOT: &str = "result-root";

#[derive(Debug, Clone)]
pub struct FakeObject {
    pub id: String,
    pub name: String,
    pub parent: String,
    pub mime_type: String,
    pub body: Bytes,
}

/// In-memory object tree that understands the query dialect the adapter emits.
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<Vec<FakeObject>>,
    next_id: AtomicU64,
    pub list_calls: AtomicUsize,
    pub media_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    active_media: AtomicUsize,
    pub peak_media: AtomicUsize,
    media_delay_ms: AtomicU64,
    list_delay_ms: AtomicU64,
    fail_listing: AtomicBool,
    fail_media: AtomicBool,
    fail_create: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_folder(&self, parent: &str, name: &str) -> String {
        self.insert(parent, name, FOLDER_MIME_TYPE, Bytes::new())
    }

    pub fn add_file(&self, parent: &str, name: &str, mime_type: &str, body: &str) -> String {
        self.insert(parent, name, mime_type, Bytes::from(body.to_string()))
    }

    fn insert(&self, parent: &str, name: &str, mime_type: &str, body: Bytes) -> String {
        let id = format!("obj-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.objects.lock().push(FakeObject {
            id: id.clone(),
            name: name.to_string(),
            parent: parent.to_string(),
            mime_type: mime_type.to_string(),
            body,
        });
        id
    }

    pub fn object(&self, id: &str) -> Option<FakeObject> {
        self.objects.lock().iter().find(|o| o.id == id).cloned()
    }

    pub fn children(&self, parent: &str) -> Vec<FakeObject> {
        self.objects
            .lock()
            .iter()
            .filter(|o| o.parent == parent)
            .cloned()
            .collect()
    }

    pub fn named(&self, parent: &str, name: &str) -> Vec<FakeObject> {
        self.children(parent)
            .into_iter()
            .filter(|o| o.name == name)
            .collect()
    }

    pub fn mutation_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst) + self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
            + self.media_calls.load(Ordering::SeqCst)
            + self.mutation_calls()
    }

    pub fn set_media_delay(&self, delay: Duration) {
        self.media_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay applied after a page has been read, so the page may be stale on return.
    pub fn set_list_delay(&self, delay: Duration) {
        self.list_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_media(&self, fail: bool) {
        self.fail_media.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Stored bytes and mime type of `id`, with the configured delay and failures applied.
    pub async fn raw_media(&self, id: &str) -> Result<(String, Bytes), StoreError> {
        self.media_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active_media.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_media.fetch_max(now, Ordering::SeqCst);

        let delay = self.media_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.active_media.fetch_sub(1, Ordering::SeqCst);

        if self.fail_media.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                message: "media unavailable".into(),
            });
        }
        self.object(id)
            .map(|o| (o.mime_type, o.body))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[derive(Default)]
struct Filter {
    parent: Option<String>,
    mime_eq: Option<String>,
    mime_ne: Option<String>,
    name: Option<String>,
}

impl Filter {
    fn parse(q: &str) -> Self {
        let mut filter = Filter::default();
        for clause in q.split(" and ") {
            let clause = clause.trim();
            if let Some(rest) = clause.strip_suffix(" in parents") {
                filter.parent = Some(unquote(rest));
            } else if let Some(rest) = clause.strip_prefix("mimeType != ") {
                filter.mime_ne = Some(unquote(rest));
            } else if let Some(rest) = clause.strip_prefix("mimeType = ") {
                filter.mime_eq = Some(unquote(rest));
            } else if let Some(rest) = clause.strip_prefix("name = ") {
                filter.name = Some(unquote(rest));
            }
        }
        filter
    }

    fn matches(&self, o: &FakeObject) -> bool {
        self.parent.as_ref().map_or(true, |p| &o.parent == p)
            && self.mime_eq.as_ref().map_or(true, |m| &o.mime_type == m)
            && self.mime_ne.as_ref().map_or(true, |m| &o.mime_type != m)
            && self.name.as_ref().map_or(true, |n| &o.name == n)
    }
}

fn unquote(literal: &str) -> String {
    let inner = literal
        .trim()
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(literal);
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn list_page(
        &self,
        query: &ListQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.list_delay_ms.load(Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 500,
                message: "listing unavailable".into(),
            });
        }

        let filter = Filter::parse(&query.filter);
        let mut matched: Vec<FakeObject> = self
            .objects
            .lock()
            .iter()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        if query.order_by.as_deref() == Some("name") {
            matched.sort_by(|a, b| a.name.cmp(&b.name));
        }

        let start: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (start + page_size as usize).min(matched.len());
        let files = matched[start.min(end)..end]
            .iter()
            .map(|o| RemoteListing::new(o.id.clone(), o.name.clone()))
            .collect();
        let next_page_token = (end < matched.len()).then(|| end.to_string());
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(ListPage {
            files,
            next_page_token,
        })
    }

    async fn get_media(&self, id: &str) -> Result<RawBody, StoreError> {
        let (mime_type, body) = self.raw_media(id).await?;
        if mime_type == JSON_MIME_TYPE {
            if let Ok(v) = serde_json::from_slice::<Value>(&body) {
                return Ok(RawBody::Object(v));
            }
        }
        if mime_type.starts_with("text/") {
            if let Ok(s) = String::from_utf8(body.to_vec()) {
                return Ok(RawBody::Text(s));
            }
        }
        Ok(RawBody::Binary(body))
    }

    async fn create_object(&self, object: NewObject) -> Result<String, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 500,
                message: "create rejected".into(),
            });
        }
        Ok(self.insert(&object.parent_id, &object.name, &object.mime_type, object.body))
    }

    async fn delete_object(&self, id: &str) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.lock();
        let before = objects.len();
        objects.retain(|o| o.id != id);
        if objects.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Config pointing at the fake roots, with a small page size so paging is exercised.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        markdown_root_id: MARKDOWN_ROOT.into(),
        json_root_id: JSON_ROOT.into(),
        result_root_id: RESULT_ROOT.into(),
        page_size: 2,
        max_concurrent_downloads: 3,
        ..ServiceConfig::default()
    }
}

pub struct Seeded {
    pub document_id: String,
    pub other_document_id: String,
    pub container_id: String,
    pub item_a: String,
    pub item_b: String,
    pub lonely_container_id: String,
}

/// One matched document/container pair plus one unmatched of each.
pub fn seed_review_tree(store: &FakeStore) -> Seeded {
    let document_id = store.add_file(
        MARKDOWN_ROOT,
        "RPT_2024_01_summary.md",
        "text/markdown",
        "# January report",
    );
    let other_document_id =
        store.add_file(MARKDOWN_ROOT, "memo_2023_q4.md", "text/markdown", "# Memo");

    let container_id = store.add_folder(JSON_ROOT, "rpt_2024_01_data");
    let item_a = store.add_file(&container_id, "a.json", JSON_MIME_TYPE, r#"{"score": 1}"#);
    let item_b = store.add_file(&container_id, "b.json", JSON_MIME_TYPE, r#"{"score": 2}"#);
    store.add_file(&container_id, "notes.txt", "text/plain", "ignored");

    let lonely_container_id = store.add_folder(JSON_ROOT, "zzz_unmatched_set");
    store.add_file(&lonely_container_id, "c.json", JSON_MIME_TYPE, "{}");

    Seeded {
        document_id,
        other_document_id,
        container_id,
        item_a,
        item_b,
        lonely_container_id,
    }
}

#[derive(Clone)]
struct FakeDriveState {
    store: Arc<FakeStore>,
    auth_headers: Arc<Mutex<Vec<String>>>,
}

/// A Drive-v3-style HTTP upstream on a random loopback port.
pub struct FakeDrive {
    pub api_base: String,
    pub upload_base: String,
    pub auth_headers: Arc<Mutex<Vec<String>>>,
}

pub async fn spawn_fake_drive(store: Arc<FakeStore>) -> FakeDrive {
    let auth_headers = Arc::new(Mutex::new(Vec::new()));
    let state = FakeDriveState {
        store,
        auth_headers: Arc::clone(&auth_headers),
    };

    let app = Router::new()
        .route("/drive/v3/files", get(drive_list).post(drive_create_folder))
        .route("/drive/v3/files/{id}", get(drive_media).delete(drive_delete))
        .route("/upload/drive/v3/files", post(drive_upload))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    FakeDrive {
        api_base: format!("http://{}/drive/v3", addr),
        upload_base: format!("http://{}/upload/drive/v3", addr),
        auth_headers,
    }
}

fn record_auth(state: &FakeDriveState, headers: &HeaderMap) {
    if let Some(v) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        state.auth_headers.lock().push(v.to_string());
    }
}

fn store_error_response(err: StoreError) -> Response {
    let status = match &err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Status { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": { "message": err.to_string() } }))).into_response()
}

async fn drive_list(
    State(state): State<FakeDriveState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    record_auth(&state, &headers);
    let query = ListQuery {
        filter: params.get("q").cloned().unwrap_or_default(),
        fields: params.get("fields").cloned().unwrap_or_default(),
        order_by: params.get("orderBy").cloned(),
    };
    let page_size = params
        .get("pageSize")
        .and_then(|s| s.parse().ok())
        .unwrap_or(100);
    match state
        .store
        .list_page(&query, page_size, params.get("pageToken").map(String::as_str))
        .await
    {
        Ok(page) => {
            let files: Vec<Value> = page
                .files
                .iter()
                .map(|f| json!({ "id": f.id, "name": f.name, "modifiedTime": "2024-01-31T12:00:00Z" }))
                .collect();
            let mut body = json!({ "files": files });
            if let Some(token) = page.next_page_token {
                body["nextPageToken"] = json!(token);
            }
            Json(body).into_response()
        }
        Err(e) => store_error_response(e),
    }
}

async fn drive_media(
    State(state): State<FakeDriveState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    record_auth(&state, &headers);
    if params.get("alt").map(String::as_str) != Some("media") {
        return (StatusCode::BAD_REQUEST, "metadata reads not supported").into_response();
    }
    match state.store.raw_media(&id).await {
        Ok((mime_type, body)) => ([(header::CONTENT_TYPE, mime_type)], body).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn drive_delete(
    State(state): State<FakeDriveState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    record_auth(&state, &headers);
    match state.store.delete_object(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => store_error_response(e),
    }
}

fn new_object_from_metadata(metadata: &Value, body: Bytes) -> NewObject {
    NewObject {
        name: metadata["name"].as_str().unwrap_or_default().to_string(),
        parent_id: metadata["parents"][0].as_str().unwrap_or_default().to_string(),
        mime_type: metadata["mimeType"].as_str().unwrap_or_default().to_string(),
        body,
    }
}

async fn drive_create_folder(
    State(state): State<FakeDriveState>,
    headers: HeaderMap,
    Json(metadata): Json<Value>,
) -> Response {
    record_auth(&state, &headers);
    let object = new_object_from_metadata(&metadata, Bytes::new());
    match state.store.create_object(object).await {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(e) => store_error_response(e),
    }
}

async fn drive_upload(
    State(state): State<FakeDriveState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    record_auth(&state, &headers);
    if params.get("uploadType").map(String::as_str) != Some("multipart") {
        return (StatusCode::BAD_REQUEST, "expected uploadType=multipart").into_response();
    }
    let boundary = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|ct| ct.split("boundary=").nth(1))
        .map(|b| b.trim().to_string());
    let Some(boundary) = boundary else {
        return (StatusCode::BAD_REQUEST, "missing boundary").into_response();
    };

    let parts = multipart_parts(&body, &boundary);
    if parts.len() != 2 {
        return (StatusCode::BAD_REQUEST, "expected two parts").into_response();
    }
    let metadata: Value = match serde_json::from_slice(&parts[0]) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "bad metadata").into_response(),
    };
    let object = new_object_from_metadata(&metadata, Bytes::from(parts[1].clone()));
    match state.store.create_object(object).await {
        Ok(id) => Json(json!({ "id": id })).into_response(),
        Err(e) => store_error_response(e),
    }
}

/// Bodies of each part of a `multipart/related` payload.
fn multipart_parts(body: &[u8], boundary: &str) -> Vec<Vec<u8>> {
    let delimiter = format!("--{}", boundary).into_bytes();
    let mut parts = Vec::new();
    let mut segments = split_on(body, &delimiter).into_iter().skip(1);
    while let Some(segment) = segments.next() {
        if segment.starts_with(b"--") {
            break;
        }
        let Some(header_end) = find(segment, b"\r\n\r\n") else {
            continue;
        };
        let content = &segment[header_end + 4..];
        let content = content.strip_suffix(b"\r\n").unwrap_or(content);
        parts.push(content.to_vec());
    }
    parts
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_on<'a>(mut haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    while let Some(pos) = find(haystack, needle) {
        out.push(&haystack[..pos]);
        haystack = &haystack[pos + needle.len()..];
    }
    out.push(haystack);
    out
}
