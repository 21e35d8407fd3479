// Drive-style REST store: listing, media reads and mutations over HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::RwLock;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::traits::{ListPage, ListQuery, NewObject, RawBody, RemoteStore, StoreError};
use crate::config::{ServiceConfig, FOLDER_MIME_TYPE};
use crate::model::RemoteListing;

const MULTIPART_BOUNDARY: &str = "review_sync_boundary_7f3a9c";

/// Drive-v3-style REST store reached over HTTP.
pub struct DriveStore {
    client: Client,
    api_base: String,
    upload_base: String,
    token: Arc<RwLock<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteListing>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

impl DriveStore {
    pub fn new(
        api_base: &str,
        upload_base: &str,
        credentials: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(bearer_from_blob(credentials))),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, StoreError> {
        Self::new(
            &config.api_base_url,
            &config.upload_base_url,
            &config.credentials,
            config.request_timeout(),
        )
    }

    /// Replace the bearer token (e.g. after the caller refreshed it).
    pub fn update_credentials(&self, blob: &str) {
        let token = bearer_from_blob(blob);
        if !token.is_empty() {
            *self.token.write() = token;
        }
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        let token = self.token.read().clone();
        if token.is_empty() {
            req
        } else {
            req.bearer_auth(token)
        }
    }

    async fn create_folder(&self, object: &NewObject) -> Result<String, StoreError> {
        let url = format!("{}/files", self.api_base);
        let metadata = json!({
            "name": object.name,
            "parents": [object.parent_id],
            "mimeType": FOLDER_MIME_TYPE,
        });
        let resp = self
            .authorized(self.client.post(&url))
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;
        let resp = check_status(resp, "create folder").await?;
        let created: CreatedFile = resp
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(created.id)
    }
}

/// Extract a bearer token from a credential blob.
///
/// Accepts either a raw token or a JSON object carrying `access_token`/`token`.
pub fn bearer_from_blob(blob: &str) -> String {
    let blob = blob.trim();
    if blob.starts_with('{') {
        if let Ok(v) = serde_json::from_str::<Value>(blob) {
            for key in ["access_token", "token"] {
                if let Some(token) = v.get(key).and_then(Value::as_str) {
                    return token.to_string();
                }
            }
        }
        warn!("credential blob is JSON without an access token");
        return String::new();
    }
    blob.to_string()
}

async fn check_status(resp: Response, context: &str) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        warn!("store {} auth rejected status={}", context, status.as_u16());
    } else {
        warn!("store {} failed status={}", context, status.as_u16());
    }
    let message = resp.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        message: message.chars().take(512).collect(),
    })
}

fn multipart_body(object: &NewObject) -> Bytes {
    let metadata = json!({
        "name": object.name,
        "parents": [object.parent_id],
        "mimeType": object.mime_type,
    });
    let mut buf = BytesMut::with_capacity(object.body.len() + 512);
    buf.put_slice(format!("--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    buf.put_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    buf.put_slice(metadata.to_string().as_bytes());
    buf.put_slice(format!("\r\n--{}\r\n", MULTIPART_BOUNDARY).as_bytes());
    buf.put_slice(format!("Content-Type: {}\r\n\r\n", object.mime_type).as_bytes());
    buf.put_slice(&object.body);
    buf.put_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    buf.freeze()
}

#[async_trait]
impl RemoteStore for DriveStore {
    async fn list_page(
        &self,
        query: &ListQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let url = format!("{}/files", self.api_base);
        let fields = format!("nextPageToken, files({})", query.fields);
        let page_size = page_size.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("q", query.filter.as_str()),
            ("fields", fields.as_str()),
            ("pageSize", page_size.as_str()),
        ];
        if let Some(order_by) = query.order_by.as_deref() {
            params.push(("orderBy", order_by));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let resp = self
            .authorized(self.client.get(&url))
            .query(&params)
            .send()
            .await?;
        let resp = check_status(resp, "list").await?;
        let list: FileList = resp
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        debug!(
            "store list page: {} files, more={}",
            list.files.len(),
            list.next_page_token.is_some()
        );
        Ok(ListPage {
            files: list.files,
            next_page_token: list.next_page_token,
        })
    }

    async fn get_media(&self, id: &str) -> Result<RawBody, StoreError> {
        let url = format!("{}/files/{}", self.api_base, id);
        let resp = self
            .authorized(self.client.get(&url))
            .query(&[("alt", "media")])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let resp = check_status(resp, "get").await?;

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_ascii_lowercase();
        let bytes = resp.bytes().await?;
        debug!("store get id={} bytes={} type={}", id, bytes.len(), content_type);

        // JSON stays as stored bytes; re-serializing would reorder keys and widen numbers.
        if content_type.starts_with("application/json") {
            return Ok(RawBody::Binary(bytes));
        }
        if content_type.starts_with("text/") {
            return Ok(match String::from_utf8(bytes.to_vec()) {
                Ok(s) => RawBody::Text(s),
                Err(_) => RawBody::Binary(bytes),
            });
        }
        Ok(RawBody::Binary(bytes))
    }

    async fn create_object(&self, object: NewObject) -> Result<String, StoreError> {
        if object.mime_type == FOLDER_MIME_TYPE {
            return self.create_folder(&object).await;
        }
        let url = format!("{}/files", self.upload_base);
        let resp = self
            .authorized(self.client.post(&url))
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .header(
                header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", MULTIPART_BOUNDARY),
            )
            .body(multipart_body(&object))
            .send()
            .await?;
        let resp = check_status(resp, "create").await?;
        let created: CreatedFile = resp
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        debug!("store created {} as {}", object.name, created.id);
        Ok(created.id)
    }

    async fn delete_object(&self, id: &str) -> Result<(), StoreError> {
        let url = format!("{}/files/{}", self.api_base, id);
        let resp = self.authorized(self.client.delete(&url)).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(id.to_string()));
        }
        check_status(resp, "delete").await?;
        debug!("store deleted {}", id);
        Ok(())
    }
}
