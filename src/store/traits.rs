use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

use crate::model::RemoteListing;

/// Transport-level failure talking to the remote store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("malformed store response: {0}")]
    Malformed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A list request: the store's filter expression plus the fields to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: String,
    pub fields: String,
    pub order_by: Option<String>,
}

/// One page of a listing. `next_page_token` is `None` on the last page.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub files: Vec<RemoteListing>,
    pub next_page_token: Option<String>,
}

/// Whatever representation the store handed back for an object's content.
#[derive(Debug, Clone)]
pub enum RawBody {
    Binary(Bytes),
    Text(String),
    Object(Value),
}

impl RawBody {
    /// Normalize into the canonical byte sequence.
    pub fn into_bytes(self) -> Result<Bytes, StoreError> {
        match self {
            Self::Binary(b) => Ok(b),
            Self::Text(s) => Ok(Bytes::from(s)),
            Self::Object(v) => serde_json::to_vec_pretty(&v)
                .map(Bytes::from)
                .map_err(|e| StoreError::Malformed(e.to_string())),
        }
    }
}

/// A new object to create under `parent_id`.
#[derive(Debug, Clone)]
pub struct NewObject {
    pub name: String,
    pub parent_id: String,
    pub mime_type: String,
    /// Empty for folders.
    pub body: Bytes,
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list_page(
        &self,
        query: &ListQuery,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<ListPage, StoreError>;

    async fn get_media(&self, id: &str) -> Result<RawBody, StoreError>;

    /// Returns the id of the created object.
    async fn create_object(&self, object: NewObject) -> Result<String, StoreError>;

    async fn delete_object(&self, id: &str) -> Result<(), StoreError>;
}
