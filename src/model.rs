// Review data model: listings, documents, editable containers and results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ReviewError};

/// One object as reported by a store listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteListing {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

impl RemoteListing {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            modified_time: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    pub id: String,
    pub name: String,
    /// Loaded on first view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_container_id: Option<String>,
    #[serde(default)]
    pub status: DocumentStatus,
}

impl SourceDocument {
    pub fn from_listing(listing: &RemoteListing) -> Self {
        Self {
            id: listing.id.clone(),
            name: listing.name.clone(),
            content: None,
            matching_container_id: None,
            status: DocumentStatus::Pending,
        }
    }
}

/// A folder of editable structured-data files belonging to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableContainer {
    pub id: String,
    pub name: String,
    pub files: Vec<EditableItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matching_document_id: Option<String>,
    /// 0..=100.
    #[serde(default)]
    pub progress: u8,
}

impl EditableContainer {
    pub fn new(listing: &RemoteListing, files: &[RemoteListing]) -> Self {
        Self {
            id: listing.id.clone(),
            name: listing.name.clone(),
            files: files
                .iter()
                .map(|f| EditableItem::from_listing(f, &listing.id))
                .collect(),
            matching_document_id: None,
            progress: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditableItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ItemContent>,
    pub container_id: String,
    /// Set on the first local edit and never cleared.
    #[serde(default)]
    pub edited: bool,
    /// Set once the item has been promoted and never cleared.
    #[serde(default)]
    pub approved: bool,
}

impl EditableItem {
    pub fn from_listing(listing: &RemoteListing, container_id: &str) -> Self {
        Self {
            id: listing.id.clone(),
            name: listing.name.clone(),
            content: None,
            container_id: container_id.to_string(),
            edited: false,
            approved: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFile {
    pub id: String,
    pub name: String,
}

/// Read-only mirror of a folder in the results area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultContainer {
    pub container_id: String,
    pub container_name: String,
    pub files: Vec<ResultFile>,
}

impl ResultContainer {
    pub fn new(listing: &RemoteListing, files: &[RemoteListing]) -> Self {
        Self {
            container_id: listing.id.clone(),
            container_name: listing.name.clone(),
            files: files
                .iter()
                .map(|f| ResultFile {
                    id: f.id.clone(),
                    name: f.name.clone(),
                })
                .collect(),
        }
    }
}

/// Payload of an editable item: either plain text or a parsed JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemContent {
    Text(String),
    Structured(Value),
}

impl ItemContent {
    /// Decode bytes fetched from the store as a JSON document.
    pub fn decode(name: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice::<Value>(bytes)
            .map(Self::Structured)
            .map_err(|source| ReviewError::ParseFailed {
                name: name.to_string(),
                source,
            })
    }

    /// Wrap an arbitrary JSON value; a bare string is treated as text.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }

    /// Canonical text form written to the store. Text passes through unchanged.
    pub fn to_canonical_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string()),
        }
    }
}
