//! Error taxonomy for the review engine.
//!
//! Store transport failures are typed by [`StoreError`] and carried as the
//! source of the higher-level variants below.

use thiserror::Error;

use crate::store::traits::StoreError;

#[derive(Debug, Error)]
pub enum ReviewError {
    /// A listing (or one of its pages) could not be retrieved.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// A single object could not be fetched.
    #[error("fetch of {id} failed: {source}")]
    FetchFailed {
        id: String,
        #[source]
        source: StoreError,
    },

    /// A promote request was malformed; nothing was sent to the store.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A create or delete during promotion failed.
    #[error("promote of {name} into {container} failed: {source}")]
    PromoteFailed {
        container: String,
        name: String,
        #[source]
        source: StoreError,
    },

    /// Structured content could not be decoded.
    #[error("could not parse {name}: {source}")]
    ParseFailed {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The id does not belong to anything in the current view.
    #[error("unknown {kind}: {id}")]
    UnknownItem { kind: &'static str, id: String },
}

impl ReviewError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn fetch_failed(id: impl Into<String>, source: StoreError) -> Self {
        Self::FetchFailed {
            id: id.into(),
            source,
        }
    }

    pub fn promote_failed(
        container: impl Into<String>,
        name: impl Into<String>,
        source: StoreError,
    ) -> Self {
        Self::PromoteFailed {
            container: container.into(),
            name: name.into(),
            source,
        }
    }

    /// Whether the failure is the caller's fault rather than the store's.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::UnknownItem { .. })
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
