// Store adapter: paged listing, byte fetches and query construction.

use bytes::Bytes;
use tracing::{debug, warn};

use super::traits::{ListQuery, RemoteStore, StoreError};
use crate::config::{FOLDER_MIME_TYPE, MAX_PAGE_SIZE};
use crate::error::{Result, ReviewError};
use crate::model::RemoteListing;

/// Fields requested for every listed object.
pub const LISTING_FIELDS: &str = "id, name, modifiedTime";

impl ListQuery {
    /// Everything directly under `parent_id` that is not trashed.
    pub fn children_of(parent_id: &str) -> Self {
        Self {
            filter: format!("'{}' in parents and trashed = false", escape(parent_id)),
            fields: LISTING_FIELDS.to_string(),
            order_by: Some("name".to_string()),
        }
    }

    pub fn folders_in(parent_id: &str) -> Self {
        Self::children_of(parent_id).and(&format!("mimeType = '{}'", FOLDER_MIME_TYPE))
    }

    pub fn files_in(parent_id: &str) -> Self {
        Self::children_of(parent_id).and(&format!("mimeType != '{}'", FOLDER_MIME_TYPE))
    }

    pub fn files_of_type(parent_id: &str, mime_type: &str) -> Self {
        Self::children_of(parent_id).and(&format!("mimeType = '{}'", escape(mime_type)))
    }

    /// Restrict to objects whose name is exactly `name`.
    pub fn named(self, name: &str) -> Self {
        self.and(&format!("name = '{}'", escape(name)))
    }

    fn and(mut self, clause: &str) -> Self {
        self.filter = format!("{} and {}", self.filter, clause);
        self
    }
}

/// Escape a value for use inside a single-quoted query literal.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Follow continuation tokens until the store reports no further pages.
///
/// Any failed page fails the whole listing; partial results are never returned.
pub async fn list_all(
    store: &dyn RemoteStore,
    query: &ListQuery,
    page_size: u32,
) -> Result<Vec<RemoteListing>> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let mut listings = Vec::new();
    let mut token: Option<String> = None;
    let mut pages = 0u32;

    loop {
        let page = store
            .list_page(query, page_size, token.as_deref())
            .await
            .map_err(|e| {
                warn!("list page {} failed for [{}]: {}", pages, query.filter, e);
                ReviewError::StoreUnavailable(e)
            })?;
        pages += 1;
        listings.extend(page.files);

        match page.next_page_token {
            Some(next) if !next.is_empty() => {
                if token.as_deref() == Some(next.as_str()) {
                    return Err(ReviewError::StoreUnavailable(StoreError::Malformed(format!(
                        "page token {} repeated",
                        next
                    ))));
                }
                token = Some(next);
            }
            _ => break,
        }
    }

    debug!(
        "listed [{}]: {} objects in {} pages",
        query.filter,
        listings.len(),
        pages
    );
    Ok(listings)
}

/// One round trip for the raw content of `id`.
pub async fn fetch_bytes(store: &dyn RemoteStore, id: &str) -> Result<Bytes> {
    let body = store
        .get_media(id)
        .await
        .map_err(|e| ReviewError::fetch_failed(id, e))?;
    body.into_bytes().map_err(|e| ReviewError::fetch_failed(id, e))
}
