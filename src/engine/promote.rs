// Promotion: upsert an edited item into a named folder of the results area.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{IndexKind, ObjectCache};
use super::locks::KeyedLocks;
use crate::config::{FOLDER_MIME_TYPE, JSON_MIME_TYPE};
use crate::error::{Result, ReviewError};
use crate::model::{EditableItem, ItemContent};
use crate::store::adapter::list_all;
use crate::store::traits::{ListQuery, NewObject, RemoteStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteOutcome {
    pub container_id: String,
    pub file_id: String,
    pub created_container: bool,
    /// Same-named files deleted before the write.
    pub replaced: usize,
}

pub struct Promoter {
    store: Arc<dyn RemoteStore>,
    cache: Arc<ObjectCache>,
    results_root: String,
    page_size: u32,
    containers: KeyedLocks,
}

/// Progress of one promotion, so the result index is dropped only when the
/// store may actually have changed.
#[derive(Default)]
struct Mutations {
    attempted: bool,
}

impl Promoter {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<ObjectCache>,
        results_root: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            cache,
            results_root: results_root.into(),
            page_size,
            containers: KeyedLocks::new(),
        }
    }

    pub async fn promote(&self, item: &EditableItem, container_name: &str) -> Result<PromoteOutcome> {
        self.promote_content(&item.name, item.content.as_ref(), container_name)
            .await
    }

    /// Write `content` as `name` inside the results folder `container_name`.
    ///
    /// The folder is created when missing and any same-named files in it are
    /// deleted first, so exactly one copy remains afterwards. Promotions into the
    /// same folder are serialized within this process.
    pub async fn promote_content(
        &self,
        name: &str,
        content: Option<&ItemContent>,
        container_name: &str,
    ) -> Result<PromoteOutcome> {
        if container_name.trim().is_empty() {
            return Err(ReviewError::invalid_input("folderName is required"));
        }
        if name.trim().is_empty() {
            return Err(ReviewError::invalid_input("fileName is required"));
        }
        let Some(content) = content else {
            return Err(ReviewError::invalid_input("content is required"));
        };
        let body = content.to_canonical_text();

        let _container = self.containers.lock(container_name).await;
        let mut mutations = Mutations::default();
        let result = self
            .upsert(name, body, container_name, &mut mutations)
            .await;

        if mutations.attempted {
            let dropped = self.cache.invalidate(IndexKind::Result.key()).await;
            debug!("promote {}/{}: invalidated {} cached entries", container_name, name, dropped);
        }

        match &result {
            Ok(outcome) => info!(
                "promoted {} into {} (file {}, replaced {})",
                name, container_name, outcome.file_id, outcome.replaced
            ),
            Err(e) => warn!("promote {} into {} failed: {}", name, container_name, e),
        }
        result
    }

    async fn upsert(
        &self,
        name: &str,
        body: String,
        container_name: &str,
        mutations: &mut Mutations,
    ) -> Result<PromoteOutcome> {
        let failed = |source: StoreError| ReviewError::promote_failed(container_name, name, source);

        let (container_id, created_container) =
            self.ensure_container(container_name, name, mutations).await?;

        let existing = if created_container {
            Vec::new()
        } else {
            let query = ListQuery::files_in(&container_id).named(name);
            list_all(self.store.as_ref(), &query, self.page_size)
                .await
                .map_err(|e| into_promote_error(e, container_name, name))?
        };

        mutations.attempted = true;
        for stale in &existing {
            match self.store.delete_object(&stale.id).await {
                Ok(()) => {}
                Err(StoreError::NotFound(_)) => {
                    debug!("promote {}/{}: {} already gone", container_name, name, stale.id)
                }
                Err(e) => return Err(failed(e)),
            }
        }

        let file_id = self
            .store
            .create_object(NewObject {
                name: name.to_string(),
                parent_id: container_id.clone(),
                mime_type: JSON_MIME_TYPE.to_string(),
                body: Bytes::from(body),
            })
            .await
            .map_err(failed)?;

        Ok(PromoteOutcome {
            container_id,
            file_id,
            created_container,
            replaced: existing.len(),
        })
    }

    /// Id of the results folder named `container_name`, creating it when absent.
    async fn ensure_container(
        &self,
        container_name: &str,
        name: &str,
        mutations: &mut Mutations,
    ) -> Result<(String, bool)> {
        let query = ListQuery::folders_in(&self.results_root).named(container_name);
        let found = list_all(self.store.as_ref(), &query, self.page_size)
            .await
            .map_err(|e| into_promote_error(e, container_name, name))?;

        if let Some(first) = found.first() {
            if found.len() > 1 {
                warn!(
                    "{} results folders named {}; using {}",
                    found.len(),
                    container_name,
                    first.id
                );
            }
            return Ok((first.id.clone(), false));
        }

        mutations.attempted = true;
        let id = self
            .store
            .create_object(NewObject {
                name: container_name.to_string(),
                parent_id: self.results_root.clone(),
                mime_type: FOLDER_MIME_TYPE.to_string(),
                body: Bytes::new(),
            })
            .await
            .map_err(|e| ReviewError::promote_failed(container_name, name, e))?;
        info!("created results folder {} ({})", container_name, id);
        Ok((id, true))
    }
}

fn into_promote_error(err: ReviewError, container: &str, name: &str) -> ReviewError {
    match err {
        ReviewError::StoreUnavailable(source) => ReviewError::promote_failed(container, name, source),
        other => other,
    }
}
