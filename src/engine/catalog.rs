// Collection catalog: the three remote listings, read through the object cache.

use std::sync::Arc;

use futures::{stream, StreamExt, TryStreamExt};
use tracing::debug;

use super::cache::{CachedValue, IndexKind, ObjectCache};
use crate::config::{CollectionRoots, JSON_MIME_TYPE};
use crate::error::{Result, ReviewError};
use crate::model::{EditableContainer, RemoteListing, ResultContainer};
use crate::store::adapter::list_all;
use crate::store::traits::{ListQuery, RemoteStore};

/// All three listings taken in one pass.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub documents: Arc<Vec<RemoteListing>>,
    pub containers: Arc<Vec<EditableContainer>>,
    pub results: Arc<Vec<ResultContainer>>,
}

pub struct Catalog {
    store: Arc<dyn RemoteStore>,
    cache: Arc<ObjectCache>,
    roots: CollectionRoots,
    page_size: u32,
    listing_concurrency: usize,
}

impl Catalog {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<ObjectCache>,
        roots: CollectionRoots,
        page_size: u32,
        listing_concurrency: usize,
    ) -> Self {
        Self {
            store,
            cache,
            roots,
            page_size,
            listing_concurrency: listing_concurrency.max(1),
        }
    }

    /// Source documents: every non-folder object under the documents root.
    pub async fn source_documents(&self) -> Result<Arc<Vec<RemoteListing>>> {
        let key = IndexKind::Markdown.key();
        if let Some(CachedValue::Listing(listing)) = self.cache.get(key).await {
            debug!("catalog {} served from cache", key);
            return Ok(listing);
        }
        let generation = self.cache.generation();
        let query = ListQuery::files_in(&self.roots.markdown);
        let listing = Arc::new(list_all(self.store.as_ref(), &query, self.page_size).await?);
        self.cache
            .set_if_current(key, CachedValue::Listing(Arc::clone(&listing)), generation)
            .await;
        Ok(listing)
    }

    /// Editable containers joined with their structured-data files.
    pub async fn editable_containers(&self) -> Result<Arc<Vec<EditableContainer>>> {
        let key = IndexKind::Json.key();
        if let Some(CachedValue::Containers(containers)) = self.cache.get(key).await {
            debug!("catalog {} served from cache", key);
            return Ok(containers);
        }
        let generation = self.cache.generation();
        let joined = self
            .folders_with_files(&self.roots.json, |folder| {
                ListQuery::files_of_type(folder, JSON_MIME_TYPE)
            })
            .await?;
        let containers = Arc::new(
            joined
                .iter()
                .map(|(folder, files)| EditableContainer::new(folder, files))
                .collect::<Vec<_>>(),
        );
        self.cache
            .set_if_current(key, CachedValue::Containers(Arc::clone(&containers)), generation)
            .await;
        Ok(containers)
    }

    /// Result containers joined with the files promoted into them.
    pub async fn result_containers(&self) -> Result<Arc<Vec<ResultContainer>>> {
        let key = IndexKind::Result.key();
        if let Some(CachedValue::Results(results)) = self.cache.get(key).await {
            debug!("catalog {} served from cache", key);
            return Ok(results);
        }
        let generation = self.cache.generation();
        let joined = self
            .folders_with_files(&self.roots.result, ListQuery::files_in)
            .await?;
        let results = Arc::new(
            joined
                .iter()
                .map(|(folder, files)| ResultContainer::new(folder, files))
                .collect::<Vec<_>>(),
        );
        self.cache
            .set_if_current(key, CachedValue::Results(Arc::clone(&results)), generation)
            .await;
        Ok(results)
    }

    /// All three listings, fetched concurrently; fails if any of them fails.
    pub async fn snapshot(&self) -> Result<CatalogSnapshot> {
        let (documents, containers, results) = tokio::try_join!(
            self.source_documents(),
            self.editable_containers(),
            self.result_containers(),
        )?;
        Ok(CatalogSnapshot {
            documents,
            containers,
            results,
        })
    }

    /// List the folders under `root`, then each folder's files, keeping folder order.
    async fn folders_with_files<F>(
        &self,
        root: &str,
        files_query: F,
    ) -> Result<Vec<(RemoteListing, Vec<RemoteListing>)>>
    where
        F: Fn(&str) -> ListQuery,
    {
        let store = self.store.as_ref();
        let page_size = self.page_size;
        let folders = list_all(store, &ListQuery::folders_in(root), page_size).await?;
        let files_query = &files_query;

        stream::iter(folders)
            .map(|folder| async move {
                let files = list_all(store, &files_query(&folder.id), page_size).await?;
                Ok::<_, ReviewError>((folder, files))
            })
            .buffered(self.listing_concurrency)
            .try_collect()
            .await
    }
}
