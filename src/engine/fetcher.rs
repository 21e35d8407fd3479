// Object fetcher: cache-first byte downloads with per-id dedup and a bounded admission gate.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::cache::{file_key, CachedValue, ObjectCache};
use super::locks::KeyedLocks;
use super::stats::FetchStats;
use crate::error::{Result, ReviewError};
use crate::store::adapter;
use crate::store::traits::{RemoteStore, StoreError};

pub struct Fetcher {
    store: Arc<dyn RemoteStore>,
    cache: Arc<ObjectCache>,
    gate: Arc<Semaphore>,
    limit: usize,
    pending: KeyedLocks,
    stats: Arc<FetchStats>,
}

impl Fetcher {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<ObjectCache>,
        max_concurrency: usize,
        stats: Arc<FetchStats>,
    ) -> Self {
        let limit = max_concurrency.max(1);
        Self {
            store,
            cache,
            gate: Arc::new(Semaphore::new(limit)),
            limit,
            pending: KeyedLocks::new(),
            stats,
        }
    }

    /// Raw bytes of object `id`.
    ///
    /// Cache hits never touch the gate. Concurrent callers for the same id wait on
    /// the first caller's request and then read its result from the cache.
    pub async fn fetch(&self, id: &str) -> Result<Bytes> {
        let key = file_key(id);
        if let Some(bytes) = self.cache.get_bytes(&key).await {
            self.stats.record_hit();
            return Ok(bytes);
        }

        let _pending = self.pending.lock(id).await;

        // Filled by the request we just waited on.
        if let Some(bytes) = self.cache.get_bytes(&key).await {
            self.stats.record_hit();
            debug!("fetch id={} served by in-flight request", id);
            return Ok(bytes);
        }

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ReviewError::fetch_failed(id, StoreError::Unavailable(e.to_string())))?;

        let generation = self.cache.generation();
        let result = {
            let _download = self.stats.begin_download();
            adapter::fetch_bytes(self.store.as_ref(), id).await
        };

        match result {
            Ok(bytes) => {
                self.stats.record_fetched(bytes.len() as u64);
                self.cache
                    .set_if_current(key, CachedValue::Bytes(bytes.clone()), generation)
                    .await;
                debug!("fetch id={} downloaded ({} bytes)", id, bytes.len());
                Ok(bytes)
            }
            Err(e) => {
                self.stats.record_failure();
                warn!("fetch id={} failed: {}", id, e);
                Err(e)
            }
        }
    }

    /// Fetch several objects at once; results keep the order of `ids`.
    ///
    /// Fails as a whole if any fetch fails.
    pub async fn fetch_many(&self, ids: &[String]) -> Result<Vec<Bytes>> {
        try_join_all(ids.iter().map(|id| self.fetch(id))).await
    }

    pub fn stats(&self) -> &Arc<FetchStats> {
        &self.stats
    }

    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    /// Size of the admission gate.
    pub fn max_concurrency(&self) -> usize {
        self.limit
    }
}
