// Object cache: time-expiring map keyed by semantic keys (`file-<id>`, `<kind>-index`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use moka::future::Cache;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SWEEP_INTERVAL_FACTOR;
use crate::model::{EditableContainer, RemoteListing, ResultContainer};

/// Listing kinds cached under `<kind>-index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Markdown,
    Json,
    Result,
}

impl IndexKind {
    pub fn key(self) -> &'static str {
        match self {
            Self::Markdown => "markdown-index",
            Self::Json => "json-index",
            Self::Result => "result-index",
        }
    }
}

/// Cache key for the raw bytes of object `id`.
pub fn file_key(id: &str) -> String {
    format!("file-{}", id)
}

/// A cached value. Replacing a key swaps the whole value.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Bytes(Bytes),
    Listing(Arc<Vec<RemoteListing>>),
    Containers(Arc<Vec<EditableContainer>>),
    Results(Arc<Vec<ResultContainer>>),
}

pub struct ObjectCache {
    inner: Cache<String, CachedValue>,
    ttl: Duration,
    /// Bumped by every `invalidate`.
    generation: AtomicU64,
    /// Orders guarded writes against invalidations.
    writes: RwLock<()>,
}

impl ObjectCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().time_to_live(ttl).build(),
            ttl,
            generation: AtomicU64::new(0),
            writes: RwLock::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns `None` for missing and expired keys alike.
    pub async fn get(&self, key: &str) -> Option<CachedValue> {
        self.inner.get(key).await
    }

    pub async fn set(&self, key: impl Into<String>, value: CachedValue) {
        self.inner.insert(key.into(), value).await;
    }

    /// Current invalidation generation; read it before computing a value for `set_if_current`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `value` unless an invalidation ran since `generation` was read.
    ///
    /// Returns whether the value was stored.
    pub async fn set_if_current(
        &self,
        key: impl Into<String>,
        value: CachedValue,
        generation: u64,
    ) -> bool {
        let _write = self.writes.read().await;
        if self.generation() != generation {
            debug!("cache write skipped: invalidated while computing");
            return false;
        }
        self.inner.insert(key.into(), value).await;
        true
    }

    pub async fn get_bytes(&self, key: &str) -> Option<Bytes> {
        match self.get(key).await {
            Some(CachedValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    /// Remove every key starting with `prefix`; an empty prefix clears everything.
    ///
    /// Returns the number of keys removed.
    pub async fn invalidate(&self, prefix: &str) -> usize {
        let _write = self.writes.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let keys: Vec<Arc<String>> = self
            .inner
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k)
            .collect();
        for key in &keys {
            self.inner.invalidate(key.as_str()).await;
        }
        if prefix.is_empty() {
            self.inner.invalidate_all();
        }
        debug!("cache invalidated prefix={:?} keys={}", prefix, keys.len());
        keys.len()
    }

    /// Number of live entries after applying pending evictions.
    pub async fn len(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Evict expired entries now.
    pub async fn sweep(&self) {
        self.inner.run_pending_tasks().await;
    }

    /// Periodically sweep expired entries until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = self.ttl.mul_f64(SWEEP_INTERVAL_FACTOR);
        tokio::spawn(async move {
            info!("cache sweeper started period_ms={}", period.as_millis());
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.sweep().await;
                        debug!("cache sweep done entries={}", cache.inner.entry_count());
                    }
                    _ = shutdown.cancelled() => {
                        debug!("cache sweeper stopped");
                        return;
                    }
                }
            }
        })
    }
}
