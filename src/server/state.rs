// Shared application state: the engine components wired around one store.

use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::engine::cache::ObjectCache;
use crate::engine::catalog::Catalog;
use crate::engine::fetcher::Fetcher;
use crate::engine::promote::Promoter;
use crate::engine::session::ReviewSession;
use crate::engine::stats::FetchStats;
use crate::store::traits::RemoteStore;

/// Everything the handlers share. Built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ObjectCache>,
    pub catalog: Arc<Catalog>,
    pub fetcher: Arc<Fetcher>,
    pub promoter: Arc<Promoter>,
    pub session: Arc<ReviewSession>,
}

impl AppState {
    /// Wire the engine around `store` with a fresh cache sized from `config`.
    pub fn new(store: Arc<dyn RemoteStore>, config: &ServiceConfig) -> Self {
        let cache = Arc::new(ObjectCache::new(config.cache_ttl()));
        Self::with_cache(store, cache, config)
    }

    pub fn with_cache(
        store: Arc<dyn RemoteStore>,
        cache: Arc<ObjectCache>,
        config: &ServiceConfig,
    ) -> Self {
        let page_size = config.effective_page_size();
        let roots = config.roots();

        let fetcher = Arc::new(Fetcher::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            config.max_concurrent_downloads,
            Arc::new(FetchStats::new()),
        ));
        let promoter = Arc::new(Promoter::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            roots.result.clone(),
            page_size,
        ));
        let catalog = Arc::new(Catalog::new(
            store,
            Arc::clone(&cache),
            roots,
            page_size,
            config.max_concurrent_downloads,
        ));
        let session = Arc::new(ReviewSession::new(
            Arc::clone(&catalog),
            Arc::clone(&fetcher),
            Arc::clone(&promoter),
        ));

        Self {
            cache,
            catalog,
            fetcher,
            promoter,
            session,
        }
    }
}
