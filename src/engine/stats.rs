// Fetch statistics: store round trips, cache hits and in-flight downloads.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStatsSnapshot {
    pub round_trips: u64,
    pub cache_hits: u64,
    pub failures: u64,
    pub bytes_fetched: u64,
    pub active_downloads: u32,
    pub peak_active_downloads: u32,
    pub cache_hit_rate: f64,
}

#[derive(Default)]
pub struct FetchStats {
    round_trips: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
    bytes_fetched: AtomicU64,
    active: AtomicU32,
    peak_active: AtomicU32,
}

/// Marks one download as in flight until dropped.
pub struct DownloadGuard<'a> {
    stats: &'a FetchStats,
}

impl Drop for DownloadGuard<'_> {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
    }
}

impl FetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched(&self, bytes: u64) {
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a store round trip and hold an in-flight slot for its duration.
    pub fn begin_download(&self) -> DownloadGuard<'_> {
        self.round_trips.fetch_add(1, Ordering::Relaxed);
        let now = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_active.fetch_max(now, Ordering::Relaxed);
        DownloadGuard { stats: self }
    }

    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(Ordering::Relaxed)
    }

    pub fn peak_active(&self) -> u32 {
        self.peak_active.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> FetchStatsSnapshot {
        let round_trips = self.round_trips.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let total = round_trips + cache_hits;
        let cache_hit_rate = if total > 0 {
            cache_hits as f64 / total as f64
        } else {
            0.0
        };

        FetchStatsSnapshot {
            round_trips,
            cache_hits,
            failures: self.failures.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            active_downloads: self.active.load(Ordering::Relaxed),
            peak_active_downloads: self.peak_active.load(Ordering::Relaxed),
            cache_hit_rate,
        }
    }
}
