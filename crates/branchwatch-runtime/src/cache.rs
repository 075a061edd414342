//! Caller-owned snapshot cache.

use std::time::{Duration, Instant};

use branchwatch_models::StatusSnapshot;

/// A snapshot kept for at most `ttl`.
///
/// Time is always passed in, so staleness is decided by the caller.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    value: Option<StatusSnapshot>,
    fetched_at: Option<Instant>,
    ttl: Duration,
}

impl SnapshotCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            value: None,
            fetched_at: None,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns true if a value is cached and younger than the TTL at `now`.
    pub fn is_fresh(&self, now: Instant) -> bool {
        match (&self.value, self.fetched_at) {
            (Some(_), Some(at)) => now.saturating_duration_since(at) < self.ttl,
            _ => false,
        }
    }

    /// Returns the cached snapshot, calling `loader` first if it is stale.
    pub fn get_or_load<F>(&mut self, now: Instant, loader: F) -> &StatusSnapshot
    where
        F: FnOnce() -> StatusSnapshot,
    {
        if !self.is_fresh(now) {
            self.value = Some(loader());
            self.fetched_at = Some(now);
        }
        self.value.get_or_insert_with(StatusSnapshot::default)
    }

    /// Drops the cached value.
    pub fn invalidate(&mut self) {
        self.value = None;
        self.fetched_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchwatch_models::ServerState;

    fn snapshot(state: ServerState) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::default();
        snapshot.server.state = state;
        snapshot
    }

    #[test]
    fn test_empty_cache_is_stale() {
        let cache = SnapshotCache::new(Duration::from_secs(1));
        assert!(!cache.is_fresh(Instant::now()));
    }

    #[test]
    fn test_loads_once_within_ttl() {
        let mut cache = SnapshotCache::new(Duration::from_secs(1));
        let start = Instant::now();
        let mut loads = 0;

        cache.get_or_load(start, || {
            loads += 1;
            snapshot(ServerState::Starting)
        });
        let value = cache
            .get_or_load(start + Duration::from_millis(500), || {
                loads += 1;
                snapshot(ServerState::Healthy)
            })
            .clone();

        assert_eq!(loads, 1);
        assert_eq!(value.server.state, ServerState::Starting);
    }

    #[test]
    fn test_reloads_after_ttl() {
        let mut cache = SnapshotCache::new(Duration::from_secs(1));
        let start = Instant::now();

        cache.get_or_load(start, || snapshot(ServerState::Starting));
        let later = start + Duration::from_secs(1);
        assert!(!cache.is_fresh(later));

        let value = cache.get_or_load(later, || snapshot(ServerState::Healthy));
        assert_eq!(value.server.state, ServerState::Healthy);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let mut cache = SnapshotCache::new(Duration::from_secs(60));
        let now = Instant::now();

        cache.get_or_load(now, || snapshot(ServerState::Starting));
        assert!(cache.is_fresh(now));

        cache.invalidate();
        assert!(!cache.is_fresh(now));
        let value = cache.get_or_load(now, || snapshot(ServerState::Error));
        assert_eq!(value.server.state, ServerState::Error);
    }
}
