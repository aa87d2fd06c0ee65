use crate::api::StaticDataSource;
use crate::models::cache::{CacheEntry, VersionMarker};
use crate::models::error::FetchError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(20 * 60);

/// Rule deciding whether a stored payload may be served without refetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StalenessPolicy {
    /// Fresh while the shared clock is younger than the duration.
    Ttl(Duration),
    /// Fresh while the realm's version marker matches the one recorded with
    /// the entry. Costs one realm call per check.
    VersionProbe { realm_url: String },
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        StalenessPolicy::Ttl(DEFAULT_TTL)
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Last confirmed-fresh point, shared by every key.
    clock: Option<Instant>,
    /// Most recent marker seen from the realm.
    marker: Option<VersionMarker>,
}

enum Verdict {
    Fresh,
    Stale,
    /// The freshness check itself produced the new payload.
    Replaced(Arc<Value>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    failures: AtomicU64,
}

/// Read-through cache over a small fixed set of upstream resources.
///
/// The lock guards only in-memory work; upstream calls happen with it
/// released, so a slow fetch for one key never holds up another key.
/// Concurrent misses on the same key may both fetch; the later write wins.
pub struct FreshnessCache {
    upstream: Arc<dyn StaticDataSource>,
    policy: StalenessPolicy,
    serve_stale_on_error: bool,
    state: Mutex<CacheState>,
    counters: Counters,
}

impl FreshnessCache {
    pub fn new(upstream: Arc<dyn StaticDataSource>, policy: StalenessPolicy) -> Self {
        Self {
            upstream,
            policy,
            serve_stale_on_error: false,
            state: Mutex::new(CacheState::default()),
            counters: Counters::default(),
        }
    }

    /// When enabled, a failed refresh of an existing entry returns the stale
    /// payload instead of the error. Off by default: callers cannot tell the
    /// data is stale.
    pub fn with_serve_stale_on_error(mut self, enabled: bool) -> Self {
        self.serve_stale_on_error = enabled;
        self
    }

    pub fn policy(&self) -> &StalenessPolicy {
        &self.policy
    }

    /// Returns the current payload for `key`, fetching `url` when there is no
    /// entry yet or the policy judges the stored one stale.
    pub async fn get(&self, key: &str, url: &str) -> Result<Arc<Value>, FetchError> {
        let cached = self.lock().entries.get(key).cloned();

        let Some(entry) = cached else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!("Cache miss for {}", key);
            return self.refresh(key, url).await;
        };

        match self.check(key, url, &entry).await {
            Verdict::Fresh => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", key);
                return Ok(entry.data);
            }
            Verdict::Replaced(data) => return Ok(data),
            Verdict::Stale => {}
        }

        debug!(
            "Cache entry for {} is stale (fetched {:?} ago), refetching",
            key,
            entry.fetched_at.elapsed()
        );
        match self.refresh(key, url).await {
            Ok(data) => Ok(data),
            Err(e) if self.serve_stale_on_error => {
                warn!("Serving stale {} after failed refresh: {}", key, e);
                Ok(entry.data)
            }
            Err(e) => Err(e),
        }
    }

    /// Stored payload for `key`, without consulting the policy.
    pub fn cached(&self, key: &str) -> Option<Arc<Value>> {
        self.lock().entries.get(key).map(|entry| Arc::clone(&entry.data))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            refreshes: self.counters.refreshes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    async fn check(&self, key: &str, url: &str, entry: &CacheEntry) -> Verdict {
        let realm_url = match &self.policy {
            StalenessPolicy::Ttl(ttl) => {
                let fresh = self
                    .lock()
                    .clock
                    .is_some_and(|confirmed| confirmed.elapsed() < *ttl);
                return if fresh { Verdict::Fresh } else { Verdict::Stale };
            }
            StalenessPolicy::VersionProbe { realm_url } => realm_url,
        };

        let realm = match self.upstream.fetch(realm_url).await {
            Ok(realm) => realm,
            Err(e) => {
                warn!("Version probe failed, treating entry as stale: {}", e);
                return Verdict::Stale;
            }
        };
        let current = VersionMarker::from_realm(&realm);
        debug!("Version probe: current {:?}, entry {:?}", current, entry.marker);

        if current.is_some() && current == entry.marker {
            let mut state = self.lock();
            state.clock = Some(Instant::now());
            state.marker = current;
            return Verdict::Fresh;
        }
        if url == realm_url.as_str() {
            // The realm check already fetched this entry's new payload.
            self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
            return Verdict::Replaced(self.store(key, Arc::new(realm), current.clone(), current));
        }

        let mut state = self.lock();
        state.clock = Some(Instant::now());
        if current.is_some() {
            state.marker = current;
        }
        Verdict::Stale
    }

    async fn refresh(&self, key: &str, url: &str) -> Result<Arc<Value>, FetchError> {
        // Taken before the fetch: a bump observed while it is in flight must
        // not be credited to a payload that may predate it.
        let marker_before = self.lock().marker.clone();

        let data = match self.upstream.fetch(url).await {
            Ok(data) => Arc::new(data),
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!("Fetch for {} failed: {}", key, e);
                return Err(e);
            }
        };
        self.counters.refreshes.fetch_add(1, Ordering::Relaxed);

        let observed = match &self.policy {
            StalenessPolicy::VersionProbe { realm_url } if url == realm_url.as_str() => {
                VersionMarker::from_realm(&data)
            }
            _ => None,
        };
        let entry_marker = observed.clone().or(marker_before);
        Ok(self.store(key, data, entry_marker, observed))
    }

    /// Writes `data` as the entry for `key` and confirms the clock. `observed`
    /// is a marker read from the realm itself and becomes the current one.
    fn store(
        &self,
        key: &str,
        data: Arc<Value>,
        entry_marker: Option<VersionMarker>,
        observed: Option<VersionMarker>,
    ) -> Arc<Value> {
        let now = Instant::now();
        let mut state = self.lock();
        if observed.is_some() {
            state.marker = observed;
        }
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                data: Arc::clone(&data),
                fetched_at: now,
                marker: entry_marker,
            },
        );
        state.clock = Some(now);
        data
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Entries are replaced whole, so a poisoned guard still holds
        // consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::Notify;

    const URL: &str = "https://upstream/version";
    const REALM: &str = "https://upstream/realm";

    /// Upstream answering from per-URL queues; an empty queue means the
    /// network is unreachable.
    #[derive(Default)]
    struct ScriptedUpstream {
        responses: Mutex<HashMap<String, VecDeque<Result<Value, FetchError>>>>,
        calls: Mutex<Vec<String>>,
        /// Calls to this URL wait for `release` before answering.
        held_url: Mutex<Option<String>>,
        held: Notify,
        release: Notify,
    }

    impl ScriptedUpstream {
        fn push(&self, url: &str, response: Result<Value, FetchError>) {
            self.responses
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default()
                .push_back(response);
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn hold(&self, url: &str) {
            *self.held_url.lock().unwrap() = Some(url.to_string());
        }
    }

    #[async_trait]
    impl StaticDataSource for ScriptedUpstream {
        async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            let held = self.held_url.lock().unwrap().as_deref() == Some(url);
            if held {
                self.held.notify_one();
                self.release.notified().await;
            }
            self.responses
                .lock()
                .unwrap()
                .get_mut(url)
                .and_then(|queue| queue.pop_front())
                .unwrap_or_else(|| Err(FetchError::Transport("network unreachable".into())))
        }
    }

    fn ttl_cache(upstream: &Arc<ScriptedUpstream>, ttl: Duration) -> FreshnessCache {
        FreshnessCache::new(upstream.clone(), StalenessPolicy::Ttl(ttl))
    }

    fn server_error() -> FetchError {
        FetchError::Upstream {
            status_code: 500,
            message: "Internal server error".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_get_fetches_once_and_returns_payload_verbatim() {
        let upstream = Arc::new(ScriptedUpstream::default());
        let payload = json!({"type": "champion", "data": {"Ahri": {"id": 103}}});
        upstream.push(URL, Ok(payload.clone()));
        let cache = ttl_cache(&upstream, DEFAULT_TTL);

        let value = cache.get("champion", URL).await.expect("first get should succeed");

        assert_eq!(*value, payload);
        assert_eq!(upstream.total_calls(), 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gets_within_ttl_make_no_further_calls() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(URL, Ok(json!({"v": "1.2"})));
        let cache = ttl_cache(&upstream, DEFAULT_TTL);

        let first = cache.get("version", URL).await.unwrap();
        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(60)).await;
            let again = cache.get("version", URL).await.unwrap();
            assert_eq!(again, first);
        }

        assert_eq!(upstream.total_calls(), 1);
        assert_eq!(cache.stats().hits, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_scenario_refreshes_after_window() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(URL, Ok(json!({"v": "1.2"})));
        upstream.push(URL, Ok(json!({"v": "1.3"})));
        let cache = ttl_cache(&upstream, Duration::from_millis(1_200_000));

        let at_zero = cache.get("version", URL).await.unwrap();
        assert_eq!(*at_zero, json!({"v": "1.2"}));

        tokio::time::advance(Duration::from_millis(500_000)).await;
        let at_500k = cache.get("version", URL).await.unwrap();
        assert_eq!(at_500k, at_zero);
        assert_eq!(upstream.total_calls(), 1);

        tokio::time::advance(Duration::from_millis(800_000)).await;
        let at_1300k = cache.get("version", URL).await.unwrap();
        assert_eq!(*at_1300k, json!({"v": "1.3"}));
        assert_eq!(upstream.total_calls(), 2);

        // The clock was reset by the refresh.
        tokio::time::advance(Duration::from_millis(1_000_000)).await;
        let later = cache.get("version", URL).await.unwrap();
        assert_eq!(*later, json!({"v": "1.3"}));
        assert_eq!(upstream.total_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_refreshes_exactly_once() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(URL, Ok(json!({"n": 1})));
        upstream.push(URL, Ok(json!({"n": 2})));
        let cache = ttl_cache(&upstream, Duration::from_secs(10));

        cache.get("item", URL).await.unwrap();
        for _ in 0..5 {
            cache.get("item", URL).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(11)).await;
        let refreshed = cache.get("item", URL).await.unwrap();
        let after = cache.get("item", URL).await.unwrap();

        assert_eq!(*refreshed, json!({"n": 2}));
        assert_eq!(after, refreshed);
        assert_eq!(upstream.total_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_first_fetch_stores_nothing_and_next_get_retries() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(URL, Err(server_error()));
        upstream.push(URL, Ok(json!({"data": {}})));
        let cache = ttl_cache(&upstream, DEFAULT_TTL);

        let err = cache.get("champion", URL).await.unwrap_err();
        assert!(matches!(err, FetchError::Upstream { status_code: 500, .. }));
        assert!(cache.cached("champion").is_none());

        let value = cache.get("champion", URL).await.expect("retry should succeed");
        assert_eq!(*value, json!({"data": {}}));
        assert_eq!(upstream.total_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_returns_error_and_keeps_entry() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(URL, Ok(json!({"v": "1.2"})));
        upstream.push(URL, Err(server_error()));
        let cache = ttl_cache(&upstream, Duration::from_secs(60));

        cache.get("version", URL).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(cache.get("version", URL).await.is_err());
        assert_eq!(cache.cached("version").as_deref(), Some(&json!({"v": "1.2"})));
        assert_eq!(cache.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_does_not_reset_clock() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(URL, Ok(json!({"v": "1.2"})));
        let cache = ttl_cache(&upstream, Duration::from_secs(60));

        cache.get("version", URL).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.get("version", URL).await.is_err());
        assert!(cache.get("version", URL).await.is_err());

        assert_eq!(upstream.total_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_serve_stale_mode_returns_previous_payload() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(URL, Ok(json!({"v": "1.2"})));
        let cache = ttl_cache(&upstream, Duration::from_secs(60)).with_serve_stale_on_error(true);

        cache.get("version", URL).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;

        let value = cache.get("version", URL).await.expect("stale value should be served");
        assert_eq!(*value, json!({"v": "1.2"}));
        assert_eq!(upstream.total_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_served_while_upstream_unreachable() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(URL, Ok(json!({"data": {"1": "Flash"}})));
        let cache = ttl_cache(&upstream, DEFAULT_TTL);

        cache.get("spell", URL).await.unwrap();
        // Queue is now empty: every further call would fail.
        let value = cache.get("spell", URL).await.expect("fresh entry needs no network");

        assert_eq!(*value, json!({"data": {"1": "Flash"}}));
        assert_eq!(upstream.total_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_is_shared_across_keys() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push("champ", Ok(json!({"c": 1})));
        upstream.push("item", Ok(json!({"i": 1})));
        let cache = ttl_cache(&upstream, Duration::from_secs(100));

        cache.get("champion", "champ").await.unwrap();
        tokio::time::advance(Duration::from_secs(90)).await;
        cache.get("item", "item").await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        // The item fetch confirmed freshness for the whole bundle.
        cache.get("champion", "champ").await.expect("still fresh");
        assert_eq!(upstream.calls_to("champ"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_probe_same_marker_is_hit() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(REALM, Ok(json!({"v": "6.1"})));
        upstream.push(URL, Ok(json!({"data": {"a": 1}})));
        upstream.push(REALM, Ok(json!({"v": "6.1"})));
        let cache = FreshnessCache::new(
            upstream.clone(),
            StalenessPolicy::VersionProbe {
                realm_url: REALM.to_string(),
            },
        );

        cache.get("version", REALM).await.unwrap();
        cache.get("item", URL).await.unwrap();
        let hit = cache.get("item", URL).await.unwrap();

        assert_eq!(*hit, json!({"data": {"a": 1}}));
        assert_eq!(upstream.calls_to(URL), 1);
        assert_eq!(upstream.calls_to(REALM), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_probe_changed_marker_refetches() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(REALM, Ok(json!({"v": "6.1"})));
        upstream.push(URL, Ok(json!({"data": {"a": 1}})));
        upstream.push(REALM, Ok(json!({"v": "6.2"})));
        upstream.push(URL, Ok(json!({"data": {"a": 2}})));
        upstream.push(REALM, Ok(json!({"v": "6.2"})));
        let cache = FreshnessCache::new(
            upstream.clone(),
            StalenessPolicy::VersionProbe {
                realm_url: REALM.to_string(),
            },
        );

        cache.get("version", REALM).await.unwrap();
        cache.get("item", URL).await.unwrap();
        let refreshed = cache.get("item", URL).await.unwrap();
        assert_eq!(*refreshed, json!({"data": {"a": 2}}));

        // The refreshed entry carries the new marker.
        let hit = cache.get("item", URL).await.unwrap();
        assert_eq!(hit, refreshed);
        assert_eq!(upstream.calls_to(URL), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_version_probe_failure_counts_as_stale() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(REALM, Ok(json!({"v": "6.1"})));
        upstream.push(URL, Ok(json!({"data": {"a": 1}})));
        upstream.push(REALM, Err(FetchError::Transport("timed out".into())));
        upstream.push(URL, Ok(json!({"data": {"a": 1}})));
        let cache = FreshnessCache::new(
            upstream.clone(),
            StalenessPolicy::VersionProbe {
                realm_url: REALM.to_string(),
            },
        );

        cache.get("version", REALM).await.unwrap();
        cache.get("item", URL).await.unwrap();
        cache.get("item", URL).await.expect("refetch after failed probe");

        assert_eq!(upstream.calls_to(URL), 2);
    }

    fn probe_cache(upstream: &Arc<ScriptedUpstream>) -> FreshnessCache {
        FreshnessCache::new(
            upstream.clone(),
            StalenessPolicy::VersionProbe {
                realm_url: REALM.to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_bump_during_inflight_fetch_does_not_mark_old_payload_fresh() {
        const CHAMP: &str = "https://upstream/champion";
        const ITEM: &str = "https://upstream/item";
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(REALM, Ok(json!({"v": "1"})));
        upstream.push(CHAMP, Ok(json!({"data": "champ-v1"})));
        upstream.push(ITEM, Ok(json!({"data": "item-v1"})));
        upstream.push(REALM, Ok(json!({"v": "2"})));
        upstream.push(CHAMP, Ok(json!({"data": "champ-v2"})));
        upstream.push(REALM, Ok(json!({"v": "2"})));
        upstream.push(ITEM, Ok(json!({"data": "item-v2"})));
        let cache = Arc::new(probe_cache(&upstream));

        cache.get("version", REALM).await.unwrap();
        cache.get("champion", CHAMP).await.unwrap();

        upstream.hold(ITEM);
        let item_fetch = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get("item", ITEM).await }
        });
        upstream.held.notified().await;

        // Realm moves to v2 while the item fetch is still in flight.
        let champ = cache.get("champion", CHAMP).await.unwrap();
        assert_eq!(*champ, json!({"data": "champ-v2"}));

        upstream.release.notify_one();
        let first_item = item_fetch.await.unwrap().unwrap();
        assert_eq!(*first_item, json!({"data": "item-v1"}));

        let item = cache.get("item", ITEM).await.unwrap();
        assert_eq!(*item, json!({"data": "item-v2"}));
        assert_eq!(upstream.calls_to(ITEM), 2);
    }

    #[tokio::test]
    async fn test_changed_realm_is_stored_from_the_version_check() {
        let upstream = Arc::new(ScriptedUpstream::default());
        upstream.push(REALM, Ok(json!({"v": "1"})));
        upstream.push(REALM, Ok(json!({"v": "2", "cdn": "new"})));
        upstream.push(REALM, Ok(json!({"v": "2", "cdn": "new"})));
        let cache = probe_cache(&upstream);

        cache.get("version", REALM).await.unwrap();
        let bumped = cache.get("version", REALM).await.unwrap();
        assert_eq!(*bumped, json!({"v": "2", "cdn": "new"}));
        assert_eq!(upstream.calls_to(REALM), 2);

        let hit = cache.get("version", REALM).await.unwrap();
        assert_eq!(hit, bumped);
        assert_eq!(upstream.calls_to(REALM), 3);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().refreshes, 2);
    }

    /// Upstream that parks calls to "slow" until released.
    struct GatedUpstream {
        gate: Notify,
    }

    #[async_trait]
    impl StaticDataSource for GatedUpstream {
        async fn fetch(&self, url: &str) -> Result<Value, FetchError> {
            if url == "slow" {
                self.gate.notified().await;
            }
            Ok(json!({ "url": url }))
        }
    }

    #[tokio::test]
    async fn test_slow_fetch_does_not_block_other_keys() {
        let upstream = Arc::new(GatedUpstream { gate: Notify::new() });
        let cache = Arc::new(FreshnessCache::new(upstream.clone(), StalenessPolicy::default()));

        let slow = tokio::spawn({
            let cache = cache.clone();
            async move { cache.get("champion", "slow").await }
        });
        tokio::task::yield_now().await;

        let fast = tokio::time::timeout(Duration::from_secs(5), cache.get("item", "fast"))
            .await
            .expect("fast key must not wait on the slow fetch")
            .unwrap();
        assert_eq!(*fast, json!({"url": "fast"}));
        assert!(!slow.is_finished());

        upstream.gate.notify_one();
        let slow = slow.await.unwrap().unwrap();
        assert_eq!(*slow, json!({"url": "slow"}));
    }
}
