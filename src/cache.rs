//! Two-layer temporal cache for oracle results.
//!
//! Layer 1 (`base_distance`) holds road distances for 30 days. Layer 2
//! (`traffic_duration`) holds traffic-aware durations keyed by time bucket
//! and weekday, with a TTL that shrinks during peak hours.
//!
//! Whether caching is available is decided once, in [`connect`]: a reachable
//! store yields a [`Cache`], an unreachable one a [`NullCache`]. Callers hold
//! an `Arc<dyn TemporalCache>` and never branch on availability.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, Weekday};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::coordinate::Coordinate;
use crate::redis_store::{RedisConfig, RedisStore};
use crate::store::CacheStore;
use crate::time_bucket::TimeBucket;

/// TTL for layer 1 entries.
pub const BASE_DISTANCE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Hex digits of the blake3 digest kept in a key.
const KEY_DIGEST_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    BaseDistance,
    TrafficDuration,
}

impl Namespace {
    pub const fn prefix(self) -> &'static str {
        match self {
            Namespace::BaseDistance => "distance:static:",
            Namespace::TrafficDuration => "duration:traffic:",
        }
    }
}

/// Fully derived store key. Direction matters: (A, B) and (B, A) differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: Namespace,
    key: String,
}

impl CacheKey {
    pub fn base_distance(origin: Coordinate, destination: Coordinate) -> Self {
        Self::derive(Namespace::BaseDistance, &[origin.key(), destination.key()])
    }

    pub fn traffic_duration(
        origin: Coordinate,
        destination: Coordinate,
        bucket: TimeBucket,
        weekday: Weekday,
    ) -> Self {
        Self::derive(
            Namespace::TrafficDuration,
            &[
                origin.key(),
                destination.key(),
                bucket.as_str().to_string(),
                weekday.to_string(),
            ],
        )
    }

    fn derive(namespace: Namespace, parts: &[String]) -> Self {
        let digest = blake3::hash(parts.join(":").as_bytes());
        let hex = digest.to_hex();
        let key = format!("{}{}", namespace.prefix(), &hex.as_str()[..KEY_DIGEST_LEN]);
        Self { namespace, key }
    }

    pub const fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

/// Hit/miss counters for one layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerStats {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
    /// Percentage, rounded to two decimals.
    pub hit_rate: f64,
}

impl LayerStats {
    fn new(hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            hits,
            misses,
            total,
            hit_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub base_distance: LayerStats,
    pub traffic_duration: LayerStats,
}

/// Cache operations used by the matrix provider.
///
/// `get`/`set` never fail loudly: store problems read as a miss or a `false`
/// write result.
pub trait TemporalCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<i64>;

    /// Store `value` under `key`; `true` when the write reached the store.
    fn set(&self, key: &CacheKey, value: i64, ttl: Duration) -> bool;

    fn stats(&self) -> CacheStats;

    fn reset_stats(&self);

    /// Remove one namespace, or everything when `None`.
    fn clear(&self, namespace: Option<Namespace>);

    fn base_distance(&self, origin: Coordinate, destination: Coordinate) -> Option<i64> {
        self.get(&CacheKey::base_distance(origin, destination))
    }

    fn set_base_distance(&self, origin: Coordinate, destination: Coordinate, meters: i64) -> bool {
        self.set(
            &CacheKey::base_distance(origin, destination),
            meters,
            BASE_DISTANCE_TTL,
        )
    }

    /// Traffic duration for the bucket and weekday of `departure_time`
    /// (now when absent).
    fn traffic_duration(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        departure_time: Option<DateTime<Local>>,
    ) -> Option<i64> {
        let departure = departure_time.unwrap_or_else(Local::now);
        self.get(&CacheKey::traffic_duration(
            origin,
            destination,
            TimeBucket::at(&departure),
            departure.weekday(),
        ))
    }

    fn set_traffic_duration(
        &self,
        origin: Coordinate,
        destination: Coordinate,
        seconds: i64,
        departure_time: Option<DateTime<Local>>,
    ) -> bool {
        let departure = departure_time.unwrap_or_else(Local::now);
        let bucket = TimeBucket::at(&departure);
        self.set(
            &CacheKey::traffic_duration(origin, destination, bucket, departure.weekday()),
            seconds,
            bucket.ttl(),
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    base_hits: AtomicU64,
    base_misses: AtomicU64,
    traffic_hits: AtomicU64,
    traffic_misses: AtomicU64,
}

impl Counters {
    fn record(&self, namespace: Namespace, hit: bool) {
        let counter = match (namespace, hit) {
            (Namespace::BaseDistance, true) => &self.base_hits,
            (Namespace::BaseDistance, false) => &self.base_misses,
            (Namespace::TrafficDuration, true) => &self.traffic_hits,
            (Namespace::TrafficDuration, false) => &self.traffic_misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        for counter in [
            &self.base_hits,
            &self.base_misses,
            &self.traffic_hits,
            &self.traffic_misses,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Cache backed by a reachable store.
#[derive(Debug)]
pub struct Cache<S> {
    store: S,
    counters: Counters,
}

impl<S: CacheStore> Cache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            counters: Counters::default(),
        }
    }
}

impl<S: CacheStore> TemporalCache for Cache<S> {
    fn get(&self, key: &CacheKey) -> Option<i64> {
        match self.store.get(key.as_str()) {
            Ok(value) => {
                self.counters.record(key.namespace(), value.is_some());
                value
            }
            Err(err) => {
                error!(key = key.as_str(), error = %err, "cache read failed");
                None
            }
        }
    }

    fn set(&self, key: &CacheKey, value: i64, ttl: Duration) -> bool {
        match self.store.set_with_ttl(key.as_str(), value, ttl) {
            Ok(()) => true,
            Err(err) => {
                error!(key = key.as_str(), error = %err, "cache write failed");
                false
            }
        }
    }

    fn stats(&self) -> CacheStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CacheStats {
            enabled: true,
            base_distance: LayerStats::new(
                load(&self.counters.base_hits),
                load(&self.counters.base_misses),
            ),
            traffic_duration: LayerStats::new(
                load(&self.counters.traffic_hits),
                load(&self.counters.traffic_misses),
            ),
        }
    }

    fn reset_stats(&self) {
        self.counters.reset();
    }

    fn clear(&self, namespace: Option<Namespace>) {
        let prefix = namespace.map_or("", Namespace::prefix);
        match self.store.delete_prefix(prefix) {
            Ok(removed) => info!(removed, prefix, "cleared cache entries"),
            Err(err) => error!(error = %err, "error clearing cache"),
        }
    }
}

/// Stand-in used when the store was unreachable at startup.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl TemporalCache for NullCache {
    fn get(&self, _key: &CacheKey) -> Option<i64> {
        None
    }

    fn set(&self, _key: &CacheKey, _value: i64, _ttl: Duration) -> bool {
        false
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            enabled: false,
            base_distance: LayerStats::new(0, 0),
            traffic_duration: LayerStats::new(0, 0),
        }
    }

    fn reset_stats(&self) {}

    fn clear(&self, _namespace: Option<Namespace>) {
        warn!("cannot clear cache: store not available");
    }
}

/// Probe `store` once and pick the cache implementation for the session.
pub fn connect<S: CacheStore + 'static>(store: S) -> Arc<dyn TemporalCache> {
    match store.ping() {
        Ok(()) => {
            info!("cache store connection successful");
            Arc::new(Cache::new(store))
        }
        Err(err) => {
            warn!(error = %err, "cache store connection failed; caching disabled");
            Arc::new(NullCache)
        }
    }
}

/// [`connect`] to the Redis server in `config`.
pub fn connect_redis(config: &RedisConfig) -> Arc<dyn TemporalCache> {
    match RedisStore::new(config) {
        Ok(store) => connect(store),
        Err(err) => {
            warn!(error = %err, "invalid redis settings; caching disabled");
            Arc::new(NullCache)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{ManualClock, MemoryStore};
    use chrono::TimeZone;

    struct UnreachableStore;

    impl CacheStore for UnreachableStore {
        fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unreachable("connection refused".to_string()))
        }

        fn get(&self, _key: &str) -> Result<Option<i64>, StoreError> {
            panic!("disabled cache must not touch the store");
        }

        fn set_with_ttl(&self, _key: &str, _value: i64, _ttl: Duration) -> Result<(), StoreError> {
            panic!("disabled cache must not touch the store");
        }

        fn delete_prefix(&self, _prefix: &str) -> Result<usize, StoreError> {
            panic!("disabled cache must not touch the store");
        }
    }

    fn point(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    fn local(hour: u32, minute: u32) -> DateTime<Local> {
        // 2024-01-08 is a Monday
        Local
            .with_ymd_and_hms(2024, 1, 8, hour, minute, 0)
            .earliest()
            .unwrap()
    }

    #[test]
    fn test_base_distance_round_trip_is_directional() {
        let cache = Cache::new(MemoryStore::new());
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);

        assert!(cache.set_base_distance(a, b, 15_000));
        assert_eq!(cache.base_distance(a, b), Some(15_000));
        assert_eq!(cache.base_distance(b, a), None);
    }

    #[test]
    fn test_key_format() {
        let key = CacheKey::base_distance(point(-6.2, 106.8), point(-6.3, 106.9));
        assert!(key.as_str().starts_with("distance:static:"));
        assert_eq!(key.as_str().len(), "distance:static:".len() + KEY_DIGEST_LEN);
    }

    #[test]
    fn test_traffic_key_depends_on_bucket_and_weekday() {
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);
        let monday_peak = CacheKey::traffic_duration(a, b, TimeBucket::PeakMorning, Weekday::Mon);
        let monday_business = CacheKey::traffic_duration(a, b, TimeBucket::Business, Weekday::Mon);
        let tuesday_peak = CacheKey::traffic_duration(a, b, TimeBucket::PeakMorning, Weekday::Tue);
        assert_ne!(monday_peak, monday_business);
        assert_ne!(monday_peak, tuesday_peak);
        assert_eq!(
            monday_peak,
            CacheKey::traffic_duration(a, b, TimeBucket::PeakMorning, Weekday::Mon)
        );
    }

    #[test]
    fn test_traffic_ttl_peak_morning() {
        let clock = Arc::new(ManualClock::new());
        let cache = Cache::new(MemoryStore::with_clock(clock.clone()));
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);
        let eight_am = Some(local(8, 0));

        assert!(cache.set_traffic_duration(a, b, 1200, eight_am));
        clock.advance(Duration::from_secs(899));
        assert_eq!(cache.traffic_duration(a, b, eight_am), Some(1200));
        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.traffic_duration(a, b, eight_am), None);
    }

    #[test]
    fn test_traffic_ttl_business() {
        let clock = Arc::new(ManualClock::new());
        let cache = Cache::new(MemoryStore::with_clock(clock.clone()));
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);
        let noon = Some(local(12, 0));

        assert!(cache.set_traffic_duration(a, b, 1500, noon));
        clock.advance(Duration::from_secs(900));
        assert_eq!(cache.traffic_duration(a, b, noon), Some(1500));
        clock.advance(Duration::from_secs(900));
        assert_eq!(cache.traffic_duration(a, b, noon), None);
    }

    #[test]
    fn test_base_distance_outlives_traffic() {
        let clock = Arc::new(ManualClock::new());
        let cache = Cache::new(MemoryStore::with_clock(clock.clone()));
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);
        cache.set_base_distance(a, b, 9_000);

        clock.advance(Duration::from_secs(29 * 24 * 60 * 60));
        assert_eq!(cache.base_distance(a, b), Some(9_000));
        clock.advance(Duration::from_secs(24 * 60 * 60));
        assert_eq!(cache.base_distance(a, b), None);
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = Cache::new(MemoryStore::new());
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);
        cache.set_base_distance(a, b, 100);

        assert_eq!(cache.base_distance(a, b), Some(100));
        assert_eq!(cache.base_distance(b, a), None);
        assert_eq!(cache.base_distance(b, a), None);
        assert_eq!(cache.traffic_duration(a, b, Some(local(8, 0))), None);

        let stats = cache.stats();
        assert!(stats.enabled);
        assert_eq!(stats.base_distance.hits, 1);
        assert_eq!(stats.base_distance.misses, 2);
        assert_eq!(stats.base_distance.total, 3);
        assert_eq!(stats.base_distance.hit_rate, 33.33);
        assert_eq!(stats.traffic_duration.misses, 1);

        cache.reset_stats();
        assert_eq!(cache.stats().base_distance.total, 0);
    }

    #[test]
    fn test_clear_single_namespace() {
        let cache = Cache::new(MemoryStore::new());
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);
        let noon = Some(local(12, 0));
        cache.set_base_distance(a, b, 100);
        cache.set_traffic_duration(a, b, 60, noon);

        cache.clear(Some(Namespace::BaseDistance));
        assert_eq!(cache.base_distance(a, b), None);
        assert_eq!(cache.traffic_duration(a, b, noon), Some(60));

        cache.clear(None);
        assert_eq!(cache.traffic_duration(a, b, noon), None);
    }

    #[test]
    fn test_unreachable_store_disables_cache() {
        let cache = connect(UnreachableStore);
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);

        assert!(!cache.set_base_distance(a, b, 15_000));
        assert_eq!(cache.base_distance(a, b), None);
        assert!(!cache.set_traffic_duration(a, b, 10, None));
        assert_eq!(cache.traffic_duration(a, b, None), None);
        cache.clear(None);

        let stats = cache.stats();
        assert!(!stats.enabled);
        assert_eq!(stats.base_distance.total, 0);
    }

    #[test]
    fn test_reachable_store_enables_cache() {
        let cache = connect(MemoryStore::new());
        assert!(cache.stats().enabled);
        let a = point(-6.2, 106.8);
        let b = point(-6.3, 106.9);
        assert!(cache.set_base_distance(a, b, 15_000));
        assert_eq!(cache.base_distance(a, b), Some(15_000));
    }
}
