//! Key/value store boundary behind the temporal cache.
//!
//! The production deployment talks to a shared key/value server; this module
//! defines the narrow interface the cache needs and an in-process
//! implementation with per-key expiry. Stores own their concurrency
//! discipline: every operation is atomic per key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::error::StoreError;

/// Key/value store with per-key time-to-live.
pub trait CacheStore: Send + Sync {
    /// Check the store is reachable.
    fn ping(&self) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<i64>, StoreError>;

    fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError>;

    /// Remove every key starting with `prefix` (all keys for `""`).
    /// Returns the number of keys removed.
    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;
}

/// Source of monotonic time for expiry checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + *offset
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at: Instant,
}

/// Writes between sweeps of expired keys.
const SWEEP_INTERVAL: usize = 256;

/// In-process store. Expired keys are dropped when read and swept every
/// [`SWEEP_INTERVAL`] writes.
#[derive(Debug, Default)]
pub struct MemoryStore<C: Clock = SystemClock> {
    entries: RwLock<HashMap<String, Entry>>,
    writes: AtomicUsize,
    clock: C,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Clock> MemoryStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            clock,
        }
    }

    /// Number of keys held, expired or not.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Number of keys that have not yet expired.
    pub fn live_entries(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.values().filter(|entry| entry.expires_at > now).count())
    }

    /// Drop expired keys. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok(before - entries.len())
    }

    /// Remaining time-to-live for a key, if present.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now))
    }
}

impl<C: Clock> CacheStore for MemoryStore<C> {
    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value)),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        // May have been rewritten between the two locks
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.value)),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> Result<(), StoreError> {
        let now = self.clock.now();
        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            StoreError::Command(format!("ttl {:?} out of range", ttl))
        })?;
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), Entry { value, expires_at });

        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }
}
