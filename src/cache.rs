//! Memoizing model cache.
//!
//! Loading a detection checkpoint is slow, so loaded models are kept and
//! reused across requests. Each entry lives for a fixed TTL from the moment it
//! was loaded; when the cache is full the oldest entry is evicted. There is no
//! other invalidation.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct CacheEntry<T: ?Sized> {
    key: String,
    loaded_at: Instant,
    value: Arc<Mutex<T>>,
}

/// Keyed cache of loaded models, bounded by age and entry count.
///
/// Values are shared as `Arc<Mutex<T>>` because inference takes `&mut self`.
pub struct ModelCache<T: ?Sized> {
    entries: Mutex<VecDeque<CacheEntry<T>>>,
    ttl: Duration,
    capacity: usize,
}

impl<T: ?Sized> ModelCache<T> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Return the cached value for `key`, calling `load` on a miss or after expiry.
    ///
    /// A failing `load` leaves the cache unchanged.
    pub fn get_or_load<F>(&self, key: &str, load: F) -> Result<Arc<Mutex<T>>>
    where
        F: FnOnce() -> Result<Arc<Mutex<T>>>,
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("model cache lock poisoned"))?;
        Self::evict_expired(&mut entries, self.ttl);

        if let Some(entry) = entries.iter().find(|entry| entry.key == key) {
            log::debug!("model cache hit for {}", key);
            return Ok(entry.value.clone());
        }

        log::info!("model cache miss for {}; loading", key);
        let value = load()?;

        while entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_front() {
                log::info!("evicting cached model {}", evicted.key);
            }
        }
        entries.push_back(CacheEntry {
            key: key.to_string(),
            loaded_at: Instant::now(),
            value: value.clone(),
        });
        Ok(value)
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(mut entries) => {
                Self::evict_expired(&mut entries, self.ttl);
                entries.len()
            }
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn evict_expired(entries: &mut VecDeque<CacheEntry<T>>, ttl: Duration) {
        entries.retain(|entry| {
            let live = entry.loaded_at.elapsed() < ttl;
            if !live {
                log::info!("cached model {} expired", entry.key);
            }
            live
        });
    }
}
