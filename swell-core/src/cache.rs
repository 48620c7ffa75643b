//! Per-provider grid cache.
//!
//! Each adapter owns exactly one [`GridCache`]. Lookups are keyed by the coordinate snapped to
//! the adapter's native resolution, so nearby requests inside the same cell share an entry.
//! Expiry is lazy: an entry older than the TTL is removed by the lookup that finds it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::model::{Coordinate, ProviderReading};

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: ProviderReading,
    pub cached_at: Instant,
}

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
}

#[derive(Debug)]
pub struct GridCache {
    resolution: f64,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl GridCache {
    pub fn new(resolution: f64) -> Self {
        Self::with_ttl(resolution, DEFAULT_TTL)
    }

    pub fn with_ttl(resolution: f64, ttl: Duration) -> Self {
        Self {
            resolution,
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The grid cell a coordinate falls into.
    pub fn cell(&self, coordinate: Coordinate) -> Coordinate {
        coordinate.snap(self.resolution)
    }

    pub fn key(&self, coordinate: Coordinate) -> String {
        let cell = self.cell(coordinate);
        format!("{:.2},{:.2}", cell.latitude(), cell.longitude())
    }

    pub fn get(&self, coordinate: Coordinate) -> Option<ProviderReading> {
        let key = self.key(coordinate);
        let mut entries = self.entries.lock();

        match entries.get(&key) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(&key);
                self.expired.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, coordinate: Coordinate, reading: ProviderReading) {
        let key = self.key(coordinate);
        let entry = CacheEntry {
            key: key.clone(),
            value: reading,
            cached_at: Instant::now(),
        };
        self.entries.lock().insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}
