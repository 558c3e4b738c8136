//! Core rate limiter implementation.

use std::mem;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::window::{duration_ms, Consumed, RateLimited, WindowEntry, MAX_DURATION_SECS};

/// Default cache capacity when no `max_entries` is configured.
pub const DEFAULT_MAX_ENTRIES: usize = 5000;

/// Settings for one named limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Name of the resource this limiter guards (e.g. "search")
    pub name: String,
    /// Quota per window
    pub points: u32,
    /// Window length in seconds
    pub duration_secs: u64,
    /// Maximum number of keys tracked at once
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

impl LimiterSettings {
    /// Create settings with the default cache capacity.
    pub fn new(name: impl Into<String>, points: u32, duration_secs: u64) -> Self {
        Self {
            name: name.into(),
            points,
            duration_secs,
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Override the cache capacity.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

/// Point-in-time occupancy of a limiter's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterMetrics {
    /// Number of keys currently tracked
    pub size: usize,
    /// Capacity of the cache
    pub max_size: usize,
    /// Estimated bytes held by keys and entries
    pub memory_usage: usize,
}

/// A fixed-window rate limiter keyed by caller identity.
///
/// Per-key state lives in a bounded LRU cache. Entries past their reset time
/// are treated as absent, and capacity eviction may drop a key's history
/// before its window ends, which resets that caller's quota early.
///
/// Each consume runs its read-modify-write under one lock, so quota
/// enforcement is exact within a process.
pub struct RateLimiter {
    name: String,
    points: u32,
    duration: Duration,
    cache: Mutex<LruCache<String, WindowEntry>>,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// A zero quota or zero capacity is raised to one, and the window is
    /// capped at [`MAX_DURATION_SECS`].
    pub fn new(settings: LimiterSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.max_entries).unwrap_or(NonZeroUsize::MIN);

        Self {
            name: settings.name,
            points: settings.points.max(1),
            duration: Duration::from_secs(settings.duration_secs.min(MAX_DURATION_SECS)),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Consume one point for `key`.
    pub async fn consume(&self, key: &str) -> Result<Consumed, RateLimited> {
        self.consume_at(key, Instant::now())
    }

    /// Consume one point for `key` as of `now`.
    pub fn consume_at(&self, key: &str, now: Instant) -> Result<Consumed, RateLimited> {
        let mut cache = self.cache.lock();

        if let Some(entry) = cache.get_mut(key) {
            if !entry.is_expired(now) {
                let outcome = entry.take(now);
                match &outcome {
                    Ok(consumed) => trace!(
                        limiter = %self.name,
                        key = %key,
                        remaining = consumed.remaining_points,
                        "Consumed point"
                    ),
                    Err(rejected) => debug!(
                        limiter = %self.name,
                        key = %key,
                        ms_before_next = rejected.ms_before_next,
                        "Rate limit exceeded"
                    ),
                }
                return outcome;
            }
        }

        let entry = WindowEntry::start(self.points, self.duration, now);
        if let Some((evicted, _)) = cache.push(key.to_string(), entry) {
            if evicted != key {
                trace!(limiter = %self.name, evicted = %evicted, "Evicted least recently used key");
            }
        }

        debug!(
            limiter = %self.name,
            key = %key,
            remaining = entry.remaining_points,
            "Opened new window"
        );

        Ok(Consumed {
            remaining_points: entry.remaining_points,
            ms_before_next: duration_ms(self.duration),
        })
    }

    /// Snapshot the cache occupancy.
    pub fn metrics(&self) -> LimiterMetrics {
        let cache = self.cache.lock();
        let memory_usage = cache
            .iter()
            .map(|(key, _)| key.len() + mem::size_of::<String>() + mem::size_of::<WindowEntry>())
            .sum();

        LimiterMetrics {
            size: cache.len(),
            max_size: cache.cap().get(),
            memory_usage,
        }
    }

    /// Name of the resource this limiter guards.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quota per window.
    pub fn points(&self) -> u32 {
        self.points
    }

    /// Window length.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Cache capacity.
    pub fn max_entries(&self) -> usize {
        self.cache.lock().cap().get()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("name", &self.name)
            .field("points", &self.points)
            .field("duration", &self.duration)
            .finish()
    }
}
