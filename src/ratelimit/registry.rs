//! Registry of named limiters.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::limiter::{LimiterMetrics, LimiterSettings, RateLimiter};
use super::window::{Consumed, RateLimited};

/// Holds one [`RateLimiter`] per named resource.
///
/// Constructed once at startup and shared by handlers. The first registration
/// of a name wins; later registrations with different settings get the
/// existing instance back.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl LimiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every limiter in `settings`.
    pub fn from_config(settings: &[LimiterSettings]) -> Self {
        let registry = Self::new();
        for limiter in settings {
            registry.register(limiter.clone());
        }
        registry
    }

    /// Return the limiter for `name`, creating it if absent.
    pub fn get_or_create(
        &self,
        name: &str,
        points: u32,
        duration_secs: u64,
        max_entries: Option<usize>,
    ) -> Arc<RateLimiter> {
        let mut settings = LimiterSettings::new(name, points, duration_secs);
        if let Some(max_entries) = max_entries {
            settings = settings.with_max_entries(max_entries);
        }
        self.register(settings)
    }

    /// Register a limiter from settings, or return the one already under that name.
    pub fn register(&self, settings: LimiterSettings) -> Arc<RateLimiter> {
        if let Some(existing) = self.limiters.get(&settings.name) {
            if existing.points() != settings.points
                || existing.duration().as_secs() != settings.duration_secs
            {
                debug!(
                    limiter = %settings.name,
                    points = settings.points,
                    duration_secs = settings.duration_secs,
                    "Limiter already registered, ignoring new settings"
                );
            }
            return Arc::clone(existing.value());
        }

        let entry = self
            .limiters
            .entry(settings.name.clone())
            .or_insert_with(|| {
                debug!(
                    limiter = %settings.name,
                    points = settings.points,
                    duration_secs = settings.duration_secs,
                    max_entries = settings.max_entries,
                    "Registering rate limiter"
                );
                Arc::new(RateLimiter::new(settings))
            });
        Arc::clone(entry.value())
    }

    /// Look up a limiter by name.
    pub fn get(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(name).map(|limiter| Arc::clone(limiter.value()))
    }

    /// Look up a limiter that must have been registered.
    ///
    /// # Panics
    ///
    /// Panics if `name` was never registered. Consuming against an unknown
    /// limiter would otherwise admit unlimited traffic.
    pub fn limiter(&self, name: &str) -> Arc<RateLimiter> {
        match self.get(name) {
            Some(limiter) => limiter,
            None => panic!("rate limiter {name:?} not found, register it first"),
        }
    }

    /// Consume one point for `key` against the limiter `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` was never registered.
    pub async fn consume(&self, name: &str, key: &str) -> Result<Consumed, RateLimited> {
        self.limiter(name).consume(key).await
    }

    /// Metrics for every registered limiter, ordered by name.
    pub fn all_metrics(&self) -> BTreeMap<String, LimiterMetrics> {
        self.limiters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect()
    }

    /// Names of all registered limiters, ordered.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limiters.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Number of registered limiters.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Whether no limiters are registered.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let registry = LimiterRegistry::new();

        let first = registry.get_or_create("search", 100, 600, Some(10_000));
        let second = registry.get_or_create("search", 100, 600, Some(10_000));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_first_registration_wins() {
        let registry = LimiterRegistry::new();

        registry.get_or_create("feedback", 5, 3600, None);
        let again = registry.get_or_create("feedback", 50, 60, Some(1));

        assert_eq!(again.points(), 5);
        assert_eq!(again.duration().as_secs(), 3600);
        assert_eq!(again.max_entries(), 5000);
    }

    #[tokio::test]
    async fn test_shared_state_across_lookups() {
        let registry = LimiterRegistry::new();
        registry.get_or_create("test", 3, 60, None);

        registry.consume("test", "1.2.3.4").await.unwrap();
        let consumed = registry.limiter("test").consume("1.2.3.4").await.unwrap();

        assert_eq!(consumed.remaining_points, 1);
    }

    #[test]
    fn test_get_unknown_returns_none() {
        let registry = LimiterRegistry::new();
        assert!(registry.get("missing").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    #[should_panic(expected = "not found")]
    fn test_limiter_unknown_panics() {
        let registry = LimiterRegistry::new();
        registry.limiter("missing");
    }

    #[tokio::test]
    async fn test_all_metrics() {
        let registry = LimiterRegistry::from_config(&[
            LimiterSettings::new("suggest", 500, 60),
            LimiterSettings::new("search", 100, 600).with_max_entries(10_000),
        ]);

        registry.consume("search", "1.2.3.4").await.unwrap();
        registry.consume("search", "5.6.7.8").await.unwrap();

        let metrics = registry.all_metrics();
        let names: Vec<&String> = metrics.keys().collect();
        assert_eq!(names, vec!["search", "suggest"]);
        assert_eq!(metrics["search"].size, 2);
        assert_eq!(metrics["search"].max_size, 10_000);
        assert_eq!(metrics["suggest"].size, 0);
        assert_eq!(registry.names(), vec!["search".to_string(), "suggest".to_string()]);
    }
}
