//! Robots.txt caching implementation
//!
//! One entry per origin (`scheme://host[:port]`), shared by all workers and
//! refreshed after 24 hours.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Cached robots.txt data for an origin
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: Arc<ParsedRobots>,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    /// Creates a new CachedRobots instance stamped with the current time
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content: Arc::new(content),
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is older than 24 hours
    pub fn is_stale(&self) -> bool {
        self.age() > Duration::hours(24)
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }
}

/// Thread-safe robots.txt cache
///
/// The lock is never held while fetching. Two workers missing the same
/// origin at the same time may both fetch it; the later insert wins.
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: Mutex<HashMap<String, CachedRobots>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the robots.txt rules for `origin`, calling `fetch` on a miss
    /// or when the cached entry is stale
    pub fn get_or_fetch<F>(&self, origin: &str, fetch: F) -> Arc<ParsedRobots>
    where
        F: FnOnce() -> ParsedRobots,
    {
        if let Some(cached) = self.lookup(origin) {
            return cached;
        }

        tracing::debug!("Fetching robots.txt for {}", origin);
        let entry = CachedRobots::new(fetch());
        let content = Arc::clone(&entry.content);
        self.lock().insert(origin.to_string(), entry);
        content
    }

    /// Returns the cached entry for `origin` if present and fresh
    pub fn lookup(&self, origin: &str) -> Option<Arc<ParsedRobots>> {
        self.lock()
            .get(origin)
            .filter(|entry| !entry.is_stale())
            .map(|entry| Arc::clone(&entry.content))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedRobots>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
