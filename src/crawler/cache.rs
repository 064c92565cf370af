//! Deduplication and state tracking for checks
//!
//! Every check is identified by its cache key. A key lives in at most one
//! of three places: `incoming` (admitted, waiting for a worker),
//! `in_progress` (owned by a worker) or `checked` (finished, result kept
//! for later duplicates). Duplicates of a key that is still incoming or in
//! progress are parked next to their owner until it finishes.
//!
//! All operations take a single mutex and do no I/O while holding it.

use crate::checker::{CachedResult, UrlCheck, UrlRecord};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What happened to a check offered to [`UrlCache::incoming_add`]
#[derive(Debug)]
pub enum Admission {
    /// The check was queued for a worker
    Queued,

    /// The key was already checked; the record carries a copy of that
    /// result and must be logged by the caller
    Cached(Box<UrlRecord>),

    /// The key is incoming or in progress; the check waits for its owner
    Parked,

    /// The URL limit was reached
    Dropped,
}

/// Where a key currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Incoming,
    InProgress,
    Checked,
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Incoming => "incoming",
            Self::InProgress => "in progress",
            Self::Checked => "checked",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
struct CacheState {
    incoming: VecDeque<UrlCheck>,
    incoming_keys: HashSet<String>,
    in_progress: HashSet<String>,
    checked: HashMap<String, CachedResult>,
    parked: HashMap<String, Vec<UrlCheck>>,
    admitted: usize,
}

impl CacheState {
    fn enqueue(&mut self, key: String, check: UrlCheck) {
        self.incoming_keys.insert(key);
        self.incoming.push_back(check);
    }

    /// Hands ownership of `key` to its first parked duplicate, if any
    fn readmit_parked(&mut self, key: &str) -> bool {
        let Some(waiters) = self.parked.get_mut(key) else {
            return false;
        };
        if waiters.is_empty() {
            self.parked.remove(key);
            return false;
        }
        let next = waiters.remove(0);
        if waiters.is_empty() {
            self.parked.remove(key);
        }
        self.enqueue(key.to_string(), next);
        true
    }
}

/// Thread-safe store of check states keyed by cache key
pub struct UrlCache {
    state: Mutex<CacheState>,
    activity: Condvar,
    max_urls: Option<usize>,
}

impl UrlCache {
    /// Creates an empty cache admitting at most `max_urls` distinct keys
    pub fn new(max_urls: Option<usize>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            activity: Condvar::new(),
            max_urls,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offers a check for admission
    ///
    /// Safe to call from any number of threads at once: of several checks
    /// with the same key exactly one is queued.
    pub fn incoming_add(&self, check: UrlCheck) -> Admission {
        let key = check.cache_key().to_string();
        let mut state = self.lock();

        if let Some(cached) = state.checked.get(&key) {
            let cached = cached.clone();
            drop(state);
            let mut record = check.into_record();
            record.copy_from_cache(&cached);
            return Admission::Cached(Box::new(record));
        }

        if state.incoming_keys.contains(&key) || state.in_progress.contains(&key) {
            state.parked.entry(key).or_default().push(check);
            return Admission::Parked;
        }

        if let Some(max) = self.max_urls {
            if state.admitted >= max {
                tracing::debug!("URL limit {} reached, dropping {}", max, key);
                return Admission::Dropped;
            }
        }

        state.admitted += 1;
        state.enqueue(key, check);
        drop(state);
        self.activity.notify_all();
        Admission::Queued
    }

    /// Takes the next incoming check and marks its key in progress
    ///
    /// `None` means nothing is waiting right now; workers may still add
    /// more.
    pub fn incoming_get_url(&self) -> Option<UrlCheck> {
        let mut state = self.lock();
        let check = state.incoming.pop_front()?;
        let key = check.cache_key().to_string();
        state.incoming_keys.remove(&key);
        state.in_progress.insert(key);
        Some(check)
    }

    /// Moves a finished check's key from in progress to checked
    ///
    /// Non-cacheable results are not stored; the first parked duplicate is
    /// queued again for a fresh attempt instead.
    ///
    /// # Returns
    ///
    /// Records of parked duplicates, filled from this result, that must now
    /// be logged
    pub fn checked_add(&self, check: &UrlCheck) -> Vec<UrlRecord> {
        let key = check.cache_key();
        let mut state = self.lock();

        if !state.in_progress.remove(key) {
            tracing::warn!("Checked URL {} was not in progress", key);
        }

        if !check.record.caching {
            let readmitted = state.readmit_parked(key);
            drop(state);
            if readmitted {
                self.activity.notify_all();
            }
            return Vec::new();
        }

        let cached = check.record.to_cached();
        let waiters = state.parked.remove(key).unwrap_or_default();
        state.checked.insert(key.to_string(), cached.clone());
        drop(state);
        self.activity.notify_all();

        waiters
            .into_iter()
            .map(|waiter| {
                let mut record = waiter.into_record();
                record.copy_from_cache(&cached);
                record
            })
            .collect()
    }

    /// Releases an in-progress key without a result so it can be retried
    ///
    /// A missing key is logged unless `ignore_missing` is set.
    pub fn in_progress_remove(&self, check: &UrlCheck, ignore_missing: bool) {
        let key = check.cache_key();
        let mut state = self.lock();

        if !state.in_progress.remove(key) && !ignore_missing {
            tracing::warn!("URL {} was not in progress", key);
        }
        state.readmit_parked(key);
        drop(state);
        self.activity.notify_all();
    }

    pub fn incoming_len(&self) -> usize {
        self.lock().incoming.len()
    }

    pub fn in_progress_len(&self) -> usize {
        self.lock().in_progress.len()
    }

    pub fn checked_len(&self) -> usize {
        self.lock().checked.len()
    }

    /// Number of duplicates waiting for an owner
    pub fn parked_len(&self) -> usize {
        self.lock().parked.values().map(Vec::len).sum()
    }

    /// Every place `key` currently appears in
    ///
    /// Holds at most one entry; more is a broken invariant.
    pub fn key_states(&self, key: &str) -> Vec<KeyState> {
        let state = self.lock();
        let mut found = Vec::new();
        if state.incoming_keys.contains(key) {
            found.push(KeyState::Incoming);
        }
        if state.in_progress.contains(key) {
            found.push(KeyState::InProgress);
        }
        if state.checked.contains_key(key) {
            found.push(KeyState::Checked);
        }
        found
    }

    /// Blocks until the cache changes or `timeout` elapses
    pub fn wait_for_activity(&self, timeout: Duration) {
        let state = self.lock();
        let _ = self
            .activity
            .wait_timeout(state, timeout)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Wakes every thread in [`wait_for_activity`](Self::wait_for_activity)
    pub fn notify(&self) {
        self.activity.notify_all();
    }
}

impl fmt::Debug for UrlCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("UrlCache")
            .field("incoming", &state.incoming.len())
            .field("in_progress", &state.in_progress.len())
            .field("checked", &state.checked.len())
            .field("max_urls", &self.max_urls)
            .finish()
    }
}
