use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Tracks request timing for one host
///
/// Used by the HTTP checker to keep a minimum distance between two requests
/// to the same host.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests made to this host in the current run
    pub request_count: u32,

    /// Time of the last request, or of the next reserved request slot
    pub last_request_time: Option<Instant>,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks if a request can be made now given the minimum delay
    pub fn can_request(&self, min_delay: Duration, now: Instant) -> bool {
        self.time_until_next_request(min_delay, now).is_none()
    }

    /// Records that a request was made to this host
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, min_delay: Duration, now: Instant) -> Option<Duration> {
        let last = self.last_request_time?;
        let next = last + min_delay;
        if next > now {
            Some(next - now)
        } else {
            None
        }
    }

    /// Reserves the next free request slot and returns how long the caller
    /// has to sleep before using it
    ///
    /// Reserving instead of polling keeps concurrent workers for the same
    /// host in a queue, each one `min_delay` behind the previous.
    pub fn reserve_slot(&mut self, min_delay: Duration, now: Instant) -> Duration {
        let wait = self.time_until_next_request(min_delay, now).unwrap_or_default();
        self.record_request(now + wait);
        wait
    }
}

/// Per-host request throttle shared by all workers
#[derive(Debug)]
pub struct HostThrottle {
    min_delay: Duration,
    hosts: Mutex<HashMap<String, DomainState>>,
}

impl HostThrottle {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks the calling worker until it may send a request to `host`
    ///
    /// `extra_delay` (e.g. a robots.txt crawl delay) raises the configured
    /// minimum for this host. The lock is released before sleeping.
    ///
    /// # Returns
    ///
    /// The time spent waiting
    pub fn wait_turn(&self, host: &str, extra_delay: Option<Duration>) -> Duration {
        let delay = extra_delay.map_or(self.min_delay, |d| d.max(self.min_delay));
        if delay.is_zero() {
            self.with_host(host, |state| state.record_request(Instant::now()));
            return Duration::ZERO;
        }

        let wait = self.with_host(host, |state| state.reserve_slot(delay, Instant::now()));
        if !wait.is_zero() {
            tracing::trace!("Waiting {:?} before next request to {}", wait, host);
            std::thread::sleep(wait);
        }
        wait
    }

    /// Returns how many requests were made to `host`
    pub fn request_count(&self, host: &str) -> u32 {
        self.with_host(host, |state| state.request_count)
    }

    fn with_host<T>(&self, host: &str, f: impl FnOnce(&mut DomainState) -> T) -> T {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        f(hosts.entry(host.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(1000);

    #[test]
    fn test_new_domain_state() {
        let state = DomainState::new();
        assert_eq!(state.request_count, 0);
        assert!(state.last_request_time.is_none());
    }

    #[test]
    fn test_can_request_initially() {
        let state = DomainState::new();
        assert!(state.can_request(DELAY, Instant::now()));
    }

    #[test]
    fn test_cannot_request_too_soon() {
        let mut state = DomainState::new();
        let now = Instant::now();
        state.record_request(now);

        assert!(!state.can_request(DELAY, now));
        assert!(!state.can_request(DELAY, now + Duration::from_millis(500)));
        assert!(state.can_request(DELAY, now + Duration::from_millis(1100)));
    }

    #[test]
    fn test_record_request() {
        let mut state = DomainState::new();
        let now = Instant::now();

        state.record_request(now);
        assert_eq!(state.request_count, 1);
        assert_eq!(state.last_request_time, Some(now));

        state.record_request(now);
        assert_eq!(state.request_count, 2);
    }

    #[test]
    fn test_time_until_next_request() {
        let mut state = DomainState::new();
        let now = Instant::now();

        assert!(state.time_until_next_request(DELAY, now).is_none());

        state.last_request_time = Some(now);
        assert_eq!(state.time_until_next_request(DELAY, now), Some(DELAY));

        let soon = now + Duration::from_millis(500);
        assert_eq!(
            state.time_until_next_request(DELAY, soon),
            Some(Duration::from_millis(500))
        );

        let later = now + Duration::from_millis(1100);
        assert!(state.time_until_next_request(DELAY, later).is_none());
    }

    #[test]
    fn test_reserve_slot_queues_callers() {
        let mut state = DomainState::new();
        let now = Instant::now();

        assert_eq!(state.reserve_slot(DELAY, now), Duration::ZERO);
        assert_eq!(state.reserve_slot(DELAY, now), DELAY);
        assert_eq!(state.reserve_slot(DELAY, now), DELAY * 2);
        assert_eq!(state.request_count, 3);
    }

    #[test]
    fn test_throttle_without_delay_never_waits() {
        let throttle = HostThrottle::new(Duration::ZERO);
        assert_eq!(throttle.wait_turn("example.com", None), Duration::ZERO);
        assert_eq!(throttle.wait_turn("example.com", None), Duration::ZERO);
        assert_eq!(throttle.request_count("example.com"), 2);
        assert_eq!(throttle.request_count("other.com"), 0);
    }

    #[test]
    fn test_throttle_delays_second_request() {
        let throttle = HostThrottle::new(Duration::from_millis(50));
        throttle.wait_turn("example.com", None);

        let started = Instant::now();
        throttle.wait_turn("example.com", None);
        assert!(started.elapsed() >= Duration::from_millis(40));

        // Other hosts are independent
        assert_eq!(throttle.wait_turn("other.com", None), Duration::ZERO);
    }

    #[test]
    fn test_extra_delay_raises_minimum() {
        let throttle = HostThrottle::new(Duration::ZERO);
        throttle.wait_turn("example.com", Some(Duration::from_millis(30)));
        let waited = throttle.wait_turn("example.com", Some(Duration::from_millis(30)));
        assert!(waited > Duration::ZERO);
    }
}
