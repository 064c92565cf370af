//! The top-level control loop of a run
//!
//! The [`Consumer`] binds the [`UrlCache`], the [`WorkerPool`] and the
//! result sinks. Its loop hands incoming checks to workers until nothing is
//! queued and no worker is busy. Workers log their own results and submit
//! the links they discover straight back into the cache.

use crate::checker::{
    get_url_from, run_check, CheckContext, CheckOutcome, LinkOrigin, LinkSubmitter, UrlCheck,
};
use crate::crawler::cache::{Admission, UrlCache};
use crate::crawler::pool::{panic_message, WorkerPool};
use crate::crawler::status::{Progress, StatusReporter};
use crate::output::{CheckStatistics, LogDispatch, ResultSink};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// How long the loop sleeps when it has nothing to dispatch
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Why a run stopped before every URL was checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// [`Consumer::abort`] was called, e.g. on Ctrl-C
    Interrupted,

    /// `max-run-seconds` elapsed
    MaxRunTime,

    /// A check failed with an error classified as fatal
    FatalError,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interrupted => "interrupted",
            Self::MaxRunTime => "maximum run time reached",
            Self::FatalError => "fatal check error",
        })
    }
}

/// State shared between the control loop and the workers
struct Shared {
    ctx: CheckContext,
    cache: UrlCache,
    log: LogDispatch,
    started: Instant,
    stop_reason: OnceLock<StopReason>,
}

impl Shared {
    fn append_url(&self, check: UrlCheck) {
        match self.cache.incoming_add(check) {
            Admission::Queued | Admission::Parked => {}
            Admission::Cached(record) => self.log.log_url(&record, false),
            Admission::Dropped => {}
        }
    }

    /// Runs one check on the current (worker) thread
    fn run_job(&self, mut check: UrlCheck) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            run_check(&mut check, &self.ctx, self)
        }))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            check.fail_internal(&message);
            CheckOutcome::Internal(message)
        });

        match outcome {
            CheckOutcome::Done => self.checked(check, false),
            CheckOutcome::Internal(_) => self.checked(check, true),
            CheckOutcome::Interrupted => self.interrupted(&check),
        }
    }

    /// Logs a finished check, then records its result for duplicates
    fn checked(&self, check: UrlCheck, internal: bool) {
        self.log.log_url(&check.record, internal);
        for duplicate in self.cache.checked_add(&check) {
            self.log.log_url(&duplicate, false);
        }
    }

    fn interrupted(&self, check: &UrlCheck) {
        tracing::debug!("Check of {} interrupted", check.record.display_url());
        self.cache.in_progress_remove(check, true);
    }
}

impl LinkSubmitter for Shared {
    fn submit(&self, check: UrlCheck) {
        self.append_url(check);
    }
}

/// Orchestrates a run: admission, dispatch, logging and termination
///
/// Cloning is cheap; clones drive the same run, so one can be handed to a
/// signal handler for [`abort`](Self::abort).
#[derive(Clone)]
pub struct Consumer {
    shared: Arc<Shared>,
    pool: Arc<WorkerPool>,
}

impl Consumer {
    /// Creates a consumer for one run
    ///
    /// # Arguments
    ///
    /// * `ctx` - The check context; its configuration sizes the pool and
    ///   the URL limit
    /// * `sinks` - Result sinks fed through the dispatcher
    ///
    /// # Returns
    ///
    /// * `Ok(Consumer)` - Worker threads are running and idle
    /// * `Err(LinkError)` - A worker thread could not be spawned
    pub fn new(ctx: CheckContext, sinks: Vec<Box<dyn ResultSink>>) -> crate::Result<Self> {
        let checking = &ctx.config.checking;
        let pool = WorkerPool::new(checking.threads)?;
        let cache = UrlCache::new(checking.max_num_urls);
        let log = LogDispatch::new(&ctx.config, sinks);

        Ok(Self {
            shared: Arc::new(Shared {
                ctx,
                cache,
                log,
                started: Instant::now(),
                stop_reason: OnceLock::new(),
            }),
            pool: Arc::new(pool),
        })
    }

    pub fn context(&self) -> &CheckContext {
        &self.shared.ctx
    }

    pub fn cache(&self) -> &UrlCache {
        &self.shared.cache
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Admits a seed URL at recursion level 0
    pub fn add_seed(&self, url: &str) {
        let check = get_url_from(url, 0, &self.shared.ctx, LinkOrigin::default(), None);
        self.append_url(check);
    }

    /// Offers a check to the cache
    ///
    /// A duplicate of an already checked key is logged right away as
    /// cached; a duplicate of a running key waits for it.
    pub fn append_url(&self, check: UrlCheck) {
        self.shared.append_url(check);
    }

    /// Dispatches the next incoming check, if any
    ///
    /// Checks that already carry their result are finished here without a
    /// worker. Blocks while every worker is busy.
    pub fn check_url(&self) {
        let Some(check) = self.shared.cache.incoming_get_url() else {
            return;
        };

        if !check.needs_connection() {
            self.shared.checked(check, false);
            return;
        }
        if self.shared.ctx.is_aborted() {
            self.shared.interrupted(&check);
            return;
        }

        let name = check.record.display_url().to_string();
        let shared = Arc::clone(&self.shared);
        let job = Box::new(move || shared.run_job(check));
        if self.pool.start_thread(job, &name).is_err() {
            tracing::debug!("Not checking {}: pool is shutting down", name);
        }
    }

    /// True when nothing is queued and no worker is busy
    ///
    /// The pool is asked first: workers only add work while they are
    /// active, so an idle pool followed by an empty queue means done.
    pub fn finished(&self) -> bool {
        self.pool.finished() && self.shared.cache.incoming_len() == 0
    }

    /// Current progress numbers
    pub fn progress(&self) -> Progress {
        Progress {
            queued: self.shared.cache.incoming_len(),
            checked: self.shared.log.statistics().number,
            active: self.pool.active_threads(),
            elapsed: self.shared.started.elapsed(),
        }
    }

    /// Current statistics
    pub fn statistics(&self) -> CheckStatistics {
        self.shared.log.statistics()
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.ctx.is_aborted()
    }

    /// Runs the control loop until every admitted URL is logged or the run
    /// is aborted
    ///
    /// `end_output` is always called; the final statistics are returned.
    pub fn run(&self) -> CheckStatistics {
        let checking = &self.shared.ctx.config.checking;
        self.shared.log.start_output();

        let reporter = if checking.status {
            let consumer = self.clone();
            let interval = Duration::from_secs(checking.status_wait_seconds);
            match StatusReporter::spawn(interval, move || consumer.progress()) {
                Ok(reporter) => Some(reporter),
                Err(e) => {
                    tracing::warn!("Could not start status reporter: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let deadline = checking
            .max_run_seconds
            .map(|secs| self.shared.started + Duration::from_secs(secs));

        loop {
            if self.is_aborted() {
                break;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::info!("Maximum run time reached, stopping");
                self.stop(StopReason::MaxRunTime);
                break;
            }

            if self.shared.cache.incoming_len() > 0 {
                self.check_url();
            } else if self.finished() {
                break;
            } else {
                self.shared.cache.wait_for_activity(IDLE_WAIT);
            }
        }

        if let Some(reporter) = reporter {
            reporter.stop();
        }

        if self.is_aborted() {
            // Checks raise the abort flag directly on fatal errors
            let reason = *self.shared.stop_reason.get_or_init(|| StopReason::FatalError);
            self.shutdown(reason);
        } else {
            self.pool.finish(checking.abort_timeout_duration());
        }
        self.shared.log.end_output()
    }

    /// Requests a stop: no new checks start and the loop winds down
    ///
    /// Running checks observe the abort flag between steps.
    pub fn abort(&self) {
        self.stop(StopReason::Interrupted);
    }

    /// Why the run stopped early, `None` while it runs or after it
    /// completed normally
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.shared.stop_reason.get().copied()
    }

    /// The first reason given wins
    fn stop(&self, reason: StopReason) {
        let _ = self.shared.stop_reason.set(reason);
        self.shared.ctx.request_abort();
        self.pool.close_admission();
        self.shared.cache.notify();
    }

    fn shutdown(&self, reason: StopReason) {
        let timeout = self.shared.ctx.config.checking.abort_timeout_duration();
        tracing::warn!(
            "{}; waiting for {} active threads to finish",
            reason,
            self.pool.active_threads()
        );
        if !self.pool.finish(timeout) {
            tracing::warn!("Abort timeout of {:?} reached, output is incomplete", timeout);
        }
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("cache", &self.shared.cache)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{CheckError, Checker, CheckerRegistry, UrlRecord};
    use crate::config::Config;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves a fixed set of pages and counts connections
    struct SiteChecker {
        pages: Arc<Vec<(&'static str, &'static str)>>,
        connections: Arc<AtomicUsize>,
        body: Option<&'static str>,
    }

    impl Checker for SiteChecker {
        fn check_connection(
            &mut self,
            _ctx: &CheckContext,
            record: &mut UrlRecord,
        ) -> Result<(), CheckError> {
            self.connections.fetch_add(1, Ordering::SeqCst);
            let url = record.url.clone().unwrap_or_default();
            match self.pages.iter().find(|(page, _)| *page == url) {
                Some((_, body)) => {
                    self.body = Some(body);
                    record.set_result("200 OK", true);
                    Ok(())
                }
                None => Err(CheckError::new(crate::checker::ErrorKind::Http, "404 Not Found")),
            }
        }

        fn set_content_type(&mut self, record: &mut UrlRecord) {
            record.content_type = Some("text/html".to_string());
        }

        fn can_get_content(&self) -> bool {
            true
        }

        fn read_content(
            &mut self,
            _ctx: &CheckContext,
            _record: &mut UrlRecord,
            _limit: u64,
        ) -> Result<Vec<u8>, CheckError> {
            Ok(self.body.unwrap_or_default().as_bytes().to_vec())
        }
    }

    #[derive(Clone, Default)]
    struct MemorySink {
        records: Arc<Mutex<Vec<UrlRecord>>>,
        ended: Arc<AtomicUsize>,
    }

    impl ResultSink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        fn log_filter_url(&mut self, record: &UrlRecord, _do_print: bool) -> crate::output::OutputResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn end_output(&mut self, _stats: &CheckStatistics) -> crate::output::OutputResult<()> {
            self.ended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn create_test_consumer(threads: usize) -> (Consumer, MemorySink, Arc<AtomicUsize>) {
        let mut config = Config::default();
        config.checking.threads = threads;
        config.checking.recursion_level = 5;
        create_configured_consumer(config)
    }

    fn create_configured_consumer(config: Config) -> (Consumer, MemorySink, Arc<AtomicUsize>) {
        let pages = Arc::new(vec![
            ("http://example.com/a.html", r#"<a href="b.html">B</a><a href="a.html">A</a>"#),
            ("http://example.com/b.html", r#"<a href="a.html">A</a><a href="missing.html">M</a>"#),
        ]);
        let connections = Arc::new(AtomicUsize::new(0));

        let mut registry = CheckerRegistry::with_defaults(&config.filtering.ignored_schemes);
        let counter = Arc::clone(&connections);
        registry.register_fn("http", move || {
            Box::new(SiteChecker {
                pages: Arc::clone(&pages),
                connections: Arc::clone(&counter),
                body: None,
            })
        });

        let seed = url::Url::parse("http://example.com/a.html").unwrap();
        let ctx = CheckContext::with_registry(Arc::new(config), &[seed], registry).unwrap();
        let sink = MemorySink::default();
        let consumer = Consumer::new(ctx, vec![Box::new(sink.clone())]).unwrap();
        (consumer, sink, connections)
    }

    fn logged(sink: &MemorySink, key: &str) -> Vec<UrlRecord> {
        sink.records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.cache_key.as_deref() == Some(key))
            .cloned()
            .collect()
    }

    #[test]
    fn test_site_checked_once_per_key() {
        let (consumer, sink, connections) = create_test_consumer(4);
        consumer.add_seed("http://example.com/a.html");

        let stats = consumer.run();

        assert!(consumer.finished());
        assert_eq!(connections.load(Ordering::SeqCst), 3);
        let a = logged(&sink, "http://example.com/a.html");
        assert_eq!(a.iter().filter(|r| !r.cached).count(), 1);
        assert_eq!(a.iter().filter(|r| r.cached).count(), 2);
        assert_eq!(logged(&sink, "http://example.com/b.html").len(), 1);
        assert!(!logged(&sink, "http://example.com/missing.html")[0].valid);
        assert_eq!(stats.number, 5);
        assert_eq!(stats.errors, 1);
        assert_eq!(sink.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_synchronous_mode() {
        let (consumer, sink, connections) = create_test_consumer(0);
        consumer.add_seed("http://example.com/a.html");

        let stats = consumer.run();

        assert_eq!(connections.load(Ordering::SeqCst), 3);
        assert_eq!(stats.number, 5);
        assert_eq!(sink.records.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_syntax_error_needs_no_worker() {
        let (consumer, sink, connections) = create_test_consumer(2);
        consumer.add_seed("http://");

        let stats = consumer.run();

        assert_eq!(connections.load(Ordering::SeqCst), 0);
        assert_eq!(stats.errors, 1);
        assert!(!sink.records.lock().unwrap()[0].valid);
    }

    #[test]
    fn test_duplicate_seed_logged_cached() {
        let (consumer, sink, connections) = create_test_consumer(1);
        consumer.add_seed("http://example.com/b.html");
        consumer.add_seed("http://example.com/b.html#frag");

        consumer.run();

        let b = logged(&sink, "http://example.com/b.html");
        assert!(connections.load(Ordering::SeqCst) >= 1);
        assert_eq!(b.iter().filter(|r| !r.cached).count(), 1);
        assert!(b.iter().any(|r| r.cached));
    }

    #[test]
    fn test_abort_before_run_ends_output() {
        let (consumer, sink, connections) = create_test_consumer(2);
        consumer.add_seed("http://example.com/a.html");
        consumer.abort();

        let stats = consumer.run();

        assert!(consumer.is_aborted());
        assert_eq!(consumer.stop_reason(), Some(StopReason::Interrupted));
        assert_eq!(connections.load(Ordering::SeqCst), 0);
        assert_eq!(stats.number, 0);
        assert_eq!(sink.ended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completed_run_has_no_stop_reason() {
        let (consumer, _sink, _) = create_test_consumer(2);
        consumer.add_seed("http://example.com/a.html");

        consumer.run();

        assert!(!consumer.is_aborted());
        assert_eq!(consumer.stop_reason(), None);
    }

    #[test]
    fn test_fatal_error_stop_reason() {
        let mut config = Config::default();
        config.checking.threads = 1;
        config.classification.fatal = vec!["http".to_string()];
        let (consumer, _sink, _) = create_configured_consumer(config);
        consumer.add_seed("http://example.com/missing.html");

        consumer.run();

        assert!(consumer.is_aborted());
        assert_eq!(consumer.stop_reason(), Some(StopReason::FatalError));
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::Interrupted.to_string(), "interrupted");
        assert_eq!(StopReason::MaxRunTime.to_string(), "maximum run time reached");
        assert_eq!(StopReason::FatalError.to_string(), "fatal check error");
    }

    #[test]
    fn test_progress() {
        let (consumer, _sink, _) = create_test_consumer(2);
        consumer.add_seed("http://example.com/a.html");

        let progress = consumer.progress();
        assert_eq!(progress.queued, 1);
        assert_eq!(progress.checked, 0);
        assert_eq!(progress.active, 0);
    }
}
