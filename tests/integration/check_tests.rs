//! Integration tests for complete checking runs
//!
//! Scripted checkers registered through the registry drive the consumer
//! core; wiremock servers and temporary directories exercise the built-in
//! HTTP and file checkers end-to-end.

use linkgauge::checker::{
    get_url_from, tags, CheckContext, CheckError, Checker, CheckerRegistry, ErrorKind, LinkOrigin,
    UrlRecord,
};
use linkgauge::config::{load_config_with_hash, Config, ConsoleFormat, SinkKind};
use linkgauge::crawler::{Consumer, StopReason};
use linkgauge::output::{
    create_sink, CheckStatistics, OutputResult, ResultSink,
};
use linkgauge::url::seed_url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Sink collecting every logged record
#[derive(Clone, Default)]
struct MemorySink {
    records: Arc<Mutex<Vec<UrlRecord>>>,
    ended: Arc<AtomicUsize>,
}

impl MemorySink {
    fn records(&self) -> Vec<UrlRecord> {
        self.records.lock().unwrap().clone()
    }

    fn by_key(&self, key: &str) -> Vec<UrlRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.cache_key.as_deref() == Some(key))
            .collect()
    }

    /// Order-independent summary of the run: (cache key, valid, cached)
    fn summary(&self) -> Vec<(String, bool, bool)> {
        let mut rows: Vec<_> = self
            .records()
            .into_iter()
            .map(|r| (r.cache_key.unwrap_or(r.base_url), r.valid, r.cached))
            .collect();
        rows.sort();
        rows
    }
}

impl ResultSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn log_filter_url(&mut self, record: &UrlRecord, _do_print: bool) -> OutputResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn end_output(&mut self, _stats: &CheckStatistics) -> OutputResult<()> {
        self.ended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What the scripted checker does for one URL
#[derive(Clone)]
enum Script {
    Page(&'static str),
    Fail(ErrorKind),
    /// Fails with the first kind on the first attempt, then serves the page
    FailOnce(ErrorKind, &'static str),
    /// Blocks until the release flag is raised
    Hang,
    Sleep(Duration),
    /// Panics on the first attempt, then serves the page
    PanicOnce(&'static str),
}

/// Shared state of all scripted checker instances of a test
#[derive(Default)]
struct Site {
    scripts: HashMap<String, Script>,
    connections: Mutex<HashMap<String, usize>>,
    release: AtomicBool,
}

impl Site {
    fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts
                .iter()
                .map(|(url, script)| (url.to_string(), script.clone()))
                .collect(),
            ..Self::default()
        })
    }

    fn connections(&self, url: &str) -> usize {
        self.connections.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_connections(&self) -> usize {
        self.connections.lock().unwrap().values().sum()
    }
}

struct ScriptedChecker {
    site: Arc<Site>,
    body: Option<&'static str>,
}

impl Checker for ScriptedChecker {
    fn check_connection(
        &mut self,
        _ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        let url = record.url.clone().unwrap_or_default();
        let attempt = {
            let mut connections = self.site.connections.lock().unwrap();
            let count = connections.entry(url.clone()).or_insert(0);
            *count += 1;
            *count
        };

        match self.site.scripts.get(&url) {
            Some(Script::Page(body)) => self.body = Some(body),
            Some(Script::Fail(kind)) => return Err(CheckError::new(*kind, "scripted failure")),
            Some(Script::FailOnce(kind, body)) => {
                if attempt == 1 {
                    return Err(CheckError::new(*kind, "scripted failure"));
                }
                self.body = Some(body);
            }
            Some(Script::Hang) => {
                let deadline = Instant::now() + Duration::from_secs(20);
                while !self.site.release.load(Ordering::SeqCst) && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(10));
                }
            }
            Some(Script::Sleep(duration)) => thread::sleep(*duration),
            Some(Script::PanicOnce(body)) => {
                if attempt == 1 {
                    panic!("checker bug on {}", url);
                }
                self.body = Some(body);
            }
            None => return Err(CheckError::new(ErrorKind::Http, "404 Not Found")),
        }
        record.set_result("200 OK", true);
        Ok(())
    }

    fn set_content_type(&mut self, record: &mut UrlRecord) {
        if self.body.is_some() {
            record.content_type = Some("text/html".to_string());
        }
    }

    fn can_get_content(&self) -> bool {
        self.body.is_some()
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

/// Creates a test configuration with the given worker count
fn create_test_config(threads: usize) -> Config {
    let mut config = Config::default();
    config.checking.threads = threads;
    config.checking.recursion_level = 5;
    config.checking.robots_txt = false;
    config.output.console = ConsoleFormat::None;
    config
}

/// Builds a consumer whose `http` checks are scripted by `site`
fn scripted_consumer(config: Config, seeds: &[&str], site: &Arc<Site>) -> (Consumer, MemorySink) {
    let mut registry = CheckerRegistry::with_defaults(&config.filtering.ignored_schemes);
    let shared = Arc::clone(site);
    registry.register_fn("http", move || {
        Box::new(ScriptedChecker {
            site: Arc::clone(&shared),
            body: None,
        })
    });

    let seed_urls: Vec<Url> = seeds.iter().filter_map(|s| Url::parse(s).ok()).collect();
    let ctx = CheckContext::with_registry(Arc::new(config), &seed_urls, registry).unwrap();
    let sink = MemorySink::default();
    let consumer = Consumer::new(ctx, vec![Box::new(sink.clone())]).unwrap();
    for seed in seeds {
        consumer.add_seed(seed);
    }
    (consumer, sink)
}

fn two_page_site() -> Arc<Site> {
    Site::new(&[
        (
            "http://localhost/a.html",
            Script::Page(r#"<a href="b.html">B</a> <a href="a.html">A</a>"#),
        ),
        (
            "http://localhost/b.html",
            Script::Page(r#"<a href="a.html">A</a> <a href="gone.html">gone</a>"#),
        ),
    ])
}

#[test]
fn test_cyclic_pages_logged_once_each() {
    let site = two_page_site();
    let (consumer, sink) = scripted_consumer(create_test_config(4), &["http://localhost/a.html"], &site);

    let stats = consumer.run();

    let a = sink.by_key("http://localhost/a.html");
    assert_eq!(a.iter().filter(|r| !r.cached).count(), 1);
    assert!(a.iter().filter(|r| r.cached).all(|r| r.valid));
    assert_eq!(sink.by_key("http://localhost/b.html").len(), 1);
    assert_eq!(site.connections("http://localhost/a.html"), 1);
    assert_eq!(site.connections("http://localhost/b.html"), 1);
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.exit_code(), 1);
    assert_eq!(sink.ended.load(Ordering::SeqCst), 1);
}

#[test]
fn test_malformed_seed_fails_without_network() {
    let site = two_page_site();
    let (consumer, sink) = scripted_consumer(create_test_config(4), &["http://"], &site);

    let stats = consumer.run();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].valid);
    assert!(!records[0].result.is_empty());
    assert_eq!(site.total_connections(), 0);
    assert_eq!(stats.errors, 1);
}

#[test]
fn test_synchronous_run_matches_threaded_run() {
    let sync_site = two_page_site();
    let (sync_consumer, sync_sink) =
        scripted_consumer(create_test_config(0), &["http://localhost/a.html"], &sync_site);
    let threaded_site = two_page_site();
    let (threaded_consumer, threaded_sink) =
        scripted_consumer(create_test_config(10), &["http://localhost/a.html"], &threaded_site);

    let sync_stats = sync_consumer.run();
    let threaded_stats = threaded_consumer.run();

    assert_eq!(sync_sink.summary(), threaded_sink.summary());
    assert_eq!(sync_stats.number, threaded_stats.number);
    assert_eq!(sync_stats.errors, threaded_stats.errors);
    assert_eq!(sync_site.total_connections(), threaded_site.total_connections());
}

#[test]
fn test_abort_returns_within_abort_timeout() {
    let site = Site::new(&[
        ("http://localhost/1", Script::Hang),
        ("http://localhost/2", Script::Hang),
        ("http://localhost/3", Script::Hang),
    ]);
    let mut config = create_test_config(3);
    config.checking.abort_timeout = 2;
    let (consumer, sink) = scripted_consumer(
        config,
        &["http://localhost/1", "http://localhost/2", "http://localhost/3"],
        &site,
    );

    let aborter = consumer.clone();
    let watcher = thread::spawn(move || {
        while aborter.pool().active_threads() < 3 {
            thread::sleep(Duration::from_millis(10));
        }
        aborter.abort();
        Instant::now()
    });

    let stats = consumer.run();
    let returned = Instant::now();
    let aborted_at = watcher.join().unwrap();
    site.release.store(true, Ordering::SeqCst);

    let waited = returned.duration_since(aborted_at);
    assert!(waited >= Duration::from_millis(1500), "returned after {:?}", waited);
    assert!(waited < Duration::from_secs(5), "returned after {:?}", waited);
    assert!(consumer.is_aborted());
    assert_eq!(sink.ended.load(Ordering::SeqCst), 1);
    assert_eq!(stats.number, 0);
}

#[test]
fn test_max_run_time_stops_hung_run() {
    let site = Site::new(&[
        ("http://localhost/1", Script::Hang),
        ("http://localhost/2", Script::Hang),
    ]);
    let mut config = create_test_config(2);
    config.checking.max_run_seconds = Some(1);
    config.checking.abort_timeout = 1;
    let started = Instant::now();
    let (consumer, sink) =
        scripted_consumer(config, &["http://localhost/1", "http://localhost/2"], &site);

    let stats = consumer.run();
    let elapsed = started.elapsed();
    site.release.store(true, Ordering::SeqCst);

    assert!(elapsed >= Duration::from_millis(900), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(6), "returned after {:?}", elapsed);
    assert!(consumer.is_aborted());
    assert_eq!(consumer.stop_reason(), Some(StopReason::MaxRunTime));
    assert_eq!(sink.ended.load(Ordering::SeqCst), 1);
    assert_eq!(stats.number, 0);
}

#[test]
fn test_panicking_checker_is_logged_and_released() {
    let site = Site::new(&[("http://localhost/boom.html", Script::PanicOnce("<p>ok</p>"))]);
    let (consumer, sink) = scripted_consumer(
        create_test_config(2),
        &["http://localhost/boom.html", "http://localhost/boom.html"],
        &site,
    );

    let stats = consumer.run();

    let records = sink.by_key("http://localhost/boom.html");
    assert_eq!(records.len(), 2);
    let failed: Vec<_> = records.iter().filter(|r| !r.valid).collect();
    assert_eq!(failed.len(), 1);
    assert!(
        failed[0].result.starts_with("Internal error: checker bug on"),
        "{}",
        failed[0].result
    );
    assert!(!failed[0].caching);

    // The parked duplicate was checked again rather than copied
    let retried: Vec<_> = records.iter().filter(|r| r.valid).collect();
    assert_eq!(retried.len(), 1);
    assert!(!retried[0].cached);
    assert_eq!(site.connections("http://localhost/boom.html"), 2);

    assert_eq!(stats.internal_errors, 1);
    assert_eq!(stats.exit_code(), 2);
    assert_eq!(consumer.cache().in_progress_len(), 0);
    assert!(!consumer.is_aborted());
    assert_eq!(consumer.stop_reason(), None);
}

#[test]
fn test_concurrent_producers_check_each_key_once() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 50;

    let site = Site::new(&[
        ("http://localhost/slow", Script::Sleep(Duration::from_secs(1))),
        ("http://localhost/shared", Script::Page("")),
    ]);
    let (consumer, sink) = scripted_consumer(create_test_config(4), &["http://localhost/slow"], &site);

    let runner = {
        let consumer = consumer.clone();
        thread::spawn(move || consumer.run())
    };
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let consumer = consumer.clone();
            thread::spawn(move || {
                for _ in 0..PER_PRODUCER {
                    let check = get_url_from(
                        "http://localhost/shared",
                        0,
                        consumer.context(),
                        LinkOrigin::default(),
                        None,
                    );
                    consumer.append_url(check);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    let stats = runner.join().unwrap();

    let shared = sink.by_key("http://localhost/shared");
    assert_eq!(site.connections("http://localhost/shared"), 1);
    assert_eq!(shared.len(), PRODUCERS * PER_PRODUCER);
    assert_eq!(shared.iter().filter(|r| !r.cached).count(), 1);
    assert_eq!(stats.cached as usize, PRODUCERS * PER_PRODUCER - 1);
    assert_eq!(consumer.cache().parked_len(), 0);
    assert_eq!(consumer.cache().in_progress_len(), 0);
}

#[test]
fn test_timeout_is_retried_for_duplicates() {
    let site = Site::new(&[(
        "http://localhost/flaky",
        Script::FailOnce(ErrorKind::Timeout, ""),
    )]);
    let (consumer, sink) = scripted_consumer(
        create_test_config(2),
        &["http://localhost/flaky", "http://localhost/flaky"],
        &site,
    );

    let stats = consumer.run();

    let records = sink.by_key("http://localhost/flaky");
    assert_eq!(site.connections("http://localhost/flaky"), 2);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.cached));
    assert_eq!(records.iter().filter(|r| r.valid).count(), 1);
    assert_eq!(stats.errors, 1);
}

#[test]
fn test_cacheable_failure_is_shared() {
    let site = Site::new(&[("http://localhost/nxdomain", Script::Fail(ErrorKind::Dns))]);
    let (consumer, sink) = scripted_consumer(
        create_test_config(2),
        &["http://localhost/nxdomain", "http://localhost/nxdomain"],
        &site,
    );

    let stats = consumer.run();

    let records = sink.by_key("http://localhost/nxdomain");
    assert_eq!(site.connections("http://localhost/nxdomain"), 1);
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.valid));
    assert_eq!(records.iter().filter(|r| r.cached).count(), 1);
    assert_eq!(stats.errors, 2);
}

#[test]
fn test_max_num_urls_limits_admission() {
    let site = two_page_site();
    let mut config = create_test_config(2);
    config.checking.max_num_urls = Some(2);
    let (consumer, sink) = scripted_consumer(config, &["http://localhost/a.html"], &site);

    consumer.run();

    let checked: Vec<_> = sink.records().into_iter().filter(|r| !r.cached).collect();
    assert_eq!(checked.len(), 2);
    assert_eq!(site.connections("http://localhost/gone.html"), 0);
}

#[test]
fn test_http_site_against_mock_server() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let server = rt.block_on(MockServer::start());
    let base = server.uri();

    rt.block_on(async {
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        r#"<html><head><title>Home</title></head><body>
                        <a href="/page1">Page 1</a>
                        <a href="/missing">Missing</a>
                        <a href="/old">Old</a>
                        <a href="/private">Private</a>
                        </body></html>"#,
                    )
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/page1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<html><body><a href="/">Home</a></body></html>"#)
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/page1"))
            .mount(&server)
            .await;
    });

    let mut config = create_test_config(4);
    config.checking.robots_txt = true;
    config.checking.timeout = 10;
    let seed = Url::parse(&format!("{}/", base)).unwrap();
    let ctx = CheckContext::new(Arc::new(config), &[seed.clone()]).unwrap();
    let sink = MemorySink::default();
    let consumer = Consumer::new(ctx, vec![Box::new(sink.clone())]).unwrap();
    consumer.add_seed(seed.as_str());

    let stats = consumer.run();

    let home = sink.by_key(&format!("{}/", base));
    assert_eq!(home[0].title.as_deref(), Some("Home"));
    assert!(home.iter().all(|r| r.valid));

    let missing = sink.by_key(&format!("{}/missing", base));
    assert_eq!(missing.len(), 1);
    assert!(!missing[0].valid);
    assert!(missing[0].result.contains("404"));

    let old = sink.by_key(&format!("{}/old", base));
    assert!(old[0].valid);
    assert!(old[0].warnings.iter().any(|w| w.tag == tags::URL_EFFECTIVE_URL));

    let private = sink.by_key(&format!("{}/private", base));
    assert!(private[0].valid);
    assert!(private[0]
        .warnings
        .iter()
        .any(|w| w.tag == tags::HTTP_ROBOTS_DENIED));

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.exit_code(), 1);
}

#[test]
fn test_file_tree_and_blacklist_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("index.html"),
        r#"<html><head><title>Index</title></head><body>
        <a href="page.html">page</a>
        <a href="missing.html">missing</a>
        </body></html>"#,
    )
    .unwrap();
    std::fs::write(
        dir.path().join("page.html"),
        r#"<html><body><a href="index.html">back</a></body></html>"#,
    )
    .unwrap();
    let blacklist = dir.path().join("blacklist");
    let seed = seed_url(&dir.path().join("index.html").display().to_string()).unwrap();

    let run = || {
        let config = Arc::new(create_test_config(2));
        let ctx = CheckContext::new(Arc::clone(&config), &[seed.clone()]).unwrap();
        let sink = MemorySink::default();
        let sinks: Vec<Box<dyn ResultSink>> = vec![
            Box::new(sink.clone()),
            create_sink(SinkKind::Blacklist, &blacklist).unwrap(),
        ];
        let consumer = Consumer::new(ctx, sinks).unwrap();
        consumer.add_seed(seed.as_str());
        (consumer.run(), sink)
    };

    let (stats, sink) = run();
    let missing: Vec<_> = sink
        .records()
        .into_iter()
        .filter(|r| r.base_url == "missing.html")
        .collect();
    assert_eq!(missing.len(), 1);
    assert!(!missing[0].valid);
    assert!(missing[0].result.contains("file not found"));
    assert_eq!(stats.errors, 1);

    let contents = std::fs::read_to_string(&blacklist).unwrap();
    assert_eq!(contents.lines().count(), 1);
    assert!(contents.starts_with("1 file://"));
    assert!(contents.trim_end().ends_with("missing.html"));

    run();
    let contents = std::fs::read_to_string(&blacklist).unwrap();
    assert!(contents.starts_with("2 file://"));

    std::fs::write(dir.path().join("missing.html"), "<html></html>").unwrap();
    let (stats, _) = run();
    assert_eq!(stats.errors, 0);
    assert_eq!(std::fs::read_to_string(&blacklist).unwrap().trim(), "");
}

#[test]
fn test_config_file_loaded_with_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("linkgauge.toml");
    std::fs::write(
        &path,
        r#"
[checking]
threads = 3
recursion-level = 2
abort-timeout = 7

[filtering]
ignore-warnings = ["url-too-long"]

[[filtering.extern-links]]
pattern = "^https?://ads\\."
strict = true

[classification]
no-cache = ["timeout", "connection-reset"]

[output]
verbose = true

[[output.file]]
type = "csv"
path = "out.csv"
"#,
    )
    .unwrap();

    let (config, hash) = load_config_with_hash(&path).unwrap();

    assert_eq!(config.checking.threads, 3);
    assert_eq!(config.checking.recursion_limit(), Some(2));
    assert_eq!(config.checking.abort_timeout_duration(), Duration::from_secs(7));
    assert!(config.filtering.extern_links[0].strict);
    assert_eq!(config.classification.no_cache.len(), 2);
    assert!(config.output.verbose);
    assert_eq!(config.output.file[0].kind, SinkKind::Csv);
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
}
