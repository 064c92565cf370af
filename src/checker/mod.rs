//! Per-scheme URL checkers
//!
//! This module contains the core checking logic:
//! - `UrlRecord`: the task description and accumulated result of one check
//! - `Checker`: the capability contract each URL scheme implements
//! - `CheckerRegistry`: maps schemes to checker factories
//! - `UrlCheck`: a record bound to its checker, driven through `CheckState`
//! - Error classification deciding caching and global abort
//! - HTML and CSS link extraction

mod dns;
mod error;
mod file;
mod ftp;
mod http;
mod lifecycle;
mod mailto;
mod nntp;
mod parser;
mod record;
mod registry;
mod resolver;
mod telnet;
mod unknown;

pub use dns::DnsChecker;
pub use error::{CheckError, ErrorClass, ErrorKind, ErrorTable};
pub use file::FileChecker;
pub use ftp::FtpChecker;
pub use http::HttpChecker;
pub use lifecycle::{get_url_from, run_check, CheckOutcome, LinkSubmitter, UrlCheck};
pub use mailto::MailtoChecker;
pub use nntp::NntpChecker;
pub use parser::{
    is_parseable_type, mime_essence, parse_content, parse_css, parse_html, FoundLink, ParsedPage,
};
pub use record::{tags, CachedResult, LinkOrigin, UrlRecord, Warning, RESULT_MAX_LENGTH};
pub use registry::{CheckerFactory, CheckerRegistry};
pub use telnet::TelnetChecker;
pub use unknown::UnknownChecker;

use crate::config::Config;
use crate::robots::RobotsCache;
use crate::state::HostThrottle;
use crate::url::{absolute_url, extract_domain, normalize_url, url_without_fragment, LinkFilter};
use crate::{ConfigError, LinkError, UrlError};
use regex::Regex;
use reqwest::blocking::Client;
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Capability contract of a per-scheme checker
///
/// One checker instance is created per URL and owned by the worker that
/// checks it. Methods are called in life-cycle order:
///
/// 1. `check_syntax` (no I/O)
/// 2. `check_connection`
/// 3. `set_content_type`, `add_size_info`
/// 4. `can_get_content`, `read_content`, `is_parseable`, `parse_url`
/// 5. `close_connection` (always)
pub trait Checker: Send {
    /// Builds the absolute canonical URL and cache key
    ///
    /// The default resolves `base_url` against the base reference and the
    /// parent URL, normalizes it and uses it without fragment as cache key.
    fn check_syntax(&mut self, record: &mut UrlRecord) -> Result<(), UrlError> {
        standard_syntax(record).map(|_| ())
    }

    /// Performs the scheme-specific network access
    fn check_connection(
        &mut self,
        ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError>;

    fn set_content_type(&mut self, _record: &mut UrlRecord) {}

    fn add_size_info(&mut self, _record: &mut UrlRecord) {}

    fn can_get_content(&self) -> bool {
        false
    }

    /// Reads at most `limit` bytes of content
    ///
    /// Fails with a content error when the content is larger than `limit`.
    fn read_content(
        &mut self,
        _ctx: &CheckContext,
        _record: &mut UrlRecord,
        _limit: u64,
    ) -> Result<Vec<u8>, CheckError> {
        Err(CheckError::new(ErrorKind::Content, "no content available"))
    }

    fn is_parseable(&self, record: &UrlRecord) -> bool {
        record.content_type.as_deref().is_some_and(is_parseable_type)
    }

    /// Extracts child links from content
    fn parse_url(&self, record: &UrlRecord, content: &[u8]) -> ParsedPage {
        parse_content(record.content_type.as_deref().unwrap_or_default(), content)
    }

    /// Whether robots rules allow recursing into this URL
    fn allows_robots(&mut self, _ctx: &CheckContext, _record: &UrlRecord) -> bool {
        true
    }

    /// Releases connection resources; must be idempotent
    fn close_connection(&mut self) {}
}

/// The standard syntax check shared by URL-shaped schemes
///
/// Sets `url`, `cache_key` and `domain` on the record and returns the
/// parsed URL.
pub fn standard_syntax(record: &mut UrlRecord) -> Result<Url, UrlError> {
    let url = absolute_url(
        &record.base_url,
        record.base_ref.as_deref(),
        record.parent_url.as_deref(),
    )?;
    let url = normalize_url(url);

    record.url = Some(url.to_string());
    record.cache_key = Some(url_without_fragment(&url));
    record.domain = extract_domain(&url);
    Ok(url)
}

/// Reads a stream up to `limit` bytes
///
/// Fails when the stream holds more than `limit` bytes.
pub(crate) fn read_limited<R: Read>(reader: R, limit: u64) -> Result<Vec<u8>, CheckError> {
    let mut content = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut content)?;
    if content.len() as u64 > limit {
        return Err(CheckError::new(
            ErrorKind::Content,
            format!("File size too large (more than {} bytes)", limit),
        ));
    }
    Ok(content)
}

/// Opens a TCP connection with the configured timeout
///
/// Every resolved address is tried in turn. Resolution failures are DNS
/// errors; the last connection error is returned when no address accepts.
pub(crate) fn connect_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, CheckError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| CheckError::new(ErrorKind::Dns, format!("{}: {}", host, e)))?
        .collect();
    if addrs.is_empty() {
        return Err(CheckError::new(
            ErrorKind::Dns,
            format!("No address found for {}", host),
        ));
    }

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream.set_read_timeout(Some(timeout))?;
                stream.set_write_timeout(Some(timeout))?;
                return Ok(stream);
            }
            Err(e) => {
                tracing::trace!("Connecting to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.map_or_else(
        || CheckError::new(ErrorKind::ConnectionRefused, host.to_string()),
        CheckError::from,
    ))
}

/// Everything a check needs besides its own record
///
/// Built once per run and shared read-only by all workers.
#[derive(Debug)]
pub struct CheckContext {
    pub config: Arc<Config>,
    pub registry: CheckerRegistry,
    pub filter: LinkFilter,
    pub errors: ErrorTable,
    pub robots: RobotsCache,
    pub throttle: HostThrottle,
    /// Compiled `warning-regex`
    pub warning_regex: Option<Regex>,
    client: Client,
    aborted: Arc<AtomicBool>,
}

impl CheckContext {
    /// Creates the context for a run starting at `seeds`
    ///
    /// Seeds contribute intern patterns when none are configured.
    pub fn new(config: Arc<Config>, seeds: &[Url]) -> Result<Self, LinkError> {
        let registry = CheckerRegistry::with_defaults(&config.filtering.ignored_schemes);
        Self::with_registry(config, seeds, registry)
    }

    /// Creates the context with a custom checker registry
    pub fn with_registry(
        config: Arc<Config>,
        seeds: &[Url],
        registry: CheckerRegistry,
    ) -> Result<Self, LinkError> {
        let filter = LinkFilter::with_seeds(&config.filtering, seeds)?;
        let errors = ErrorTable::from_config(&config.classification);
        let throttle = HostThrottle::new(Duration::from_millis(
            config.checking.wait_between_requests_ms,
        ));
        let client = build_http_client(&config)?;
        let warning_regex = config
            .checking
            .warning_regex
            .as_deref()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    ConfigError::InvalidPattern(format!("warning-regex '{}': {}", pattern, e))
                })
            })
            .transpose()?;

        Ok(Self {
            config,
            registry,
            filter,
            errors,
            robots: RobotsCache::new(),
            throttle,
            warning_regex,
            client,
            aborted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The shared blocking HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Raises the global abort flag
    pub fn request_abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            tracing::debug!("Abort requested");
        }
    }

    /// The abort flag, shared with the consumer
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.aborted)
    }
}

/// Builds the blocking HTTP client used by all HTTP checks
///
/// Redirects are followed by the client; the checker compares the final
/// URL with the requested one.
fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.checking.user_agent.clone())
        .timeout(config.checking.timeout_duration())
        .connect_timeout(config.checking.timeout_duration())
        .redirect(reqwest::redirect::Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_syntax_sets_identity() {
        let mut record = UrlRecord::new(
            "b.html#top",
            1,
            LinkOrigin {
                parent_url: Some("http://Example.com/dir/a.html".to_string()),
                ..LinkOrigin::default()
            },
        );

        let url = standard_syntax(&mut record).unwrap();

        assert_eq!(url.as_str(), "http://example.com/dir/b.html#top");
        assert_eq!(record.cache_key.as_deref(), Some("http://example.com/dir/b.html"));
        assert_eq!(record.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_standard_syntax_rejects_empty_host() {
        let mut record = UrlRecord::new("http://", 0, LinkOrigin::default());
        assert!(standard_syntax(&mut record).is_err());
        assert!(record.cache_key.is_none());
    }

    #[test]
    fn test_read_limited() {
        let content = read_limited(&b"hello"[..], 5).unwrap();
        assert_eq!(content, b"hello");

        let err = read_limited(&b"hello!"[..], 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Content);
        assert!(err.message().starts_with("File size too large"));
    }

    #[test]
    fn test_context_compiles_warning_regex() {
        let mut config = Config::default();
        config.checking.warning_regex = Some("Oracle DB Error".to_string());
        let ctx = CheckContext::new(Arc::new(config), &[]).unwrap();
        assert!(ctx.warning_regex.is_some());

        let mut config = Config::default();
        config.checking.warning_regex = Some("(".to_string());
        assert!(matches!(
            CheckContext::new(Arc::new(config), &[]),
            Err(LinkError::Config(ConfigError::InvalidPattern(_)))
        ));
    }

    #[test]
    fn test_context_abort_flag() {
        let ctx = CheckContext::new(Arc::new(Config::default()), &[]).unwrap();
        assert!(!ctx.is_aborted());

        let flag = ctx.abort_flag();
        ctx.request_abort();
        assert!(flag.load(Ordering::SeqCst));
        assert!(ctx.is_aborted());
    }
}
