use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration structure for linkgauge
///
/// Built once at startup, validated, then shared read-only behind an `Arc`.
/// Every section has defaults so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub checking: CheckingConfig,
    pub filtering: FilteringConfig,
    pub classification: ClassificationConfig,
    pub output: OutputConfig,
}

/// Checking behaviour: concurrency, limits and timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckingConfig {
    /// Number of worker threads; 0 checks synchronously in the calling thread
    pub threads: usize,

    /// Maximum recursion depth; negative means unlimited
    #[serde(rename = "recursion-level")]
    pub recursion_level: i32,

    /// Per-connection timeout (seconds)
    pub timeout: u64,

    /// How long shutdown waits for in-flight checks (seconds)
    #[serde(rename = "abort-timeout")]
    pub abort_timeout: u64,

    /// Download ceiling (bytes)
    #[serde(rename = "max-file-size")]
    pub max_file_size: u64,

    /// Content larger than this is not parsed for links (bytes)
    #[serde(rename = "max-parse-size")]
    pub max_parse_size: u64,

    /// Warn about content at least this large (bytes)
    #[serde(rename = "warn-size-bytes")]
    pub warn_size_bytes: Option<u64>,

    /// Stop admitting new URLs after this many
    #[serde(rename = "max-num-urls")]
    pub max_num_urls: Option<usize>,

    /// Abort the run after this many seconds
    #[serde(rename = "max-run-seconds")]
    pub max_run_seconds: Option<u64>,

    /// Minimum time between two HTTP requests to the same host (milliseconds)
    #[serde(rename = "wait-between-requests-ms")]
    pub wait_between_requests_ms: u64,

    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Honour robots.txt before recursing into HTTP content
    #[serde(rename = "robots-txt")]
    pub robots_txt: bool,

    /// Fallback news server for `news:` URLs without a host
    #[serde(rename = "nntp-server")]
    pub nntp_server: Option<String>,

    /// Log a progress line periodically
    pub status: bool,

    #[serde(rename = "status-wait-seconds")]
    pub status_wait_seconds: u64,

    /// Check that the fragment of HTML links names an anchor of the page
    pub anchors: bool,

    /// Warn when parsed content matches this regular expression
    #[serde(rename = "warning-regex")]
    pub warning_regex: Option<String>,

    /// At most this many matches of `warning-regex` are reported per page
    #[serde(rename = "warning-regex-max")]
    pub warning_regex_max: usize,
}

impl Default for CheckingConfig {
    fn default() -> Self {
        Self {
            threads: 10,
            recursion_level: -1,
            timeout: 60,
            abort_timeout: 300,
            max_file_size: 5 * 1024 * 1024,
            max_parse_size: 1024 * 1024,
            warn_size_bytes: None,
            max_num_urls: None,
            max_run_seconds: None,
            wait_between_requests_ms: 0,
            user_agent: format!("linkgauge/{}", env!("CARGO_PKG_VERSION")),
            robots_txt: true,
            nntp_server: None,
            status: false,
            status_wait_seconds: 5,
            anchors: false,
            warning_regex: None,
            warning_regex_max: 5,
        }
    }
}

impl CheckingConfig {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn abort_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.abort_timeout)
    }

    /// Returns the recursion limit, or `None` when recursion is unlimited
    pub fn recursion_limit(&self) -> Option<u32> {
        u32::try_from(self.recursion_level).ok()
    }
}

/// Which links are considered part of the checked site
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilteringConfig {
    /// Patterns marking URLs as external; the first match wins
    #[serde(rename = "extern-links")]
    pub extern_links: Vec<LinkPattern>,

    /// Patterns marking URLs as internal
    #[serde(rename = "intern-links")]
    pub intern_links: Vec<LinkPattern>,

    /// Warning tags that are dropped from records
    #[serde(rename = "ignore-warnings")]
    pub ignore_warnings: Vec<String>,

    /// Schemes reported as "ignored" instead of "unrecognized"
    #[serde(rename = "ignored-schemes")]
    pub ignored_schemes: Vec<String>,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        Self {
            extern_links: Vec::new(),
            intern_links: Vec::new(),
            ignore_warnings: Vec::new(),
            ignored_schemes: [
                "javascript", "data", "tel", "sms", "irc", "ircs", "ldap", "gopher", "ssh",
                "sftp", "rsync", "feed", "webcal", "magnet", "about", "chrome", "callto",
                "skype", "xmpp", "geo",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// A regular expression over absolute URLs
#[derive(Debug, Clone, Deserialize)]
pub struct LinkPattern {
    pub pattern: String,

    /// Match URLs that do NOT match the pattern
    #[serde(default)]
    pub negate: bool,

    /// Strict extern URLs are not checked at all
    #[serde(default)]
    pub strict: bool,
}

/// Error kind names controlling result caching and global abort
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Error kinds whose results are never cached
    #[serde(rename = "no-cache")]
    pub no_cache: Vec<String>,

    /// Error kinds that abort the whole run
    pub fatal: Vec<String>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            no_cache: vec!["timeout".to_string()],
            fatal: vec!["interrupted".to_string()],
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Log valid URLs as well as invalid ones
    pub verbose: bool,

    /// Log URLs that carry warnings
    pub warnings: bool,

    /// Disable the console sink
    pub quiet: bool,

    /// Format of the console sink
    pub console: ConsoleFormat,

    /// Additional file sinks
    pub file: Vec<FileOutput>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            warnings: true,
            quiet: false,
            console: ConsoleFormat::Text,
            file: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    Text,
    Csv,
    None,
}

impl FromStr for ConsoleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "none" => Ok(Self::None),
            other => Err(format!("unknown console format '{}'", other)),
        }
    }
}

/// A result sink writing to a file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileOutput {
    #[serde(rename = "type")]
    pub kind: SinkKind,
    pub path: String,
}

impl FromStr for FileOutput {
    type Err = String;

    /// Parses the CLI form `TYPE:PATH`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, path) = s
            .split_once(':')
            .ok_or_else(|| format!("expected TYPE:PATH, got '{}'", s))?;
        Ok(Self {
            kind: kind.parse()?,
            path: path.to_string(),
        })
    }
}

/// Kinds of file sinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Text,
    Csv,
    Sql,
    Blacklist,
    Dot,
    Gml,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Csv => "csv",
            Self::Sql => "sql",
            Self::Blacklist => "blacklist",
            Self::Dot => "dot",
            Self::Gml => "gml",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "sql" => Ok(Self::Sql),
            "blacklist" => Ok(Self::Blacklist),
            "dot" => Ok(Self::Dot),
            "gml" => Ok(Self::Gml),
            other => Err(format!("unknown output type '{}'", other)),
        }
    }
}
