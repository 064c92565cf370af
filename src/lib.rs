//! linkgauge: a recursive link checker
//!
//! This crate checks a set of seed URLs and every link reachable from them,
//! dispatching each URL to a scheme-specific checker on a bounded pool of
//! worker threads and reporting every finished check exactly once through
//! pluggable result sinks.

pub mod checker;
pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod url;

use thiserror::Error;

/// Main error type for linkgauge operations
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::CheckState,
        to: state::CheckState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid link pattern: {0}")]
    InvalidPattern(String),
}

/// URL syntax errors
///
/// The display strings end up verbatim in the `result` column of invalid
/// records, so they are written for the person reading the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("URL is empty")]
    Empty,

    #[error("URL has unparsable syntax: {0}")]
    Parse(String),

    #[error("URL has empty hostname")]
    EmptyHost,

    #[error("URL has invalid port {0}")]
    InvalidPort(String),

    #[error("URL length {0} is longer than maximum of {max}", max = crate::url::URL_MAX_LENGTH)]
    TooLong(usize),

    #[error("{0}")]
    Malformed(String),
}

/// Result type alias for linkgauge operations
pub type Result<T> = std::result::Result<T, LinkError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use checker::{get_url_from, CheckContext, Checker, CheckerRegistry, UrlCheck, UrlRecord};
pub use config::Config;
pub use crawler::{Consumer, UrlCache, WorkerPool};
pub use output::{CheckStatistics, ResultSink};
pub use state::CheckState;
