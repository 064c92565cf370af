//! Check errors and their classification
//!
//! Every failure inside a checker is a [`CheckError`] carrying an
//! [`ErrorKind`]. The [`ErrorTable`] maps kinds to how the consumer treats
//! the failed record: whether its result is cached for later duplicates and
//! whether it aborts the whole run. The table is built from configuration,
//! so e.g. connection resets can be made non-cacheable without code changes.

use crate::config::ClassificationConfig;
use std::collections::HashSet;
use std::fmt;
use std::io;
use thiserror::Error;

/// Kinds of check failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Dns,
    ConnectionRefused,
    ConnectionReset,
    Timeout,
    Http,
    Tls,
    Protocol,
    Io,
    Content,
    Interrupted,
    Internal,
}

impl ErrorKind {
    /// Configuration name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Dns => "dns",
            Self::ConnectionRefused => "connection-refused",
            Self::ConnectionReset => "connection-reset",
            Self::Timeout => "timeout",
            Self::Http => "http",
            Self::Tls => "tls",
            Self::Protocol => "protocol",
            Self::Io => "io",
            Self::Content => "content",
            Self::Interrupted => "interrupted",
            Self::Internal => "internal",
        }
    }

    /// Parses a configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|kind| kind.name() == name.trim().to_ascii_lowercase())
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Syntax,
            Self::Dns,
            Self::ConnectionRefused,
            Self::ConnectionReset,
            Self::Timeout,
            Self::Http,
            Self::Tls,
            Self::Protocol,
            Self::Io,
            Self::Content,
            Self::Interrupted,
            Self::Internal,
        ]
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Syntax => "Syntax error",
            Self::Dns => "DNS error",
            Self::ConnectionRefused => "Connection refused",
            Self::ConnectionReset => "Connection reset",
            Self::Timeout => "Timeout",
            Self::Http => "HTTP error",
            Self::Tls => "TLS error",
            Self::Protocol => "Protocol error",
            Self::Io => "I/O error",
            Self::Content => "Content error",
            Self::Interrupted => "Interrupted",
            Self::Internal => "Internal error",
        };
        f.write_str(label)
    }
}

/// A failed check step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CheckError {
    kind: ErrorKind,
    message: String,
}

impl CheckError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CheckError {
    /// HTTP errors read as the status line (`404 Not Found`), everything
    /// else as `<kind>: <message>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Http => f.write_str(&self.message),
            kind => write!(f, "{}: {}", kind, self.message),
        }
    }
}

impl From<io::Error> for CheckError {
    fn from(error: io::Error) -> Self {
        let kind = match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ErrorKind::ConnectionReset,
            _ => ErrorKind::Io,
        };
        Self::new(kind, error.to_string())
    }
}

impl From<reqwest::Error> for CheckError {
    fn from(error: reqwest::Error) -> Self {
        let detail = error_chain_text(&error);
        let kind = categorize_reqwest_error(&error, &detail);
        Self::new(kind, detail)
    }
}

/// Categorizes a `reqwest::Error`
///
/// `detail` is the flattened source chain; hyper reports DNS and TLS
/// failures only through their messages.
fn categorize_reqwest_error(error: &reqwest::Error, detail: &str) -> ErrorKind {
    let lower = detail.to_lowercase();

    if let Some(status) = error.status() {
        if status.is_client_error() || status.is_server_error() {
            return ErrorKind::Http;
        }
    }

    if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_redirect() {
        ErrorKind::Protocol
    } else if lower.contains("dns error") || lower.contains("failed to lookup address") {
        ErrorKind::Dns
    } else if lower.contains("certificate") || lower.contains("tls") {
        ErrorKind::Tls
    } else if error.is_connect() {
        if lower.contains("connection reset") {
            ErrorKind::ConnectionReset
        } else {
            ErrorKind::ConnectionRefused
        }
    } else if error.is_body() || error.is_decode() {
        ErrorKind::Content
    } else if lower.contains("connection reset") || lower.contains("connection closed") {
        ErrorKind::ConnectionReset
    } else {
        ErrorKind::Protocol
    }
}

/// Joins an error and all of its sources into one line
fn error_chain_text(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        let inner_text = inner.to_string();
        if !text.contains(&inner_text) {
            text.push_str(": ");
            text.push_str(&inner_text);
        }
        source = inner.source();
    }
    text
}

/// How the consumer treats a failed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorClass {
    /// The result is stored and reused for later duplicates
    pub cacheable: bool,

    /// The failure aborts the whole run
    pub fatal: bool,

    /// The failure is a checker bug rather than a broken link
    pub internal: bool,
}

/// Data-driven error classification
#[derive(Debug, Clone)]
pub struct ErrorTable {
    no_cache: HashSet<ErrorKind>,
    fatal: HashSet<ErrorKind>,
}

impl ErrorTable {
    /// Builds the table from configuration
    ///
    /// Unknown names are skipped; configuration validation rejects them
    /// before a table is ever built.
    pub fn from_config(config: &ClassificationConfig) -> Self {
        let kinds = |names: &[String]| {
            names
                .iter()
                .filter_map(|name| {
                    let kind = ErrorKind::from_name(name);
                    if kind.is_none() {
                        tracing::warn!("Ignoring unknown error kind '{}'", name);
                    }
                    kind
                })
                .collect::<HashSet<_>>()
        };

        Self {
            no_cache: kinds(&config.no_cache),
            fatal: kinds(&config.fatal),
        }
    }

    /// Looks up the treatment of an error kind
    ///
    /// Internal errors are never cached so that their keys are released.
    pub fn classify(&self, kind: ErrorKind) -> ErrorClass {
        let internal = kind == ErrorKind::Internal;
        ErrorClass {
            cacheable: !internal && !self.no_cache.contains(&kind),
            fatal: self.fatal.contains(&kind),
            internal,
        }
    }
}

impl Default for ErrorTable {
    fn default() -> Self {
        Self::from_config(&ClassificationConfig::default())
    }
}
