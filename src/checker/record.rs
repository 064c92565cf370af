//! The result record of one URL check
//!
//! A `UrlRecord` is created when a link is found, filled in by exactly one
//! worker during its check, and handed to the sinks once. Sinks only ever
//! see `&UrlRecord`.

use crate::url::LinkScope;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Maximum length of a result message
pub const RESULT_MAX_LENGTH: usize = 240;

/// Warning tags, usable in `ignore-warnings`
pub mod tags {
    pub const URL_EFFECTIVE_URL: &str = "url-effective-url";
    pub const URL_ERROR_GETTING_CONTENT: &str = "url-error-getting-content";
    pub const URL_CONTENT_TOO_LARGE: &str = "url-content-too-large";
    pub const URL_CONTENT_SIZE_ZERO: &str = "url-content-size-zero";
    pub const URL_TOO_LONG: &str = "url-too-long";
    pub const URL_WHITESPACE: &str = "url-whitespace";
    pub const URL_ANCHOR_NOT_FOUND: &str = "url-anchor-not-found";
    pub const URL_WARNREGEX_FOUND: &str = "url-warnregex-found";
    pub const HTTP_ROBOTS_DENIED: &str = "http-robots-denied";
    pub const HTTP_EMPTY_CONTENT: &str = "http-empty-content";
    pub const FILE_MISSING_SLASH: &str = "file-missing-slash";
    pub const MAIL_NO_MX_HOST: &str = "mail-no-mx-host";
    pub const NNTP_NO_SERVER: &str = "nntp-no-server";
    pub const NNTP_NO_NEWSGROUP: &str = "nntp-no-newsgroup";
    pub const IGNORE_URL: &str = "ignore-url";
}

/// A tagged warning attached to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub tag: String,
    pub message: String,
}

/// Where a link was found
#[derive(Debug, Clone, Default)]
pub struct LinkOrigin {
    /// URL of the document containing the link
    pub parent_url: Option<String>,

    /// Explicit base of the containing document (`<base href>`)
    pub base_ref: Option<String>,

    pub line: usize,
    pub column: usize,

    /// Page number, for paged documents
    pub page: usize,

    /// Link text or other human-readable name
    pub name: String,
}

/// Description of one URL check task and its accumulated result
#[derive(Debug, Clone)]
pub struct UrlRecord {
    // ===== Task inputs =====
    /// The link as found in the document
    pub base_url: String,
    pub parent_url: Option<String>,
    pub base_ref: Option<String>,
    pub recursion_level: u32,
    pub line: usize,
    pub column: usize,
    pub page: usize,
    pub name: String,
    pub scope: LinkScope,

    // ===== Set by the syntax check =====
    /// Absolute, canonical URL
    pub url: Option<String>,
    pub cache_key: Option<String>,
    pub domain: Option<String>,

    // ===== Result =====
    pub valid: bool,
    pub result: String,
    pub warnings: Vec<Warning>,
    pub info: Vec<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
    pub checktime: Duration,
    pub dltime: Option<Duration>,

    /// Result was copied from an earlier check of the same cache key
    pub cached: bool,

    /// Result may be stored for deduplication
    pub caching: bool,

    has_result: bool,
}

impl UrlRecord {
    /// Creates a record for a link found at `origin`
    pub fn new(base_url: &str, recursion_level: u32, origin: LinkOrigin) -> Self {
        Self {
            base_url: base_url.to_string(),
            parent_url: origin.parent_url,
            base_ref: origin.base_ref,
            recursion_level,
            line: origin.line,
            column: origin.column,
            page: origin.page,
            name: origin.name,
            scope: LinkScope::default(),
            url: None,
            cache_key: None,
            domain: None,
            valid: true,
            result: String::new(),
            warnings: Vec::new(),
            info: Vec::new(),
            title: None,
            content_type: None,
            size: None,
            modified: None,
            checktime: Duration::ZERO,
            dltime: None,
            cached: false,
            caching: true,
            has_result: false,
        }
    }

    /// Sets the result message and validity
    ///
    /// The first result wins; a second call is ignored and logged.
    pub fn set_result(&mut self, message: impl Into<String>, valid: bool) {
        let message = message.into();
        if self.has_result {
            tracing::warn!(
                "Double result {:?} (previous {:?}) for {}",
                message,
                self.result,
                self.display_url()
            );
            return;
        }
        self.has_result = true;
        self.result = truncate_result(message);
        self.valid = valid;
    }

    /// Replaces any earlier result with an internal error
    ///
    /// Internal errors are never cached.
    pub fn set_internal_error(&mut self, error: impl fmt::Display) {
        self.has_result = true;
        self.result = truncate_result(format!("Internal error: {}", error));
        self.valid = false;
        self.caching = false;
    }

    /// Whether a result has been set
    pub fn has_result(&self) -> bool {
        self.has_result
    }

    pub fn add_warning(&mut self, tag: &str, message: impl Into<String>) {
        let warning = Warning {
            tag: tag.to_string(),
            message: message.into(),
        };
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn add_info(&mut self, info: impl Into<String>) {
        let info = info.into();
        if !self.info.contains(&info) {
            self.info.push(info);
        }
    }

    /// Removes warnings whose tag is in `ignored`
    pub fn drop_ignored_warnings(&mut self, ignored: &[String]) {
        if !ignored.is_empty() {
            self.warnings.retain(|w| !ignored.contains(&w.tag));
        }
    }

    /// The URL for display: the canonical URL if known, else the link text
    pub fn display_url(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.base_url)
    }

    /// Summary of the result kept for later duplicates
    pub fn to_cached(&self) -> CachedResult {
        CachedResult {
            url: self.url.clone(),
            valid: self.valid,
            result: self.result.clone(),
            warnings: self.warnings.clone(),
            info: self.info.clone(),
            title: self.title.clone(),
            content_type: self.content_type.clone(),
            size: self.size,
            modified: self.modified,
        }
    }

    /// Fills this record's result from an earlier check of the same key
    ///
    /// Warnings and info the duplicate collected itself, such as syntax
    /// warnings about how the link was written, come first.
    pub fn copy_from_cache(&mut self, cached: &CachedResult) {
        self.valid = cached.valid;
        self.result = cached.result.clone();
        self.has_result = true;
        for warning in &cached.warnings {
            self.add_warning(&warning.tag, warning.message.clone());
        }
        for info in &cached.info {
            self.add_info(info.clone());
        }
        if self.title.is_none() {
            self.title = cached.title.clone();
        }
        self.content_type = cached.content_type.clone();
        self.size = cached.size;
        self.modified = cached.modified;
        self.checktime = Duration::ZERO;
        self.dltime = None;
        self.cached = true;
    }
}

/// Lightweight copy of a finished record, stored per cache key
#[derive(Debug, Clone)]
pub struct CachedResult {
    pub url: Option<String>,
    pub valid: bool,
    pub result: String,
    pub warnings: Vec<Warning>,
    pub info: Vec<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    pub modified: Option<DateTime<Utc>>,
}

/// Truncates a result message to [`RESULT_MAX_LENGTH`] characters
fn truncate_result(message: String) -> String {
    match message.char_indices().nth(RESULT_MAX_LENGTH) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message,
    }
}
