//! URL handling module for linkgauge
//!
//! This module provides absolute-URL construction for links found in
//! documents, normalization, host helpers and the extern/intern link filter.

mod domain;
mod matcher;
mod normalize;

// Re-export main functions
pub use domain::{extract_domain, host_and_port, origin_key};
pub use matcher::{CompiledPattern, LinkFilter, LinkScope};
pub use normalize::{
    absolute_url, file_url_from_path, normalize_url, percent_decode, seed_url,
    url_without_fragment,
};

/// URLs longer than this are invalid
pub const URL_MAX_LENGTH: usize = 2047;

/// URLs longer than this get a `url-too-long` warning
pub const URL_WARN_LENGTH: usize = 255;

/// Returns the lowercase scheme of a link, if it has a syntactically valid one
///
/// Single-letter schemes are treated as Windows drive letters, not schemes.
///
/// # Examples
///
/// ```
/// use linkgauge::url::scheme_of;
///
/// assert_eq!(scheme_of("HTTP://example.com"), Some("http".to_string()));
/// assert_eq!(scheme_of("mailto:a@b.org"), Some("mailto".to_string()));
/// assert_eq!(scheme_of("../page.html"), None);
/// assert_eq!(scheme_of("c:/autoexec.bat"), None);
/// ```
pub fn scheme_of(link: &str) -> Option<String> {
    let link = link.trim_start();
    let (scheme, _) = link.split_once(':')?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if scheme.len() < 2 || !first.is_ascii_alphabetic() {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}
