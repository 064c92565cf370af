//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! The HTTP checker consults it before recursing into a page.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use reqwest::blocking::Client;
use reqwest::StatusCode;

/// Fetches robots.txt for an origin
///
/// Fetch failures never block checking:
///
/// | Response | Result |
/// |----------|--------|
/// | 2xx | parsed rules |
/// | 401, 403 | disallow all |
/// | anything else, network error | allow all |
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `origin` - `scheme://host[:port]` of the site
pub fn fetch_robots(client: &Client, origin: &str) -> ParsedRobots {
    let robots_url = format!("{}/robots.txt", origin.trim_end_matches('/'));

    let response = match client.get(&robots_url).send() {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("robots.txt fetch failed for {}: {}", robots_url, e);
            return ParsedRobots::allow_all();
        }
    };

    match response.status() {
        status if status.is_success() => match response.text() {
            Ok(body) => ParsedRobots::from_content(&body),
            Err(e) => {
                tracing::debug!("robots.txt body unreadable for {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ParsedRobots::disallow_all(),
        _ => ParsedRobots::allow_all(),
    }
}

/// Returns the product token robots.txt rules are matched against
///
/// # Examples
///
/// ```
/// use linkgauge::robots::agent_token;
///
/// assert_eq!(agent_token("linkgauge/1.0.0 (+https://example.com)"), "linkgauge");
/// ```
pub fn agent_token(user_agent: &str) -> &str {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .filter(|token| !token.is_empty())
        .unwrap_or(user_agent)
}
