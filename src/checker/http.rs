//! HTTP and HTTPS checking
//!
//! A check is one GET through the shared blocking client, after the
//! per-host delay and the robots.txt rules of the origin allow it. The
//! response is kept open so that content is only downloaded when the page
//! will be parsed.

use crate::checker::record::tags;
use crate::checker::{
    mime_essence, parse_content, read_limited, CheckContext, CheckError, Checker, ErrorKind,
    ParsedPage, UrlRecord,
};
use crate::robots::{agent_token, fetch_robots};
use crate::url::origin_key;
use chrono::{DateTime, Utc};
use reqwest::blocking::Response;
use reqwest::header::{CONTENT_TYPE, LAST_MODIFIED};
use std::time::Duration;
use url::Url;

/// Checks `http:` and `https:` URLs
#[derive(Debug, Default)]
pub struct HttpChecker {
    response: Option<Response>,
    final_url: Option<Url>,
    robots_denied: bool,
}

impl HttpChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consults robots.txt for the URL's origin
    fn robots_verdict(ctx: &CheckContext, url: &Url) -> RobotsVerdict {
        if !ctx.config.checking.robots_txt {
            return RobotsVerdict::Allowed(None);
        }
        let Some(origin) = origin_key(url) else {
            return RobotsVerdict::Allowed(None);
        };

        let agent = agent_token(&ctx.config.checking.user_agent);
        let robots = ctx
            .robots
            .get_or_fetch(&origin, || fetch_robots(ctx.client(), &origin));
        if robots.is_allowed(url.as_str(), agent) {
            RobotsVerdict::Allowed(robots.crawl_delay(agent))
        } else {
            RobotsVerdict::Denied
        }
    }
}

enum RobotsVerdict {
    /// Allowed, with the crawl delay if any
    Allowed(Option<Duration>),
    Denied,
}

impl Checker for HttpChecker {
    fn check_connection(
        &mut self,
        ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        let url = record
            .url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .ok_or_else(|| CheckError::new(ErrorKind::Internal, "syntax check left no URL"))?;

        let crawl_delay = match Self::robots_verdict(ctx, &url) {
            RobotsVerdict::Allowed(delay) => delay,
            RobotsVerdict::Denied => {
                self.robots_denied = true;
                record.add_warning(
                    tags::HTTP_ROBOTS_DENIED,
                    "Access denied by robots.txt, checked only syntax.",
                );
                record.set_result("syntax OK", true);
                return Ok(());
            }
        };

        if let Some(host) = record.domain.as_deref() {
            ctx.throttle.wait_turn(host, crawl_delay);
        }

        tracing::debug!("GET {}", url);
        let response = ctx.client().get(url.clone()).send()?;
        let status = response.status();
        let status_line = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or_default()
        )
        .trim()
        .to_string();

        let mut requested = url.clone();
        requested.set_fragment(None);
        if response.url() != &requested {
            let effective = response.url().clone();
            record.add_info(format!("Redirected to `{}`.", effective));
            record.add_warning(
                tags::URL_EFFECTIVE_URL,
                format!("The effective URL is different from the original: {}", effective),
            );
            self.final_url = Some(effective);
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(CheckError::new(ErrorKind::Http, status_line));
        }

        record.set_result(status_line, true);
        self.response = Some(response);
        Ok(())
    }

    fn set_content_type(&mut self, record: &mut UrlRecord) {
        record.content_type = self
            .response
            .as_ref()
            .and_then(|r| r.headers().get(CONTENT_TYPE))
            .and_then(|value| value.to_str().ok())
            .map(mime_essence)
            .filter(|essence| !essence.is_empty());
    }

    fn add_size_info(&mut self, record: &mut UrlRecord) {
        let Some(response) = self.response.as_ref() else {
            return;
        };

        if let Some(length) = response.content_length() {
            record.size = Some(length);
            if length == 0 {
                record.add_warning(tags::HTTP_EMPTY_CONTENT, "Missing or empty content.");
            }
        }

        record.modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|date| date.with_timezone(&Utc));
    }

    fn can_get_content(&self) -> bool {
        !self.robots_denied && self.response.is_some()
    }

    fn read_content(
        &mut self,
        _ctx: &CheckContext,
        _record: &mut UrlRecord,
        limit: u64,
    ) -> Result<Vec<u8>, CheckError> {
        let response = self
            .response
            .take()
            .ok_or_else(|| CheckError::new(ErrorKind::Content, "response already consumed"))?;
        read_limited(response, limit)
    }

    /// Parses against the effective URL when the request was redirected
    fn parse_url(&self, record: &UrlRecord, content: &[u8]) -> ParsedPage {
        let mut page = parse_content(record.content_type.as_deref().unwrap_or_default(), content);
        if page.base_ref.is_none() {
            page.base_ref = self.final_url.as_ref().map(Url::to_string);
        }
        page
    }

    fn allows_robots(&mut self, _ctx: &CheckContext, _record: &UrlRecord) -> bool {
        !self.robots_denied
    }

    fn close_connection(&mut self) {
        self.response = None;
    }
}
