//! The per-URL check life cycle
//!
//! [`get_url_from`] creates a record, picks its checker and runs the syntax
//! phase. [`run_check`] drives the rest of the life cycle on a worker:
//! connection, size, content (anchor and warning regex) and recursion
//! checks. Every step moves the
//! [`UrlCheck`] through [`CheckState`]; an illegal transition is an
//! internal error.

use crate::checker::parser::LineTracker;
use crate::checker::record::tags;
use crate::checker::{mime_essence, CheckContext, Checker, LinkOrigin, ParsedPage, UrlRecord};
use crate::state::CheckState;
use crate::url::{percent_decode, scheme_of, LinkScope, URL_MAX_LENGTH, URL_WARN_LENGTH};
use crate::{LinkError, UrlError};
use std::fmt;
use std::time::Instant;
use url::Url;

/// Schemes whose fragments name anchors of an HTML document
const ANCHOR_SCHEMES: &[&str] = &["http", "https", "file"];

/// Receives child links discovered while parsing content
pub trait LinkSubmitter {
    fn submit(&self, check: UrlCheck);
}

/// How a check run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The record carries its final result and must be logged
    Done,

    /// The check was cancelled; the record is not logged and its key may be
    /// retried
    Interrupted,

    /// The checker failed unexpectedly; the record carries an internal
    /// error result and must be logged
    Internal(String),
}

/// A record bound to the checker responsible for it
pub struct UrlCheck {
    pub record: UrlRecord,
    checker: Box<dyn Checker>,
    state: CheckState,
}

impl UrlCheck {
    pub fn new(record: UrlRecord, checker: Box<dyn Checker>) -> Self {
        Self {
            record,
            checker,
            state: CheckState::Created,
        }
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    /// True when the record still needs a worker
    ///
    /// Records that failed the syntax check, were filtered, or whose scheme
    /// needs no connection already carry their result.
    pub fn needs_connection(&self) -> bool {
        !self.state.is_terminal()
    }

    /// The deduplication key; the trimmed link text when syntax failed
    pub fn cache_key(&self) -> &str {
        self.record
            .cache_key
            .as_deref()
            .unwrap_or_else(|| self.record.base_url.trim())
    }

    /// Moves to `next`, failing on an illegal transition
    pub fn transition(&mut self, next: CheckState) -> Result<(), LinkError> {
        if !self.state.can_transition_to(next) {
            return Err(LinkError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("{}: {} -> {}", self.record.display_url(), self.state, next);
        self.state = next;
        Ok(())
    }

    pub fn into_record(self) -> UrlRecord {
        self.record
    }

    /// Ends the check with an internal error result, whatever state it
    /// was in
    pub fn fail_internal(&mut self, error: &dyn fmt::Display) {
        tracing::error!(
            "Internal error checking {}: {}",
            self.record.display_url(),
            error
        );
        self.record.set_internal_error(error);
        self.state = CheckState::Done;
    }

    /// Syntax phase: URL construction, length checks and extern filter
    fn check_syntax(&mut self, ctx: &CheckContext, scope: Option<LinkScope>) -> Result<(), LinkError> {
        if self.record.base_url.trim() != self.record.base_url {
            self.record.add_warning(
                tags::URL_WHITESPACE,
                "Leading or trailing whitespace in URL",
            );
        }

        if let Err(e) = self.checker.check_syntax(&mut self.record) {
            tracing::debug!("Syntax error in {:?}: {}", self.record.base_url, e);
            self.record.set_result(e.to_string(), false);
            return self.transition(CheckState::Done);
        }

        let length = self.record.url.as_deref().map_or(0, str::len);
        if length > URL_MAX_LENGTH {
            self.record
                .set_result(UrlError::TooLong(length).to_string(), false);
            return self.transition(CheckState::Done);
        }
        if length > URL_WARN_LENGTH {
            self.record.add_warning(
                tags::URL_TOO_LONG,
                format!(
                    "URL length {} is longer than {}",
                    length, URL_WARN_LENGTH
                ),
            );
        }

        if ctx.config.checking.anchors {
            self.key_by_anchor();
        }

        self.transition(CheckState::SyntaxChecked)?;

        // Schemes that need no connection set their result during syntax
        if self.record.has_result() {
            return self.transition(CheckState::Done);
        }

        let scope = match scope {
            Some(scope) => scope,
            None => self
                .record
                .url
                .as_deref()
                .map_or(LinkScope::EXTERN, |url| ctx.filter.classify(url)),
        };
        self.record.scope = scope;

        if scope.is_filtered() {
            self.record.set_result("filtered", true);
            self.record
                .add_info("Outside of domain filter, checked only syntax.");
            self.transition(CheckState::Filtered)?;
        }
        Ok(())
    }

    /// Everything after the syntax phase
    fn check_remaining(
        &mut self,
        ctx: &CheckContext,
        submit: &dyn LinkSubmitter,
    ) -> Result<CheckOutcome, LinkError> {
        if ctx.is_aborted() {
            return Ok(CheckOutcome::Interrupted);
        }

        if let Err(err) = self.checker.check_connection(ctx, &mut self.record) {
            let class = ctx.errors.classify(err.kind());
            tracing::debug!("{}: {}", self.record.display_url(), err);

            if class.fatal {
                ctx.request_abort();
                return Ok(CheckOutcome::Interrupted);
            }
            if class.internal {
                self.fail_internal(&err);
                return Ok(CheckOutcome::Internal(err.to_string()));
            }
            if !class.cacheable {
                self.record.caching = false;
            }
            self.record.set_result(err.to_string(), false);
            self.transition(CheckState::Done)?;
            return Ok(CheckOutcome::Done);
        }

        self.checker.set_content_type(&mut self.record);
        self.checker.add_size_info(&mut self.record);
        self.transition(CheckState::Connected)?;

        let recurse = self.allows_recursion(ctx);
        let inspect = self.wants_content_checks(ctx);
        let content = if recurse || inspect {
            self.read_content(ctx)
        } else {
            None
        };

        self.check_size(ctx);
        let page = content
            .as_deref()
            .and_then(|content| self.parse_content(ctx, content));
        if inspect {
            if let Some(content) = &content {
                self.check_anchor(ctx, page.as_ref());
                self.check_warning_regex(ctx, content);
            }
        }
        self.transition(CheckState::ContentChecked)?;

        if recurse {
            if let Some(page) = page {
                self.recurse(ctx, page, submit);
                self.transition(CheckState::Recursed)?;
            }
        }

        if !self.record.has_result() {
            self.record.set_result("Valid", true);
        }
        self.transition(CheckState::Done)?;
        Ok(CheckOutcome::Done)
    }

    /// With anchor checking, links to different anchors of one page are
    /// distinct checks
    fn key_by_anchor(&mut self) {
        let Some(url) = self.record.url.as_deref() else {
            return;
        };
        let has_anchor = Url::parse(url).is_ok_and(|url| {
            ANCHOR_SCHEMES.contains(&url.scheme()) && url.fragment().is_some_and(|f| !f.is_empty())
        });
        if has_anchor {
            self.record.cache_key = Some(url.to_string());
        }
    }

    fn allows_recursion(&mut self, ctx: &CheckContext) -> bool {
        let within_depth = ctx
            .config
            .checking
            .recursion_limit()
            .map_or(true, |max| self.record.recursion_level < max);

        self.record.valid
            && within_depth
            && !self.record.scope.is_extern
            && self.checker.can_get_content()
            && self.checker.is_parseable(&self.record)
            && self.checker.allows_robots(ctx, &self.record)
    }

    /// Content checks apply to extern pages too
    fn wants_content_checks(&self, ctx: &CheckContext) -> bool {
        let wanted = ctx.warning_regex.is_some()
            || (ctx.config.checking.anchors && self.anchor().is_some());

        wanted
            && self.record.valid
            && self.checker.can_get_content()
            && self.checker.is_parseable(&self.record)
    }

    /// The non-empty fragment of the checked URL
    fn anchor(&self) -> Option<String> {
        let url = Url::parse(self.record.url.as_deref()?).ok()?;
        url.fragment()
            .filter(|f| !f.is_empty())
            .map(str::to_string)
    }

    fn read_content(&mut self, ctx: &CheckContext) -> Option<Vec<u8>> {
        let started = Instant::now();
        let result =
            self.checker
                .read_content(ctx, &mut self.record, ctx.config.checking.max_file_size);
        self.record.dltime = Some(started.elapsed());

        match result {
            Ok(content) => {
                self.record.size.get_or_insert(content.len() as u64);
                Some(content)
            }
            Err(e) => {
                self.record
                    .add_warning(tags::URL_ERROR_GETTING_CONTENT, e.to_string());
                None
            }
        }
    }

    fn check_size(&mut self, ctx: &CheckContext) {
        let Some(size) = self.record.size else {
            return;
        };
        if size == 0 {
            self.record
                .add_warning(tags::URL_CONTENT_SIZE_ZERO, "Content size is zero.");
        } else if let Some(limit) = ctx.config.checking.warn_size_bytes {
            if size >= limit {
                self.record.add_warning(
                    tags::URL_CONTENT_TOO_LARGE,
                    format!("Content size {} is larger than {} bytes.", size, limit),
                );
            }
        }
    }

    /// Parses content once for the title, the anchors and child links
    fn parse_content(&mut self, ctx: &CheckContext, content: &[u8]) -> Option<ParsedPage> {
        let max_parse = ctx.config.checking.max_parse_size;
        if content.len() as u64 > max_parse {
            self.record.add_info(format!(
                "Content size {} exceeds the parse limit of {} bytes; links not checked.",
                content.len(),
                max_parse
            ));
            return None;
        }

        let mut page = self.checker.parse_url(&self.record, content);
        if self.record.title.is_none() {
            self.record.title = page.title.take();
        }
        Some(page)
    }

    /// Warns when the URL's fragment names no anchor of the HTML page
    fn check_anchor(&mut self, ctx: &CheckContext, page: Option<&ParsedPage>) {
        if !ctx.config.checking.anchors {
            return;
        }
        let Some(anchor) = self.anchor() else {
            return;
        };
        let is_html = self.record.content_type.as_deref().is_some_and(|ct| {
            matches!(mime_essence(ct).as_str(), "text/html" | "application/xhtml+xml")
        });
        let Some(page) = page.filter(|_| is_html) else {
            return;
        };

        let decoded = percent_decode(&anchor).unwrap_or_else(|_| anchor.clone());
        if page.anchors.iter().any(|a| *a == anchor || *a == decoded) {
            return;
        }

        let available = if page.anchors.is_empty() {
            "-".to_string()
        } else {
            page.anchors
                .iter()
                .map(|a| format!("`{}'", a))
                .collect::<Vec<_>>()
                .join(", ")
        };
        self.record.add_warning(
            tags::URL_ANCHOR_NOT_FOUND,
            format!(
                "Anchor `{}' not found. Available anchors: {}.",
                decoded, available
            ),
        );
    }

    /// Warns about the first `warning-regex-max` matches in the content
    fn check_warning_regex(&mut self, ctx: &CheckContext, content: &[u8]) {
        let Some(regex) = &ctx.warning_regex else {
            return;
        };
        let text = String::from_utf8_lossy(content);
        let mut lines = LineTracker::default();

        for found in regex
            .find_iter(&text)
            .take(ctx.config.checking.warning_regex_max)
        {
            let (line, _) = lines.advance(&text, found.start());
            self.record.add_warning(
                tags::URL_WARNREGEX_FOUND,
                format!("Found {:?} at line {} in link contents.", found.as_str(), line),
            );
        }
    }

    /// Submits every child link of a parsed page
    fn recurse(&mut self, ctx: &CheckContext, page: ParsedPage, submit: &dyn LinkSubmitter) {
        if page.nofollow {
            self.record
                .add_info("Recursion disabled by robots meta tag (nofollow).");
            return;
        }

        let level = self.record.recursion_level + 1;
        for link in page.links {
            if ctx.is_aborted() {
                break;
            }
            let origin = LinkOrigin {
                parent_url: self.record.url.clone(),
                base_ref: page.base_ref.clone(),
                line: link.line,
                column: link.column,
                page: 0,
                name: link.name,
            };
            submit.submit(get_url_from(&link.url, level, ctx, origin, None));
        }
    }
}

impl fmt::Debug for UrlCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlCheck")
            .field("url", &self.record.display_url())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Creates the check for a link and runs its syntax phase
///
/// The checker is picked by the link's scheme. Relative links inherit the
/// scheme of their base reference or parent; links with neither are local
/// file paths.
///
/// # Arguments
///
/// * `base_url` - The link as written
/// * `recursion_level` - Depth below the seed (seeds are level 0)
/// * `ctx` - The shared check context
/// * `origin` - Where the link was found
/// * `scope` - Extern classification; computed from the link filter when `None`
///
/// # Returns
///
/// A check in state `SyntaxChecked` awaiting a worker, or in a terminal
/// state (syntax error, filtered, no connection needed).
pub fn get_url_from(
    base_url: &str,
    recursion_level: u32,
    ctx: &CheckContext,
    origin: LinkOrigin,
    scope: Option<LinkScope>,
) -> UrlCheck {
    let scheme = scheme_of(base_url)
        .or_else(|| origin.base_ref.as_deref().and_then(scheme_of))
        .or_else(|| origin.parent_url.as_deref().and_then(scheme_of))
        .unwrap_or_else(|| "file".to_string());

    let record = UrlRecord::new(base_url, recursion_level, origin);
    let mut check = UrlCheck::new(record, ctx.registry.create(&scheme));

    if let Err(e) = check.check_syntax(ctx, scope) {
        check.fail_internal(&e);
    }
    check
}

/// Runs the remaining life cycle of a check on the calling thread
///
/// `close_connection` is always called. Check time is recorded on the
/// record.
pub fn run_check(
    check: &mut UrlCheck,
    ctx: &CheckContext,
    submit: &dyn LinkSubmitter,
) -> CheckOutcome {
    if !check.needs_connection() {
        return CheckOutcome::Done;
    }

    let started = Instant::now();
    let outcome = match check.check_remaining(ctx, submit) {
        Ok(outcome) => outcome,
        Err(e) => {
            check.fail_internal(&e);
            CheckOutcome::Internal(e.to_string())
        }
    };
    check.checker.close_connection();
    check.record.checktime = started.elapsed();
    outcome
}
