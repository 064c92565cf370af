//! Content parsers for extracting links and metadata
//!
//! This module handles parsing fetched content to extract:
//! - Links to check, with their line and column in the source
//! - The document title and `<base href>`
//! - The robots `nofollow` meta directive
//! - Anchor names (`<a name>` and any `id`) that fragments may point at
//!
//! HTML goes through `scraper`; CSS is scanned with regular expressions.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// A link found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundLink {
    /// The link as written, not yet resolved
    pub url: String,

    /// 1-based line, 0 when unknown
    pub line: usize,

    /// 1-based column, 0 when unknown
    pub column: usize,

    /// Anchor text, alt text or similar
    pub name: String,
}

/// Extracted information from a document
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Explicit base for relative links (from <base href>)
    pub base_ref: Option<String>,

    /// All links found, in document order
    pub links: Vec<FoundLink>,

    /// `<meta name="robots" content="nofollow">` was present
    pub nofollow: bool,

    /// Fragment targets of the document, sorted and without duplicates
    pub anchors: Vec<String>,
}

/// Elements carrying links, with the attribute holding the link
const LINK_ATTRIBUTES: &[(&str, &str)] = &[
    ("a", "href"),
    ("area", "href"),
    ("link", "href"),
    ("img", "src"),
    ("script", "src"),
    ("frame", "src"),
    ("iframe", "src"),
    ("embed", "src"),
    ("form", "action"),
    ("object", "data"),
];

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// | Element | Attribute |
/// |---------|-----------|
/// | `a`, `area`, `link` | `href` |
/// | `img`, `script`, `frame`, `iframe`, `embed` | `src` |
/// | `form` | `action` |
/// | `object` | `data` |
///
/// Empty attribute values are skipped. Links are returned as written;
/// resolution against the document URL happens when the child record is
/// created.
///
/// # Example
///
/// ```
/// use linkgauge::checker::parse_html;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let parsed = parse_html(html);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].url, "/page");
/// assert_eq!(parsed.links[0].name, "Link");
/// ```
pub fn parse_html(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        base_ref: extract_base_ref(&document),
        links: extract_links(&document, html),
        nofollow: has_nofollow(&document),
        anchors: extract_anchors(&document),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

fn extract_base_ref(document: &Html) -> Option<String> {
    let base_selector = Selector::parse("base[href]").ok()?;

    document
        .select(&base_selector)
        .next()
        .and_then(|element| element.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

fn has_nofollow(document: &Html) -> bool {
    let Ok(meta_selector) = Selector::parse("meta[name][content]") else {
        return false;
    };

    document.select(&meta_selector).any(|element| {
        let value = element.value();
        value
            .attr("name")
            .is_some_and(|name| name.eq_ignore_ascii_case("robots"))
            && value
                .attr("content")
                .is_some_and(|content| content.to_ascii_lowercase().contains("nofollow"))
    })
}

fn extract_anchors(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("a[name], [id]") else {
        return Vec::new();
    };

    let mut anchors = BTreeSet::new();
    for element in document.select(&selector) {
        let value = element.value();
        if value.name() == "a" {
            anchors.extend(value.attr("name").filter(|n| !n.is_empty()));
        }
        anchors.extend(value.attr("id").filter(|id| !id.is_empty()));
    }
    anchors.into_iter().map(str::to_string).collect()
}

/// Extracts all links in document order
fn extract_links(document: &Html, source: &str) -> Vec<FoundLink> {
    let combined = LINK_ATTRIBUTES
        .iter()
        .map(|(tag, attr)| format!("{}[{}]", tag, attr))
        .collect::<Vec<_>>()
        .join(", ");
    let Ok(selector) = Selector::parse(&combined) else {
        return Vec::new();
    };

    let mut positions = SourcePositions::new(source);
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let tag = element.value().name();
        let Some(attr) = LINK_ATTRIBUTES
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, a)| *a)
        else {
            continue;
        };

        let Some(value) = element.value().attr(attr) else {
            continue;
        };
        if value.trim().is_empty() {
            continue;
        }

        let (line, column) = positions.locate(value);
        links.push(FoundLink {
            url: value.to_string(),
            line,
            column,
            name: link_name(&element),
        });
    }

    links
}

/// Human-readable name of a link element
fn link_name(element: &ElementRef) -> String {
    let text = collapse_whitespace(&element.text().collect::<String>());
    if !text.is_empty() {
        return text;
    }
    ["alt", "title"]
        .iter()
        .find_map(|attr| element.value().attr(attr))
        .map(collapse_whitespace)
        .unwrap_or_default()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Finds link values in the raw source, moving forward
///
/// Values that were entity-decoded by the HTML parser may not occur
/// verbatim; those get position (0, 0).
struct SourcePositions<'a> {
    source: &'a str,
    cursor: usize,
    tracker: LineTracker,
}

impl<'a> SourcePositions<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            cursor: 0,
            tracker: LineTracker::default(),
        }
    }

    fn locate(&mut self, value: &str) -> (usize, usize) {
        let Some(found) = self.source[self.cursor..].find(value) else {
            return (0, 0);
        };
        let offset = self.cursor + found;
        self.cursor = offset + value.len();
        self.tracker.advance(self.source, offset)
    }
}

/// Line and column of increasing byte offsets
///
/// Only the text between the previous and the requested offset is scanned,
/// so locating every link of a page stays linear in the page size.
#[derive(Debug)]
pub(crate) struct LineTracker {
    offset: usize,
    line: usize,
    column: usize,
}

impl Default for LineTracker {
    fn default() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }
}

impl LineTracker {
    /// 1-based line and column of `offset`, which must not be lower than
    /// the previous one and must lie on a char boundary
    pub(crate) fn advance(&mut self, source: &str, offset: usize) -> (usize, usize) {
        if offset > self.offset {
            for c in source[self.offset..offset].chars() {
                if c == '\n' {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
            }
            self.offset = offset;
        }
        (self.line, self.column)
    }
}

fn css_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]*))\s*\)|@import\s+(?:"([^"]*)"|'([^']*)')"#)
                .ok()
        })
        .as_ref()
}

/// Extracts `url(...)` and `@import "..."` references from a stylesheet
///
/// # Example
///
/// ```
/// use linkgauge::checker::parse_css;
///
/// let parsed = parse_css("body { background: url('bg.png') }\n@import \"print.css\";");
/// let urls: Vec<_> = parsed.links.iter().map(|l| l.url.as_str()).collect();
/// assert_eq!(urls, vec!["bg.png", "print.css"]);
/// ```
pub fn parse_css(css: &str) -> ParsedPage {
    let Some(pattern) = css_url_pattern() else {
        return ParsedPage::default();
    };

    let mut tracker = LineTracker::default();
    let links = pattern
        .captures_iter(css)
        .filter_map(|caps| {
            let found = (1..=5).find_map(|i| caps.get(i))?;
            let url = found.as_str().trim();
            if url.is_empty() {
                return None;
            }
            let (line, column) = tracker.advance(css, found.start());
            Some(FoundLink {
                url: url.to_string(),
                line,
                column,
                name: String::new(),
            })
        })
        .collect();

    ParsedPage {
        links,
        ..ParsedPage::default()
    }
}

/// Returns true for content types whose links can be extracted
pub fn is_parseable_type(content_type: &str) -> bool {
    matches!(
        mime_essence(content_type).as_str(),
        "text/html" | "application/xhtml+xml" | "text/css"
    )
}

/// Parses content according to its type
pub fn parse_content(content_type: &str, content: &[u8]) -> ParsedPage {
    let text = String::from_utf8_lossy(content);
    if mime_essence(content_type) == "text/css" {
        parse_css(&text)
    } else {
        parse_html(&text)
    }
}

/// Lowercase `type/subtype` without parameters
pub fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
