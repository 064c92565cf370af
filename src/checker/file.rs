//! Local file checking
//!
//! Directories are presented as a generated HTML index so that their
//! entries are checked like links of a page. A local file is only read for
//! seeds and for links found in other local files; a remote page cannot
//! make the checker read the local file system.

use crate::checker::record::tags;
use crate::checker::{
    parse_content, parse_html, read_limited, standard_syntax, CheckContext, CheckError, Checker,
    ErrorKind, ParsedPage, UrlRecord,
};
use crate::UrlError;
use chrono::{DateTime, Utc};
use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// Checks `file:` URLs and scheme-less paths
#[derive(Debug, Default)]
pub struct FileChecker {
    path: Option<PathBuf>,
    metadata: Option<Metadata>,
    dir_url: Option<String>,
}

impl FileChecker {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_dir(&self) -> bool {
        self.metadata.as_ref().is_some_and(Metadata::is_dir)
    }
}

impl Checker for FileChecker {
    fn check_syntax(&mut self, record: &mut UrlRecord) -> Result<(), UrlError> {
        let link = record.base_url.trim();
        let lower = link.to_ascii_lowercase();
        if lower.starts_with("file:/") && !lower.starts_with("file://") {
            record.add_warning(
                tags::FILE_MISSING_SLASH,
                format!("Add the missing slashes: `file://{}`.", &link["file:".len()..]),
            );
        }
        standard_syntax(record).map(|_| ())
    }

    fn check_connection(
        &mut self,
        _ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        if !parent_allows_local(record.parent_url.as_deref()) {
            // A file parent may still check the same path later
            record.caching = false;
            return Err(CheckError::new(
                ErrorKind::Protocol,
                "local files are only checked without a parent URL or when the parent URL is also a file",
            ));
        }

        let url = record
            .url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .ok_or_else(|| CheckError::new(ErrorKind::Internal, "syntax check left no URL"))?;
        let path = url
            .to_file_path()
            .map_err(|_| CheckError::new(ErrorKind::Io, format!("invalid file path in {}", url)))?;

        let metadata = fs::metadata(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CheckError::new(ErrorKind::Io, "file not found"),
            _ => CheckError::from(e),
        })?;

        if metadata.is_dir() {
            let mut dir_url = url.clone();
            if !dir_url.path().ends_with('/') {
                dir_url.set_path(&format!("{}/", dir_url.path()));
            }
            self.dir_url = Some(dir_url.to_string());
        }

        record.modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        self.metadata = Some(metadata);
        self.path = Some(path);
        Ok(())
    }

    fn set_content_type(&mut self, record: &mut UrlRecord) {
        if self.is_dir() {
            record.content_type = Some("text/html".to_string());
        } else if let Some(path) = &self.path {
            record.content_type = Some(guess_content_type(path).to_string());
        }
    }

    fn add_size_info(&mut self, record: &mut UrlRecord) {
        if let Some(metadata) = self.metadata.as_ref().filter(|m| m.is_file()) {
            record.size = Some(metadata.len());
        }
    }

    fn can_get_content(&self) -> bool {
        self.path.is_some()
    }

    fn read_content(
        &mut self,
        _ctx: &CheckContext,
        _record: &mut UrlRecord,
        limit: u64,
    ) -> Result<Vec<u8>, CheckError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| CheckError::new(ErrorKind::Content, "no file to read"))?;

        if self.is_dir() {
            let index = directory_index(path)?;
            return read_limited(index.as_bytes(), limit);
        }
        read_limited(File::open(path)?, limit)
    }

    /// Directory entries resolve against the directory with a trailing slash
    fn parse_url(&self, record: &UrlRecord, content: &[u8]) -> ParsedPage {
        if !self.is_dir() {
            return parse_content(
                record.content_type.as_deref().unwrap_or_default(),
                content,
            );
        }
        let mut page = parse_html(&String::from_utf8_lossy(content));
        page.base_ref = self.dir_url.clone();
        page
    }
}

fn parent_allows_local(parent_url: Option<&str>) -> bool {
    parent_url.map_or(true, |parent| {
        parent
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("file:"))
    })
}

/// Guesses a content type from the file extension
pub fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" | "shtml" => "text/html",
        "xhtml" => "application/xhtml+xml",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" | "text" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Renders a directory listing as HTML
///
/// Subdirectories get a trailing slash; entries are sorted by name.
fn directory_index(dir: &Path) -> Result<String, CheckError> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();

    let title = escape_html(&dir.display().to_string());
    let mut html = format!(
        "<html>\n<head><title>{}</title></head>\n<body>\n",
        title
    );
    for name in entries {
        html.push_str(&format!(
            "<a href=\"{}\">{}</a><br>\n",
            escape_href(&name),
            escape_html(&name)
        ));
    }
    html.push_str("</body>\n</html>\n");
    Ok(html)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Percent-encodes characters that would change the meaning of a
/// relative reference
///
/// Names with a colon get a `./` prefix so they are not read as a scheme.
fn escape_href(name: &str) -> String {
    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ' ' => escaped.push_str("%20"),
            '#' => escaped.push_str("%23"),
            '?' => escaped.push_str("%3F"),
            '"' => escaped.push_str("%22"),
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("%3C"),
            '>' => escaped.push_str("%3E"),
            c => escaped.push(c),
        }
    }
    if escaped.contains(':') {
        escaped.insert_str(0, "./");
    }
    escaped
}
