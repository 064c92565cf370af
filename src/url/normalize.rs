use crate::UrlError;
use std::path::Path;
use url::{ParseError, Url};

/// Builds the absolute URL for a link as written in a document
///
/// Resolution order:
/// 1. `base_url` is already absolute: parse it directly
/// 2. resolve against `base_ref` (a `<base href>` of the containing document)
/// 3. resolve against `parent_url` (the URL of the containing document)
/// 4. no usable base: treat `base_url` as a local file path
///
/// Leading and trailing whitespace is ignored; callers report it as a
/// warning separately.
///
/// # Arguments
///
/// * `base_url` - The link text as found
/// * `base_ref` - Optional explicit base of the containing document
/// * `parent_url` - Optional URL of the containing document
///
/// # Returns
///
/// * `Ok(Url)` - The absolute URL
/// * `Err(UrlError)` - The link cannot be turned into a URL
///
/// # Examples
///
/// ```
/// use linkgauge::url::absolute_url;
///
/// let url = absolute_url("b.html", None, Some("http://example.com/dir/a.html")).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/dir/b.html");
/// ```
pub fn absolute_url(
    base_url: &str,
    base_ref: Option<&str>,
    parent_url: Option<&str>,
) -> Result<Url, UrlError> {
    let link = base_url.trim();
    if link.is_empty() {
        return Err(UrlError::Empty);
    }

    match Url::parse(link) {
        Ok(url) => return Ok(url),
        Err(ParseError::RelativeUrlWithoutBase) => {}
        Err(e) => return Err(map_parse_error(e, link)),
    }

    for base in [base_ref, parent_url].into_iter().flatten() {
        if let Ok(base) = Url::parse(base) {
            return base.join(link).map_err(|e| map_parse_error(e, link));
        }
    }

    file_url_from_path(link)
}

/// Turns a command-line seed into an absolute URL
///
/// Input with a scheme is parsed as is. Host-looking input starting with
/// `www.` or `ftp.` gets the matching scheme; anything else is a local path.
///
/// # Examples
///
/// ```
/// use linkgauge::url::seed_url;
///
/// assert_eq!(seed_url("www.example.com").unwrap().as_str(), "http://www.example.com/");
/// assert_eq!(seed_url("ftp.example.com").unwrap().as_str(), "ftp://ftp.example.com/");
/// assert_eq!(seed_url("https://example.com/a").unwrap().as_str(), "https://example.com/a");
/// ```
pub fn seed_url(arg: &str) -> Result<Url, UrlError> {
    let arg = arg.trim();
    if arg.is_empty() {
        return Err(UrlError::Empty);
    }
    if crate::url::scheme_of(arg).is_some() {
        return Url::parse(arg).map_err(|e| map_parse_error(e, arg));
    }

    let lower = arg.to_ascii_lowercase();
    let prefixed = if lower.starts_with("www.") {
        Some(format!("http://{}", arg))
    } else if lower.starts_with("ftp.") {
        Some(format!("ftp://{}", arg))
    } else {
        None
    };
    match prefixed {
        Some(link) => Url::parse(&link).map_err(|e| map_parse_error(e, &link)),
        None => file_url_from_path(arg),
    }
}

/// Converts a local path into a `file:` URL, relative paths against the
/// current directory
pub fn file_url_from_path(path: &str) -> Result<Url, UrlError> {
    let path = Path::new(path);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| UrlError::Malformed(format!("cannot resolve relative path: {}", e)))?
            .join(path)
    };

    Url::from_file_path(&absolute)
        .map_err(|_| UrlError::Parse(format!("invalid file path '{}'", absolute.display())))
}

/// Normalizes an absolute URL
///
/// # Normalization Steps
///
/// 1. Host is lowercased and default ports dropped (done by the parser)
/// 2. Dot segments are removed (done by the parser)
/// 3. Repeated slashes inside the path are collapsed, keeping a trailing slash
/// 4. An empty query string (trailing `?`) is removed
///
/// The fragment is kept; [`url_without_fragment`] derives the dedup key.
///
/// # Examples
///
/// ```
/// use linkgauge::url::normalize_url;
/// use url::Url;
///
/// let url = normalize_url(Url::parse("HTTP://Example.COM:80/a/./b/../c//d/?").unwrap());
/// assert_eq!(url.as_str(), "http://example.com/a/c/d/");
/// ```
pub fn normalize_url(mut url: Url) -> Url {
    if !url.cannot_be_a_base() {
        let path = normalize_path(url.path());
        if path != url.path() {
            url.set_path(&path);
        }
    }

    if url.query() == Some("") {
        url.set_query(None);
    }

    url
}

/// Returns the URL as a string without its fragment
pub fn url_without_fragment(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Decodes `%XX` escapes
///
/// Fails on a truncated escape or when the decoded bytes are not UTF-8.
pub fn percent_decode(text: &str) -> Result<String, UrlError> {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| UrlError::Malformed(format!("Bad escape in `{}`", text)))?;
            decoded.push(hex);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).map_err(|e| UrlError::Malformed(e.to_string()))
}

/// Collapses repeated slashes in a URL path
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut result = format!("/{}", segments.join("/"));
    if trailing_slash && result.len() > 1 {
        result.push('/');
    }
    result
}

/// Maps a parser error onto the user-facing syntax error
fn map_parse_error(error: ParseError, link: &str) -> UrlError {
    match error {
        ParseError::EmptyHost => UrlError::EmptyHost,
        ParseError::InvalidPort => UrlError::InvalidPort(link.to_string()),
        other => UrlError::Parse(other.to_string()),
    }
}
