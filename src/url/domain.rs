use url::Url;

/// Extracts the domain from a URL
///
/// Returns the lowercase host, or `None` for URLs without one
/// (`mailto:`, `file:` paths, `news:` groups).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use linkgauge::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("mailto:someone@example.com").unwrap();
/// assert_eq!(extract_domain(&url), None);
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
}

/// Returns host and port of a URL, falling back to `default_port` for
/// schemes the URL parser has no default for
pub fn host_and_port(url: &Url, default_port: u16) -> Option<(String, u16)> {
    let host = extract_domain(url)?;
    let port = url.port_or_known_default().unwrap_or(default_port);
    Some((host, port))
}

/// Returns `scheme://host[:port]`, the origin used for robots.txt and
/// per-host throttling
pub fn origin_key(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}
