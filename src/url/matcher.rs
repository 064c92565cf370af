use crate::config::{FilteringConfig, LinkPattern};
use crate::url::domain::origin_key;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Extern classification of a URL
///
/// `is_extern` URLs are checked but never recursed into; `strict` extern
/// URLs are not checked at all and end in the FILTERED state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkScope {
    pub is_extern: bool,
    pub strict: bool,
}

impl LinkScope {
    pub const INTERN: LinkScope = LinkScope {
        is_extern: false,
        strict: false,
    };

    pub const EXTERN: LinkScope = LinkScope {
        is_extern: true,
        strict: false,
    };

    /// True when the URL must not be checked beyond its syntax
    pub fn is_filtered(&self) -> bool {
        self.is_extern && self.strict
    }
}

/// A compiled extern/intern link pattern
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    negate: bool,
    strict: bool,
}

impl CompiledPattern {
    /// Compiles a configured link pattern
    pub fn new(entry: &LinkPattern) -> Result<Self, ConfigError> {
        let regex = Regex::new(&entry.pattern)
            .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", entry.pattern, e)))?;
        Ok(Self {
            regex,
            negate: entry.negate,
            strict: entry.strict,
        })
    }

    /// Checks if a URL matches this pattern, honouring `negate`
    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url) != self.negate
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

/// Decides which URLs belong to the checked site
///
/// Classification priority:
/// 1. First matching extern pattern: extern, strict as configured
/// 2. Any matching intern pattern: intern
/// 3. Otherwise: extern, not strict
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    extern_links: Vec<CompiledPattern>,
    intern_links: Vec<CompiledPattern>,
}

impl LinkFilter {
    /// Compiles the configured patterns
    pub fn new(config: &FilteringConfig) -> Result<Self, ConfigError> {
        let extern_links = config
            .extern_links
            .iter()
            .map(CompiledPattern::new)
            .collect::<Result<Vec<_>, _>>()?;
        let intern_links = config
            .intern_links
            .iter()
            .map(CompiledPattern::new)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            extern_links,
            intern_links,
        })
    }

    /// Compiles the configured patterns and, when no intern pattern is
    /// configured, adds one per seed so that links on the seed's own site
    /// are followed
    pub fn with_seeds(config: &FilteringConfig, seeds: &[Url]) -> Result<Self, ConfigError> {
        let mut filter = Self::new(config)?;
        if filter.intern_links.is_empty() {
            for seed in seeds {
                if let Some(pattern) = intern_pattern_for(seed) {
                    tracing::debug!("Adding intern pattern {} for seed {}", pattern, seed);
                    filter.intern_links.push(CompiledPattern::new(&LinkPattern {
                        pattern,
                        negate: false,
                        strict: false,
                    })?);
                }
            }
        }
        Ok(filter)
    }

    /// Classifies an absolute URL
    pub fn classify(&self, url: &str) -> LinkScope {
        if let Some(entry) = self.extern_links.iter().find(|p| p.matches(url)) {
            return LinkScope {
                is_extern: true,
                strict: entry.strict,
            };
        }

        if self.intern_links.iter().any(|p| p.matches(url)) {
            return LinkScope::INTERN;
        }

        LinkScope::EXTERN
    }

    pub fn intern_patterns(&self) -> impl Iterator<Item = &str> {
        self.intern_links.iter().map(|p| p.as_str())
    }
}

/// Builds the intern pattern for a seed URL
///
/// Network URLs match their origin; local files match their directory.
fn intern_pattern_for(seed: &Url) -> Option<String> {
    if seed.scheme() == "file" {
        let url = seed.as_str();
        let dir = &url[..url.rfind('/')? + 1];
        return Some(format!("^{}", regex::escape(dir)));
    }

    let origin = origin_key(seed)?;
    Some(format!("^{}(?:[/?#]|$)", regex::escape(&origin)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(p: &str, negate: bool, strict: bool) -> LinkPattern {
        LinkPattern {
            pattern: p.to_string(),
            negate,
            strict,
        }
    }

    #[test]
    fn test_unmatched_url_is_extern_not_strict() {
        let filter = LinkFilter::default();
        assert_eq!(filter.classify("http://example.com/"), LinkScope::EXTERN);
    }

    #[test]
    fn test_intern_pattern() {
        let config = FilteringConfig {
            intern_links: vec![pattern("^https?://example\\.com/", false, false)],
            ..FilteringConfig::default()
        };
        let filter = LinkFilter::new(&config).unwrap();

        assert_eq!(filter.classify("http://example.com/a"), LinkScope::INTERN);
        assert_eq!(filter.classify("http://other.com/a"), LinkScope::EXTERN);
    }

    #[test]
    fn test_extern_pattern_takes_priority() {
        let config = FilteringConfig {
            extern_links: vec![pattern("/private/", false, true)],
            intern_links: vec![pattern("^http://example\\.com/", false, false)],
            ..FilteringConfig::default()
        };
        let filter = LinkFilter::new(&config).unwrap();

        let scope = filter.classify("http://example.com/private/x");
        assert!(scope.is_extern);
        assert!(scope.strict);
        assert!(scope.is_filtered());
        assert_eq!(filter.classify("http://example.com/public"), LinkScope::INTERN);
    }

    #[test]
    fn test_negated_pattern() {
        let config = FilteringConfig {
            extern_links: vec![pattern("^http://example\\.com", true, true)],
            ..FilteringConfig::default()
        };
        let filter = LinkFilter::new(&config).unwrap();

        assert!(filter.classify("http://elsewhere.org/").is_filtered());
        assert!(!filter.classify("http://example.com/").is_extern);
    }

    #[test]
    fn test_seed_adds_origin_pattern() {
        let seed = Url::parse("http://localhost:8080/a.html").unwrap();
        let filter = LinkFilter::with_seeds(&FilteringConfig::default(), &[seed]).unwrap();

        assert_eq!(
            filter.classify("http://localhost:8080/b.html"),
            LinkScope::INTERN
        );
        assert_eq!(filter.classify("http://localhost:8080"), LinkScope::INTERN);
        assert_eq!(
            filter.classify("http://localhost:80801/"),
            LinkScope::EXTERN
        );
        assert_eq!(filter.classify("http://example.com/"), LinkScope::EXTERN);
    }

    #[test]
    fn test_seed_pattern_not_added_with_configured_intern_links() {
        let config = FilteringConfig {
            intern_links: vec![pattern("^http://only\\.example/", false, false)],
            ..FilteringConfig::default()
        };
        let seed = Url::parse("http://localhost/a.html").unwrap();
        let filter = LinkFilter::with_seeds(&config, &[seed]).unwrap();

        assert_eq!(filter.intern_patterns().count(), 1);
        assert!(filter.classify("http://localhost/b.html").is_extern);
    }

    #[test]
    fn test_file_seed_matches_directory() {
        let seed = Url::parse("file:///srv/site/index.html").unwrap();
        let filter = LinkFilter::with_seeds(&FilteringConfig::default(), &[seed]).unwrap();

        assert!(!filter.classify("file:///srv/site/sub/page.html").is_extern);
        assert!(filter.classify("file:///srv/other/page.html").is_extern);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = FilteringConfig {
            extern_links: vec![pattern("([", false, false)],
            ..FilteringConfig::default()
        };
        assert!(matches!(
            LinkFilter::new(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }
}
