//! Scheme to checker mapping

use crate::checker::{
    Checker, DnsChecker, FileChecker, FtpChecker, HttpChecker, MailtoChecker, NntpChecker,
    TelnetChecker, UnknownChecker,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Creates a fresh checker for one URL
pub type CheckerFactory = Arc<dyn Fn() -> Box<dyn Checker> + Send + Sync>;

/// Maps URL schemes to checker factories
///
/// Populated once at startup. Schemes without a registered factory fall
/// back to the unknown-scheme checker.
#[derive(Clone)]
pub struct CheckerRegistry {
    factories: HashMap<String, CheckerFactory>,
    fallback: CheckerFactory,
}

impl CheckerRegistry {
    /// Creates an empty registry whose every scheme is unknown
    pub fn empty(ignored_schemes: &[String]) -> Self {
        let ignored: Arc<[String]> = ignored_schemes.into();
        let fallback: CheckerFactory = Arc::new(move || -> Box<dyn Checker> {
            Box::new(UnknownChecker::new(Arc::clone(&ignored)))
        });
        Self {
            factories: HashMap::new(),
            fallback,
        }
    }

    /// Creates a registry with the built-in checkers
    ///
    /// | Schemes | Checker |
    /// |---------|---------|
    /// | `http`, `https` | [`HttpChecker`] |
    /// | `file` | [`FileChecker`] |
    /// | `mailto` | [`MailtoChecker`] |
    /// | `dns` | [`DnsChecker`] |
    /// | `telnet` | [`TelnetChecker`] |
    /// | `ftp` | [`FtpChecker`] |
    /// | `news`, `nntp`, `snews` | [`NntpChecker`] |
    pub fn with_defaults(ignored_schemes: &[String]) -> Self {
        let mut registry = Self::empty(ignored_schemes);
        registry.register_fn("http", || Box::new(HttpChecker::new()));
        registry.register_fn("https", || Box::new(HttpChecker::new()));
        registry.register_fn("file", || Box::new(FileChecker::new()));
        registry.register_fn("mailto", || Box::new(MailtoChecker::new()));
        registry.register_fn("dns", || Box::new(DnsChecker::new()));
        registry.register_fn("telnet", || Box::new(TelnetChecker::new()));
        registry.register_fn("ftp", || Box::new(FtpChecker::new()));
        for scheme in ["news", "nntp", "snews"] {
            registry.register_fn(scheme, || Box::new(NntpChecker::new()));
        }
        registry
    }

    /// Registers a factory for a scheme, replacing any previous one
    pub fn register(&mut self, scheme: &str, factory: CheckerFactory) {
        self.factories.insert(scheme.to_ascii_lowercase(), factory);
    }

    pub fn register_fn<F>(&mut self, scheme: &str, factory: F)
    where
        F: Fn() -> Box<dyn Checker> + Send + Sync + 'static,
    {
        self.register(scheme, Arc::new(factory));
    }

    /// Creates the checker for `scheme`
    pub fn create(&self, scheme: &str) -> Box<dyn Checker> {
        let factory = self
            .factories
            .get(&scheme.to_ascii_lowercase())
            .unwrap_or(&self.fallback);
        factory()
    }

    pub fn is_registered(&self, scheme: &str) -> bool {
        self.factories.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckerRegistry")
            .field("schemes", &self.schemes())
            .finish_non_exhaustive()
    }
}
