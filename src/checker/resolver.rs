//! Shared DNS resolver setup for the `dns:` and `mailto:` checkers

use crate::checker::{CheckContext, CheckError, ErrorKind};
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::Resolver;

/// Creates a resolver from the system configuration, falling back to the
/// resolver library's defaults
///
/// The lookup timeout follows the configured connection timeout. One
/// resolver is built per check: the blocking resolver runs its lookups on
/// an internal runtime guarded by a lock, so a shared instance would
/// serialize every worker's lookups.
pub(crate) fn build_resolver(ctx: &CheckContext) -> Result<Resolver, CheckError> {
    let (config, mut opts) = match trust_dns_resolver::system_conf::read_system_conf() {
        Ok(conf) => conf,
        Err(e) => {
            tracing::debug!("No system resolver configuration ({}), using defaults", e);
            (ResolverConfig::default(), ResolverOpts::default())
        }
    };
    opts.timeout = ctx.config.checking.timeout_duration();
    Resolver::new(config, opts).map_err(CheckError::from)
}

/// The name exists but has no records of the requested type
pub(crate) fn is_no_records(error: &ResolveError) -> bool {
    matches!(error.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// Maps a lookup failure; timeouts stay distinguishable so they are not
/// cached
pub(crate) fn resolve_error(name: &str, error: &ResolveError) -> CheckError {
    let kind = match error.kind() {
        ResolveErrorKind::Timeout => ErrorKind::Timeout,
        _ => ErrorKind::Dns,
    };
    CheckError::new(kind, format!("{}: {}", name, error))
}
