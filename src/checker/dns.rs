//! `dns:` checking
//!
//! `dns:example.com` and `dns://server/example.com` both name the host
//! `example.com`; it must resolve through the configured DNS resolver,
//! bounded by the connection timeout. A nameserver given in the URL is not
//! contacted directly.

use crate::checker::resolver::{build_resolver, is_no_records, resolve_error};
use crate::checker::{standard_syntax, CheckContext, CheckError, Checker, ErrorKind, UrlRecord};
use crate::UrlError;

/// Checks `dns:` URLs
#[derive(Debug, Default)]
pub struct DnsChecker {
    name: String,
}

impl DnsChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checker for DnsChecker {
    fn check_syntax(&mut self, record: &mut UrlRecord) -> Result<(), UrlError> {
        let url = standard_syntax(record)?;
        let name = url.path().trim_start_matches('/').trim_end_matches('.');
        if name.is_empty() {
            return Err(UrlError::Malformed(format!(
                "No host name in `{}`.",
                record.base_url.trim()
            )));
        }
        self.name = name.to_ascii_lowercase();
        record.domain = Some(self.name.clone());
        Ok(())
    }

    fn check_connection(
        &mut self,
        ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        let resolver = build_resolver(ctx)?;
        tracing::debug!("Resolving {}", self.name);

        let mut addrs: Vec<String> = match resolver.lookup_ip(self.name.as_str()) {
            Ok(lookup) => lookup.iter().map(|ip| ip.to_string()).collect(),
            Err(e) if is_no_records(&e) => Vec::new(),
            Err(e) => return Err(resolve_error(&self.name, &e)),
        };
        addrs.sort();
        addrs.dedup();

        if addrs.is_empty() {
            return Err(no_address(&self.name));
        }
        record.add_info(format!("{} resolved to {}", self.name, addrs.join(", ")));
        record.set_result(format!("{} resolved", self.name), true);
        Ok(())
    }
}

fn no_address(name: &str) -> CheckError {
    CheckError::new(ErrorKind::Dns, format!("No address found for {}", name))
}
