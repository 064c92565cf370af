//! `mailto:` checking
//!
//! The syntax check collects every address of the URL (path plus `to`,
//! `cc` and `bcc` headers). The connection check looks up a mail exchanger
//! for each distinct domain.

use crate::checker::record::tags;
use crate::checker::resolver::{build_resolver, is_no_records, resolve_error};
use crate::checker::{CheckContext, CheckError, Checker, ErrorKind, UrlRecord};
use crate::url::percent_decode;
use crate::UrlError;
use std::collections::BTreeSet;
use trust_dns_resolver::Resolver;
use url::Url;

/// Checks `mailto:` URLs
#[derive(Debug, Default)]
pub struct MailtoChecker {
    addresses: Vec<String>,
}

impl MailtoChecker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checker for MailtoChecker {
    fn check_syntax(&mut self, record: &mut UrlRecord) -> Result<(), UrlError> {
        let link = record.base_url.trim();
        let url = Url::parse(link).map_err(|e| UrlError::Parse(e.to_string()))?;

        let addresses = parse_addresses(&url)?;
        if addresses.is_empty() {
            return Err(UrlError::Malformed(format!(
                "No mail addresses found in `{}`.",
                link
            )));
        }
        for address in &addresses {
            validate_address(address)?;
        }

        let sorted: BTreeSet<&str> = addresses.iter().map(String::as_str).collect();
        record.url = Some(url.to_string());
        record.cache_key = Some(format!(
            "mailto:{}",
            sorted.into_iter().collect::<Vec<_>>().join(",")
        ));
        record.domain = addresses.first().and_then(|a| domain_of(a)).map(str::to_string);
        self.addresses = addresses;
        Ok(())
    }

    fn check_connection(
        &mut self,
        ctx: &CheckContext,
        record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        let resolver = build_resolver(ctx)?;
        let domains: BTreeSet<&str> = self.addresses.iter().filter_map(|a| domain_of(a)).collect();

        for domain in domains {
            tracing::debug!("Looking up MX for {}", domain);
            match resolver.mx_lookup(domain) {
                Ok(lookup) if lookup.iter().next().is_some() => {
                    let mut hosts: Vec<_> = lookup.iter().collect();
                    hosts.sort_by_key(|mx| mx.preference());
                    let names: Vec<String> = hosts
                        .iter()
                        .map(|mx| mx.exchange().to_utf8().trim_end_matches('.').to_string())
                        .collect();
                    record.add_info(format!("MX hosts of {}: {}", domain, names.join(", ")));
                }
                Ok(_) => fall_back_to_address(&resolver, domain, record)?,
                Err(e) if is_no_records(&e) => fall_back_to_address(&resolver, domain, record)?,
                Err(e) => return Err(resolve_error(domain, &e)),
            }
        }

        record.set_result("Valid mail address syntax", true);
        Ok(())
    }
}

/// Without an MX record mail goes to the domain's address record
fn fall_back_to_address(
    resolver: &Resolver,
    domain: &str,
    record: &mut UrlRecord,
) -> Result<(), CheckError> {
    record.add_warning(
        tags::MAIL_NO_MX_HOST,
        format!("No MX mail host for {} found.", domain),
    );
    match resolver.lookup_ip(domain) {
        Ok(ips) if ips.iter().next().is_some() => Ok(()),
        Ok(_) => Err(no_host(domain)),
        Err(e) if is_no_records(&e) => Err(no_host(domain)),
        Err(e) => Err(resolve_error(domain, &e)),
    }
}

fn no_host(domain: &str) -> CheckError {
    CheckError::new(ErrorKind::Dns, format!("No host for {} found", domain))
}

/// Collects addresses from the URL path and the `to`, `cc` and `bcc` headers
fn parse_addresses(url: &Url) -> Result<Vec<String>, UrlError> {
    let mut addresses = Vec::new();

    let path = percent_decode(url.path())?;
    addresses.extend(split_addresses(&path));

    for (key, value) in url.query_pairs() {
        if matches!(key.to_ascii_lowercase().as_str(), "to" | "cc" | "bcc") {
            addresses.extend(split_addresses(&value));
        }
    }
    Ok(addresses)
}

fn split_addresses(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(strip_display_name)
}

/// Reduces `Name <user@host>` to `user@host`
fn strip_display_name(address: &str) -> String {
    match (address.rfind('<'), address.rfind('>')) {
        (Some(start), Some(end)) if start < end => address[start + 1..end].trim().to_string(),
        _ => address.to_string(),
    }
}

fn domain_of(address: &str) -> Option<&str> {
    address.rsplit_once('@').map(|(_, domain)| domain)
}

/// Checks the shape of `local@domain`
fn validate_address(address: &str) -> Result<(), UrlError> {
    let invalid = |reason: &str| {
        Err(UrlError::Malformed(format!(
            "Mail address `{}` is invalid: {}",
            address, reason
        )))
    };

    let Some((local, domain)) = address.rsplit_once('@') else {
        return invalid("missing @");
    };
    if local.is_empty() {
        return invalid("empty local part");
    }
    if local.len() > 64 {
        return invalid("local part longer than 64 characters");
    }
    if local.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return invalid("whitespace in local part");
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return invalid("misplaced dot in local part");
    }
    if domain.is_empty() || domain.len() > 255 {
        return invalid("bad domain length");
    }

    let literal = domain.starts_with('[') && domain.ends_with(']');
    if !literal {
        let labels_ok = domain.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        });
        if !labels_ok {
            return invalid("bad domain");
        }
    }
    Ok(())
}
