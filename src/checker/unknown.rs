//! Fallback for schemes without a checker
//!
//! The result is decided during the syntax check, so these records never
//! reach a worker.

use crate::checker::record::tags;
use crate::checker::{standard_syntax, CheckContext, CheckError, Checker, UrlRecord};
use crate::url::scheme_of;
use crate::UrlError;
use std::sync::Arc;

/// Checks URLs of unknown or deliberately ignored schemes
#[derive(Debug)]
pub struct UnknownChecker {
    ignored_schemes: Arc<[String]>,
}

impl UnknownChecker {
    pub fn new(ignored_schemes: Arc<[String]>) -> Self {
        Self { ignored_schemes }
    }

    fn is_ignored(&self, scheme: &str) -> bool {
        self.ignored_schemes
            .iter()
            .any(|ignored| ignored.eq_ignore_ascii_case(scheme))
    }
}

impl Checker for UnknownChecker {
    fn check_syntax(&mut self, record: &mut UrlRecord) -> Result<(), UrlError> {
        if standard_syntax(record).is_err() {
            let link = record.base_url.trim().to_string();
            record.url = Some(link.clone());
            record.cache_key = Some(link);
        }

        let scheme = scheme_of(&record.base_url).unwrap_or_default();
        if self.is_ignored(&scheme) {
            record.add_warning(tags::IGNORE_URL, format!("{} URL ignored.", scheme));
            record.set_result("ignored", true);
        } else {
            record.set_result("URL is unrecognized or has invalid syntax", false);
        }
        Ok(())
    }

    fn check_connection(
        &mut self,
        _ctx: &CheckContext,
        _record: &mut UrlRecord,
    ) -> Result<(), CheckError> {
        Ok(())
    }
}
