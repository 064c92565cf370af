//! Persistent list of failing URLs
//!
//! The file holds one `count cache_key` line per key that failed in one or
//! more runs. A key that checks valid again is removed. The whole file is
//! read at the start of a run and rewritten at the end.

use crate::checker::UrlRecord;
use crate::output::stats::CheckStatistics;
use crate::output::traits::{OutputResult, ResultSink};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Blacklist sink
#[derive(Debug)]
pub struct BlacklistLogger {
    path: PathBuf,
    entries: BTreeMap<String, u64>,
}

impl BlacklistLogger {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            entries: BTreeMap::new(),
        }
    }

    /// Failure counts per key
    pub fn entries(&self) -> &BTreeMap<String, u64> {
        &self.entries
    }

    fn read_entries(&mut self) -> OutputResult<()> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = line
                .split_once(' ')
                .and_then(|(count, key)| Some((count.parse::<u64>().ok()?, key.trim())));
            match parsed {
                Some((count, key)) if !key.is_empty() => {
                    self.entries.insert(key.to_string(), count);
                }
                _ => tracing::warn!(
                    "Ignoring malformed line {} in blacklist {}",
                    number + 1,
                    self.path.display()
                ),
            }
        }
        tracing::debug!(
            "Read {} blacklist entries from {}",
            self.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

impl ResultSink for BlacklistLogger {
    fn name(&self) -> &str {
        "blacklist"
    }

    fn start_output(&mut self) -> OutputResult<()> {
        self.read_entries()
    }

    fn log_filter_url(&mut self, record: &UrlRecord, _do_print: bool) -> OutputResult<()> {
        if record.cached {
            return Ok(());
        }
        let key = record
            .cache_key
            .as_deref()
            .unwrap_or_else(|| record.base_url.trim());
        if record.valid {
            self.entries.remove(key);
        } else {
            *self.entries.entry(key.to_string()).or_insert(0) += 1;
        }
        Ok(())
    }

    fn end_output(&mut self, _stats: &CheckStatistics) -> OutputResult<()> {
        let mut out = BufWriter::new(fs::File::create(&self.path)?);
        for (key, count) in &self.entries {
            writeln!(out, "{} {}", count, key)?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::LinkOrigin;

    fn create_test_record(key: &str, valid: bool) -> UrlRecord {
        let mut record = UrlRecord::new(key, 0, LinkOrigin::default());
        record.cache_key = Some(key.to_string());
        record.set_result(if valid { "200 OK" } else { "404 Not Found" }, valid);
        record
    }

    #[test]
    fn test_counts_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blacklist");
        fs::write(&path, "2 http://example.com/gone\n1 http://example.com/fixed\nnot a line\n")
            .unwrap();

        let mut logger = BlacklistLogger::new(&path);
        logger.start_output().unwrap();
        logger
            .log_filter_url(&create_test_record("http://example.com/gone", false), false)
            .unwrap();
        logger
            .log_filter_url(&create_test_record("http://example.com/fixed", true), false)
            .unwrap();
        logger
            .log_filter_url(&create_test_record("http://example.com/new", false), false)
            .unwrap();
        logger.end_output(&CheckStatistics::default()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "3 http://example.com/gone\n1 http://example.com/new\n");
    }

    #[test]
    fn test_cached_records_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = BlacklistLogger::new(&dir.path().join("blacklist"));
        logger.start_output().unwrap();

        let mut record = create_test_record("http://example.com/gone", false);
        record.cached = true;
        logger.log_filter_url(&record, true).unwrap();

        assert!(logger.entries().is_empty());
    }
}
