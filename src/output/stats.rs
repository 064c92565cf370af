//! Run statistics accumulated from the stream of finished records
//!
//! This module provides the counters the dispatcher keeps while a run is in
//! progress and the end-of-run summary printed by the binary.

use crate::checker::UrlRecord;
use std::collections::BTreeMap;
use std::time::Duration;

/// Totals for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckStatistics {
    /// Number of logged records
    pub number: u64,

    /// Records with an invalid result
    pub errors: u64,

    /// Warnings across all records
    pub warnings: u64,

    /// Records whose checker failed unexpectedly
    pub internal_errors: u64,

    /// Records answered from an earlier check of the same key
    pub cached: u64,

    /// Bytes of content reported by fresh checks
    pub downloaded_bytes: u64,

    /// Fresh checks per content type
    pub content_types: BTreeMap<String, u64>,

    /// Run time up to the last update
    pub elapsed: Duration,
}

impl CheckStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one finished record
    ///
    /// # Arguments
    ///
    /// * `record` - The record as handed to the sinks
    /// * `internal` - Whether the record carries an internal error
    pub fn record(&mut self, record: &UrlRecord, internal: bool) {
        self.number += 1;
        if !record.valid {
            self.errors += 1;
        }
        self.warnings += record.warnings.len() as u64;
        if internal {
            self.internal_errors += 1;
        }

        if record.cached {
            self.cached += 1;
            return;
        }
        if let Some(size) = record.size {
            self.downloaded_bytes += size;
        }
        if let Some(content_type) = &record.content_type {
            *self.content_types.entry(content_type.clone()).or_insert(0) += 1;
        }
    }

    pub fn valid(&self) -> u64 {
        self.number - self.errors
    }

    /// Process exit code for this run: 2 on internal errors, 1 when invalid
    /// links were found, otherwise 0
    pub fn exit_code(&self) -> i32 {
        if self.internal_errors > 0 {
            2
        } else if self.errors > 0 {
            1
        } else {
            0
        }
    }
}

/// Formats a duration as `HH:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Formats a byte count with a binary unit
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{}B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1}{}", value, UNITS[unit])
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CheckStatistics) {
    println!("=== Check Statistics ===\n");

    println!("Overview:");
    println!("  Links checked: {}", stats.number);
    println!("  Valid: {}", stats.valid());
    println!("  Errors: {}", stats.errors);
    println!("  Warnings: {}", stats.warnings);
    println!("  Cached duplicates: {}", stats.cached);
    if stats.internal_errors > 0 {
        println!("  Internal errors: {}", stats.internal_errors);
    }
    println!("  Downloaded: {}", format_size(stats.downloaded_bytes));
    println!("  Runtime: {}", format_duration(stats.elapsed));
    println!();

    if !stats.content_types.is_empty() {
        println!("Content Types:");
        // Sort by count (descending)
        let mut counts: Vec<_> = stats.content_types.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let fresh = stats.number - stats.cached;
        for (content_type, count) in counts {
            let percentage = if fresh > 0 {
                (*count as f64 / fresh as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", content_type, count, percentage);
        }
        println!();
    }

    if stats.errors == 0 {
        println!("That's it. No errors found.");
    } else {
        println!(
            "That's it. {} {} found.",
            stats.errors,
            if stats.errors == 1 { "error" } else { "errors" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{tags, LinkOrigin};

    fn create_test_record(valid: bool) -> UrlRecord {
        let mut record = UrlRecord::new("http://example.com/", 0, LinkOrigin::default());
        record.set_result(if valid { "200 OK" } else { "404 Not Found" }, valid);
        record
    }

    #[test]
    fn test_record_counts() {
        let mut stats = CheckStatistics::new();

        let mut page = create_test_record(true);
        page.content_type = Some("text/html".to_string());
        page.size = Some(2048);
        page.add_warning(tags::URL_TOO_LONG, "long");
        stats.record(&page, false);

        stats.record(&create_test_record(false), false);

        let mut duplicate = create_test_record(true);
        duplicate.cached = true;
        duplicate.size = Some(4096);
        stats.record(&duplicate, false);

        assert_eq!(stats.number, 3);
        assert_eq!(stats.valid(), 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.warnings, 1);
        assert_eq!(stats.cached, 1);
        assert_eq!(stats.downloaded_bytes, 2048);
        assert_eq!(stats.content_types.get("text/html"), Some(&1));
    }

    #[test]
    fn test_exit_code() {
        let mut stats = CheckStatistics::new();
        assert_eq!(stats.exit_code(), 0);

        stats.record(&create_test_record(false), false);
        assert_eq!(stats.exit_code(), 1);

        stats.record(&create_test_record(false), true);
        assert_eq!(stats.exit_code(), 2);
        assert_eq!(stats.internal_errors, 1);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2.0KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0MiB");
    }
}
