//! Human-readable text output
//!
//! Writes one block per printed record and a short summary at the end of
//! the run. Used for the console and for `text` file outputs.

use crate::checker::UrlRecord;
use crate::output::stats::{format_duration, format_size, CheckStatistics};
use crate::output::traits::{OutputResult, ResultSink};
use chrono::Local;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Width of the field label column
const LABEL_WIDTH: usize = 13;

/// Text sink writing to any byte stream
pub struct TextLogger {
    out: Box<dyn Write + Send>,
}

impl TextLogger {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Creates (or truncates) the file at `path`
    pub fn create(path: &Path) -> OutputResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(BufWriter::new(file))))
    }

    fn field(&mut self, label: &str, value: impl std::fmt::Display) -> io::Result<()> {
        writeln!(self.out, "{:<width$}{}", label, value, width = LABEL_WIDTH)
    }

    fn write_record(&mut self, record: &UrlRecord) -> io::Result<()> {
        writeln!(self.out)?;
        self.field("URL", format!("`{}'", record.base_url))?;
        if !record.name.is_empty() {
            self.field("Name", format!("`{}'", record.name))?;
        }
        if let Some(parent) = &record.parent_url {
            let mut location = parent.clone();
            if record.line > 0 {
                location.push_str(&format!(", line {}", record.line));
            }
            if record.column > 0 {
                location.push_str(&format!(", col {}", record.column));
            }
            if record.page > 0 {
                location.push_str(&format!(", page {}", record.page));
            }
            self.field("Parent URL", location)?;
        }
        if let Some(base) = &record.base_ref {
            self.field("Base", base)?;
        }
        if let Some(url) = &record.url {
            self.field("Real URL", url)?;
        }
        if let Some(title) = &record.title {
            self.field("Title", title)?;
        }
        if !record.cached {
            self.field(
                "Check time",
                format!("{:.3} seconds", record.checktime.as_secs_f64()),
            )?;
            if let Some(dltime) = record.dltime {
                self.field("D/L time", format!("{:.3} seconds", dltime.as_secs_f64()))?;
            }
        }
        if let Some(size) = record.size {
            self.field("Size", format_size(size))?;
        }
        if let Some(content_type) = &record.content_type {
            self.field("Content type", content_type)?;
        }
        if let Some(modified) = record.modified {
            self.field("Modified", modified.format("%Y-%m-%d %H:%M:%S%z"))?;
        }
        for info in &record.info {
            self.field("Info", info)?;
        }
        for warning in &record.warnings {
            self.field("Warning", format!("[{}] {}", warning.tag, warning.message))?;
        }

        let mut result = if record.valid {
            format!("Valid: {}", record.result)
        } else {
            format!("Error: {}", record.result)
        };
        if record.cached {
            result.push_str(" (cached)");
        }
        self.field("Result", result)
    }
}

impl ResultSink for TextLogger {
    fn name(&self) -> &str {
        "text"
    }

    fn start_output(&mut self) -> OutputResult<()> {
        writeln!(self.out, "linkgauge {}", env!("CARGO_PKG_VERSION"))?;
        writeln!(
            self.out,
            "Start checking at {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%z")
        )?;
        Ok(())
    }

    fn log_filter_url(&mut self, record: &UrlRecord, do_print: bool) -> OutputResult<()> {
        if do_print {
            self.write_record(record)?;
        }
        Ok(())
    }

    fn end_output(&mut self, stats: &CheckStatistics) -> OutputResult<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "That's it. {} links checked. {} warnings found. {} errors found.",
            stats.number, stats.warnings, stats.errors
        )?;
        if stats.internal_errors > 0 {
            writeln!(
                self.out,
                "There were {} internal errors.",
                stats.internal_errors
            )?;
        }
        writeln!(
            self.out,
            "Stopped checking at {} ({})",
            Local::now().format("%Y-%m-%d %H:%M:%S%z"),
            format_duration(stats.elapsed)
        )?;
        self.out.flush()?;
        Ok(())
    }
}
