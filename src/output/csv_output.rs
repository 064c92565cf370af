//! Semicolon-separated output with one row per printed record

use crate::checker::UrlRecord;
use crate::output::stats::CheckStatistics;
use crate::output::traits::{OutputResult, ResultSink};
use csv::{Writer, WriterBuilder};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

const COLUMNS: [&str; 17] = [
    "urlname",
    "parentname",
    "baseref",
    "result",
    "warningstring",
    "infostring",
    "valid",
    "url",
    "line",
    "column",
    "name",
    "dltime",
    "size",
    "checktime",
    "cached",
    "level",
    "modified",
];

/// CSV sink
pub struct CsvLogger {
    writer: Writer<Box<dyn Write + Send>>,
}

impl CsvLogger {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        let writer = WriterBuilder::new().delimiter(b';').from_writer(out);
        Self { writer }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Creates (or truncates) the file at `path`
    pub fn create(path: &Path) -> OutputResult<Self> {
        let file = File::create(path)?;
        Ok(Self::new(Box::new(io::BufWriter::new(file))))
    }
}

fn row(record: &UrlRecord) -> Vec<String> {
    let warnings: Vec<String> = record
        .warnings
        .iter()
        .map(|w| format!("[{}] {}", w.tag, w.message))
        .collect();
    vec![
        record.base_url.clone(),
        record.parent_url.clone().unwrap_or_default(),
        record.base_ref.clone().unwrap_or_default(),
        record.result.clone(),
        warnings.join("\n"),
        record.info.join("\n"),
        record.valid.to_string(),
        record.url.clone().unwrap_or_default(),
        record.line.to_string(),
        record.column.to_string(),
        record.name.clone(),
        record
            .dltime
            .map(|d| format!("{:.3}", d.as_secs_f64()))
            .unwrap_or_default(),
        record.size.map(|s| s.to_string()).unwrap_or_default(),
        format!("{:.3}", record.checktime.as_secs_f64()),
        record.cached.to_string(),
        record.recursion_level.to_string(),
        record.modified.map(|m| m.to_rfc3339()).unwrap_or_default(),
    ]
}

impl ResultSink for CsvLogger {
    fn name(&self) -> &str {
        "csv"
    }

    fn start_output(&mut self) -> OutputResult<()> {
        self.writer.write_record(COLUMNS)?;
        Ok(())
    }

    fn log_filter_url(&mut self, record: &UrlRecord, do_print: bool) -> OutputResult<()> {
        if do_print {
            self.writer.write_record(row(record))?;
        }
        Ok(())
    }

    fn end_output(&mut self, _stats: &CheckStatistics) -> OutputResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
