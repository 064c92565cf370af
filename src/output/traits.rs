//! Result sink trait and output errors
//!
//! Every output format implements [`ResultSink`]. Sinks are driven by the
//! dispatcher from whichever thread finished a check, one record at a time,
//! and only ever see finished records.

use crate::checker::UrlRecord;
use crate::output::stats::CheckStatistics;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Consumer of finished check records
///
/// The dispatcher calls `start_output` once, then `log_filter_url` once per
/// finished record, then `end_output` once.
pub trait ResultSink: Send {
    /// Short name used in diagnostics
    fn name(&self) -> &str;

    /// Writes headers or opens resources
    fn start_output(&mut self) -> OutputResult<()> {
        Ok(())
    }

    /// Receives one finished record
    ///
    /// # Arguments
    ///
    /// * `record` - The finished record
    /// * `do_print` - Whether the record passes the output filter (invalid,
    ///   has warnings, or verbose output is on). Sinks that keep a complete
    ///   projection, such as graphs and databases, may ignore it.
    fn log_filter_url(&mut self, record: &UrlRecord, do_print: bool) -> OutputResult<()>;

    /// Writes trailers and flushes
    ///
    /// # Arguments
    ///
    /// * `stats` - Totals for the whole run
    fn end_output(&mut self, stats: &CheckStatistics) -> OutputResult<()>;
}
