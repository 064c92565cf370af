//! Output module for reporting finished checks
//!
//! This module handles:
//! - Fanning each finished record out to every configured sink
//! - Deciding which records are printed (invalid, warned, or verbose)
//! - Recording run statistics

mod blacklist;
mod csv_output;
mod graph;
mod sqlite_output;
pub mod stats;
mod text;
mod traits;

pub use blacklist::BlacklistLogger;
pub use csv_output::CsvLogger;
pub use graph::{GraphFormat, GraphLogger};
pub use sqlite_output::SqlLogger;
pub use stats::{print_statistics, CheckStatistics};
pub use text::TextLogger;
pub use traits::{OutputError, OutputResult, ResultSink};

use crate::checker::{tags, UrlRecord};
use crate::config::{Config, ConsoleFormat, SinkKind};
use std::borrow::Cow;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Creates the file sink for one `[[output.file]]` entry
///
/// # Arguments
///
/// * `kind` - The output format
/// * `path` - Destination file
///
/// # Returns
///
/// * `Ok(Box<dyn ResultSink>)` - The sink, with its file created or opened
/// * `Err(OutputError)` - The destination could not be opened
pub fn create_sink(kind: SinkKind, path: &Path) -> OutputResult<Box<dyn ResultSink>> {
    let sink: Box<dyn ResultSink> = match kind {
        SinkKind::Text => Box::new(TextLogger::create(path)?),
        SinkKind::Csv => Box::new(CsvLogger::create(path)?),
        SinkKind::Sql => Box::new(SqlLogger::open(path)?),
        SinkKind::Blacklist => Box::new(BlacklistLogger::new(path)),
        SinkKind::Dot => Box::new(GraphLogger::new(path, GraphFormat::Dot)),
        SinkKind::Gml => Box::new(GraphLogger::new(path, GraphFormat::Gml)),
    };
    Ok(sink)
}

/// Creates the console sink and every file sink named by the configuration
pub fn sinks_from_config(config: &Config) -> OutputResult<Vec<Box<dyn ResultSink>>> {
    let mut sinks: Vec<Box<dyn ResultSink>> = Vec::new();

    if !config.output.quiet {
        match config.output.console {
            ConsoleFormat::Text => sinks.push(Box::new(TextLogger::stdout())),
            ConsoleFormat::Csv => sinks.push(Box::new(CsvLogger::stdout())),
            ConsoleFormat::None => {}
        }
    }
    for file in &config.output.file {
        tracing::debug!("Writing {} output to {}", file.kind, file.path);
        sinks.push(create_sink(file.kind, Path::new(&file.path))?);
    }
    Ok(sinks)
}

struct DispatchState {
    sinks: Vec<Box<dyn ResultSink>>,
    stats: CheckStatistics,
    started: bool,
    ended: bool,
}

/// Fans finished records out to the sinks and keeps statistics
///
/// Safe to call from any worker thread; sinks see one record at a time.
pub struct LogDispatch {
    state: Mutex<DispatchState>,
    verbose: bool,
    warnings: bool,
    ignore_warnings: Vec<String>,
    started_at: Instant,
}

/// Configured ignore list; an enabled anchor check is never silenced
fn ignored_warning_tags(config: &Config) -> Vec<String> {
    let mut ignored = config.filtering.ignore_warnings.clone();
    if config.checking.anchors {
        ignored.retain(|tag| tag != tags::URL_ANCHOR_NOT_FOUND);
    }
    ignored
}

impl LogDispatch {
    /// Creates a dispatcher over `sinks`, filtering as `config.output` says
    pub fn new(config: &Config, sinks: Vec<Box<dyn ResultSink>>) -> Self {
        Self {
            state: Mutex::new(DispatchState {
                sinks,
                stats: CheckStatistics::new(),
                started: false,
                ended: false,
            }),
            verbose: config.output.verbose,
            warnings: config.output.warnings,
            ignore_warnings: ignored_warning_tags(config),
            started_at: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether sinks should print `record`
    pub fn do_print(&self, record: &UrlRecord) -> bool {
        self.verbose || !record.valid || (self.warnings && !record.warnings.is_empty())
    }

    /// Calls `start_output` on every sink, once
    pub fn start_output(&self) {
        let mut state = self.lock();
        if state.started {
            return;
        }
        state.started = true;
        for sink in state.sinks.iter_mut() {
            if let Err(e) = sink.start_output() {
                tracing::warn!("Output {} failed to start: {}", sink.name(), e);
            }
        }
    }

    /// Hands one finished record to every sink
    ///
    /// Records arriving after [`end_output`](Self::end_output) are dropped.
    ///
    /// # Arguments
    ///
    /// * `record` - The finished record
    /// * `internal` - Whether the record carries an internal error
    pub fn log_url(&self, record: &UrlRecord, internal: bool) {
        let record = if self.ignore_warnings.is_empty() {
            Cow::Borrowed(record)
        } else {
            let mut filtered = record.clone();
            filtered.drop_ignored_warnings(&self.ignore_warnings);
            Cow::Owned(filtered)
        };
        let do_print = self.do_print(&record);

        let mut state = self.lock();
        if state.ended {
            tracing::debug!("Dropping {} logged after end of output", record.display_url());
            return;
        }
        state.stats.record(&record, internal);
        for sink in state.sinks.iter_mut() {
            if let Err(e) = sink.log_filter_url(&record, do_print) {
                tracing::warn!(
                    "Output {} failed for {}: {}",
                    sink.name(),
                    record.display_url(),
                    e
                );
            }
        }
    }

    /// Calls `end_output` on every sink, once, and returns the final
    /// statistics
    pub fn end_output(&self) -> CheckStatistics {
        let mut state = self.lock();
        if state.ended {
            return state.stats.clone();
        }
        state.ended = true;
        state.stats.elapsed = self.started_at.elapsed();

        let DispatchState { sinks, stats, .. } = &mut *state;
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.end_output(stats) {
                tracing::warn!("Output {} failed to finish: {}", sink.name(), e);
            }
        }
        stats.clone()
    }

    /// Current statistics
    pub fn statistics(&self) -> CheckStatistics {
        let state = self.lock();
        let mut stats = state.stats.clone();
        if !state.ended {
            stats.elapsed = self.started_at.elapsed();
        }
        stats
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }
}
