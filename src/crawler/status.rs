//! Periodic progress logging while a run is in progress

use crate::output::stats::format_duration;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Snapshot of a run's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub queued: usize,
    pub checked: u64,
    pub active: usize,
    pub elapsed: Duration,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} URLs queued, {} links checked, {} active threads, runtime {}",
            self.queued,
            self.checked,
            self.active,
            format_duration(self.elapsed)
        )
    }
}

/// Background thread logging a [`Progress`] line at a fixed interval
///
/// Stops when [`stop`](Self::stop) is called or the reporter is dropped.
pub struct StatusReporter {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusReporter {
    /// Starts the reporter thread
    ///
    /// # Arguments
    ///
    /// * `interval` - Time between two progress lines
    /// * `probe` - Produces the current progress
    pub fn spawn<F>(interval: Duration, probe: F) -> std::io::Result<Self>
    where
        F: Fn() -> Progress + Send + 'static,
    {
        let (stop, stopped) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("linkgauge-status".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tracing::info!("{}", probe()),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stops the reporter and waits for its thread
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
