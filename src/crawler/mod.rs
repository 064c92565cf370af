//! Crawler module: the concurrent checking core
//!
//! This module contains the coordination logic of a run, including:
//! - Deduplicating checks by cache key
//! - Bounding the number of concurrently running checks
//! - Driving the control loop until every admitted URL is logged
//! - Periodic progress reporting

mod cache;
mod consumer;
mod pool;
mod queue;
mod status;

pub use cache::{Admission, KeyState, UrlCache};
pub use consumer::{Consumer, StopReason};
pub use pool::{Job, PoolClosed, WorkerPool};
pub use queue::{QueueClosed, WorkQueue};
pub use status::{Progress, StatusReporter};

use crate::checker::CheckContext;
use crate::config::Config;
use crate::output::{sinks_from_config, CheckStatistics};
use std::sync::Arc;
use url::Url;

/// Runs a complete check of `seeds` with sinks built from the configuration
///
/// This is the library entry point behind the binary. It will:
/// 1. Build the check context (HTTP client, filters, error table)
/// 2. Open every configured result sink
/// 3. Admit the seeds and run the control loop to completion
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `seeds` - Absolute seed URLs
///
/// # Returns
///
/// * `Ok(CheckStatistics)` - The run finished (possibly aborted)
/// * `Err(LinkError)` - Setup failed before any URL was checked
pub fn check(config: Arc<Config>, seeds: &[Url]) -> crate::Result<CheckStatistics> {
    let consumer = prepare(config, seeds)?;
    Ok(consumer.run())
}

/// Builds a consumer with all seeds admitted, ready to [`run`](Consumer::run)
pub fn prepare(config: Arc<Config>, seeds: &[Url]) -> crate::Result<Consumer> {
    let ctx = CheckContext::new(Arc::clone(&config), seeds)?;
    let sinks = sinks_from_config(&config)?;
    let consumer = Consumer::new(ctx, sinks)?;
    for seed in seeds {
        consumer.add_seed(seed.as_str());
    }
    Ok(consumer)
}
