//! Bounded pool of worker threads
//!
//! A fixed number of named OS threads take jobs from a [`WorkQueue`].
//! [`WorkerPool::start_thread`] blocks the caller while every slot is busy,
//! so at most `threads` checks run at once. With zero threads every job
//! runs synchronously in the caller's thread.

use crate::crawler::queue::WorkQueue;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// A unit of work run on a worker thread
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Returned by [`WorkerPool::start_thread`] once the pool stopped admitting
/// work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolClosed;

impl fmt::Display for PoolClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("worker pool is shutting down")
    }
}

impl std::error::Error for PoolClosed {}

struct Task {
    name: String,
    job: Job,
}

#[derive(Debug, Default)]
struct Slots {
    active: usize,
    closed: bool,
}

/// Slot accounting shared with the worker threads
#[derive(Debug, Default)]
struct SlotState {
    slots: Mutex<Slots>,
    changed: Condvar,
}

impl SlotState {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut slots = self.lock();
        slots.active = slots.active.saturating_sub(1);
        drop(slots);
        self.changed.notify_all();
    }
}

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    threads: usize,
    queue: Arc<WorkQueue<Task>>,
    state: Arc<SlotState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Creates a pool and spawns its worker threads
    ///
    /// # Arguments
    ///
    /// * `threads` - Number of workers; 0 runs every job in the caller's thread
    ///
    /// # Returns
    ///
    /// * `Ok(WorkerPool)` - All workers started
    /// * `Err(std::io::Error)` - The OS refused to spawn a thread
    pub fn new(threads: usize) -> std::io::Result<Self> {
        let queue = Arc::new(WorkQueue::new());
        let state = Arc::new(SlotState::default());

        let mut workers = Vec::with_capacity(threads);
        for id in 0..threads {
            let queue = Arc::clone(&queue);
            let state = Arc::clone(&state);
            let handle = thread::Builder::new()
                .name(format!("linkgauge-worker-{}", id))
                .spawn(move || worker_loop(&queue, &state))?;
            workers.push(handle);
        }

        tracing::debug!("Started worker pool with {} threads", threads);
        Ok(Self {
            threads,
            queue,
            state,
            workers: Mutex::new(workers),
        })
    }

    /// Runs `job` on a free worker, waiting for a slot if all are busy
    ///
    /// In synchronous mode the job has run when this returns.
    pub fn start_thread(&self, job: Job, name: &str) -> Result<(), PoolClosed> {
        let mut slots = self.state.lock();

        if self.threads == 0 {
            if slots.closed {
                return Err(PoolClosed);
            }
            slots.active += 1;
            drop(slots);
            run_task(Task {
                name: name.to_string(),
                job,
            });
            self.state.release();
            return Ok(());
        }

        while slots.active >= self.threads && !slots.closed {
            slots = self
                .state
                .changed
                .wait(slots)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if slots.closed {
            return Err(PoolClosed);
        }
        slots.active += 1;
        drop(slots);

        let task = Task {
            name: name.to_string(),
            job,
        };
        if self.queue.put(task).is_err() {
            self.state.release();
            return Err(PoolClosed);
        }
        Ok(())
    }

    /// Number of jobs currently running
    pub fn active_threads(&self) -> usize {
        self.state.lock().active
    }

    /// True when no job is running
    pub fn finished(&self) -> bool {
        self.active_threads() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Stops admitting work and wakes callers blocked in `start_thread`
    pub fn close_admission(&self) {
        self.state.lock().closed = true;
        self.state.changed.notify_all();
    }

    /// Shuts the pool down, waiting at most `timeout` for running jobs
    ///
    /// Workers still busy after the timeout are abandoned; they exit on
    /// their own once their job returns.
    ///
    /// # Returns
    ///
    /// `true` when every job finished in time and all workers were joined
    pub fn finish(&self, timeout: Duration) -> bool {
        self.close_admission();
        self.queue.close();

        let deadline = Instant::now() + timeout;
        let mut slots = self.state.lock();
        while slots.active > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, _) = self
                .state
                .changed
                .wait_timeout(slots, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slots = guard;
        }
        let remaining = slots.active;
        drop(slots);

        if remaining > 0 {
            tracing::warn!(
                "{} threads did not finish within {:?}; results are incomplete",
                remaining,
                timeout
            );
            return false;
        }

        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in workers {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked outside of a job");
            }
        }
        true
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("active", &self.active_threads())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.queue.close();
    }
}

fn worker_loop(queue: &WorkQueue<Task>, state: &SlotState) {
    while let Some(task) = queue.get() {
        run_task(task);
        state.release();
    }
}

fn run_task(task: Task) {
    let span = tracing::debug_span!("check", url = %task.name);
    let _entered = span.enter();

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task.job)) {
        tracing::error!("Job panicked: {}", panic_message(payload.as_ref()));
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
