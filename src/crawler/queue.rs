//! Thread-safe FIFO handing jobs to worker threads
//!
//! Built on an unbounded crossbeam channel: every item is received by
//! exactly one worker. Closing the queue drops the sender, which lets idle
//! workers drain what is left and exit.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

/// Returned by [`WorkQueue::put`] after the queue was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

/// Multi-producer, multi-consumer FIFO
#[derive(Debug)]
pub struct WorkQueue<T> {
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    /// Appends an item, failing once the queue is closed
    pub fn put(&self, item: T) -> Result<(), QueueClosed> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.send(item).map_err(|_| QueueClosed),
            None => Err(QueueClosed),
        }
    }

    /// Blocks until an item is available
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn get(&self) -> Option<T> {
        self.receiver.recv().ok()
    }

    /// Stops accepting items; queued items can still be taken
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
