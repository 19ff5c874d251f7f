//! Shared work queue with a drain barrier
//!
//! An empty channel does not mean the work is done: a worker may have taken
//! the last path and still be evaluating it. The queue therefore counts
//! outstanding items separately. A path is only acknowledged when the
//! [`Ticket`] handed out with it is dropped, after the worker has merged its
//! outcome (or while unwinding).

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

enum Message {
    File(PathBuf),
    Shutdown,
}

#[derive(Default)]
struct DrainState {
    outstanding: Mutex<u64>,
    drained: Condvar,
}

impl DrainState {
    fn add_one(&self) {
        let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        *outstanding += 1;
    }

    fn complete_one(&self) {
        let mut outstanding = self.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.drained.notify_all();
        }
    }
}

/// Multi-consumer queue of file paths.
///
/// Cloning shares the same channel and counter.
#[derive(Clone)]
pub struct WorkQueue {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    drain: Arc<DrainState>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx,
            rx,
            drain: Arc::new(DrainState::default()),
        }
    }

    /// Enqueue a path. It counts as outstanding until its ticket drops.
    pub fn push(&self, path: PathBuf) {
        self.drain.add_one();
        // The queue owns a receiver, so the channel cannot be disconnected
        if self.tx.send(Message::File(path)).is_err() {
            self.drain.complete_one();
        }
    }

    /// Block until a path or a shutdown signal arrives.
    ///
    /// Returns `None` on shutdown.
    pub fn next(&self) -> Option<Ticket> {
        match self.rx.recv() {
            Ok(Message::File(path)) => Some(Ticket {
                path,
                drain: Arc::clone(&self.drain),
            }),
            Ok(Message::Shutdown) | Err(_) => None,
        }
    }

    /// Paths enqueued but not yet acknowledged
    pub fn outstanding(&self) -> u64 {
        *self.drain.outstanding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until every enqueued path has been acknowledged.
    ///
    /// Only meaningful once the producer has stopped pushing.
    pub fn wait_drained(&self) {
        let outstanding = self.drain.outstanding.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self
            .drain
            .drained
            .wait_while(outstanding, |n| *n > 0)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Send one shutdown signal per worker.
    pub fn shutdown(&self, workers: usize) {
        for _ in 0..workers {
            let _ = self.tx.send(Message::Shutdown);
        }
    }
}

/// A dequeued path; dropping it acknowledges the path to the drain barrier.
pub struct Ticket {
    path: PathBuf,
    drain: Arc<DrainState>,
}

impl Ticket {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.drain.complete_one();
    }
}
