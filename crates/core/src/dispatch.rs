//! Target queues for notification delivery.
//!
//! A `Dispatcher` is a FIFO of tasks. A manual dispatcher is drained by
//! whichever thread calls [`Dispatcher::run_pending`], which lets a thread own
//! its notifications the way a run loop would. A spawned dispatcher drains
//! itself on a dedicated worker thread until [`Dispatcher::shutdown`].

use crate::error::{Error, Result};
use core::fmt;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use tracing::{debug, trace};

/// A unit of work posted to a dispatcher.
pub type Task = Box<dyn FnOnce() + Send>;

struct QueueState {
    tasks: VecDeque<Task>,
    shutdown: bool,
}

struct DispatcherInner {
    label: String,
    state: Mutex<QueueState>,
    ready: Condvar,
}

/// A FIFO task queue that notifications can be delivered on.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    /// Creates a dispatcher drained manually with `run_pending`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                label: label.into(),
                state: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    shutdown: false,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Creates a dispatcher drained by its own worker thread.
    pub fn spawn(label: impl Into<String>) -> Result<Self> {
        let dispatcher = Self::new(label);
        let worker = dispatcher.clone();
        thread::Builder::new()
            .name(dispatcher.inner.label.clone())
            .spawn(move || worker.run_worker())
            .map_err(|e| Error::invalid_operation(format!("failed to spawn dispatcher: {}", e)))?;
        debug!(label = %dispatcher.inner.label, "spawned dispatcher worker");
        Ok(dispatcher)
    }

    /// Returns the dispatcher label.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Enqueues a task. Tasks posted after shutdown are discarded.
    pub fn post(&self, task: Task) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            trace!(label = %self.inner.label, "dropping task posted after shutdown");
            return;
        }
        state.tasks.push_back(task);
        drop(state);
        self.inner.ready.notify_one();
    }

    /// Runs every task queued at the time of the call, plus any task those
    /// tasks enqueue, on the calling thread. Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut count = 0;
        loop {
            let task = self.inner.state.lock().tasks.pop_front();
            match task {
                Some(task) => {
                    task();
                    count += 1;
                }
                None => return count,
            }
        }
    }

    /// Returns the number of queued tasks.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().tasks.len()
    }

    /// Stops accepting tasks and wakes the worker thread, if any. Queued
    /// tasks are discarded.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.shutdown = true;
        state.tasks.clear();
        drop(state);
        self.inner.ready.notify_all();
    }

    /// Returns true if both handles refer to the same queue.
    pub fn same_queue(&self, other: &Dispatcher) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn run_worker(&self) {
        loop {
            let task = {
                let mut state = self.inner.state.lock();
                loop {
                    if state.shutdown {
                        debug!(label = %self.inner.label, "dispatcher worker stopped");
                        return;
                    }
                    if let Some(task) = state.tasks.pop_front() {
                        break task;
                    }
                    self.inner.ready.wait(&mut state);
                }
            };
            task();
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("label", &self.inner.label)
            .field("pending", &self.pending())
            .finish()
    }
}
