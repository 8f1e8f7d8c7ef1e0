//! Bounded FIFO execution of operations.
//!
//! # Design
//! The pending deque and the running map are the only shared mutable state
//! in the pipeline, and both live behind one mutex. Admission happens only
//! while holding it, so `running.len() <= max_concurrent` holds under any
//! interleaving of submit, cancel, and completion.
//!
//! Every admitted operation runs as its own Tokio task. The task owns a
//! `Release` guard that frees the running slot and admits the next pending
//! operation when the task ends for any reason, including cancellation.
//! Operations cancelled while still queued are dropped lazily when they
//! reach the front.
//!
//! Lock order is queue, then operation. Operation code never calls back into
//! the queue while holding its own lock.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::http::Transport;
use crate::model::Model;
use crate::operation::{Job, Operation, OperationId};

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Arc<dyn Job>>,
    running: HashMap<OperationId, Arc<dyn Job>>,
}

struct QueueInner {
    max_concurrent: usize,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    state: Mutex<QueueState>,
}

/// Runs operations with at most `max_concurrent` in flight. Cheap to clone.
#[derive(Clone)]
pub struct OperationQueue {
    inner: Arc<QueueInner>,
}

impl fmt::Debug for OperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("OperationQueue")
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("pending", &state.pending.len())
            .field("running", &state.running.len())
            .field("transport", &self.inner.transport)
            .finish()
    }
}

impl OperationQueue {
    /// Create a queue on the current Tokio runtime.
    pub fn new(max_concurrent: usize, transport: Arc<dyn Transport>) -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|e| ClientError::NoRuntime(e.to_string()))?;
        Self::with_runtime(max_concurrent, transport, runtime)
    }

    /// Create a queue that spawns its work on `runtime`.
    pub fn with_runtime(
        max_concurrent: usize,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Result<Self, ClientError> {
        if max_concurrent == 0 {
            return Err(ClientError::InvalidConcurrency);
        }
        Ok(Self {
            inner: Arc::new(QueueInner {
                max_concurrent,
                transport,
                runtime,
                state: Mutex::new(QueueState::default()),
            }),
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub fn running_count(&self) -> usize {
        self.inner.state.lock().running.len()
    }

    /// Queued entries not yet admitted, including cancelled ones not yet skipped.
    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Enqueue an operation; it starts as soon as a slot is free.
    pub fn submit<T: Model>(&self, operation: &Operation<T>) -> Result<(), ClientError> {
        if !operation.mark_submitted() {
            return Err(ClientError::AlreadySubmitted(operation.id()));
        }
        {
            let mut state = self.inner.state.lock();
            state.pending.push_back(Arc::new(operation.clone()));
            debug!(
                id = %operation.id(),
                url = %operation.request().url,
                pending = state.pending.len(),
                "operation submitted"
            );
        }
        self.inner.pump();
        Ok(())
    }

    /// Cancel one operation. Returns false if it had already finished.
    pub fn cancel<T: Model>(&self, operation: &Operation<T>) -> bool {
        let cancelled = operation.cancel();
        let id = operation.id();
        self.inner.state.lock().pending.retain(|job| job.id() != id);
        cancelled
    }

    /// Cancel every pending and running operation.
    pub fn cancel_all(&self) {
        let (pending, running): (Vec<_>, Vec<_>) = {
            let mut state = self.inner.state.lock();
            (
                state.pending.drain(..).collect(),
                state.running.values().cloned().collect(),
            )
        };
        let cancelled = pending
            .iter()
            .chain(running.iter())
            .filter(|job| job.cancel())
            .count();
        info!(
            pending = pending.len(),
            running = running.len(),
            cancelled,
            "cancelled all operations"
        );
    }
}

impl QueueInner {
    /// Admit pending operations while there is capacity, then start them.
    fn pump(self: &Arc<Self>) {
        let admitted = {
            let mut state = self.state.lock();
            let mut admitted = Vec::new();
            while state.running.len() < self.max_concurrent {
                let Some(job) = state.pending.pop_front() else {
                    break;
                };
                if !job.admit() {
                    debug!(id = %job.id(), "skipping cancelled operation");
                    continue;
                }
                state.running.insert(job.id(), Arc::clone(&job));
                admitted.push(job);
            }
            if !admitted.is_empty() {
                debug!(
                    admitted = admitted.len(),
                    running = state.running.len(),
                    pending = state.pending.len(),
                    "operations admitted"
                );
            }
            admitted
        };

        for job in admitted {
            let release = Release {
                queue: Arc::clone(self),
                id: job.id(),
            };
            let work = job.run(Arc::clone(&self.transport));
            self.runtime.spawn(async move {
                let _release = release;
                work.await;
            });
        }
    }

    fn release(self: &Arc<Self>, id: OperationId) {
        self.state.lock().running.remove(&id);
        self.pump();
    }
}

/// Frees a running slot when its task ends, however it ends.
struct Release {
    queue: Arc<QueueInner>,
    id: OperationId,
}

impl Drop for Release {
    fn drop(&mut self) {
        self.queue.release(self.id);
    }
}
