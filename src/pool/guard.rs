//! Scoped worker ownership
//!
//! A `WorkerGuard` holds a checked-out worker for the lifetime of a
//! streaming response. Whatever ends the stream (completion, an error, or
//! the client dropping the body) the worker goes back to the pool once.

use std::sync::Arc;

use super::worker::{Worker, WorkerPool};
use crate::core::WorkerContext;

pub struct WorkerGuard {
    pool: Arc<WorkerPool>,
    worker: Option<Worker>,
    failed: bool,
}

impl WorkerGuard {
    pub fn new(pool: Arc<WorkerPool>, worker: Worker) -> Self {
        Self {
            pool,
            worker: Some(worker),
            failed: false,
        }
    }

    pub fn worker_id(&self) -> Option<u64> {
        self.worker.as_ref().map(Worker::id)
    }

    /// `None` once the guard has been finished
    pub fn context_mut(&mut self) -> Option<&mut WorkerContext> {
        self.worker.as_mut().map(Worker::context_mut)
    }

    /// Check the worker in as failed when the guard is dropped
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Take the worker back out; the guard will no longer check it in
    pub fn into_worker(mut self) -> Option<Worker> {
        self.worker.take()
    }

    /// Check the worker in now. Later calls and the drop are no-ops.
    pub fn finish(&mut self, error: bool) {
        if let Some(worker) = self.worker.take() {
            self.pool.check_in(error || self.failed, worker);
        }
    }
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        // Unwinding out of a backend call leaves the connection suspect
        let failed = self.failed || std::thread::panicking();
        self.finish(failed);
    }
}
