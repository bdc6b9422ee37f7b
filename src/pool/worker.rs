//! Worker pool
//!
//! A bounded set of backend connections. `check_out` hands one connection,
//! wrapped in a fresh `WorkerContext`, to exactly one caller; `check_in`
//! takes it back. A worker is a move-only value, so it cannot be returned
//! twice.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::errors::{PoolError, PoolResult};
use crate::connection::{Connection, ConnectionFactory};
use crate::core::WorkerContext;
use crate::observability::{log_event_with_fields, Event};

/// What `check_out` does when every worker is in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPolicy {
    /// Fail immediately with `Exhausted`
    FailFast,
    /// Wait up to the given duration, then fail with `Timeout`
    Wait(Duration),
    /// Wait until a worker is checked in
    Block,
}

impl CheckoutPolicy {
    /// `None` blocks, `Some(0)` fails fast, `Some(n)` waits n ms
    pub fn from_timeout_ms(timeout_ms: Option<u64>) -> Self {
        match timeout_ms {
            None => CheckoutPolicy::Block,
            Some(0) => CheckoutPolicy::FailFast,
            Some(ms) => CheckoutPolicy::Wait(Duration::from_millis(ms)),
        }
    }
}

/// Lifetime counters of a pool
#[derive(Debug, Default)]
pub struct PoolStats {
    checkouts: AtomicU64,
    checkins: AtomicU64,
    discarded: AtomicU64,
    created: AtomicU64,
}

/// Point-in-time copy of `PoolStats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatsSnapshot {
    pub checkouts: u64,
    pub checkins: u64,
    pub discarded: u64,
    pub created: u64,
    pub in_use: u64,
    pub idle: usize,
}

/// A checked-out connection bound to one request or stream
#[derive(Debug)]
pub struct Worker {
    id: u64,
    context: WorkerContext,
    checked_out_at: Instant,
    permit: OwnedSemaphorePermit,
}

impl Worker {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn context(&self) -> &WorkerContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut WorkerContext {
        &mut self.context
    }

    /// Time since check-out
    pub fn held_for(&self) -> Duration {
        self.checked_out_at.elapsed()
    }
}

/// Bounded connection pool
pub struct WorkerPool {
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<Vec<Box<dyn Connection>>>,
    semaphore: Arc<Semaphore>,
    policy: CheckoutPolicy,
    max_workers: usize,
    next_id: AtomicU64,
    stats: PoolStats,
    closed: AtomicBool,
}

impl WorkerPool {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        max_workers: usize,
        policy: CheckoutPolicy,
    ) -> Self {
        Self {
            factory,
            idle: Mutex::new(Vec::new()),
            semaphore: Arc::new(Semaphore::new(max_workers)),
            policy,
            max_workers,
            next_id: AtomicU64::new(1),
            stats: PoolStats::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    async fn acquire(&self) -> PoolResult<OwnedSemaphorePermit> {
        let semaphore = Arc::clone(&self.semaphore);
        match self.policy {
            CheckoutPolicy::FailFast => {
                semaphore.try_acquire_owned().map_err(|_| PoolError::Exhausted {
                    max_workers: self.max_workers,
                })
            }
            CheckoutPolicy::Wait(timeout) => {
                match tokio::time::timeout(timeout, semaphore.acquire_owned()).await {
                    Ok(permit) => permit.map_err(|_| PoolError::Closed),
                    Err(_) => Err(PoolError::Timeout {
                        waited_ms: timeout.as_millis() as u64,
                    }),
                }
            }
            CheckoutPolicy::Block => semaphore.acquire_owned().await.map_err(|_| PoolError::Closed),
        }
    }

    /// Obtain an exclusive worker according to the checkout policy
    pub async fn check_out(&self) -> PoolResult<Worker> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PoolError::Closed);
        }

        let permit = match self.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                log_event_with_fields(Event::PoolExhausted, &[("reason", &e.to_string())]);
                return Err(e);
            }
        };

        let reused = self.idle.lock().ok().and_then(|mut idle| idle.pop());
        let connection = match reused {
            Some(connection) => connection,
            None => {
                let connection = self.factory.connect()?;
                self.stats.created.fetch_add(1, Ordering::Relaxed);
                connection
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.stats.checkouts.fetch_add(1, Ordering::Relaxed);
        log_event_with_fields(Event::WorkerCheckout, &[("worker_id", &id.to_string())]);

        Ok(Worker {
            id,
            context: WorkerContext::new(connection),
            checked_out_at: Instant::now(),
            permit,
        })
    }

    /// Return a worker. `error` discards its connection instead of reusing it.
    ///
    /// A transaction still bound to the connection is rolled back first; the
    /// connection is then treated as failed.
    pub fn check_in(&self, error: bool, worker: Worker) {
        let Worker {
            id,
            context,
            permit,
            ..
        } = worker;
        let mut connection = context.into_connection();

        let mut discard = error || self.closed.load(Ordering::Acquire);
        if let Some(transaction_id) = connection.transaction_id() {
            let outcome = match connection.rollback() {
                Ok(()) => "rolled back".to_string(),
                Err(e) => e.to_string(),
            };
            log_event_with_fields(
                Event::TransactionRollback,
                &[
                    ("worker_id", &id.to_string()),
                    ("transaction_id", &transaction_id.to_string()),
                    ("outcome", &outcome),
                ],
            );
            discard = true;
        }

        self.stats.checkins.fetch_add(1, Ordering::Relaxed);
        if discard {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            log_event_with_fields(Event::WorkerDiscard, &[("worker_id", &id.to_string())]);
            drop(connection);
        } else {
            if let Ok(mut idle) = self.idle.lock() {
                idle.push(connection);
            }
            log_event_with_fields(Event::WorkerCheckin, &[("worker_id", &id.to_string())]);
        }

        // Release the slot only once the connection is back in the idle list
        drop(permit);
    }

    /// Refuse further check-outs and drop idle connections
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.semaphore.close();
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        let checkouts = self.stats.checkouts.load(Ordering::Relaxed);
        let checkins = self.stats.checkins.load(Ordering::Relaxed);
        PoolStatsSnapshot {
            checkouts,
            checkins,
            discarded: self.stats.discarded.load(Ordering::Relaxed),
            created: self.stats.created.load(Ordering::Relaxed),
            in_use: checkouts.saturating_sub(checkins),
            idle: self.idle.lock().map(|idle| idle.len()).unwrap_or(0),
        }
    }
}
