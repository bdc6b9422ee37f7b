//! Worker pool
//!
//! Exclusive, bounded checkout of backend connections for requests that
//! outlive a single call, such as archive streams and interactive sessions.

mod errors;
mod guard;
mod worker;

pub use errors::{PoolError, PoolResult};
pub use guard::WorkerGuard;
pub use worker::{CheckoutPolicy, PoolStats, PoolStatsSnapshot, Worker, WorkerPool};
