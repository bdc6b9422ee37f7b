//! Observability subsystem
//!
//! - Named lifecycle events (`Event`)
//! - Event-oriented logging facade over `tracing` (`Logger`)
//! - Operational counters (`MetricsRegistry`)
//! - Start/complete bracketing for long-running work (`ObservationScope`)
//!
//! # Usage
//!
//! ```ignore
//! use afsgate::observability::{Logger, Event, MetricsRegistry};
//!
//! Logger::info(Event::WorkerCheckout.as_str(), &[("worker_id", "3")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_operations_executed();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{init, render_fields, LogFormat, Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event, at WARN for failure events
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    if event.is_failure() {
        Logger::warn(event.as_str(), fields);
    } else {
        Logger::info(event.as_str(), fields);
    }
}
