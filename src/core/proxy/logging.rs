//! Logging Proxy
//!
//! Records every operation that passed authorization and validation:
//! one log line with the outcome and duration, plus counters.

use std::sync::Arc;

use crate::core::context::WorkerContext;
use crate::core::operation::{Operation, OperationOutput};
use crate::core::pipeline::{Next, OperationFuture, OperationResult, Proxy};
use crate::observability::{Event, Logger, MetricsRegistry};

/// Operation log and metrics
pub struct LoggingProxy {
    metrics: Arc<MetricsRegistry>,
}

impl LoggingProxy {
    pub fn new(metrics: Arc<MetricsRegistry>) -> Self {
        Self { metrics }
    }

    fn record(&self, op: &Operation, result: &OperationResult) {
        match (op, result) {
            (Operation::Read(_), Ok(OperationOutput::Bytes(bytes))) => {
                self.metrics.add_bytes_read(bytes.len() as u64)
            }
            (Operation::Write(write), Ok(_)) => {
                self.metrics.add_bytes_written(write.data.len() as u64)
            }
            (Operation::Begin { .. }, Ok(_)) => self.metrics.increment_transactions_begun(),
            (Operation::Commit, Ok(_)) => self.metrics.increment_transactions_committed(),
            (Operation::Rollback, Ok(_)) => self.metrics.increment_transactions_rolled_back(),
            _ => {}
        }

        match result {
            Ok(_) => self.metrics.increment_operations_executed(),
            // Counted once by the chain
            Err(e) if e.is_rejection() => {}
            Err(_) => self.metrics.increment_operations_failed(),
        }
    }
}

fn transaction_event(op: &Operation) -> Option<Event> {
    match op {
        Operation::Begin { .. } => Some(Event::TransactionBegin),
        Operation::Prepare => Some(Event::TransactionPrepare),
        Operation::Commit => Some(Event::TransactionCommit),
        Operation::Rollback => Some(Event::TransactionRollback),
        Operation::Recover => Some(Event::TransactionRecover),
        _ => None,
    }
}

impl Proxy for LoggingProxy {
    fn process<'a>(
        &'a self,
        op: &'a Operation,
        ctx: &'a mut WorkerContext,
        next: Next<'a>,
    ) -> OperationFuture<'a> {
        Box::pin(async move {
            // Begin binds the id only after it runs; capture it up front
            let transaction_id = match op {
                Operation::Begin { transaction_id } => Some(*transaction_id),
                _ => ctx.transaction_id,
            };

            let result = next.run(op, ctx).await;
            self.record(op, &result);

            let request_id = ctx.request_id.to_string();
            let transaction = transaction_id.map(|id| id.to_string()).unwrap_or_default();
            let duration = ctx.elapsed_ms().to_string();
            let owner = op.owner().unwrap_or("");
            let mut fields = vec![
                ("request_id", request_id.as_str()),
                ("operation", op.name()),
                ("owner", owner),
                ("transaction_id", transaction.as_str()),
                ("duration_ms", duration.as_str()),
            ];

            match &result {
                Ok(_) => {
                    let event = transaction_event(op).unwrap_or(Event::OperationExecuted);
                    Logger::info(event.as_str(), &fields);
                }
                Err(e) => {
                    let message = e.to_string();
                    fields.push(("error", message.as_str()));
                    Logger::warn(Event::OperationFailed.as_str(), &fields);
                }
            }

            result
        })
    }
}
