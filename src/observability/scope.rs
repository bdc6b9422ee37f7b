//! ObservationScope for start/complete logging around long-running work
//!
//! - Logs the start event on creation
//! - Logs the complete event on `complete()`
//! - Logs the abort event on `fail()` or on drop without completion

use super::events::Event;
use super::logger::Logger;

/// Scope that brackets a unit of work with lifecycle events
///
/// Owned and `Send`, so it can live inside a response stream.
#[derive(Debug)]
pub struct ObservationScope {
    complete_event: Event,
    abort_event: Event,
    fields: Vec<(&'static str, String)>,
    completed: bool,
}

impl ObservationScope {
    /// Logs `start` immediately
    pub fn new(
        start: Event,
        complete_event: Event,
        abort_event: Event,
        fields: Vec<(&'static str, String)>,
    ) -> Self {
        let scope = Self {
            complete_event,
            abort_event,
            fields,
            completed: false,
        };
        Logger::info(start.as_str(), &scope.field_refs());
        scope
    }

    fn field_refs(&self) -> Vec<(&str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    /// Mark the scope as successfully completed
    pub fn complete(mut self, extra_fields: &[(&str, &str)]) {
        self.completed = true;
        let mut fields = self.field_refs();
        fields.extend(extra_fields.iter().copied());
        Logger::info(self.complete_event.as_str(), &fields);
    }

    /// Mark the scope as failed with a reason
    pub fn fail(mut self, reason: &str) {
        self.completed = true;
        let mut fields = self.field_refs();
        fields.push(("reason", reason));
        Logger::error(self.abort_event.as_str(), &fields);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.completed {
            let mut fields = self.field_refs();
            fields.push(("reason", "dropped before completion"));
            Logger::warn(self.abort_event.as_str(), &fields);
        }
    }
}
