use crate::protocol::{ErrorMessage, ProcessComplete, StepUpdate};

/// Receives the events of one processing run, in delivery order.
///
/// Callbacks run on the dispatch task, never on the transport read loop.
/// Implementations should return quickly.
pub trait TaskHandler: Send + Sync {
    /// Called for every step update, whatever its status.
    fn on_step_update(&self, step: &StepUpdate);

    /// Called once when the upstream reports the run finished.
    fn on_process_complete(&self, message: &ProcessComplete);

    /// Called once when the upstream reports the run failed.
    fn on_error(&self, message: &ErrorMessage);

    fn on_connection_open(&self) {}

    fn on_connection_close(&self) {}
}

/// Handler that ignores every event.
pub struct NoopHandler;

impl TaskHandler for NoopHandler {
    fn on_step_update(&self, _step: &StepUpdate) {}
    fn on_process_complete(&self, _message: &ProcessComplete) {}
    fn on_error(&self, _message: &ErrorMessage) {}
}
