//! Process-wide analysis state with change notification.

pub mod listeners;
pub mod state;

use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::sync::{read, write};

pub use listeners::Unsubscribe;
pub use state::{GlobalState, InputData, ProcessingStep, StateSnapshot};

use listeners::ListenerRegistry;

/// Holds the latest run's steps and result.
///
/// Every mutating call applies its change under the write lock, takes a
/// snapshot, releases the lock and then notifies each listener exactly once
/// with that snapshot. Snapshots carry a revision so listeners on other
/// threads can discard stale deliveries. Listeners may read the store but
/// must not expect their own mutations to be delivered before they return.
pub struct AnalysisStore {
    state: RwLock<StateSnapshot>,
    listeners: Arc<ListenerRegistry>,
}

impl AnalysisStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StateSnapshot::default()),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    fn mutate<F>(&self, apply: F)
    where
        F: FnOnce(&mut GlobalState),
    {
        let snapshot = {
            let mut guard = write(&self.state, "Analysis store");
            apply(&mut guard.state);
            guard.revision += 1;
            guard.clone()
        };
        self.listeners.notify(&snapshot);
    }

    /// Stores the final result and marks the analysis complete.
    pub fn set_analysis_result(&self, result: Value) {
        self.mutate(|state| {
            state.analysis_result = Some(result);
            state.is_analysis_complete = true;
        });
    }

    pub fn analysis_result(&self) -> Option<Value> {
        read(&self.state, "Analysis store").state.analysis_result.clone()
    }

    pub fn has_analysis_result(&self) -> bool {
        read(&self.state, "Analysis store")
            .state
            .analysis_result
            .is_some()
    }

    pub fn is_analysis_complete(&self) -> bool {
        read(&self.state, "Analysis store").state.is_analysis_complete
    }

    /// Records the request behind the current state.
    pub fn set_input_data(&self, data: InputData) {
        self.mutate(|state| state.input_data = Some(data));
    }

    pub fn input_data(&self) -> Option<InputData> {
        read(&self.state, "Analysis store").state.input_data.clone()
    }

    /// Inserts `step`, or replaces the step with the same id in place.
    pub fn update_processing_step(&self, step: ProcessingStep) {
        self.mutate(|state| {
            match state.processing_steps.iter_mut().find(|s| s.id == step.id) {
                Some(existing) => *existing = step,
                None => state.processing_steps.push(step),
            }
        });
    }

    pub fn processing_steps(&self) -> Vec<ProcessingStep> {
        read(&self.state, "Analysis store")
            .state
            .processing_steps
            .clone()
    }

    pub fn clear_processing_steps(&self) {
        self.mutate(|state| state.processing_steps.clear());
    }

    /// Resets every field to its initial value with a single notification.
    pub fn clear_global_state(&self) {
        self.mutate(|state| *state = GlobalState::default());
    }

    pub fn snapshot(&self) -> StateSnapshot {
        read(&self.state, "Analysis store").clone()
    }

    /// Registers `listener` to receive a snapshot after every mutation.
    ///
    /// A panicking listener is logged and does not stop the others.
    pub fn add_state_change_listener<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&StateSnapshot) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(listener));
        Unsubscribe::new(id, Arc::downgrade(&self.listeners))
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for AnalysisStore {
    fn default() -> Self {
        Self::new()
    }
}
