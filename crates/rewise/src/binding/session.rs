//! Owner of the store during a run: starts processors and folds their
//! events into the store.

use std::sync::{Arc, Mutex};

use crate::config::ClientConfig;
use crate::error::ProcessorError;
use crate::processor::{TaskHandler, TaskProcessor, TerminalReason};
use crate::protocol::{ErrorMessage, ProcessComplete, StepStatus, StepUpdate, TaskRequest};
use crate::store::{AnalysisStore, InputData, ProcessingStep};
use crate::sync::lock;

/// Id of the upstream step whose completed result is the final analysis.
pub const FINAL_STEP_ID: &str = "result_integration";

/// Handler that writes a run's events into an [`AnalysisStore`].
pub struct StoreSync {
    store: Arc<AnalysisStore>,
    upstream_error: Mutex<Option<String>>,
}

impl StoreSync {
    pub fn new(store: Arc<AnalysisStore>) -> Self {
        Self {
            store,
            upstream_error: Mutex::new(None),
        }
    }

    /// The error reported by the upstream, if the run failed that way.
    pub fn upstream_error(&self) -> Option<String> {
        lock(&self.upstream_error, "Session error").clone()
    }
}

impl TaskHandler for StoreSync {
    fn on_step_update(&self, step: &StepUpdate) {
        self.store.update_processing_step(ProcessingStep::from(step));

        if step.status == StepStatus::Completed && step.step == FINAL_STEP_ID {
            match &step.result {
                Some(result) => self.store.set_analysis_result(result.clone()),
                None => log::warn!("Final step completed without a result payload"),
            }
        }
    }

    fn on_process_complete(&self, message: &ProcessComplete) {
        log::info!("Analysis run finished: {}", message.message);
    }

    fn on_error(&self, message: &ErrorMessage) {
        log::warn!("Analysis run failed upstream: {}", message.error);
        *lock(&self.upstream_error, "Session error") = Some(message.error.clone());
    }
}

/// How [`AnalysisSession::begin`] handled a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    /// A new processor was started.
    Started,
    /// The request matches the run already in the store; nothing was sent.
    Resumed,
}

struct ActiveRun {
    processor: Arc<TaskProcessor>,
    sync: Arc<StoreSync>,
}

/// Starts runs against a shared store and keeps track of the current one.
pub struct AnalysisSession {
    config: ClientConfig,
    store: Arc<AnalysisStore>,
    current: Mutex<Option<ActiveRun>>,
}

impl AnalysisSession {
    pub fn new(config: ClientConfig, store: Arc<AnalysisStore>) -> Self {
        Self {
            config,
            store,
            current: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<AnalysisStore> {
        &self.store
    }

    /// Starts a run for `request` unless the store already holds the run
    /// for the same image and description.
    pub async fn begin(&self, request: &TaskRequest) -> Result<SessionStart, ProcessorError> {
        let same_run = self
            .store
            .input_data()
            .is_some_and(|data| data.matches(request));

        if same_run && self.processor().is_some() {
            log::debug!("Request matches the current run, not starting a new one");
            return Ok(SessionStart::Resumed);
        }

        self.start(request).await
    }

    /// Discards the current run and starts a fresh one.
    pub async fn restart(&self, request: &TaskRequest) -> Result<SessionStart, ProcessorError> {
        self.start(request).await
    }

    async fn start(&self, request: &TaskRequest) -> Result<SessionStart, ProcessorError> {
        let previous = lock(&self.current, "Session run").take();
        if let Some(previous) = previous {
            previous.processor.disconnect().await;
        }

        self.store.clear_global_state();
        self.store.set_input_data(InputData::from(request));

        let sync = Arc::new(StoreSync::new(Arc::clone(&self.store)));
        let processor = Arc::new(TaskProcessor::new(&self.config, sync.clone()));
        *lock(&self.current, "Session run") = Some(ActiveRun {
            processor: Arc::clone(&processor),
            sync,
        });

        if let Err(e) = processor.process_task(request).await {
            // Forget the request so retrying it starts a new run.
            lock(&self.current, "Session run").take();
            self.store.clear_global_state();
            return Err(e);
        }

        Ok(SessionStart::Started)
    }

    pub fn processor(&self) -> Option<Arc<TaskProcessor>> {
        lock(&self.current, "Session run")
            .as_ref()
            .map(|run| Arc::clone(&run.processor))
    }

    /// Waits for the current run to end. Returns `None` if nothing is running.
    pub async fn wait_for_terminal(&self) -> Option<TerminalReason> {
        let processor = self.processor()?;
        Some(processor.wait_for_terminal().await)
    }

    pub fn upstream_error(&self) -> Option<String> {
        lock(&self.current, "Session run")
            .as_ref()
            .and_then(|run| run.sync.upstream_error())
    }

    /// Disconnects the current run, if any. The store keeps its contents.
    pub async fn cancel(&self) {
        let processor = self.processor();
        if let Some(processor) = processor {
            processor.disconnect().await;
        }
    }
}
