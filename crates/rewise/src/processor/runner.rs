//! The protocol state machine for one processing run.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::channel::{ChannelEvent, ConnectionChannel};
use crate::config::ClientConfig;
use crate::error::ProcessorError;
use crate::processor::diagnostics::Diagnostics;
use crate::processor::handler::TaskHandler;
use crate::protocol::{classify, Inbound, TaskRequest, WebSocketMessage};
use crate::sync::lock;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// The upstream sent `process_complete`.
    Completed,
    /// The upstream sent an `error` frame.
    UpstreamError,
    /// The caller disconnected.
    Disconnected,
    /// The connection dropped before a terminal frame arrived.
    ConnectionLost,
    /// The channel never opened.
    HandshakeFailed,
    /// The channel opened but the request could not be sent.
    SendFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Idle,
    Connecting,
    AwaitingSteps,
    Terminal(TerminalReason),
}

impl ProcessorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessorState::Terminal(_))
    }
}

/// Drives one request/response exchange over a [`ConnectionChannel`].
///
/// A processor is single-use: once it reaches [`ProcessorState::Terminal`] a
/// new run needs a new instance. There is no reconnection or retry.
pub struct TaskProcessor {
    run_id: String,
    channel: Arc<ConnectionChannel>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>,
    handler: Arc<dyn TaskHandler>,
    state: Arc<watch::Sender<ProcessorState>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    diagnostics: Diagnostics,
}

impl TaskProcessor {
    pub fn new(config: &ClientConfig, handler: Arc<dyn TaskHandler>) -> Self {
        let run_id = Uuid::new_v4().to_string();
        let (channel, events) = ConnectionChannel::from_config(config);
        let (state, _) = watch::channel(ProcessorState::Idle);

        Self {
            diagnostics: Diagnostics::new(config.debug_logging, &run_id),
            run_id,
            channel: Arc::new(channel),
            events: Mutex::new(Some(events)),
            handler,
            state: Arc::new(state),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn state(&self) -> ProcessorState {
        *self.state.borrow()
    }

    pub fn channel(&self) -> &ConnectionChannel {
        &self.channel
    }

    /// Opens the channel and sends `request`.
    ///
    /// Returns once the request has been handed to the channel. Step updates
    /// and the terminal frame arrive later through the handler. Handshake and
    /// send failures are returned here and are not retried.
    pub async fn process_task(&self, request: &TaskRequest) -> Result<(), ProcessorError> {
        let started = self.state.send_if_modified(|state| {
            if *state == ProcessorState::Idle {
                *state = ProcessorState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ProcessorError::AlreadyStarted);
        }

        let mut guard = StartGuard {
            state: Arc::clone(&self.state),
            channel: Arc::clone(&self.channel),
            reason: TerminalReason::HandshakeFailed,
            armed: true,
        };

        self.diagnostics.connecting(self.channel.endpoint());
        if let Err(e) = self.channel.connect().await {
            guard.armed = false;
            self.diagnostics.connect_failed(&e);
            self.finish(TerminalReason::HandshakeFailed);
            return Err(e.into());
        }
        self.diagnostics.connected();
        self.handler.on_connection_open();

        guard.reason = TerminalReason::SendFailed;
        if let Err(e) = self.channel.send(request).await {
            guard.armed = false;
            self.diagnostics.send_failed(&e);
            self.finish(TerminalReason::SendFailed);
            self.channel.disconnect().await;
            return Err(e.into());
        }
        guard.armed = false;
        self.diagnostics.request_sent(request);

        self.state.send_if_modified(|state| {
            if *state == ProcessorState::Connecting {
                *state = ProcessorState::AwaitingSteps;
                true
            } else {
                false
            }
        });

        if let Some(events) = lock(&self.events, "Processor events").take() {
            let dispatch = Dispatch {
                handler: Arc::clone(&self.handler),
                state: Arc::clone(&self.state),
                channel: Arc::clone(&self.channel),
                diagnostics: self.diagnostics.clone(),
            };
            let span = info_span!("task.dispatch", run_id = %self.run_id);
            let handle = tokio::spawn(dispatch.run(events).instrument(span));
            *lock(&self.dispatcher, "Processor dispatcher") = Some(handle);
        }

        Ok(())
    }

    /// Waits until the run reaches a terminal state.
    pub async fn wait_for_terminal(&self) -> TerminalReason {
        let mut changes = self.state.subscribe();
        let reached = changes
            .wait_for(ProcessorState::is_terminal)
            .await
            .map(|state| *state);

        match reached {
            Ok(ProcessorState::Terminal(reason)) => reason,
            _ => TerminalReason::Disconnected,
        }
    }

    /// Stops the run immediately. No callbacks fire after this returns.
    pub async fn disconnect(&self) {
        if let Some(handle) = lock(&self.dispatcher, "Processor dispatcher").take() {
            handle.abort();
        }
        self.channel.disconnect().await;
        self.finish(TerminalReason::Disconnected);
        self.diagnostics.closed(Some("disconnected by caller"));
    }

    fn finish(&self, reason: TerminalReason) {
        finish(&self.state, reason);
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.dispatcher, "Processor dispatcher").take() {
            handle.abort();
        }
    }
}

/// Ends the run when `process_task` is dropped before the request went out.
struct StartGuard {
    state: Arc<watch::Sender<ProcessorState>>,
    channel: Arc<ConnectionChannel>,
    reason: TerminalReason,
    armed: bool,
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        debug!(reason = ?self.reason, "Start cancelled before the request was sent");
        finish(&self.state, self.reason);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let channel = Arc::clone(&self.channel);
            runtime.spawn(async move { channel.disconnect().await });
        }
    }
}

fn finish(state: &watch::Sender<ProcessorState>, reason: TerminalReason) {
    state.send_if_modified(|current| {
        if current.is_terminal() {
            false
        } else {
            *current = ProcessorState::Terminal(reason);
            true
        }
    });
}

/// Delivers inbound frames to the handler, off the transport read loop.
struct Dispatch {
    handler: Arc<dyn TaskHandler>,
    state: Arc<watch::Sender<ProcessorState>>,
    channel: Arc<ConnectionChannel>,
    diagnostics: Diagnostics,
}

impl Dispatch {
    async fn run(self, mut events: mpsc::UnboundedReceiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::Frame(value) => {
                    if let Some(reason) = self.handle_frame(value) {
                        // Nothing can follow a terminal frame, so the socket goes first.
                        self.channel.disconnect().await;
                        self.diagnostics.closed(Some("run finished"));
                        finish(&self.state, reason);
                        break;
                    }
                }
                ChannelEvent::Closed { reason } => {
                    self.diagnostics.closed(reason.as_deref());
                    finish(&self.state, TerminalReason::ConnectionLost);
                    self.handler.on_connection_close();
                    break;
                }
            }
        }
        debug!("Dispatch loop finished");
    }

    /// Delivers one frame. Returns the reason when the frame ends the run.
    fn handle_frame(&self, value: serde_json::Value) -> Option<TerminalReason> {
        let message = match classify(value) {
            Inbound::Message(message) => message,
            Inbound::Unrecognized(kind) => {
                self.diagnostics.unrecognized(kind.as_deref());
                return None;
            }
            Inbound::Malformed(reason) => {
                self.diagnostics.malformed(&reason);
                return None;
            }
        };

        if self.state.borrow().is_terminal() {
            self.diagnostics.after_terminal();
            return None;
        }

        match message {
            WebSocketMessage::StepUpdate(step) => {
                self.diagnostics.step(&step);
                self.handler.on_step_update(&step);
                None
            }
            WebSocketMessage::ProcessComplete(done) => {
                self.diagnostics.complete(&done);
                self.handler.on_process_complete(&done);
                Some(TerminalReason::Completed)
            }
            WebSocketMessage::Error(error) => {
                self.diagnostics.upstream_error(&error);
                self.handler.on_error(&error);
                Some(TerminalReason::UpstreamError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::handler::NoopHandler;
    use crate::protocol::{ErrorMessage, ProcessComplete, StepUpdate};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Counting {
        steps: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        closes: AtomicUsize,
    }

    impl TaskHandler for Counting {
        fn on_step_update(&self, _step: &StepUpdate) {
            self.steps.fetch_add(1, Ordering::SeqCst);
        }
        fn on_process_complete(&self, _message: &ProcessComplete) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, _message: &ErrorMessage) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        fn on_connection_close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn dispatch(handler: Arc<Counting>) -> Dispatch {
        let (state, _) = watch::channel(ProcessorState::AwaitingSteps);
        let (channel, _events) =
            ConnectionChannel::new("ws://127.0.0.1:1/ws", Duration::from_secs(1));
        Dispatch {
            handler,
            state: Arc::new(state),
            channel: Arc::new(channel),
            diagnostics: Diagnostics::new(false, "test"),
        }
    }

    fn step_frame(step: &str, status: &str) -> serde_json::Value {
        json!({
            "type": "step_update",
            "step": step,
            "title": "Step",
            "status": status,
            "description": "",
            "timestamp": "2026-10-18T09:00:00Z"
        })
    }

    #[test]
    fn test_step_updates_pass_through_any_status() {
        let handler = Arc::new(Counting::default());
        let dispatch = dispatch(Arc::clone(&handler));

        for status in ["pending", "running", "completed", "failed"] {
            dispatch.handle_frame(step_frame("analysis", status));
        }

        assert_eq!(handler.steps.load(Ordering::SeqCst), 4);
        assert_eq!(*dispatch.state.borrow(), ProcessorState::AwaitingSteps);
    }

    #[test]
    fn test_unknown_and_malformed_frames_fire_nothing() {
        let handler = Arc::new(Counting::default());
        let dispatch = dispatch(Arc::clone(&handler));

        dispatch.handle_frame(json!({"type": "heartbeat"}));
        dispatch.handle_frame(json!({"type": "step_update"}));
        dispatch.handle_frame(json!([1, 2, 3]));

        assert_eq!(handler.steps.load(Ordering::SeqCst), 0);
        assert_eq!(handler.errors.load(Ordering::SeqCst), 0);
        assert_eq!(*dispatch.state.borrow(), ProcessorState::AwaitingSteps);
    }

    #[tokio::test]
    async fn test_terminal_is_absorbing() {
        let handler = Arc::new(Counting::default());
        let dispatch = dispatch(Arc::clone(&handler));
        let state = Arc::clone(&dispatch.state);

        let (tx, rx) = mpsc::unbounded_channel();
        for frame in [
            json!({"type": "error", "error": "boom", "timestamp": "t"}),
            json!({"type": "process_complete", "message": "m", "timestamp": "t"}),
            step_frame("late", "completed"),
        ] {
            tx.send(ChannelEvent::Frame(frame)).unwrap();
        }
        tx.send(ChannelEvent::Closed { reason: None }).unwrap();

        dispatch.run(rx).await;

        assert_eq!(handler.errors.load(Ordering::SeqCst), 1);
        assert_eq!(handler.completes.load(Ordering::SeqCst), 0);
        assert_eq!(handler.steps.load(Ordering::SeqCst), 0);
        assert_eq!(handler.closes.load(Ordering::SeqCst), 0);
        assert_eq!(
            *state.borrow(),
            ProcessorState::Terminal(TerminalReason::UpstreamError)
        );
    }

    #[test]
    fn test_terminal_frames_report_their_reason() {
        let handler = Arc::new(Counting::default());
        let dispatch = dispatch(Arc::clone(&handler));

        assert_eq!(dispatch.handle_frame(step_frame("analysis", "completed")), None);
        assert_eq!(
            dispatch.handle_frame(json!({"type": "process_complete", "message": "m", "timestamp": "t"})),
            Some(TerminalReason::Completed)
        );
        assert_eq!(
            dispatch.handle_frame(json!({"type": "error", "error": "boom", "timestamp": "t"})),
            Some(TerminalReason::UpstreamError)
        );
    }

    #[tokio::test]
    async fn test_close_before_terminal_is_connection_lost() {
        let handler = Arc::new(Counting::default());
        let dispatch = dispatch(Arc::clone(&handler));
        let state = Arc::clone(&dispatch.state);

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(ChannelEvent::Frame(step_frame("analysis", "running")))
            .unwrap();
        tx.send(ChannelEvent::Closed { reason: None }).unwrap();
        tx.send(ChannelEvent::Frame(step_frame("ignored", "running")))
            .unwrap();

        dispatch.run(rx).await;

        assert_eq!(handler.steps.load(Ordering::SeqCst), 1);
        assert_eq!(handler.closes.load(Ordering::SeqCst), 1);
        assert_eq!(
            *state.borrow(),
            ProcessorState::Terminal(TerminalReason::ConnectionLost)
        );
    }

    #[tokio::test]
    async fn test_handshake_failure_is_returned_and_terminal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ClientConfig {
            connect_timeout_secs: 2,
            debug_logging: false,
            ..Default::default()
        }
        .with_endpoint(format!("ws://{}/ws", addr));
        let processor = TaskProcessor::new(&config, Arc::new(NoopHandler));

        let err = processor
            .process_task(&TaskRequest::from_description("chair"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProcessorError::Channel(_)));
        assert_eq!(
            processor.state(),
            ProcessorState::Terminal(TerminalReason::HandshakeFailed)
        );
        let reason = tokio::time::timeout(Duration::from_secs(1), processor.wait_for_terminal())
            .await
            .unwrap();
        assert_eq!(reason, TerminalReason::HandshakeFailed);
    }

    #[tokio::test]
    async fn test_dropped_start_still_reaches_terminal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accepts the TCP connection but never answers the handshake.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let config = ClientConfig {
            connect_timeout_secs: 30,
            debug_logging: false,
            ..Default::default()
        }
        .with_endpoint(format!("ws://{}/ws", addr));
        let processor = TaskProcessor::new(&config, Arc::new(NoopHandler));

        let attempt = tokio::time::timeout(
            Duration::from_millis(200),
            processor.process_task(&TaskRequest::from_description("chair")),
        )
        .await;
        assert!(attempt.is_err());

        let reason = tokio::time::timeout(Duration::from_secs(1), processor.wait_for_terminal())
            .await
            .unwrap();
        assert_eq!(reason, TerminalReason::HandshakeFailed);
        server.abort();
    }

    #[tokio::test]
    async fn test_second_run_is_rejected() {
        let config = ClientConfig {
            connect_timeout_secs: 1,
            debug_logging: false,
            ..Default::default()
        }
        .with_endpoint("ws://127.0.0.1:1/ws");
        let processor = TaskProcessor::new(&config, Arc::new(NoopHandler));

        let _ = processor.process_task(&TaskRequest::default()).await;
        let err = processor
            .process_task(&TaskRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err, ProcessorError::AlreadyStarted);
    }

    #[tokio::test]
    async fn test_disconnect_from_idle() {
        let processor = TaskProcessor::new(&ClientConfig::default(), Arc::new(NoopHandler));
        processor.disconnect().await;
        processor.disconnect().await;
        assert_eq!(
            processor.state(),
            ProcessorState::Terminal(TerminalReason::Disconnected)
        );
    }
}
