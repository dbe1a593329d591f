//! Mock upstream server and recording handler.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use rewise::{ClientConfig, ErrorMessage, ProcessComplete, StepUpdate, TaskHandler};

const WAIT: Duration = Duration::from_secs(5);

enum Action {
    Text(String),
    Close,
}

/// A local WebSocket server whose frames are pushed by the test.
///
/// Frames go to the connection that is currently open; a new connection
/// takes over once the previous one has ended.
pub struct MockUpstream {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    requests: tokio::sync::Mutex<mpsc::UnboundedReceiver<Value>>,
    actions: mpsc::UnboundedSender<Action>,
    task: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock upstream");
        let addr = listener.local_addr().expect("Failed to read local address");

        let accepted = Arc::new(AtomicUsize::new(0));
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let action_rx = Arc::new(tokio::sync::Mutex::new(action_rx));

        let counter = Arc::clone(&accepted);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    Arc::clone(&counter),
                    request_tx.clone(),
                    Arc::clone(&action_rx),
                ));
            }
        });

        Self {
            addr,
            accepted,
            requests: tokio::sync::Mutex::new(request_rx),
            actions: action_tx,
            task,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("ws://{}/api/v1/tasks/ws/process", self.addr)
    }

    /// Client config pointing at this server with diagnostics enabled.
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout_secs: 5,
            debug_logging: true,
            ..Default::default()
        }
        .with_endpoint(self.endpoint())
    }

    /// Number of completed WebSocket handshakes.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Waits for the next JSON frame a client sent.
    pub async fn next_request(&self) -> Value {
        let mut requests = self.requests.lock().await;
        tokio::time::timeout(WAIT, requests.recv())
            .await
            .expect("Timed out waiting for a client request")
            .expect("Mock upstream stopped")
    }

    pub fn send_json(&self, frame: &Value) {
        self.send_raw(&frame.to_string());
    }

    pub fn send_raw(&self, text: &str) {
        let _ = self.actions.send(Action::Text(text.to_string()));
    }

    /// Closes the current connection from the server side.
    pub fn close(&self) {
        let _ = self.actions.send(Action::Close);
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    stream: TcpStream,
    accepted: Arc<AtomicUsize>,
    requests: mpsc::UnboundedSender<Value>,
    actions: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Action>>>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    accepted.fetch_add(1, Ordering::SeqCst);

    let (mut sink, mut source) = ws.split();
    let mut actions = actions.lock().await;

    loop {
        tokio::select! {
            incoming = source.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(value) = serde_json::from_str::<Value>(text.as_str()) {
                        let _ = requests.send(value);
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            action = actions.recv() => match action {
                Some(Action::Text(text)) => {
                    if sink.send(Message::text(text)).await.is_err() {
                        break;
                    }
                }
                Some(Action::Close) | None => {
                    let _ = sink.close().await;
                    break;
                }
            },
        }
    }
}

/// Polls `condition` until it holds, panicking after a few seconds.
pub async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// One handler callback, as observed by `Recording`.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Open,
    Step { id: String, status: String },
    Complete(String),
    Error(String),
    Close,
}

/// Records every callback and optionally forwards to another handler.
#[derive(Default)]
pub struct Recording {
    events: Mutex<Vec<Recorded>>,
    forward: Option<Arc<dyn TaskHandler>>,
}

impl Recording {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forwarding_to(handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            forward: Some(handler),
        }
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Recorded) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| matches(e)).count()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().unwrap().push(event);
    }
}

impl TaskHandler for Recording {
    fn on_step_update(&self, step: &StepUpdate) {
        self.push(Recorded::Step {
            id: step.step.clone(),
            status: step.status.to_string(),
        });
        if let Some(forward) = &self.forward {
            forward.on_step_update(step);
        }
    }

    fn on_process_complete(&self, message: &ProcessComplete) {
        self.push(Recorded::Complete(message.message.clone()));
        if let Some(forward) = &self.forward {
            forward.on_process_complete(message);
        }
    }

    fn on_error(&self, message: &ErrorMessage) {
        self.push(Recorded::Error(message.error.clone()));
        if let Some(forward) = &self.forward {
            forward.on_error(message);
        }
    }

    fn on_connection_open(&self) {
        self.push(Recorded::Open);
    }

    fn on_connection_close(&self) {
        self.push(Recorded::Close);
    }
}
