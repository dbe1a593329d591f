//! Persistent WebSocket connection to the processing endpoint.
//!
//! The channel only opens, sends, receives and closes. Every inbound text
//! frame is parsed as JSON and forwarded as a [`ChannelEvent`]; frames that
//! are not JSON are logged and dropped.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, Shared};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ChannelError;
use crate::sync::lock;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type ConnectAttempt = Shared<BoxFuture<'static, Result<(), ChannelError>>>;

/// Coarse lifecycle state of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Connected => write!(f, "connected"),
            ChannelState::Disconnected => write!(f, "disconnected"),
            ChannelState::Error => write!(f, "error"),
        }
    }
}

/// Something the channel observed on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A frame that parsed as JSON.
    Frame(Value),
    /// The remote side closed the connection or the transport failed.
    Closed { reason: Option<String> },
}

struct ChannelInner {
    endpoint: String,
    connect_timeout: Duration,
    state: watch::Sender<ChannelState>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    pending: Mutex<Option<ConnectAttempt>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    /// Bumped by every disconnect; attempts and readers from an older
    /// generation must not touch shared state.
    generation: AtomicU64,
    attempts: AtomicUsize,
}

impl ChannelInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn deliver(&self, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                if self.events.send(ChannelEvent::Frame(value)).is_err() {
                    debug!("No event receiver attached, dropping frame");
                }
            }
            Err(e) => {
                warn!(error = %e, "Dropping inbound frame that is not valid JSON");
            }
        }
    }
}

/// One persistent connection to a fixed endpoint.
pub struct ConnectionChannel {
    inner: Arc<ChannelInner>,
}

impl ConnectionChannel {
    /// Creates a channel and the receiver its inbound events are delivered to.
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ChannelState::Disconnected);

        let inner = ChannelInner {
            endpoint: endpoint.into(),
            connect_timeout,
            state,
            sink: tokio::sync::Mutex::new(None),
            reader: Mutex::new(None),
            pending: Mutex::new(None),
            events,
            generation: AtomicU64::new(0),
            attempts: AtomicUsize::new(0),
        };

        (
            Self {
                inner: Arc::new(inner),
            },
            receiver,
        )
    }

    pub fn from_config(config: &ClientConfig) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        Self::new(config.endpoint.clone(), config.connect_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Watches lifecycle state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    /// Number of handshakes this channel has started.
    pub fn connect_attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Opens the channel, or joins the attempt that is already in flight.
    ///
    /// Resolves once the handshake completes. Fails with
    /// [`ChannelError::Timeout`] if the channel has not opened within the
    /// configured window and [`ChannelError::Connect`] if the handshake fails.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        let attempt = {
            let mut pending = lock(&self.inner.pending, "Channel attempt");
            let live = matches!(
                self.state(),
                ChannelState::Connecting | ChannelState::Connected
            );

            match pending.as_ref() {
                Some(attempt) if live => attempt.clone(),
                _ => {
                    self.inner.state.send_replace(ChannelState::Connecting);
                    let generation = self.inner.generation.load(Ordering::SeqCst);
                    let attempt = open(Arc::clone(&self.inner), generation)
                        .boxed()
                        .shared();
                    *pending = Some(attempt.clone());
                    attempt
                }
            }
        };

        attempt.await
    }

    /// Serializes `payload` as JSON and sends it as one text frame.
    pub async fn send<T>(&self, payload: &T) -> Result<(), ChannelError>
    where
        T: Serialize + Sync + ?Sized,
    {
        if self.state() != ChannelState::Connected {
            return Err(ChannelError::NotReady);
        }

        let text = serde_json::to_string(payload)?;

        let mut guard = self.inner.sink.lock().await;
        let sink = guard.as_mut().ok_or(ChannelError::NotReady)?;
        sink.send(Message::text(text))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    /// Closes the channel. Safe to call repeatedly and from any state.
    pub async fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.pending, "Channel attempt").take();

        let mut guard = self.inner.sink.lock().await;
        let reader = lock(&self.inner.reader, "Channel reader").take();
        if let Some(mut sink) = guard.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "Error while closing channel");
            }
        }
        drop(guard);

        if let Some(reader) = reader {
            reader.abort();
        }

        self.inner.state.send_replace(ChannelState::Disconnected);
    }
}

impl Drop for ConnectionChannel {
    fn drop(&mut self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(reader) = lock(&self.inner.reader, "Channel reader").take() {
            reader.abort();
        }
    }
}

async fn open(inner: Arc<ChannelInner>, generation: u64) -> Result<(), ChannelError> {
    inner.attempts.fetch_add(1, Ordering::SeqCst);
    debug!(endpoint = %inner.endpoint, "Opening channel");

    let handshake =
        tokio::time::timeout(inner.connect_timeout, connect_async(inner.endpoint.as_str())).await;

    let stream = match handshake {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            if inner.is_current(generation) {
                inner.state.send_replace(ChannelState::Error);
            }
            return Err(ChannelError::Connect(e.to_string()));
        }
        Err(_) => {
            if inner.is_current(generation) {
                inner.state.send_replace(ChannelState::Error);
            }
            return Err(ChannelError::Timeout(inner.connect_timeout));
        }
    };

    let mut guard = inner.sink.lock().await;
    if !inner.is_current(generation) {
        drop(guard);
        let mut stream = stream;
        let _ = stream.close(None).await;
        return Err(ChannelError::Cancelled);
    }

    let (sink, source) = stream.split();
    *guard = Some(sink);
    let reader = tokio::spawn(read_loop(Arc::clone(&inner), source, generation));
    *lock(&inner.reader, "Channel reader") = Some(reader);
    inner.state.send_replace(ChannelState::Connected);
    drop(guard);

    debug!(endpoint = %inner.endpoint, "Channel open");
    Ok(())
}

async fn read_loop(inner: Arc<ChannelInner>, mut source: SplitStream<WsStream>, generation: u64) {
    let mut failed = false;

    let reason = loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => inner.deliver(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => inner.deliver(text),
                Err(_) => warn!("Dropping binary frame that is not UTF-8"),
            },
            Some(Ok(Message::Close(frame))) => break frame.map(|f| f.reason.as_str().to_owned()),
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                failed = true;
                break Some(e.to_string());
            }
            None => break None,
        }
    };

    if !inner.is_current(generation) {
        return;
    }

    inner.sink.lock().await.take();
    inner.state.send_replace(if failed {
        ChannelState::Error
    } else {
        ChannelState::Disconnected
    });
    debug!(reason = ?reason, "Channel closed");
    let _ = inner.events.send(ChannelEvent::Closed { reason });
}
