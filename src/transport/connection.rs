//! WebSocket connection and event loop.
//!
//! [`WebSocketConnector`] opens client sockets to the board with
//! tokio-tungstenite. Each socket runs in its own tokio task that:
//!
//! - Performs the handshake (bounded by a timeout, abortable by `close`)
//! - Forwards inbound text frames to the [`EventSink`]
//! - Writes outbound text queued through the [`WebSocketHandle`]
//! - Reports `Error` / `Closed` when the socket goes away

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::socket::{Connector, EventSink, ReadyState, SocketEvent, SocketHandle};

// ============================================================================
// Constants
// ============================================================================

/// Default bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Types
// ============================================================================

type BoardStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal commands for the event loop.
enum SocketCommand {
    /// Write a text frame.
    Send(String),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// WebSocketConnector
// ============================================================================

/// Opens tokio-tungstenite client sockets.
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    /// Handshake timeout.
    connect_timeout: Duration,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WebSocketConnector {
    /// Creates a connector with the given handshake timeout.
    #[inline]
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Returns the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &Url, sink: EventSink) -> Result<Box<dyn SocketHandle>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::connection(format!("No tokio runtime: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));

        runtime.spawn(run_event_loop(
            url.clone(),
            self.connect_timeout,
            command_rx,
            Arc::clone(&state),
            sink,
        ));

        Ok(Box::new(WebSocketHandle { command_tx, state }))
    }
}

// ============================================================================
// WebSocketHandle
// ============================================================================

/// Handle to one socket task.
pub struct WebSocketHandle {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Ready state shared with the event loop.
    state: Arc<AtomicU8>,
}

impl SocketHandle for WebSocketHandle {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn send_text(&self, text: String) -> Result<()> {
        if self.ready_state() != ReadyState::Open {
            return Err(Error::ConnectionClosed);
        }
        self.command_tx
            .send(SocketCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != ReadyState::Closed as u8).then_some(ReadyState::Closing as u8)
            });
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }
}

// ============================================================================
// Event Loop
// ============================================================================

fn set_state(state: &AtomicU8, next: ReadyState) {
    state.store(next as u8, Ordering::Release);
}

/// Connects, then pumps frames until either side closes.
async fn run_event_loop(
    url: Url,
    connect_timeout: Duration,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    state: Arc<AtomicU8>,
    sink: EventSink,
) {
    let Some(ws_stream) = handshake(&url, connect_timeout, &mut command_rx, &sink).await else {
        set_state(&state, ReadyState::Closed);
        sink.emit(SocketEvent::Closed);
        return;
    };

    info!(%url, id = %sink.id(), "WebSocket connection established");
    set_state(&state, ReadyState::Open);
    sink.emit(SocketEvent::Open);

    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming frames from the board
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.len(), "Frame received");
                        sink.emit(SocketEvent::Text(text.as_str().to_owned()));
                    }

                    Some(Ok(Message::Close(_))) => {
                        debug!(%url, "WebSocket closed by board");
                        break;
                    }

                    Some(Err(e)) => {
                        let err = Error::from(e);
                        warn!(error = %err, "WebSocket read failed");
                        sink.emit(SocketEvent::Error(err.to_string()));
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Commands from the bridge
            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            let err = Error::send(e.to_string());
                            warn!(error = %err, "Failed to write frame");
                            sink.emit(SocketEvent::Error(err.to_string()));
                            break;
                        }
                    }

                    Some(SocketCommand::Shutdown) => {
                        debug!(id = %sink.id(), "Shutdown command received");
                        set_state(&state, ReadyState::Closing);
                        let _ = ws_write.close().await;
                        break;
                    }

                    None => {
                        debug!("Command channel closed");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    set_state(&state, ReadyState::Closed);
    sink.emit(SocketEvent::Closed);

    debug!(id = %sink.id(), "Event loop terminated");
}

/// Runs the handshake unless a shutdown arrives first.
///
/// Reports failures through the sink and returns `None`.
async fn handshake(
    url: &Url,
    connect_timeout: Duration,
    command_rx: &mut mpsc::UnboundedReceiver<SocketCommand>,
    sink: &EventSink,
) -> Option<BoardStream> {
    let connecting = timeout(connect_timeout, connect_async(url.as_str()));
    tokio::pin!(connecting);

    loop {
        tokio::select! {
            result = &mut connecting => {
                return match result {
                    Ok(Ok((stream, _response))) => Some(stream),
                    Ok(Err(e)) => {
                        let err = Error::from(e);
                        warn!(%url, error = %err, "WebSocket handshake failed");
                        sink.emit(SocketEvent::Error(err.to_string()));
                        None
                    }
                    Err(_) => {
                        let millis = connect_timeout.as_millis();
                        warn!(%url, timeout_ms = millis as u64, "WebSocket handshake timed out");
                        let err = Error::connection(format!("Handshake timed out after {millis}ms"));
                        sink.emit(SocketEvent::Error(err.to_string()));
                        None
                    }
                };
            }

            command = command_rx.recv() => {
                match command {
                    // Nothing can be written before the handshake
                    Some(SocketCommand::Send(_)) => continue,
                    Some(SocketCommand::Shutdown) | None => {
                        debug!(%url, "Connect aborted");
                        return None;
                    }
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
