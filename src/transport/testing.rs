//! In-memory connector for driving the bridge deterministically in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

use super::socket::{Connector, EventSink, ReadyState, SocketEvent, SocketHandle};

/// Records every socket the bridge opens.
#[derive(Default)]
pub(crate) struct MockConnector {
    sockets: Mutex<Vec<Arc<MockSocket>>>,
    refuse: AtomicBool,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `open` calls fail synchronously.
    pub(crate) fn refuse_open(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn opened(&self) -> usize {
        self.sockets.lock().len()
    }

    pub(crate) fn socket(&self, index: usize) -> Arc<MockSocket> {
        Arc::clone(&self.sockets.lock()[index])
    }

    pub(crate) fn last(&self) -> Arc<MockSocket> {
        let sockets = self.sockets.lock();
        Arc::clone(sockets.last().expect("no socket opened"))
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &Url, sink: EventSink) -> Result<Box<dyn SocketHandle>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::connection("refused by mock"));
        }
        let socket = Arc::new(MockSocket {
            url: url.clone(),
            sink,
            state: Mutex::new(ReadyState::Connecting),
            sent: Mutex::new(Vec::new()),
            fail_send: AtomicBool::new(false),
        });
        self.sockets.lock().push(Arc::clone(&socket));
        Ok(Box::new(MockHandle(socket)))
    }
}

/// One fake socket. The test plays the board's part.
pub(crate) struct MockSocket {
    pub(crate) url: Url,
    sink: EventSink,
    state: Mutex<ReadyState>,
    sent: Mutex<Vec<String>>,
    fail_send: AtomicBool,
}

impl MockSocket {
    /// Completes the handshake.
    pub(crate) fn accept(&self) {
        self.mark_open();
        self.announce_open();
    }

    /// Flips the ready state to open without telling the bridge yet, as the
    /// event loop does just before it emits the open event.
    pub(crate) fn mark_open(&self) {
        *self.state.lock() = ReadyState::Open;
    }

    /// Delivers the open event.
    pub(crate) fn announce_open(&self) {
        self.sink.emit(SocketEvent::Open);
    }

    /// Delivers a text frame from the board.
    pub(crate) fn receive(&self, text: &str) {
        self.sink.emit(SocketEvent::Text(text.to_owned()));
    }

    /// Reports a transport failure followed by close.
    pub(crate) fn fail(&self, message: &str) {
        *self.state.lock() = ReadyState::Closed;
        self.sink.emit(SocketEvent::Error(message.to_owned()));
        self.sink.emit(SocketEvent::Closed);
    }

    /// Closes from the board side.
    pub(crate) fn drop_connection(&self) {
        *self.state.lock() = ReadyState::Closed;
        self.sink.emit(SocketEvent::Closed);
    }

    /// Emits a close event regardless of state, as a late callback would.
    pub(crate) fn emit_closed(&self) {
        self.sink.emit(SocketEvent::Closed);
    }

    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn state(&self) -> ReadyState {
        *self.state.lock()
    }

    /// Frames the bridge wrote, parsed.
    pub(crate) fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|text| serde_json::from_str(text).expect("bridge sent invalid json"))
            .collect()
    }

    /// Frames the bridge wrote with the given tag.
    pub(crate) fn sent_with_tag(&self, tag: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|frame| frame[0] == tag)
            .collect()
    }
}

struct MockHandle(Arc<MockSocket>);

impl SocketHandle for MockHandle {
    fn ready_state(&self) -> ReadyState {
        self.0.state()
    }

    fn send_text(&self, text: String) -> Result<()> {
        if self.0.fail_send.load(Ordering::SeqCst) {
            return Err(Error::send("mock send failure"));
        }
        if self.0.state() != ReadyState::Open {
            return Err(Error::ConnectionClosed);
        }
        self.0.sent.lock().push(text);
        Ok(())
    }

    fn close(&self) {
        *self.0.state.lock() = ReadyState::Closed;
    }
}
