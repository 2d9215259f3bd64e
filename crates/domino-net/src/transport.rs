//! The seam between the connection state machine and the socket.
//!
//! A [`Transport`] is non-blocking: `open` and `send` only start work, and
//! results come back as [`TransportEvent`]s from `poll` on a later tick.
//! Opening a new connection supersedes the previous one; no events of the
//! superseded connection are reported afterwards.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::protocol::{ClientMessage, MessageError, ServerMessage, decode_client, encode_server};

/// WebSocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// 1000: the purpose of the connection was fulfilled.
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// 1001: the peer is going away (server shutdown, page navigation).
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// 1005: the close frame carried no status.
    pub const NO_STATUS: CloseCode = CloseCode(1005);
    /// 1006: the connection dropped without a close frame.
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    /// Whether the close ends the session on purpose. Any other code is
    /// treated as a connectivity failure and triggers reconnection.
    pub fn is_clean(self) -> bool {
        self == Self::NORMAL || self == Self::GOING_AWAY
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Something that happened on the transport since the last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established.
    Opened,
    /// A text frame arrived.
    Frame(String),
    /// The connection closed, or a connection attempt failed.
    Closed {
        /// Close status; [`CloseCode::ABNORMAL`] for failures without one.
        code: CloseCode,
        /// Close reason or error description.
        reason: String,
    },
}

/// Errors reported synchronously by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// There is no open connection to send on.
    #[error("transport is not connected")]
    NotConnected,
    /// The frame could not be handed to the connection.
    #[error("send failed: {0}")]
    SendFailed(String),
    /// No async runtime is available to drive the connection.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),
}

/// Non-blocking, poll-driven connection.
pub trait Transport {
    /// Start connecting to `url`, tearing down any existing connection.
    fn open(&mut self, url: &str) -> Result<(), TransportError>;

    /// Send a text frame on the open connection.
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Close the connection deliberately. An active or connecting
    /// connection reports exactly one [`TransportEvent::Closed`] afterwards.
    fn close(&mut self);

    /// Collect events that happened since the last call, in order.
    fn poll(&mut self) -> Vec<TransportEvent>;
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MockState {
    opened_urls: Vec<String>,
    sent: Vec<String>,
    pending: VecDeque<TransportEvent>,
    connecting: bool,
    connected: bool,
    fail_sends: usize,
    close_calls: usize,
}

/// In-memory transport for tests and offline tools.
///
/// Clones share state, so a test keeps one handle to script the "server"
/// while the connection manager owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    /// A transport with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the pending connection attempt.
    pub fn accept(&self) {
        self.state.borrow_mut().pending.push_back(TransportEvent::Opened);
    }

    /// Fail the pending attempt or drop the open connection with `code`.
    pub fn drop_connection(&self, code: CloseCode) {
        self.state.borrow_mut().pending.push_back(TransportEvent::Closed {
            code,
            reason: "dropped by test".to_string(),
        });
    }

    /// Queue a raw inbound text frame.
    pub fn push_frame(&self, frame: impl Into<String>) {
        self.state
            .borrow_mut()
            .pending
            .push_back(TransportEvent::Frame(frame.into()));
    }

    /// Queue an inbound server message.
    pub fn deliver(&self, msg: &ServerMessage) -> Result<(), MessageError> {
        let frame = encode_server(msg)?;
        self.push_frame(frame);
        Ok(())
    }

    /// Make the next `count` sends fail.
    pub fn fail_next_sends(&self, count: usize) {
        self.state.borrow_mut().fail_sends = count;
    }

    /// Every frame sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.state.borrow().sent.clone()
    }

    /// Every frame sent so far, decoded. Undecodable frames are skipped.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.state
            .borrow()
            .sent
            .iter()
            .filter_map(|f| decode_client(f).ok())
            .collect()
    }

    /// Sent messages other than heartbeat pings.
    pub fn sent_game_messages(&self) -> Vec<ClientMessage> {
        self.sent_messages()
            .into_iter()
            .filter(|m| *m != ClientMessage::Ping)
            .collect()
    }

    /// Forget what was sent so far.
    pub fn clear_sent(&self) {
        self.state.borrow_mut().sent.clear();
    }

    /// URLs passed to `open`, in order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.state.borrow().opened_urls.clone()
    }

    /// How many times `close` was called.
    pub fn close_calls(&self) -> usize {
        self.state.borrow().close_calls
    }

    /// Whether a connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }
}

impl Transport for MockTransport {
    fn open(&mut self, url: &str) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.opened_urls.push(url.to_string());
        // Superseded connection: drop anything it still had to report.
        state.pending.clear();
        state.connected = false;
        state.connecting = true;
        Ok(())
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(TransportError::SendFailed("scripted failure".to_string()));
        }
        state.sent.push(frame.to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.borrow_mut();
        state.close_calls += 1;
        if state.connected || state.connecting {
            state.pending.push_back(TransportEvent::Closed {
                code: CloseCode::NORMAL,
                reason: "closed by client".to_string(),
            });
        }
        state.connected = false;
        state.connecting = false;
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut state = self.state.borrow_mut();
        let events: Vec<TransportEvent> = state.pending.drain(..).collect();
        for event in &events {
            match event {
                TransportEvent::Opened => {
                    state.connected = true;
                    state.connecting = false;
                }
                TransportEvent::Closed { .. } => {
                    state.connected = false;
                    state.connecting = false;
                }
                TransportEvent::Frame(_) => {}
            }
        }
        events
    }
}
