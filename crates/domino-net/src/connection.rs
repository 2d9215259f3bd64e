//! Connection state machine: connect, heartbeat, liveness, reconnection
//! with backoff, and the outbound queue.
//!
//! [`ConnectionManager`] does no I/O of its own. The caller drives it with
//! [`ConnectionManager::tick`] from the single game thread; every tick polls
//! the [`Transport`], runs due timers and returns what happened as
//! [`ConnectionEvent`]s, in order.

use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::protocol::{ClientMessage, MessageError, ServerMessage, decode_server, encode_client};
use crate::queue::OutboundQueue;
use crate::reconnection::{ReconnectConfig, ReconnectState};
use crate::transport::{CloseCode, Transport, TransportError, TransportEvent};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of the real-time connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection, possibly waiting for a scheduled reconnect.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; frames flow both ways.
    Open,
    /// A deliberate close is in progress.
    Closing,
}

/// Observable connection status.
///
/// Wraps a `tokio::sync::watch` channel so UI code can subscribe to status
/// changes without polling the manager.
#[derive(Debug)]
pub struct ConnectionStatusWatch {
    tx: watch::Sender<ConnectionStatus>,
    rx: watch::Receiver<ConnectionStatus>,
}

impl Default for ConnectionStatusWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStatusWatch {
    /// Create a new watch initialized to [`ConnectionStatus::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionStatus::Disconnected);
        Self { tx, rx }
    }

    /// Set the current status, notifying subscribers if it changed.
    pub fn set(&self, status: ConnectionStatus) {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.rx.clone()
    }

    /// Return the current status without blocking.
    pub fn current(&self) -> ConnectionStatus {
        *self.rx.borrow()
    }
}

// ---------------------------------------------------------------------------
// Settings, events, errors
// ---------------------------------------------------------------------------

/// Timing and sizing knobs for a [`ConnectionManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Interval between heartbeat pings while open.
    pub heartbeat_interval: Duration,
    /// Close the connection if nothing arrives for this long. `None` only
    /// sends heartbeats and relies on transport close events.
    pub liveness_timeout: Option<Duration>,
    /// Delay between consecutive frames when flushing the queue.
    pub flush_interval: Duration,
    /// Maximum number of frames held while offline.
    pub max_queued_messages: usize,
    /// Backoff policy for reconnection.
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
            liveness_timeout: Some(Duration::from_secs(45)),
            flush_interval: Duration::from_millis(50),
            max_queued_messages: 256,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Something the connection reports back to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection opened. `resumed` is true when an earlier connection
    /// of this manager had been open, so local state may be stale.
    Opened { resumed: bool },
    /// An inbound server message, in arrival order.
    Message(ServerMessage),
    /// An inbound frame could not be decoded.
    DecodeFailed { error: String, frame: String },
    /// The connection closed for a reason other than a local disconnect.
    Closed { code: CloseCode, reason: String },
    /// A reconnect attempt is due after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },
    /// A frame could not be sent. Game messages stay queued; a heartbeat
    /// is dropped.
    SendFailed { error: TransportError },
    /// The last permitted consecutive connection failed. Terminal until the
    /// next explicit `connect`.
    ReconnectsExhausted { attempts: u32 },
    /// A local `disconnect` completed.
    Disconnected,
}

/// Errors returned synchronously by [`ConnectionManager`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The offline queue is at capacity; the message was not accepted.
    #[error("outbound queue is full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[from] MessageError),

    /// The transport refused to start a connection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// ConnectionManager
// ---------------------------------------------------------------------------

/// Owns one real-time connection and keeps it alive.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    settings: ConnectionSettings,
    status: ConnectionStatusWatch,
    url: Option<String>,
    backoff: ReconnectState,
    reconnect_at: Option<Instant>,
    exhausted: bool,
    has_opened: bool,
    local_close: bool,
    queue: OutboundQueue,
    flushing: bool,
    next_flush_at: Option<Instant>,
    next_ping_at: Option<Instant>,
    last_inbound: Option<Instant>,
    pending: Vec<ConnectionEvent>,
}

impl<T: Transport> ConnectionManager<T> {
    /// A disconnected manager over `transport`.
    pub fn new(transport: T, settings: ConnectionSettings) -> Self {
        let backoff = ReconnectState::new(settings.reconnect.clone());
        let queue = OutboundQueue::new(settings.max_queued_messages);
        Self {
            transport,
            settings,
            status: ConnectionStatusWatch::new(),
            url: None,
            backoff,
            reconnect_at: None,
            exhausted: false,
            has_opened: false,
            local_close: false,
            queue,
            flushing: false,
            next_flush_at: None,
            next_ping_at: None,
            last_inbound: None,
            pending: Vec::new(),
        }
    }

    /// Start connecting to `url`. Any existing connection or reconnect
    /// schedule is superseded. The queue is kept.
    pub fn connect(&mut self, url: &str) -> Result<(), ConnectionError> {
        tracing::info!(url = %redact(url), "connecting");
        self.url = Some(url.to_string());
        self.reconnect_at = None;
        self.exhausted = false;
        self.local_close = false;
        self.backoff.reset();
        self.stop_timers();

        self.status.set(ConnectionStatus::Connecting);
        if let Err(e) = self.transport.open(url) {
            self.status.set(ConnectionStatus::Disconnected);
            return Err(e.into());
        }
        Ok(())
    }

    /// Close the connection deliberately. Clears the queue and any
    /// reconnect schedule; no reconnection follows.
    pub fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.exhausted = false;
        self.backoff.reset();
        self.queue.clear();
        self.stop_timers();

        match self.status.current() {
            ConnectionStatus::Disconnected => {
                tracing::debug!("disconnect while already disconnected");
            }
            ConnectionStatus::Closing => {}
            ConnectionStatus::Connecting | ConnectionStatus::Open => {
                tracing::info!("disconnecting");
                self.status.set(ConnectionStatus::Closing);
                self.local_close = true;
                self.transport.close();
            }
        }
    }

    /// Send `msg` now if the connection is open and idle, otherwise queue
    /// it for the next open.
    pub fn send(&mut self, msg: &ClientMessage) -> Result<(), ConnectionError> {
        let frame = encode_client(msg)?;

        if self.status.current() == ConnectionStatus::Open && !self.flushing && self.queue.is_empty() {
            if let Err(error) = self.transport.send(&frame) {
                tracing::warn!(%error, "send failed, message kept for the next open");
                self.queue.requeue_front(frame);
                self.pending.push(ConnectionEvent::SendFailed { error });
            }
            return Ok(());
        }

        if !self.queue.enqueue(frame) {
            return Err(ConnectionError::QueueFull {
                capacity: self.queue.capacity(),
            });
        }
        tracing::debug!(queued = self.queue.len(), "message queued");
        Ok(())
    }

    /// Drive the connection: poll the transport, then run the liveness,
    /// reconnect, heartbeat and flush timers that are due at `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<ConnectionEvent> {
        let mut events = std::mem::take(&mut self.pending);

        for event in self.transport.poll() {
            match event {
                TransportEvent::Opened => self.handle_open(now, &mut events),
                TransportEvent::Frame(frame) => self.handle_frame(frame, now, &mut events),
                TransportEvent::Closed { code, reason } => {
                    self.handle_close(code, reason, now, &mut events);
                }
            }
        }

        self.check_liveness(now, &mut events);
        self.run_reconnect(now, &mut events);
        self.heartbeat(now, &mut events);
        self.flush(now, &mut events);
        events
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status.current()
    }

    /// The observable status.
    pub fn status_watch(&self) -> &ConnectionStatusWatch {
        &self.status
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        self.status.current() == ConnectionStatus::Open
    }

    /// Consecutive failed connections since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.backoff.attempts()
    }

    /// When the next reconnect attempt is due, if one is scheduled.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Whether reconnection gave up.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Frames waiting to be sent.
    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    /// The endpoint of the last `connect`.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Settings in use.
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn handle_open(&mut self, now: Instant, events: &mut Vec<ConnectionEvent>) {
        if self.status.current() != ConnectionStatus::Connecting {
            tracing::debug!(status = ?self.status.current(), "ignoring open of a superseded connection");
            return;
        }
        let resumed = self.has_opened;
        self.has_opened = true;
        self.backoff.reset();
        self.reconnect_at = None;
        self.status.set(ConnectionStatus::Open);

        self.last_inbound = Some(now);
        self.next_ping_at = Some(now + self.settings.heartbeat_interval);
        if !self.queue.is_empty() {
            self.flushing = true;
            self.next_flush_at = Some(now);
        }
        tracing::info!(resumed, queued = self.queue.len(), "connection open");
        events.push(ConnectionEvent::Opened { resumed });
    }

    fn handle_frame(&mut self, frame: String, now: Instant, events: &mut Vec<ConnectionEvent>) {
        if self.status.current() != ConnectionStatus::Open {
            tracing::debug!("dropping frame received outside an open connection");
            return;
        }
        self.last_inbound = Some(now);

        match decode_server(&frame) {
            Ok(ServerMessage::Pong) => tracing::trace!("pong"),
            Ok(msg) => events.push(ConnectionEvent::Message(msg)),
            Err(e) => {
                tracing::warn!(error = %e, %frame, "undecodable frame");
                events.push(ConnectionEvent::DecodeFailed {
                    error: e.to_string(),
                    frame,
                });
            }
        }
    }

    fn handle_close(&mut self, code: CloseCode, reason: String, now: Instant, events: &mut Vec<ConnectionEvent>) {
        self.stop_timers();

        if self.local_close {
            self.local_close = false;
            self.status.set(ConnectionStatus::Disconnected);
            tracing::info!("disconnected");
            events.push(ConnectionEvent::Disconnected);
            return;
        }
        if self.status.current() == ConnectionStatus::Disconnected {
            // Already handled, e.g. a liveness timeout closed it first.
            return;
        }

        self.status.set(ConnectionStatus::Disconnected);
        events.push(ConnectionEvent::Closed {
            code,
            reason: reason.clone(),
        });

        if code.is_clean() {
            tracing::info!(%code, %reason, "connection closed by server");
            self.backoff.reset();
            return;
        }
        tracing::warn!(%code, %reason, "connection lost");
        self.schedule_reconnect(now, events);
    }

    fn schedule_reconnect(&mut self, now: Instant, events: &mut Vec<ConnectionEvent>) {
        if self.reconnect_at.is_some() || self.exhausted {
            return;
        }
        match self.backoff.next_delay() {
            Some(delay) => {
                let attempt = self.backoff.attempts();
                tracing::info!(attempt, ?delay, "reconnect scheduled");
                self.reconnect_at = Some(now + delay);
                events.push(ConnectionEvent::ReconnectScheduled { attempt, delay });
            }
            None => {
                let attempts = self.backoff.attempts();
                tracing::error!(attempts, "reconnect attempts exhausted");
                self.exhausted = true;
                events.push(ConnectionEvent::ReconnectsExhausted { attempts });
            }
        }
    }

    fn check_liveness(&mut self, now: Instant, events: &mut Vec<ConnectionEvent>) {
        let (Some(timeout), Some(last)) = (self.settings.liveness_timeout, self.last_inbound) else {
            return;
        };
        if self.status.current() != ConnectionStatus::Open || now.duration_since(last) < timeout {
            return;
        }
        tracing::warn!(?timeout, "no frames from server, closing");
        self.transport.close();
        self.handle_close(CloseCode::ABNORMAL, "liveness timeout".to_string(), now, events);
    }

    fn run_reconnect(&mut self, now: Instant, events: &mut Vec<ConnectionEvent>) {
        let Some(at) = self.reconnect_at else {
            return;
        };
        if now < at {
            return;
        }
        self.reconnect_at = None;
        let Some(url) = self.url.clone() else {
            return;
        };

        tracing::info!(attempt = self.backoff.attempts(), "reconnecting");
        self.status.set(ConnectionStatus::Connecting);
        if let Err(e) = self.transport.open(&url) {
            tracing::warn!(error = %e, "reconnect attempt could not start");
            self.status.set(ConnectionStatus::Disconnected);
            self.schedule_reconnect(now, events);
        }
    }

    fn heartbeat(&mut self, now: Instant, events: &mut Vec<ConnectionEvent>) {
        let Some(at) = self.next_ping_at else {
            return;
        };
        if now < at || self.status.current() != ConnectionStatus::Open {
            return;
        }
        self.next_ping_at = Some(now + self.settings.heartbeat_interval);
        match encode_client(&ClientMessage::Ping) {
            Ok(frame) => {
                if let Err(error) = self.transport.send(&frame) {
                    tracing::warn!(%error, "heartbeat send failed");
                    events.push(ConnectionEvent::SendFailed { error });
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to encode heartbeat"),
        }
    }

    fn flush(&mut self, now: Instant, events: &mut Vec<ConnectionEvent>) {
        if !self.flushing || self.status.current() != ConnectionStatus::Open {
            return;
        }
        if self.next_flush_at.is_some_and(|at| now < at) {
            return;
        }
        let Some(frame) = self.queue.pop_front() else {
            self.flushing = false;
            self.next_flush_at = None;
            return;
        };

        match self.transport.send(&frame) {
            Ok(()) => {
                if self.queue.is_empty() {
                    tracing::debug!("outbound queue flushed");
                    self.flushing = false;
                    self.next_flush_at = None;
                } else {
                    self.next_flush_at = Some(now + self.settings.flush_interval);
                }
            }
            Err(error) => {
                tracing::warn!(%error, remaining = self.queue.len() + 1, "flush halted");
                self.queue.requeue_front(frame);
                self.flushing = false;
                self.next_flush_at = None;
                events.push(ConnectionEvent::SendFailed { error });
            }
        }
    }

    fn stop_timers(&mut self) {
        self.flushing = false;
        self.next_flush_at = None;
        self.next_ping_at = None;
        self.last_inbound = None;
    }
}

/// Strip the query string so auth tokens stay out of the logs.
fn redact(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChatOut, PlayerLeft};
    use crate::transport::MockTransport;

    const URL: &str = "ws://test/room";

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            heartbeat_interval: Duration::from_secs(15),
            liveness_timeout: Some(Duration::from_secs(45)),
            flush_interval: Duration::from_millis(50),
            max_queued_messages: 8,
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_secs(1),
                backoff_multiplier: 2.0,
                max_delay: Duration::from_secs(30),
                max_attempts: 3,
                jitter: 0.0,
            },
        }
    }

    fn manager() -> (ConnectionManager<MockTransport>, MockTransport) {
        let remote = MockTransport::new();
        (ConnectionManager::new(remote.clone(), settings()), remote)
    }

    fn chat(text: &str) -> ClientMessage {
        ClientMessage::ChatMessage(ChatOut {
            message: text.to_string(),
        })
    }

    fn open(conn: &mut ConnectionManager<MockTransport>, remote: &MockTransport, now: Instant) -> Vec<ConnectionEvent> {
        conn.connect(URL).unwrap();
        remote.accept();
        conn.tick(now)
    }

    fn chats(remote: &MockTransport) -> Vec<String> {
        remote
            .sent_game_messages()
            .into_iter()
            .filter_map(|m| match m {
                ClientMessage::ChatMessage(c) => Some(c.message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_and_open() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();

        conn.connect(URL).unwrap();
        assert_eq!(conn.status(), ConnectionStatus::Connecting);
        assert!(conn.tick(t0).is_empty());

        remote.accept();
        assert_eq!(conn.tick(t0), vec![ConnectionEvent::Opened { resumed: false }]);
        assert_eq!(conn.status(), ConnectionStatus::Open);
        assert_eq!(remote.opened_urls(), vec![URL]);
    }

    #[test]
    fn test_status_watch_follows_lifecycle() {
        let (mut conn, remote) = manager();
        let mut rx = conn.status_watch().subscribe();
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Disconnected);

        open(&mut conn, &remote, Instant::now());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Open);
    }

    #[test]
    fn test_offline_messages_flush_in_fifo_order() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();

        for text in ["a", "b", "c"] {
            conn.send(&chat(text)).unwrap();
        }
        assert_eq!(conn.queue().len(), 3);

        open(&mut conn, &remote, t0);
        conn.tick(t0 + Duration::from_millis(50));
        conn.tick(t0 + Duration::from_millis(100));

        assert_eq!(chats(&remote), vec!["a", "b", "c"]);
        assert!(conn.queue().is_empty());
    }

    #[test]
    fn test_flush_respects_inter_message_delay() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        conn.send(&chat("a")).unwrap();
        conn.send(&chat("b")).unwrap();

        open(&mut conn, &remote, t0);
        conn.tick(t0 + Duration::from_millis(10));
        assert_eq!(chats(&remote), vec!["a"]);

        conn.tick(t0 + Duration::from_millis(50));
        assert_eq!(chats(&remote), vec!["a", "b"]);
    }

    #[test]
    fn test_send_while_flushing_goes_behind_queue() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        conn.send(&chat("a")).unwrap();
        conn.send(&chat("b")).unwrap();

        open(&mut conn, &remote, t0);
        conn.send(&chat("c")).unwrap();
        conn.tick(t0 + Duration::from_millis(50));
        conn.tick(t0 + Duration::from_millis(100));

        assert_eq!(chats(&remote), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_send_when_open_is_immediate() {
        let (mut conn, remote) = manager();
        open(&mut conn, &remote, Instant::now());

        conn.send(&chat("now")).unwrap();
        assert_eq!(chats(&remote), vec!["now"]);
        assert!(conn.queue().is_empty());
    }

    #[test]
    fn test_queue_full_is_rejected() {
        let (mut conn, _remote) = manager();
        for i in 0..8 {
            conn.send(&chat(&i.to_string())).unwrap();
        }
        let err = conn.send(&chat("overflow")).unwrap_err();
        assert!(matches!(err, ConnectionError::QueueFull { capacity: 8 }));
    }

    #[test]
    fn test_send_failure_mid_flush_requeues_at_front() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        for text in ["a", "b", "c"] {
            conn.send(&chat(text)).unwrap();
        }

        open(&mut conn, &remote, t0);
        assert_eq!(chats(&remote), vec!["a"]);

        remote.fail_next_sends(1);
        let events = conn.tick(t0 + Duration::from_millis(50));
        assert!(matches!(events.as_slice(), [ConnectionEvent::SendFailed { .. }]));
        assert_eq!(conn.queue().len(), 2);

        // Flushing stays halted until the next open.
        conn.tick(t0 + Duration::from_millis(500));
        assert_eq!(chats(&remote), vec!["a"]);

        remote.drop_connection(CloseCode::ABNORMAL);
        conn.tick(t0 + Duration::from_secs(1));
        conn.tick(t0 + Duration::from_secs(2));
        remote.accept();
        conn.tick(t0 + Duration::from_secs(2));
        conn.tick(t0 + Duration::from_secs(2) + Duration::from_millis(50));

        assert_eq!(chats(&remote), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_failed_direct_send_is_kept() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        remote.fail_next_sends(1);
        conn.send(&chat("x")).unwrap();
        assert_eq!(conn.queue().len(), 1);
        assert!(matches!(
            conn.tick(t0).as_slice(),
            [ConnectionEvent::SendFailed { .. }]
        ));
    }

    #[test]
    fn test_abnormal_close_schedules_backoff() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        remote.drop_connection(CloseCode::ABNORMAL);
        let events = conn.tick(t0);
        assert_eq!(
            events,
            vec![
                ConnectionEvent::Closed {
                    code: CloseCode::ABNORMAL,
                    reason: "dropped by test".to_string(),
                },
                ConnectionEvent::ReconnectScheduled {
                    attempt: 1,
                    delay: Duration::from_secs(1),
                },
            ]
        );
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);

        conn.tick(t0 + Duration::from_millis(999));
        assert_eq!(remote.opened_urls().len(), 1);
        conn.tick(t0 + Duration::from_secs(1));
        assert_eq!(remote.opened_urls().len(), 2);
        assert_eq!(conn.status(), ConnectionStatus::Connecting);

        remote.drop_connection(CloseCode::ABNORMAL);
        let events = conn.tick(t0 + Duration::from_secs(1));
        assert!(events.contains(&ConnectionEvent::ReconnectScheduled {
            attempt: 2,
            delay: Duration::from_secs(2),
        }));
    }

    #[test]
    fn test_reconnects_exhausted_reported_once() {
        let (mut conn, remote) = manager();
        let mut now = Instant::now();
        open(&mut conn, &remote, now);

        let mut exhausted = 0;
        let mut scheduled = 0;
        remote.drop_connection(CloseCode::ABNORMAL);
        for _ in 0..10 {
            for event in conn.tick(now) {
                match event {
                    ConnectionEvent::ReconnectScheduled { .. } => scheduled += 1,
                    ConnectionEvent::ReconnectsExhausted { attempts } => {
                        assert_eq!(attempts, 3);
                        exhausted += 1;
                    }
                    _ => {}
                }
            }
            now += Duration::from_secs(60);
            conn.tick(now);
            if conn.status() == ConnectionStatus::Connecting {
                remote.drop_connection(CloseCode::ABNORMAL);
            }
        }

        assert_eq!(scheduled, 2);
        assert_eq!(exhausted, 1);
        assert!(conn.is_exhausted());
        assert_eq!(conn.reconnect_at(), None);
        // Initial connect plus two reconnect attempts.
        assert_eq!(remote.opened_urls().len(), 3);
    }

    #[test]
    fn test_third_consecutive_close_is_terminal() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        remote.drop_connection(CloseCode::ABNORMAL);
        assert!(conn.tick(t0).contains(&ConnectionEvent::ReconnectScheduled {
            attempt: 1,
            delay: Duration::from_secs(1),
        }));

        conn.tick(t0 + Duration::from_secs(1));
        remote.drop_connection(CloseCode::ABNORMAL);
        assert!(conn.tick(t0 + Duration::from_secs(1)).contains(&ConnectionEvent::ReconnectScheduled {
            attempt: 2,
            delay: Duration::from_secs(2),
        }));

        conn.tick(t0 + Duration::from_secs(3));
        remote.drop_connection(CloseCode::ABNORMAL);
        let events = conn.tick(t0 + Duration::from_secs(3));
        assert_eq!(events.last(), Some(&ConnectionEvent::ReconnectsExhausted { attempts: 3 }));
        assert!(conn.is_exhausted());
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
        assert_eq!(conn.reconnect_at(), None);
    }

    #[test]
    fn test_explicit_connect_after_exhaustion() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        let mut settings = settings();
        settings.reconnect.max_attempts = 0;
        conn.settings = settings.clone();
        conn.backoff = ReconnectState::new(settings.reconnect);

        open(&mut conn, &remote, t0);
        remote.drop_connection(CloseCode::ABNORMAL);
        let events = conn.tick(t0);
        assert!(events.contains(&ConnectionEvent::ReconnectsExhausted { attempts: 1 }));

        let events = open(&mut conn, &remote, t0);
        assert_eq!(events, vec![ConnectionEvent::Opened { resumed: true }]);
        assert!(!conn.is_exhausted());
    }

    #[test]
    fn test_successful_reopen_resets_attempts() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        remote.drop_connection(CloseCode::ABNORMAL);
        conn.tick(t0);
        assert_eq!(conn.reconnect_attempts(), 1);

        conn.tick(t0 + Duration::from_secs(1));
        remote.accept();
        let events = conn.tick(t0 + Duration::from_secs(1));
        assert_eq!(events, vec![ConnectionEvent::Opened { resumed: true }]);
        assert_eq!(conn.reconnect_attempts(), 0);
    }

    #[test]
    fn test_clean_close_does_not_reconnect() {
        for code in [CloseCode::NORMAL, CloseCode::GOING_AWAY] {
            let (mut conn, remote) = manager();
            let t0 = Instant::now();
            open(&mut conn, &remote, t0);

            remote.drop_connection(code);
            let events = conn.tick(t0);
            assert!(matches!(events.as_slice(), [ConnectionEvent::Closed { .. }]));

            conn.tick(t0 + Duration::from_secs(120));
            assert_eq!(remote.opened_urls().len(), 1);
            assert_eq!(conn.reconnect_at(), None);
        }
    }

    #[test]
    fn test_disconnect_is_deliberate() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        conn.disconnect();
        assert_eq!(conn.status(), ConnectionStatus::Closing);
        assert_eq!(conn.tick(t0), vec![ConnectionEvent::Disconnected]);
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);

        conn.tick(t0 + Duration::from_secs(120));
        assert_eq!(remote.opened_urls().len(), 1);
    }

    #[test]
    fn test_disconnect_clears_queue_and_schedule() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);
        remote.drop_connection(CloseCode::ABNORMAL);
        conn.tick(t0);
        conn.send(&chat("pending")).unwrap();
        assert!(conn.reconnect_at().is_some());

        conn.disconnect();
        assert!(conn.queue().is_empty());
        assert_eq!(conn.reconnect_at(), None);
        assert_eq!(conn.reconnect_attempts(), 0);

        conn.tick(t0 + Duration::from_secs(120));
        assert_eq!(remote.opened_urls().len(), 1);
    }

    #[test]
    fn test_connect_supersedes_reconnect_schedule() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);
        remote.drop_connection(CloseCode::ABNORMAL);
        conn.tick(t0);

        conn.connect("ws://other/room").unwrap();
        assert_eq!(conn.reconnect_at(), None);
        conn.tick(t0 + Duration::from_secs(5));
        assert_eq!(remote.opened_urls(), vec![URL, "ws://other/room"]);
    }

    #[test]
    fn test_heartbeat_sends_ping() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        conn.tick(t0 + Duration::from_secs(14));
        assert!(remote.sent_messages().is_empty());

        conn.tick(t0 + Duration::from_secs(15));
        assert_eq!(remote.sent_messages(), vec![ClientMessage::Ping]);
    }

    #[test]
    fn test_failed_heartbeat_is_reported() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        remote.fail_next_sends(1);
        let events = conn.tick(t0 + Duration::from_secs(15));
        assert!(matches!(events.as_slice(), [ConnectionEvent::SendFailed { .. }]));
        assert!(remote.sent_messages().is_empty());
        assert!(conn.queue().is_empty());

        conn.tick(t0 + Duration::from_secs(30));
        assert_eq!(remote.sent_messages(), vec![ClientMessage::Ping]);
    }

    #[test]
    fn test_pong_is_consumed_and_refreshes_liveness() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        remote.deliver(&ServerMessage::Pong).unwrap();
        assert!(conn.tick(t0 + Duration::from_secs(30)).is_empty());

        // 44 s after the pong: still alive.
        assert!(conn.tick(t0 + Duration::from_secs(74)).is_empty());
        assert_eq!(conn.status(), ConnectionStatus::Open);
    }

    #[test]
    fn test_liveness_timeout_triggers_reconnect() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        let events = conn.tick(t0 + Duration::from_secs(45));
        assert!(matches!(
            events.first(),
            Some(ConnectionEvent::Closed {
                code: CloseCode::ABNORMAL,
                ..
            })
        ));
        assert!(matches!(events.last(), Some(ConnectionEvent::ReconnectScheduled { attempt: 1, .. })));
        assert_eq!(remote.close_calls(), 1);

        // The transport's own close report is not counted twice.
        assert!(conn.tick(t0 + Duration::from_secs(45)).is_empty());
    }

    #[test]
    fn test_liveness_disabled() {
        let remote = MockTransport::new();
        let mut conn = ConnectionManager::new(
            remote.clone(),
            ConnectionSettings {
                liveness_timeout: None,
                ..settings()
            },
        );
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        conn.tick(t0 + Duration::from_secs(600));
        assert_eq!(conn.status(), ConnectionStatus::Open);
    }

    #[test]
    fn test_inbound_messages_in_order_and_decode_failures_reported() {
        let (mut conn, remote) = manager();
        let t0 = Instant::now();
        open(&mut conn, &remote, t0);

        let left = |id: &str| {
            ServerMessage::PlayerLeft(PlayerLeft {
                player_id: id.into(),
            })
        };
        remote.deliver(&left("p1")).unwrap();
        remote.push_frame("{not json");
        remote.deliver(&left("p2")).unwrap();

        let events = conn.tick(t0);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ConnectionEvent::Message(left("p1")));
        assert!(matches!(events[1], ConnectionEvent::DecodeFailed { .. }));
        assert_eq!(events[2], ConnectionEvent::Message(left("p2")));
    }

    #[test]
    fn test_redact_strips_query() {
        assert_eq!(redact("ws://h/room?token=secret"), "ws://h/room");
        assert_eq!(redact("ws://h/room"), "ws://h/room");
    }
}
