//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Each `open` spawns one connection task on the current tokio runtime. The
//! task owns the socket; the tick thread talks to it through two unbounded
//! channels (commands out, events in), so nothing here ever blocks the
//! caller.

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;

use crate::transport::{CloseCode, Transport, TransportError, TransportEvent};

enum Command {
    Text(String),
    Close,
}

struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    task: JoinHandle<()>,
    opened: bool,
}

/// [`Transport`] over a real WebSocket.
pub struct WsTransport {
    runtime: Handle,
    connection: Option<Connection>,
    pending: Vec<TransportEvent>,
}

impl WsTransport {
    /// A transport that spawns its connection tasks on the current runtime.
    pub fn new() -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|e| TransportError::NoRuntime(e.to_string()))?;
        Ok(Self::with_runtime(runtime))
    }

    /// A transport that spawns its connection tasks on `runtime`.
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            connection: None,
            pending: Vec::new(),
        }
    }

    fn teardown(&mut self) {
        if let Some(old) = self.connection.take() {
            old.task.abort();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Transport for WsTransport {
    fn open(&mut self, url: &str) -> Result<(), TransportError> {
        self.teardown();
        self.pending.clear();

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let task = self
            .runtime
            .spawn(run_connection(url.to_string(), command_rx, event_tx));

        self.connection = Some(Connection {
            commands: command_tx,
            events: event_rx,
            task,
            opened: false,
        });
        Ok(())
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let connection = self
            .connection
            .as_ref()
            .filter(|c| c.opened)
            .ok_or(TransportError::NotConnected)?;
        connection
            .commands
            .send(Command::Text(frame.to_string()))
            .map_err(|_| TransportError::SendFailed("connection task has exited".to_string()))
    }

    fn close(&mut self) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        if connection.opened && connection.commands.send(Command::Close).is_ok() {
            // The task performs the close handshake and reports `Closed`.
            return;
        }
        self.teardown();
        self.pending.push(TransportEvent::Closed {
            code: CloseCode::NORMAL,
            reason: "closed by client".to_string(),
        });
    }

    fn poll(&mut self) -> Vec<TransportEvent> {
        let mut events = std::mem::take(&mut self.pending);
        let mut finished = false;

        if let Some(connection) = self.connection.as_mut() {
            while let Ok(event) = connection.events.try_recv() {
                match event {
                    TransportEvent::Opened => connection.opened = true,
                    TransportEvent::Closed { .. } => finished = true,
                    TransportEvent::Frame(_) => {}
                }
                events.push(event);
                if finished {
                    break;
                }
            }
        }

        if finished {
            self.connection = None;
        }
        events
    }
}

async fn run_connection(
    url: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let closed = |code: CloseCode, reason: String| TransportEvent::Closed { code, reason };

    let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::debug!(%url, error = %e, "websocket connect failed");
            let _ = events.send(closed(CloseCode::ABNORMAL, e.to_string()));
            return;
        }
    };
    tracing::debug!(%url, "websocket connected");
    let _ = events.send(TransportEvent::Opened);

    let (mut sink, mut stream) = stream.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Text(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        let _ = events.send(closed(CloseCode::ABNORMAL, e.to_string()));
                        return;
                    }
                }
                Some(Command::Close) | None => {
                    let frame = CloseFrame {
                        code: WsCloseCode::Normal,
                        reason: String::from("client disconnect").into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    let _ = sink.close().await;
                    let _ = events.send(closed(CloseCode::NORMAL, "closed by client".to_string()));
                    return;
                }
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (CloseCode(u16::from(f.code)), f.reason.as_str().to_owned()))
                        .unwrap_or((CloseCode::NO_STATUS, String::new()));
                    let _ = events.send(closed(code, reason));
                    return;
                }
                // Binary frames are not part of the protocol; ping/pong
                // control frames are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.send(closed(CloseCode::ABNORMAL, e.to_string()));
                    return;
                }
                None => {
                    let _ = events.send(closed(CloseCode::ABNORMAL, "stream ended".to_string()));
                    return;
                }
            },
        }
    }
}
