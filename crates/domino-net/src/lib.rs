//! Real-time connection to the game room: wire protocol, transport,
//! heartbeat, reconnection with backoff, and the offline outbound queue.

pub mod connection;
pub mod protocol;
pub mod queue;
pub mod reconnection;
pub mod transport;
pub mod ws;

pub use connection::{
    ConnectionError, ConnectionEvent, ConnectionManager, ConnectionSettings, ConnectionStatus,
    ConnectionStatusWatch,
};
pub use protocol::{ClientMessage, MessageError, ServerMessage, WireTile, decode_server, encode_client};
pub use queue::OutboundQueue;
pub use reconnection::{ReconnectConfig, ReconnectState};
pub use transport::{CloseCode, MockTransport, Transport, TransportError, TransportEvent};
pub use ws::WsTransport;
