//! Headless domino table client.
//!
//! [`GameSession`] ties a [`domino_net::ConnectionManager`] to a
//! [`SyncCoordinator`] and is driven by one periodic tick. UI code observes
//! [`GameEvent`]s and issues intents back through the session.

pub mod observer;
pub mod session;
pub mod sync;

pub use observer::{Observers, SubscriptionId};
pub use session::{GameSession, SessionError, choose_move, connection_settings};
pub use sync::{ConnectivityNotice, GameEvent, GameSummary, SyncCoordinator, SyncError};
