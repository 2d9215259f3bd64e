//! One game session: a connection plus the local table state, driven by a
//! single tick.

use std::time::{Duration, Instant};

use domino_config::{Config, NetworkConfig};
use domino_engine::{ActionRejected, End, Phase, PlayerId, TileId, TileSetError};
use domino_net::{
    ClientMessage, ConnectionError, ConnectionEvent, ConnectionManager, ConnectionSettings, ConnectionStatus,
    ReconnectConfig, Transport,
};

use crate::observer::SubscriptionId;
use crate::sync::{ConnectivityNotice, GameEvent, SyncCoordinator, SyncError};

/// Errors returned by session intents.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The local guard refused the action; nothing was sent.
    #[error("action rejected: {0}")]
    Rejected(#[from] ActionRejected),

    /// The request could not be sent or queued.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The configured tile set is invalid.
    #[error("invalid tile set: {0}")]
    TileSet(#[from] TileSetError),
}

/// Connection settings derived from the network config section.
pub fn connection_settings(network: &NetworkConfig) -> ConnectionSettings {
    ConnectionSettings {
        heartbeat_interval: network.heartbeat_interval(),
        liveness_timeout: network.liveness_timeout(),
        flush_interval: network.flush_interval(),
        max_queued_messages: network.max_queued_messages,
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_millis(network.reconnect_base_delay_ms),
            backoff_multiplier: network.reconnect_backoff_multiplier,
            max_delay: Duration::from_millis(network.reconnect_max_delay_ms),
            max_attempts: network.reconnect_max_attempts,
            jitter: network.reconnect_jitter,
        },
    }
}

/// A connection to one room and the local view of its table.
pub struct GameSession<T: Transport> {
    connection: ConnectionManager<T>,
    sync: SyncCoordinator,
    autoplay: bool,
    autoplayed_serial: Option<u64>,
    resync_unsent: bool,
}

impl<T: Transport> GameSession<T> {
    /// A disconnected session for `local_player`.
    pub fn new(transport: T, local_player: PlayerId, config: &Config) -> Result<Self, SessionError> {
        let sync = SyncCoordinator::new(local_player, &config.game)?;
        let connection = ConnectionManager::new(transport, connection_settings(&config.network));
        Ok(Self {
            connection,
            sync,
            autoplay: config.game.autoplay,
            autoplayed_serial: None,
            resync_unsent: false,
        })
    }

    /// Connect, or reconnect after a fatal failure.
    pub fn connect(&mut self, url: &str) -> Result<(), SessionError> {
        self.connection.connect(url)?;
        Ok(())
    }

    /// Close the connection for good.
    pub fn disconnect(&mut self) {
        self.resync_unsent = false;
        self.connection.disconnect();
    }

    /// Drive the session: connection work first, then inbound updates in
    /// arrival order, then the turn timer and autoplay.
    pub fn tick(&mut self, now: Instant) {
        for event in self.connection.tick(now) {
            self.handle_connection_event(event, now);
        }
        if self.resync_unsent && self.connection.is_open() && !self.connection.queue().is_full() {
            self.request_resync();
        }

        if let Some(skip) = self.sync.tick(now) {
            self.send(&skip);
        }
        if self.autoplay {
            self.autoplay_turn();
        }
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent, now: Instant) {
        match event {
            ConnectionEvent::Opened { resumed } => {
                self.sync
                    .notify_connectivity(ConnectivityNotice::Connected { resumed });
                if resumed {
                    self.send_resync();
                }
            }
            ConnectionEvent::Message(msg) => {
                if self.sync.apply(msg, now).is_err() {
                    self.request_resync();
                }
            }
            ConnectionEvent::DecodeFailed { error, .. } => {
                self.sync.report_failure(SyncError::Decode(error));
                self.request_resync();
            }
            ConnectionEvent::Closed { code, .. } => {
                self.sync
                    .notify_connectivity(ConnectivityNotice::Lost { code });
            }
            ConnectionEvent::ReconnectScheduled { attempt, delay } => {
                self.sync
                    .notify_connectivity(ConnectivityNotice::Reconnecting { attempt, delay });
            }
            ConnectionEvent::SendFailed { error } => {
                self.sync.notify_connectivity(ConnectivityNotice::SendFailed {
                    reason: error.to_string(),
                });
            }
            ConnectionEvent::ReconnectsExhausted { attempts } => {
                self.sync
                    .notify_connectivity(ConnectivityNotice::Fatal { attempts });
            }
            ConnectionEvent::Disconnected => {
                self.sync
                    .notify_connectivity(ConnectivityNotice::Disconnected);
            }
        }
    }

    fn request_resync(&mut self) {
        if self.sync.is_resync_pending() {
            return;
        }
        self.send_resync();
    }

    /// Ask for a snapshot. If the request cannot even be queued, no snapshot
    /// will come, so updates keep applying and the request is retried on a
    /// later tick.
    fn send_resync(&mut self) {
        let request = self.sync.begin_resync();
        match self.connection.send(&request) {
            Ok(()) => self.resync_unsent = false,
            Err(e) => {
                self.sync.cancel_resync();
                if !self.resync_unsent {
                    self.report_send_failure(&e);
                }
                self.resync_unsent = true;
            }
        }
    }

    /// Send a request the session makes on its own. Failures go to
    /// observers instead of a caller.
    fn send(&mut self, msg: &ClientMessage) {
        if let Err(e) = self.connection.send(msg) {
            self.report_send_failure(&e);
        }
    }

    fn report_send_failure(&mut self, error: &ConnectionError) {
        tracing::warn!(%error, "could not send or queue message");
        self.sync.notify_connectivity(ConnectivityNotice::SendFailed {
            reason: error.to_string(),
        });
    }

    fn autoplay_turn(&mut self) {
        let serial = self.sync.turn_serial();
        if self.autoplayed_serial == Some(serial) {
            return;
        }
        let Some(msg) = choose_move(&self.sync) else {
            return;
        };
        self.autoplayed_serial = Some(serial);
        tracing::info!(?msg, "autoplay");
        self.send(&msg);
    }

    // --- Intents ---

    /// Place a tile from the local hand.
    pub fn play(&mut self, tile: TileId, end: End) -> Result<(), SessionError> {
        let msg = self.sync.request_play(tile, end)?;
        self.connection.send(&msg)?;
        Ok(())
    }

    /// Draw from the pile.
    pub fn draw(&mut self) -> Result<(), SessionError> {
        let msg = self.sync.request_draw()?;
        self.connection.send(&msg)?;
        Ok(())
    }

    /// Pass the turn.
    pub fn skip(&mut self) -> Result<(), SessionError> {
        let msg = self.sync.request_skip()?;
        self.connection.send(&msg)?;
        Ok(())
    }

    /// Set the ready flag in the waiting room.
    pub fn set_ready(&mut self, ready: bool) -> Result<(), SessionError> {
        let msg = self.sync.request_ready(ready);
        self.connection.send(&msg)?;
        Ok(())
    }

    /// Ask the server to start the game.
    pub fn start_game(&mut self) -> Result<(), SessionError> {
        let msg = self.sync.request_start();
        self.connection.send(&msg)?;
        Ok(())
    }

    /// Say something at the table.
    pub fn chat(&mut self, message: &str) -> Result<(), SessionError> {
        let msg = self.sync.request_chat(message);
        self.connection.send(&msg)?;
        Ok(())
    }

    /// Leave the room.
    pub fn leave(&mut self) -> Result<(), SessionError> {
        let msg = self.sync.request_leave();
        self.connection.send(&msg)?;
        Ok(())
    }

    // --- Access ---

    /// Register an observer for game and connectivity events.
    pub fn subscribe(&mut self, callback: impl FnMut(&GameEvent) + 'static) -> SubscriptionId {
        self.sync.subscribe(callback)
    }

    /// Remove an observer.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.sync.unsubscribe(id)
    }

    /// Local table state.
    pub fn state(&self) -> &SyncCoordinator {
        &self.sync
    }

    /// Connection state machine.
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Turn autoplay on or off.
    pub fn set_autoplay(&mut self, enabled: bool) {
        self.autoplay = enabled;
    }
}

/// Pick a move for the local player: the legal tile with the highest pip
/// total, else a draw while the pile has tiles, else a pass.
pub fn choose_move(sync: &SyncCoordinator) -> Option<ClientMessage> {
    let turn = sync.turn();
    if turn.phase() != Phase::Playing || !turn.is_my_turn() || sync.is_resync_pending() {
        return None;
    }

    let mut moves = sync.legal_moves();
    moves.sort_by_key(|(tile, _)| std::cmp::Reverse(tile.pip_total()));
    if let Some((tile, end)) = moves.first() {
        return sync.request_play(tile.id(), *end).ok();
    }
    if sync.summary().draw_pile > 0 {
        return sync.request_draw().ok();
    }
    sync.request_skip().ok()
}
