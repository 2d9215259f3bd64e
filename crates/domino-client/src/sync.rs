//! Applies authoritative server updates to the local board, hand and turn
//! state, and turns local intents into guarded requests.
//!
//! Local state only changes when the server confirms something. Intents are
//! checked against the current state and produce a [`ClientMessage`] to send;
//! nothing is mutated until the echo arrives.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use domino_config::GameConfig;
use domino_engine::{
    ActionRejected, BoardEnds, BoardError, BoardGraph, End, Hand, Phase, Pip, Placement, PlayerId, Tile,
    TileId, TileSet, TileSetError, TurnAction, TurnEngine,
};
use domino_net::protocol::{
    ChatIn, ChatOut, GameBlocked, GameEnded, GameStarted, GameStateSnapshot, PlayTile, PlayerJoined,
    PlayerLeft, PlayerReadyChanged, ReadyFlag, RoundEnded, ServerError, TileDrawn, TilePlayed, TurnChanged,
    TurnSkipped,
};
use domino_net::{ClientMessage, CloseCode, ServerMessage, WireTile};

use crate::observer::{Observers, SubscriptionId};

// ---------------------------------------------------------------------------
// Summary and events
// ---------------------------------------------------------------------------

/// Table-level facts that are not part of the board or the local hand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSummary {
    /// Seating order.
    pub players: Vec<PlayerId>,
    /// Display names shared by the server.
    pub names: BTreeMap<PlayerId, String>,
    /// Ready flags in the waiting room.
    pub ready: BTreeMap<PlayerId, bool>,
    /// Tiles held by each player.
    pub hand_counts: BTreeMap<PlayerId, usize>,
    /// Tiles left in the draw pile.
    pub draw_pile: usize,
    /// Cumulative scores.
    pub scores: BTreeMap<PlayerId, i64>,
    /// Current round, starting at 1.
    pub round: u32,
    /// Rounds in the game.
    pub total_rounds: u32,
    /// Winner of the last finished round or game.
    pub winner: Option<PlayerId>,
    /// Hands revealed at the end of a round.
    pub revealed_hands: BTreeMap<PlayerId, Vec<WireTile>>,
}

/// Connection changes, surfaced separately from gameplay errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityNotice {
    /// Connected; `resumed` means a resync was requested.
    Connected { resumed: bool },
    /// The connection dropped.
    Lost { code: CloseCode },
    /// Another connection attempt is scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// A message could not be sent or queued.
    SendFailed { reason: String },
    /// Reconnection gave up. A new `connect` is required.
    Fatal { attempts: u32 },
    /// A local disconnect completed.
    Disconnected,
}

/// What observers are told about.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// A player took a seat.
    PlayerJoined { player: PlayerId, name: Option<String> },
    /// A player left.
    PlayerLeft { player: PlayerId },
    /// A ready flag changed.
    ReadyChanged { player: PlayerId, ready: bool },
    /// A round started and the local hand was dealt.
    GameStarted { round: u32, first_player: PlayerId },
    /// The turn moved.
    TurnChanged { player: PlayerId, is_mine: bool },
    /// A tile was placed on the board.
    TilePlayed { player: PlayerId, tile: Tile, end: End },
    /// A player drew; `tile` is only known for the local player.
    TileDrawn { player: PlayerId, tile: Option<Tile> },
    /// A player passed.
    TurnSkipped { player: PlayerId, reason: String },
    /// Nobody can move.
    GameBlocked { reason: String },
    /// A round was scored.
    RoundEnded {
        winner: Option<PlayerId>,
        round: u32,
        next_round: Option<u32>,
    },
    /// The game is over.
    GameEnded {
        winner: Option<PlayerId>,
        scores: BTreeMap<PlayerId, i64>,
    },
    /// Table chat.
    Chat { player: PlayerId, message: String },
    /// The server refused a request. Local state is unchanged.
    ServerError { code: String, message: String },
    /// Local state was replaced by a snapshot.
    StateRestored,
    /// An authoritative update could not be applied; a resync follows.
    SyncFailed(SyncError),
    /// Connection status changed.
    Connectivity(ConnectivityNotice),
}

/// Why an authoritative update could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The server named a tile that does not exist in this set.
    #[error("tile [{left}|{right}] is not part of the tile set")]
    UnknownTile { left: Pip, right: Pip },

    /// The server says the local player played a tile they do not hold.
    #[error("tile [{left}|{right}] is not in the local hand")]
    NotInHand { left: Pip, right: Pip },

    /// The local board refuses a placement the server accepted.
    #[error("server placement rejected by the local board: {0}")]
    Board(#[from] BoardError),

    /// The local board no longer matches the server's after a move.
    ///
    /// Main-line ends and tile counts are always compared. A branch end is
    /// compared only when the server reported it, so `None` in `server.top`
    /// or `server.bottom` means "not sent", not "unopened".
    #[error(
        "board diverged: local {local:?} ({local_len} tiles), server {server:?} ({server_len} tiles)"
    )]
    Diverged {
        local: BoardEnds,
        server: BoardEnds,
        local_len: usize,
        server_len: usize,
    },

    /// An inbound frame could not be decoded.
    #[error("undecodable server frame: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// SyncCoordinator
// ---------------------------------------------------------------------------

/// Owns the local view of the table.
pub struct SyncCoordinator {
    tiles: TileSet,
    board: BoardGraph,
    hand: Hand,
    turn: TurnEngine,
    summary: GameSummary,
    resync_pending: bool,
    turn_serial: u64,
    observers: Observers<GameEvent>,
}

impl SyncCoordinator {
    /// A coordinator for `local_player` with the set and timer from `game`.
    pub fn new(local_player: PlayerId, game: &GameConfig) -> Result<Self, TileSetError> {
        let tiles = TileSet::new(game.max_pip)?;
        Ok(Self {
            tiles,
            board: BoardGraph::new(),
            hand: Hand::new(local_player.clone()),
            turn: TurnEngine::new(local_player, game.turn_time_limit()),
            summary: GameSummary::default(),
            resync_pending: false,
            turn_serial: 0,
            observers: Observers::new(),
        })
    }

    // --- State access ---

    /// The board.
    pub fn board(&self) -> &BoardGraph {
        &self.board
    }

    /// The local hand.
    pub fn hand(&self) -> &Hand {
        &self.hand
    }

    /// Turn and phase.
    pub fn turn(&self) -> &TurnEngine {
        &self.turn
    }

    /// Table summary.
    pub fn summary(&self) -> &GameSummary {
        &self.summary
    }

    /// The player this client acts for.
    pub fn local_player(&self) -> &PlayerId {
        self.turn.local_player()
    }

    /// Whether a snapshot has been requested and not yet applied.
    pub fn is_resync_pending(&self) -> bool {
        self.resync_pending
    }

    /// Increases whenever the local player may have a new decision to make:
    /// a turn starts, a state snapshot lands or a local draw is confirmed.
    pub fn turn_serial(&self) -> u64 {
        self.turn_serial
    }

    /// Every `(tile, end)` the local player could play now.
    pub fn legal_moves(&self) -> Vec<(Tile, End)> {
        let mut moves = Vec::new();
        for tile in self.hand.tiles() {
            if self.board.is_empty() {
                moves.push((*tile, End::Left));
                continue;
            }
            for end in self.board.legal_ends(tile) {
                moves.push((*tile, end));
            }
        }
        moves
    }

    // --- Observers ---

    /// Register an observer.
    pub fn subscribe(&mut self, callback: impl FnMut(&GameEvent) + 'static) -> SubscriptionId {
        self.observers.subscribe(callback)
    }

    /// Remove an observer.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Remove every observer.
    pub fn clear_observers(&mut self) {
        self.observers.clear();
    }

    /// Forward a connectivity change to observers.
    pub fn notify_connectivity(&mut self, notice: ConnectivityNotice) {
        self.observers.notify(&GameEvent::Connectivity(notice));
    }

    // --- Intents ---

    /// Request placing `tile_id` on `end`.
    pub fn request_play(&self, tile_id: TileId, end: End) -> Result<ClientMessage, ActionRejected> {
        self.guard(TurnAction::Play)?;
        let tile = self
            .hand
            .get(tile_id)
            .ok_or(ActionRejected::TileNotInHand(tile_id))?;
        if !self.board.is_empty() {
            self.board.validate(tile, end)?;
        }
        Ok(ClientMessage::PlayTile(PlayTile {
            tile: WireTile::from(tile),
            position: end,
        }))
    }

    /// Request a tile from the draw pile.
    pub fn request_draw(&self) -> Result<ClientMessage, ActionRejected> {
        self.guard(TurnAction::Draw)?;
        Ok(ClientMessage::DrawTile)
    }

    /// Request passing the turn.
    pub fn request_skip(&self) -> Result<ClientMessage, ActionRejected> {
        self.guard(TurnAction::Skip)?;
        Ok(ClientMessage::SkipTurn)
    }

    /// Set the ready flag.
    pub fn request_ready(&self, ready: bool) -> ClientMessage {
        ClientMessage::PlayerReady(ReadyFlag { ready })
    }

    /// Ask the server to start the game.
    pub fn request_start(&self) -> ClientMessage {
        ClientMessage::StartGame
    }

    /// Say something at the table.
    pub fn request_chat(&self, message: impl Into<String>) -> ClientMessage {
        ClientMessage::ChatMessage(ChatOut {
            message: message.into(),
        })
    }

    /// Leave the room.
    pub fn request_leave(&self) -> ClientMessage {
        ClientMessage::LeaveRoom
    }

    /// Mark local state as stale and return the snapshot request to send.
    /// Incremental updates are ignored until the snapshot arrives.
    pub fn begin_resync(&mut self) -> ClientMessage {
        if !self.resync_pending {
            tracing::info!("requesting full state resync");
        }
        self.resync_pending = true;
        ClientMessage::RequestState
    }

    /// Drop a resync whose request never left, so updates apply again.
    pub fn cancel_resync(&mut self) {
        if self.resync_pending {
            tracing::debug!("resync cancelled");
        }
        self.resync_pending = false;
    }

    /// Run the turn countdown. Returns the skip request to send when the
    /// local player's time runs out.
    pub fn tick(&mut self, now: Instant) -> Option<ClientMessage> {
        match self.turn.tick(now)? {
            TurnAction::Skip => Some(ClientMessage::SkipTurn),
            TurnAction::Play | TurnAction::Draw => None,
        }
    }

    fn guard(&self, action: TurnAction) -> Result<(), ActionRejected> {
        if self.resync_pending {
            return Err(ActionRejected::Resyncing);
        }
        self.turn.authorize(action)
    }

    // --- Authoritative updates ---

    /// Apply one inbound server message.
    ///
    /// Failures are reported to observers as [`GameEvent::SyncFailed`] and
    /// returned; the caller is expected to start a resync.
    pub fn apply(&mut self, msg: ServerMessage, now: Instant) -> Result<(), SyncError> {
        if self.resync_pending && supersedable(&msg) {
            tracing::debug!(kind = msg.kind(), "update superseded by pending resync");
            return Ok(());
        }
        tracing::trace!(kind = msg.kind(), "applying server update");

        let result = match msg {
            ServerMessage::PlayerJoined(m) => {
                self.on_player_joined(m);
                Ok(())
            }
            ServerMessage::PlayerLeft(m) => {
                self.on_player_left(m);
                Ok(())
            }
            ServerMessage::PlayerReady(m) => {
                self.on_player_ready(m);
                Ok(())
            }
            ServerMessage::GameStarted(m) => self.on_game_started(m, now),
            ServerMessage::TurnChanged(m) => {
                self.on_turn_changed(m, now);
                Ok(())
            }
            ServerMessage::TilePlayed(m) => self.on_tile_played(m),
            ServerMessage::TileDrawn(m) => self.on_tile_drawn(m),
            ServerMessage::TurnSkipped(TurnSkipped { player_id, reason }) => {
                self.observers.notify(&GameEvent::TurnSkipped {
                    player: player_id,
                    reason,
                });
                Ok(())
            }
            ServerMessage::GameBlocked(m) => {
                self.on_game_blocked(m);
                Ok(())
            }
            ServerMessage::RoundEnded(m) => {
                self.on_round_ended(m);
                Ok(())
            }
            ServerMessage::GameEnded(m) => {
                self.on_game_ended(m);
                Ok(())
            }
            ServerMessage::ChatMessage(ChatIn { player_id, message }) => {
                self.observers.notify(&GameEvent::Chat {
                    player: player_id,
                    message,
                });
                Ok(())
            }
            ServerMessage::Error(ServerError { code, message }) => {
                tracing::warn!(%code, %message, "server rejected a request");
                self.observers.notify(&GameEvent::ServerError { code, message });
                Ok(())
            }
            ServerMessage::Pong => Ok(()),
            ServerMessage::GameState(snapshot) => self.restore(snapshot, now),
        };

        if let Err(ref error) = result {
            self.report_failure(error.clone());
        }
        result
    }

    /// Report a failure that happened outside `apply`, e.g. an undecodable
    /// frame.
    pub fn report_failure(&mut self, error: SyncError) {
        tracing::warn!(%error, "local state may be out of sync");
        self.observers.notify(&GameEvent::SyncFailed(error));
    }

    fn resolve(&self, wire: WireTile) -> Result<Tile, SyncError> {
        self.tiles
            .tile_for(wire.left, wire.right)
            .ok_or(SyncError::UnknownTile {
                left: wire.left,
                right: wire.right,
            })
    }

    fn resolve_all(&self, wires: &[WireTile]) -> Result<Vec<Tile>, SyncError> {
        wires.iter().map(|w| self.resolve(*w)).collect()
    }

    fn is_local(&self, player: &PlayerId) -> bool {
        player == self.turn.local_player()
    }

    fn on_player_joined(&mut self, m: PlayerJoined) {
        if !self.summary.players.contains(&m.player_id) {
            self.summary.players.push(m.player_id.clone());
        }
        if let Some(name) = &m.name {
            self.summary.names.insert(m.player_id.clone(), name.clone());
        }
        if self.is_local(&m.player_id) {
            self.turn.on_room_joined();
        }
        self.observers.notify(&GameEvent::PlayerJoined {
            player: m.player_id,
            name: m.name,
        });
    }

    fn on_player_left(&mut self, m: PlayerLeft) {
        self.summary.players.retain(|p| *p != m.player_id);
        self.summary.ready.remove(&m.player_id);
        self.observers
            .notify(&GameEvent::PlayerLeft { player: m.player_id });
    }

    fn on_player_ready(&mut self, m: PlayerReadyChanged) {
        self.summary.ready.insert(m.player_id.clone(), m.ready);
        self.observers.notify(&GameEvent::ReadyChanged {
            player: m.player_id,
            ready: m.ready,
        });
    }

    fn on_game_started(&mut self, m: GameStarted, now: Instant) -> Result<(), SyncError> {
        let dealt = self.resolve_all(&m.hand)?;
        let local = self.turn.local_player().clone();

        self.board.reset();
        self.hand = Hand::with_tiles(local, dealt);
        let per_player = self.hand.len();
        self.summary.hand_counts = m.players.iter().map(|p| (p.clone(), per_player)).collect();
        self.summary.draw_pile = self
            .tiles
            .inventory()
            .len()
            .saturating_sub(per_player * m.players.len());
        self.summary.players = m.players;
        self.summary.round = m.round;
        self.summary.total_rounds = m.total_rounds;
        self.summary.winner = None;
        self.summary.revealed_hands.clear();

        self.turn.on_game_started(m.first_player.clone(), now);
        self.turn_serial += 1;
        tracing::info!(round = m.round, first = %m.first_player, hand = per_player, "round started");
        self.observers.notify(&GameEvent::GameStarted {
            round: m.round,
            first_player: m.first_player,
        });
        Ok(())
    }

    fn on_turn_changed(&mut self, m: TurnChanged, now: Instant) {
        let limit = (m.timer > 0).then(|| Duration::from_secs(m.timer));
        self.turn.on_turn_changed(m.player_id.clone(), limit, now);
        self.turn_serial += 1;
        let is_mine = self.is_local(&m.player_id);
        self.observers.notify(&GameEvent::TurnChanged {
            player: m.player_id,
            is_mine,
        });
    }

    fn on_tile_played(&mut self, m: TilePlayed) -> Result<(), SyncError> {
        let tile = self.resolve(m.tile)?;
        let mine = self.is_local(&m.player_id);
        if mine && !self.hand.contains(tile.id()) {
            return Err(SyncError::NotInHand {
                left: m.tile.left,
                right: m.tile.right,
            });
        }

        if self.board.is_empty() {
            self.board.place_first_oriented(tile, m.left_end, m.right_end)?;
        } else {
            self.board.place(tile, m.position)?;
        }
        if mine {
            self.hand.remove(tile.id());
        }
        self.summary
            .hand_counts
            .insert(m.player_id.clone(), m.remaining_tiles);

        self.check_divergence(&m)?;
        self.observers.notify(&GameEvent::TilePlayed {
            player: m.player_id,
            tile,
            end: m.position,
        });
        Ok(())
    }

    /// Compare the locally derived board with the values the server sent.
    fn check_divergence(&self, m: &TilePlayed) -> Result<(), SyncError> {
        let local = self.board.ends();
        let line_ok = (local.left, local.right) == (Some(m.left_end), Some(m.right_end));
        let branches_ok = m.top_end.is_none_or(|v| local.top == Some(v))
            && m.bottom_end.is_none_or(|v| local.bottom == Some(v));

        if line_ok && branches_ok && self.board.len() == m.board.len() {
            return Ok(());
        }
        Err(SyncError::Diverged {
            local,
            server: BoardEnds {
                left: Some(m.left_end),
                right: Some(m.right_end),
                top: m.top_end,
                bottom: m.bottom_end,
            },
            local_len: self.board.len(),
            server_len: m.board.len(),
        })
    }

    fn on_tile_drawn(&mut self, m: TileDrawn) -> Result<(), SyncError> {
        let tile = m.tile.map(|w| self.resolve(w)).transpose()?;
        let mine = self.is_local(&m.player_id);
        self.summary.draw_pile = m.remaining_tiles;

        if mine {
            match tile {
                Some(tile) if !self.hand.contains(tile.id()) => self.hand.push(tile),
                Some(tile) => tracing::debug!(%tile, "drawn tile already in hand"),
                None => tracing::warn!("draw confirmed without the drawn tile"),
            }
            self.summary
                .hand_counts
                .insert(m.player_id.clone(), self.hand.len());
            self.turn_serial += 1;
        } else {
            *self.summary.hand_counts.entry(m.player_id.clone()).or_insert(0) += 1;
        }

        self.observers.notify(&GameEvent::TileDrawn {
            player: m.player_id,
            tile: if mine { tile } else { None },
        });
        Ok(())
    }

    fn on_game_blocked(&mut self, m: GameBlocked) {
        tracing::info!(reason = %m.reason, "game blocked");
        self.summary.revealed_hands = m.player_hands;
        self.observers
            .notify(&GameEvent::GameBlocked { reason: m.reason });
    }

    fn on_round_ended(&mut self, m: RoundEnded) {
        self.summary.scores = m.scores;
        self.summary.winner = m.winner.clone();
        self.summary.round = m.round;
        self.summary.revealed_hands = m.player_hands;
        self.turn.on_round_ended();
        tracing::info!(round = m.round, winner = ?m.winner, "round ended");
        self.observers.notify(&GameEvent::RoundEnded {
            winner: m.winner,
            round: m.round,
            next_round: m.next_round,
        });
    }

    fn on_game_ended(&mut self, m: GameEnded) {
        self.summary.scores = m.scores.clone();
        self.summary.winner = m.winner.clone();
        self.turn.on_game_ended();
        tracing::info!(winner = ?m.winner, duration_secs = m.duration, "game over");
        self.observers.notify(&GameEvent::GameEnded {
            winner: m.winner,
            scores: m.scores,
        });
    }

    /// Replace board, hand, turn and summary with a snapshot.
    fn restore(&mut self, s: GameStateSnapshot, now: Instant) -> Result<(), SyncError> {
        let hand = self.resolve_all(&s.hand)?;
        let played = s
            .board
            .iter()
            .map(|p| {
                Ok(Placement {
                    tile: self.resolve(p.tile)?,
                    end: p.position,
                })
            })
            .collect::<Result<Vec<_>, SyncError>>()?;
        let ends = BoardEnds {
            left: s.left_end,
            right: s.right_end,
            top: s.top_end,
            bottom: s.bottom_end,
        };

        let local = self.turn.local_player().clone();
        self.board = BoardGraph::from_snapshot(played, ends);
        self.hand = Hand::with_tiles(local, hand);
        self.turn.restore(
            s.phase,
            s.current_player,
            s.time_remaining.map(Duration::from_secs),
            now,
        );
        self.summary.players = s.players;
        self.summary.hand_counts = s.hand_counts;
        self.summary.draw_pile = s.draw_pile;
        self.summary.scores = s.scores;
        self.summary.round = s.round;
        self.summary.total_rounds = s.total_rounds;
        if s.phase != Phase::GameOver {
            self.summary.winner = None;
        }

        self.resync_pending = false;
        self.turn_serial += 1;
        tracing::info!(
            phase = %s.phase,
            board = self.board.len(),
            hand = self.hand.len(),
            "state restored from snapshot"
        );
        self.observers.notify(&GameEvent::StateRestored);
        Ok(())
    }
}

/// Deltas to board, hand or turn that a pending snapshot replaces anyway.
fn supersedable(msg: &ServerMessage) -> bool {
    matches!(
        msg,
        ServerMessage::GameStarted(_)
            | ServerMessage::TurnChanged(_)
            | ServerMessage::TilePlayed(_)
            | ServerMessage::TileDrawn(_)
            | ServerMessage::TurnSkipped(_)
    )
}
