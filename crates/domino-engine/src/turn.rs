//! Turn state machine: phase, whose turn it is, and the turn countdown.
//!
//! `Lobby -> Waiting -> Playing -> GameOver`. Every transition follows a
//! confirmed server message except the local timeout, which only produces a
//! skip *request*; the server decides whether the skip happens.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::board::BoardError;
use crate::tile::{PlayerId, TileId};

/// Lifecycle phase of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Connected to the room API but not seated at a table yet.
    Lobby,
    /// Seated, waiting for a game or the next round to start.
    Waiting,
    /// A round is in progress.
    Playing,
    /// The game finished. Only a new `game_started` leaves this phase.
    GameOver,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Lobby => "lobby",
            Phase::Waiting => "waiting",
            Phase::Playing => "playing",
            Phase::GameOver => "game over",
        };
        f.write_str(name)
    }
}

/// A turn action the local player can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnAction {
    /// Place a tile.
    Play,
    /// Take a tile from the draw pile.
    Draw,
    /// Pass the turn.
    Skip,
}

/// Why a local action was refused before reaching the network.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionRejected {
    /// No round is in progress.
    #[error("no round in progress (phase: {0})")]
    WrongPhase(Phase),
    /// Another player holds the turn.
    #[error("it is not your turn")]
    NotYourTurn,
    /// The tile is not in the local hand.
    #[error("tile {0:?} is not in your hand")]
    TileNotInHand(TileId),
    /// The board refuses the placement.
    #[error("illegal placement: {0}")]
    IllegalPlacement(#[from] BoardError),
    /// A resync is in progress; local state is about to be replaced.
    #[error("waiting for the server to resynchronize the table")]
    Resyncing,
}

/// Tracks phase, turn holder and the per-turn deadline.
#[derive(Debug, Clone)]
pub struct TurnEngine {
    local_player: PlayerId,
    phase: Phase,
    current_player: Option<PlayerId>,
    deadline: Option<Instant>,
    default_time_limit: Duration,
    timeout_fired: bool,
}

impl TurnEngine {
    /// A fresh engine in [`Phase::Lobby`].
    ///
    /// `default_time_limit` is used for turns whose timer the server has
    /// not announced.
    pub fn new(local_player: PlayerId, default_time_limit: Duration) -> Self {
        Self {
            local_player,
            phase: Phase::Lobby,
            current_player: None,
            deadline: None,
            default_time_limit,
            timeout_fired: false,
        }
    }

    /// The player this client acts for.
    pub fn local_player(&self) -> &PlayerId {
        &self.local_player
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The player whose turn it is, if a round is running.
    pub fn current_player(&self) -> Option<&PlayerId> {
        self.current_player.as_ref()
    }

    /// Whether the local player holds the turn.
    pub fn is_my_turn(&self) -> bool {
        self.current_player.as_ref() == Some(&self.local_player)
    }

    /// When the current turn expires.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left on the current turn, zero once expired.
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(now))
    }

    /// The server seated the local player.
    pub fn on_room_joined(&mut self) {
        if self.phase == Phase::Lobby {
            self.phase = Phase::Waiting;
        }
    }

    /// A game or a new round began with `first_player` to move.
    pub fn on_game_started(&mut self, first_player: PlayerId, now: Instant) {
        self.phase = Phase::Playing;
        self.start_turn(first_player, None, now);
    }

    /// The turn passed to `player` with `time_limit` to act.
    pub fn on_turn_changed(&mut self, player: PlayerId, time_limit: Option<Duration>, now: Instant) {
        if self.phase != Phase::Playing {
            tracing::debug!(phase = %self.phase, %player, "turn change outside a running round");
        }
        self.start_turn(player, time_limit, now);
    }

    /// The round finished; wait for the next `game_started`.
    pub fn on_round_ended(&mut self) {
        if self.phase == Phase::Playing {
            self.phase = Phase::Waiting;
        }
        self.clear_turn();
    }

    /// The game finished.
    pub fn on_game_ended(&mut self) {
        self.phase = Phase::GameOver;
        self.clear_turn();
    }

    /// Replace the whole turn state from a snapshot.
    pub fn restore(
        &mut self,
        phase: Phase,
        current_player: Option<PlayerId>,
        time_remaining: Option<Duration>,
        now: Instant,
    ) {
        self.phase = phase;
        self.current_player = current_player;
        self.deadline = match (&self.current_player, phase) {
            (Some(_), Phase::Playing) => {
                Some(now + time_remaining.unwrap_or(self.default_time_limit))
            }
            _ => None,
        };
        self.timeout_fired = false;
    }

    /// Local guard: may the local player take `action` right now?
    pub fn authorize(&self, action: TurnAction) -> Result<(), ActionRejected> {
        if self.phase != Phase::Playing {
            return Err(ActionRejected::WrongPhase(self.phase));
        }
        if !self.is_my_turn() {
            tracing::debug!(?action, "rejected: not our turn");
            return Err(ActionRejected::NotYourTurn);
        }
        Ok(())
    }

    /// Advance the countdown. Returns `Some(TurnAction::Skip)` once when the
    /// local player's turn runs out.
    pub fn tick(&mut self, now: Instant) -> Option<TurnAction> {
        if self.phase != Phase::Playing || !self.is_my_turn() || self.timeout_fired {
            return None;
        }
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.timeout_fired = true;
        tracing::info!("turn timer expired, requesting skip");
        Some(TurnAction::Skip)
    }

    fn start_turn(&mut self, player: PlayerId, time_limit: Option<Duration>, now: Instant) {
        self.deadline = Some(now + time_limit.unwrap_or(self.default_time_limit));
        self.current_player = Some(player);
        self.timeout_fired = false;
    }

    fn clear_turn(&mut self) {
        self.current_player = None;
        self.deadline = None;
        self.timeout_fired = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(30);

    fn engine() -> TurnEngine {
        TurnEngine::new(PlayerId::from("me"), LIMIT)
    }

    fn playing(first: &str, now: Instant) -> TurnEngine {
        let mut engine = engine();
        engine.on_room_joined();
        engine.on_game_started(PlayerId::from(first), now);
        engine
    }

    #[test]
    fn test_starts_in_lobby_and_rejects_actions() {
        let engine = engine();
        assert_eq!(engine.phase(), Phase::Lobby);
        assert_eq!(
            engine.authorize(TurnAction::Draw),
            Err(ActionRejected::WrongPhase(Phase::Lobby))
        );
    }

    #[test]
    fn test_phase_progression() {
        let now = Instant::now();
        let mut engine = engine();
        engine.on_room_joined();
        assert_eq!(engine.phase(), Phase::Waiting);

        engine.on_game_started(PlayerId::from("me"), now);
        assert_eq!(engine.phase(), Phase::Playing);
        assert!(engine.is_my_turn());

        engine.on_round_ended();
        assert_eq!(engine.phase(), Phase::Waiting);
        assert_eq!(engine.current_player(), None);

        engine.on_game_started(PlayerId::from("other"), now);
        engine.on_game_ended();
        assert_eq!(engine.phase(), Phase::GameOver);
        assert_eq!(
            engine.authorize(TurnAction::Play),
            Err(ActionRejected::WrongPhase(Phase::GameOver))
        );

        engine.on_game_started(PlayerId::from("me"), now);
        assert_eq!(engine.phase(), Phase::Playing);
        assert!(engine.authorize(TurnAction::Play).is_ok());
    }

    #[test]
    fn test_not_my_turn_is_rejected() {
        let engine = playing("other", Instant::now());
        assert_eq!(
            engine.authorize(TurnAction::Skip),
            Err(ActionRejected::NotYourTurn)
        );
    }

    #[test]
    fn test_turn_changed_resets_deadline() {
        let now = Instant::now();
        let mut engine = playing("other", now);
        let later = now + Duration::from_secs(10);

        engine.on_turn_changed(PlayerId::from("me"), Some(Duration::from_secs(15)), later);

        assert!(engine.is_my_turn());
        assert_eq!(engine.deadline(), Some(later + Duration::from_secs(15)));
        assert_eq!(
            engine.time_remaining(later + Duration::from_secs(5)),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            engine.time_remaining(later + Duration::from_secs(60)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_timeout_requests_skip_once() {
        let now = Instant::now();
        let mut engine = playing("me", now);

        assert_eq!(engine.tick(now + Duration::from_secs(29)), None);
        assert_eq!(engine.tick(now + LIMIT), Some(TurnAction::Skip));
        assert_eq!(engine.tick(now + LIMIT + Duration::from_secs(1)), None);
        // Still our turn: the skip is only a request.
        assert!(engine.is_my_turn());

        let next = now + Duration::from_secs(40);
        engine.on_turn_changed(PlayerId::from("me"), Some(Duration::from_secs(5)), next);
        assert_eq!(engine.tick(next + Duration::from_secs(5)), Some(TurnAction::Skip));
    }

    #[test]
    fn test_timeout_ignored_for_other_players() {
        let now = Instant::now();
        let mut engine = playing("other", now);
        assert_eq!(engine.tick(now + Duration::from_secs(300)), None);
    }

    #[test]
    fn test_restore_from_snapshot() {
        let now = Instant::now();
        let mut engine = engine();

        engine.restore(
            Phase::Playing,
            Some(PlayerId::from("me")),
            Some(Duration::from_secs(3)),
            now,
        );
        assert_eq!(engine.phase(), Phase::Playing);
        assert_eq!(engine.deadline(), Some(now + Duration::from_secs(3)));

        engine.restore(Phase::Waiting, None, None, now);
        assert_eq!(engine.deadline(), None);
        assert_eq!(engine.tick(now + LIMIT), None);
    }
}
