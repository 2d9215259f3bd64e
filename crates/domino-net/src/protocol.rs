//! Room protocol messages and their JSON encoding.
//!
//! Every frame is a JSON object with a `type` tag and a `data` payload:
//!
//! ```text
//! {"type": "play_tile", "data": {"tile": {"left": 3, "right": 5}, "position": "left"}}
//! ```
//!
//! Messages without a payload carry only the tag (`{"type": "draw_tile"}`).

use std::collections::BTreeMap;

use domino_engine::{End, Phase, Pip, PlayerId, Tile};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared payload types
// ---------------------------------------------------------------------------

/// A tile as it travels on the wire: just its two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WireTile {
    /// One half.
    pub left: Pip,
    /// The other half.
    pub right: Pip,
}

impl WireTile {
    /// A wire tile with the given values.
    pub fn new(left: Pip, right: Pip) -> Self {
        Self { left, right }
    }
}

impl From<&Tile> for WireTile {
    fn from(tile: &Tile) -> Self {
        Self {
            left: tile.low(),
            right: tile.high(),
        }
    }
}

/// A placed tile inside a state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePlacement {
    /// The tile.
    pub tile: WireTile,
    /// Where it was attached.
    pub position: End,
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// Messages the client sends to the room server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Toggle the ready flag in the waiting room.
    PlayerReady(ReadyFlag),
    /// Ask the server to start the game (host only; the server decides).
    StartGame,
    /// Place a tile on an end.
    PlayTile(PlayTile),
    /// Take a tile from the draw pile.
    DrawTile,
    /// Pass the turn.
    SkipTurn,
    /// Table chat.
    ChatMessage(ChatOut),
    /// Leave the room for good.
    LeaveRoom,
    /// Ask for a full `game_state` snapshot.
    RequestState,
    /// Heartbeat ping.
    Ping,
}

/// Payload of `player_ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyFlag {
    /// Whether the player is ready.
    pub ready: bool,
}

/// Payload of `play_tile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayTile {
    /// The tile to place.
    pub tile: WireTile,
    /// The end to attach it to.
    pub position: End,
}

/// Payload of an outgoing `chat_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatOut {
    /// Message text.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Messages the room server pushes to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A player took a seat.
    PlayerJoined(PlayerJoined),
    /// A player left the room.
    PlayerLeft(PlayerLeft),
    /// A player's ready flag changed.
    PlayerReady(PlayerReadyChanged),
    /// A game (or the next round) started.
    GameStarted(GameStarted),
    /// The turn moved to another player.
    TurnChanged(TurnChanged),
    /// A tile was placed.
    TilePlayed(TilePlayed),
    /// A player drew from the pile.
    TileDrawn(TileDrawn),
    /// A player passed.
    TurnSkipped(TurnSkipped),
    /// Nobody can move; the round is about to be scored.
    GameBlocked(GameBlocked),
    /// A round finished.
    RoundEnded(RoundEnded),
    /// The game finished.
    GameEnded(GameEnded),
    /// Table chat.
    ChatMessage(ChatIn),
    /// The server refused a request.
    Error(ServerError),
    /// Heartbeat pong.
    Pong,
    /// Full authoritative table state, sent after a reconnect.
    GameState(GameStateSnapshot),
}

impl ServerMessage {
    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PlayerJoined(_) => "player_joined",
            Self::PlayerLeft(_) => "player_left",
            Self::PlayerReady(_) => "player_ready",
            Self::GameStarted(_) => "game_started",
            Self::TurnChanged(_) => "turn_changed",
            Self::TilePlayed(_) => "tile_played",
            Self::TileDrawn(_) => "tile_drawn",
            Self::TurnSkipped(_) => "turn_skipped",
            Self::GameBlocked(_) => "game_blocked",
            Self::RoundEnded(_) => "round_ended",
            Self::GameEnded(_) => "game_ended",
            Self::ChatMessage(_) => "chat_message",
            Self::Error(_) => "error",
            Self::Pong => "pong",
            Self::GameState(_) => "game_state",
        }
    }
}

/// Payload of `player_joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerJoined {
    /// The joining player.
    pub player_id: PlayerId,
    /// Display name, if the server shares it.
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of `player_left`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerLeft {
    /// The leaving player.
    pub player_id: PlayerId,
}

/// Payload of an incoming `player_ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerReadyChanged {
    /// The player whose flag changed.
    pub player_id: PlayerId,
    /// New value.
    pub ready: bool,
}

/// Payload of `game_started`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStarted {
    /// Seating order.
    pub players: Vec<PlayerId>,
    /// Who moves first.
    pub first_player: PlayerId,
    /// The local player's dealt hand.
    pub hand: Vec<WireTile>,
    /// Round number, starting at 1.
    pub round: u32,
    /// Rounds in the game.
    pub total_rounds: u32,
}

/// Payload of `turn_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnChanged {
    /// The player now on turn.
    pub player_id: PlayerId,
    /// Seconds available for the turn.
    pub timer: u64,
}

/// Payload of `tile_played`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilePlayed {
    /// Who played.
    pub player_id: PlayerId,
    /// What was played.
    pub tile: WireTile,
    /// Where it went.
    pub position: End,
    /// Every tile on the board after the move, in play order.
    pub board: Vec<WireTile>,
    /// Left end value after the move.
    pub left_end: Pip,
    /// Right end value after the move.
    pub right_end: Pip,
    /// Upper branch value, once started.
    #[serde(default)]
    pub top_end: Option<Pip>,
    /// Lower branch value, once started.
    #[serde(default)]
    pub bottom_end: Option<Pip>,
    /// Tiles left in the playing player's hand.
    pub remaining_tiles: usize,
}

/// Payload of `tile_drawn`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDrawn {
    /// Who drew.
    pub player_id: PlayerId,
    /// The drawn tile; only sent to the drawing player.
    #[serde(default)]
    pub tile: Option<WireTile>,
    /// Tiles left in the draw pile.
    pub remaining_tiles: usize,
}

/// Payload of `turn_skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSkipped {
    /// Who passed.
    pub player_id: PlayerId,
    /// Why (e.g. `"timeout"`, `"no_moves"`).
    pub reason: String,
}

/// Payload of `game_blocked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameBlocked {
    /// Why the game is blocked.
    pub reason: String,
    /// Every player's remaining tiles, revealed.
    #[serde(default)]
    pub player_hands: BTreeMap<PlayerId, Vec<WireTile>>,
}

/// Payload of `round_ended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundEnded {
    /// Round winner; `None` on a tie.
    #[serde(default)]
    pub winner: Option<PlayerId>,
    /// Every player's remaining tiles, revealed.
    #[serde(default)]
    pub player_hands: BTreeMap<PlayerId, Vec<WireTile>>,
    /// Cumulative scores.
    pub scores: BTreeMap<PlayerId, i64>,
    /// The round that ended.
    pub round: u32,
    /// The round that follows, if any.
    #[serde(default)]
    pub next_round: Option<u32>,
}

/// Payload of `game_ended`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEnded {
    /// Game winner; `None` on a tie.
    #[serde(default)]
    pub winner: Option<PlayerId>,
    /// Final scores.
    pub scores: BTreeMap<PlayerId, i64>,
    /// Game length in seconds.
    pub duration: u64,
}

/// Payload of an incoming `chat_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatIn {
    /// Author.
    pub player_id: PlayerId,
    /// Text.
    pub message: String,
}

/// Payload of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Machine-readable code, e.g. `"invalid_move"` or `"not_your_turn"`.
    pub code: String,
    /// Human-readable explanation.
    pub message: String,
}

/// Payload of `game_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    /// Table phase.
    pub phase: Phase,
    /// Seating order.
    pub players: Vec<PlayerId>,
    /// Player on turn.
    #[serde(default)]
    pub current_player: Option<PlayerId>,
    /// Seconds left on the current turn.
    #[serde(default)]
    pub time_remaining: Option<u64>,
    /// The local player's hand.
    pub hand: Vec<WireTile>,
    /// Board tiles in play order.
    pub board: Vec<WirePlacement>,
    /// Left end value.
    #[serde(default)]
    pub left_end: Option<Pip>,
    /// Right end value.
    #[serde(default)]
    pub right_end: Option<Pip>,
    /// Upper branch value.
    #[serde(default)]
    pub top_end: Option<Pip>,
    /// Lower branch value.
    #[serde(default)]
    pub bottom_end: Option<Pip>,
    /// Hand size of every player.
    #[serde(default)]
    pub hand_counts: BTreeMap<PlayerId, usize>,
    /// Tiles left in the draw pile.
    pub draw_pile: usize,
    /// Cumulative scores.
    #[serde(default)]
    pub scores: BTreeMap<PlayerId, i64>,
    /// Current round.
    pub round: u32,
    /// Rounds in the game.
    pub total_rounds: u32,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The frame was empty.
    #[error("empty frame")]
    EmptyFrame,

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Encode an outgoing message as a JSON text frame.
pub fn encode_client(msg: &ClientMessage) -> Result<String, MessageError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode an incoming JSON text frame.
pub fn decode_server(frame: &str) -> Result<ServerMessage, MessageError> {
    decode(frame)
}

/// Encode a server message; used by test servers and tools.
pub fn encode_server(msg: &ServerMessage) -> Result<String, MessageError> {
    Ok(serde_json::to_string(msg)?)
}

/// Decode a client message; used by test servers and tools.
pub fn decode_client(frame: &str) -> Result<ClientMessage, MessageError> {
    decode(frame)
}

fn decode<T: for<'de> Deserialize<'de>>(frame: &str) -> Result<T, MessageError> {
    if frame.trim().is_empty() {
        return Err(MessageError::EmptyFrame);
    }
    Ok(serde_json::from_str(frame)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn to_value(msg: &ClientMessage) -> Value {
        serde_json::from_str(&encode_client(msg).unwrap()).unwrap()
    }

    #[test]
    fn test_play_tile_wire_shape() {
        let msg = ClientMessage::PlayTile(PlayTile {
            tile: WireTile::new(3, 5),
            position: End::Left,
        });
        assert_eq!(
            to_value(&msg),
            json!({"type": "play_tile", "data": {"tile": {"left": 3, "right": 5}, "position": "left"}})
        );
    }

    #[test]
    fn test_unit_messages_carry_only_the_tag() {
        assert_eq!(to_value(&ClientMessage::DrawTile), json!({"type": "draw_tile"}));
        assert_eq!(to_value(&ClientMessage::SkipTurn), json!({"type": "skip_turn"}));
        assert_eq!(to_value(&ClientMessage::Ping), json!({"type": "ping"}));
        assert_eq!(
            to_value(&ClientMessage::RequestState),
            json!({"type": "request_state"})
        );
    }

    #[test]
    fn test_player_ready_and_chat_shape() {
        assert_eq!(
            to_value(&ClientMessage::PlayerReady(ReadyFlag { ready: true })),
            json!({"type": "player_ready", "data": {"ready": true}})
        );
        assert_eq!(
            to_value(&ClientMessage::ChatMessage(ChatOut {
                message: "gg".to_string()
            })),
            json!({"type": "chat_message", "data": {"message": "gg"}})
        );
    }

    #[test]
    fn test_decode_tile_played() {
        let frame = r#"{"type":"tile_played","data":{
            "player_id":"p2","tile":{"left":2,"right":3},"position":"left",
            "board":[{"left":2,"right":3},{"left":3,"right":5}],
            "left_end":2,"right_end":5,"remaining_tiles":6}}"#;
        let ServerMessage::TilePlayed(played) = decode_server(frame).unwrap() else {
            panic!("expected tile_played");
        };
        assert_eq!(played.player_id, PlayerId::from("p2"));
        assert_eq!(played.position, End::Left);
        assert_eq!(played.board.len(), 2);
        assert_eq!(played.top_end, None);
        assert_eq!(played.remaining_tiles, 6);
    }

    #[test]
    fn test_decode_tile_drawn_for_opponent_has_no_tile() {
        let frame = r#"{"type":"tile_drawn","data":{"player_id":"p3","remaining_tiles":4}}"#;
        assert_eq!(
            decode_server(frame).unwrap(),
            ServerMessage::TileDrawn(TileDrawn {
                player_id: PlayerId::from("p3"),
                tile: None,
                remaining_tiles: 4,
            })
        );
    }

    #[test]
    fn test_decode_pong_and_error() {
        assert_eq!(decode_server(r#"{"type":"pong"}"#).unwrap(), ServerMessage::Pong);
        let frame = r#"{"type":"error","data":{"code":"not_your_turn","message":"wait"}}"#;
        assert_eq!(
            decode_server(frame).unwrap(),
            ServerMessage::Error(ServerError {
                code: "not_your_turn".to_string(),
                message: "wait".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_round_ended_scores() {
        let frame = r#"{"type":"round_ended","data":{
            "winner":"p1","player_hands":{"p2":[{"left":6,"right":6}]},
            "scores":{"p1":12,"p2":0},"round":1,"next_round":2}}"#;
        let ServerMessage::RoundEnded(ended) = decode_server(frame).unwrap() else {
            panic!("expected round_ended");
        };
        assert_eq!(ended.winner, Some(PlayerId::from("p1")));
        assert_eq!(ended.scores[&PlayerId::from("p1")], 12);
        assert_eq!(ended.player_hands[&PlayerId::from("p2")], vec![WireTile::new(6, 6)]);
        assert_eq!(ended.next_round, Some(2));
    }

    #[test]
    fn test_decode_game_state_snapshot() {
        let frame = r#"{"type":"game_state","data":{
            "phase":"playing","players":["me","p2"],"current_player":"p2","time_remaining":12,
            "hand":[{"left":1,"right":4}],
            "board":[{"tile":{"left":5,"right":5},"position":"left"},{"tile":{"left":5,"right":2},"position":"top"}],
            "left_end":5,"right_end":5,"top_end":2,
            "hand_counts":{"me":1,"p2":3},"draw_pile":10,"scores":{},"round":2,"total_rounds":3}}"#;
        let ServerMessage::GameState(state) = decode_server(frame).unwrap() else {
            panic!("expected game_state");
        };
        assert_eq!(state.phase, Phase::Playing);
        assert_eq!(state.board[1].position, End::Top);
        assert_eq!(state.top_end, Some(2));
        assert_eq!(state.bottom_end, None);
        assert_eq!(state.hand_counts[&PlayerId::from("p2")], 3);
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(matches!(
            decode_server(r#"{"type":"warp_drive","data":{}}"#),
            Err(MessageError::Json(_))
        ));
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(matches!(decode_server("  "), Err(MessageError::EmptyFrame)));
    }

    #[test]
    fn test_truncated_frame_rejected() {
        assert!(decode_server(r#"{"type":"turn_changed","data":{"player_id":"p1""#).is_err());
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let messages = [
            ServerMessage::Pong,
            ServerMessage::PlayerLeft(PlayerLeft {
                player_id: PlayerId::from("p1"),
            }),
            ServerMessage::Error(ServerError {
                code: "not_your_turn".to_string(),
                message: "wait".to_string(),
            }),
        ];
        for msg in messages {
            let value: Value = serde_json::from_str(&encode_server(&msg).unwrap()).unwrap();
            assert_eq!(value["type"], msg.kind());
        }
    }
}
