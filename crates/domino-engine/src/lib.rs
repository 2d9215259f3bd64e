//! Domino rules engine: tile inventory, the branching board, and the
//! turn state machine.
//!
//! Everything here is pure state with no I/O. The network layer feeds it
//! authoritative updates; local intents are checked against it before they
//! are ever sent.

pub mod board;
pub mod tile;
pub mod tile_set;
pub mod turn;

pub use board::{BoardEnds, BoardError, BoardGraph, End, Placement};
pub use tile::{Pip, PlayerId, Tile, TileId};
pub use tile_set::{Hand, MAX_SUPPORTED_PIP, TileSet, TileSetError, inventory_size};
pub use turn::{ActionRejected, Phase, TurnAction, TurnEngine};
