//! Tiles, pip values and player identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of dots on one half of a tile.
pub type Pip = u8;

/// Stable identity of a tile, independent of its pip values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId(pub u32);

/// Player identifier as assigned by the room server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable domino tile.
///
/// Values are stored normalized so that `low <= high`. Two tiles with the
/// same values are still different tiles if their ids differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    id: TileId,
    low: Pip,
    high: Pip,
}

impl Tile {
    /// Create a tile. The pip order does not matter.
    pub fn new(id: TileId, a: Pip, b: Pip) -> Self {
        Self {
            id,
            low: a.min(b),
            high: a.max(b),
        }
    }

    /// The tile's identity.
    pub fn id(&self) -> TileId {
        self.id
    }

    /// The smaller pip value.
    pub fn low(&self) -> Pip {
        self.low
    }

    /// The larger pip value.
    pub fn high(&self) -> Pip {
        self.high
    }

    /// Both values as `(low, high)`.
    pub fn pips(&self) -> (Pip, Pip) {
        (self.low, self.high)
    }

    /// Whether both halves carry the same value.
    pub fn is_double(&self) -> bool {
        self.low == self.high
    }

    /// Whether either half carries `value`.
    pub fn matches(&self, value: Pip) -> bool {
        self.low == value || self.high == value
    }

    /// The value left exposed after joining this tile on `value`.
    ///
    /// Returns `None` if the tile cannot join on `value` at all.
    pub fn other_side(&self, value: Pip) -> Option<Pip> {
        if self.low == value {
            Some(self.high)
        } else if self.high == value {
            Some(self.low)
        } else {
            None
        }
    }

    /// Sum of both halves.
    pub fn pip_total(&self) -> u32 {
        u32::from(self.low) + u32::from(self.high)
    }

    /// Whether this tile has the same values as `(a, b)` in either order.
    pub fn same_face(&self, a: Pip, b: Pip) -> bool {
        self.low == a.min(b) && self.high == a.max(b)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}|{}]", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_normalized() {
        let tile = Tile::new(TileId(1), 5, 2);
        assert_eq!(tile.pips(), (2, 5));
        assert!(tile.same_face(5, 2));
        assert!(tile.same_face(2, 5));
    }

    #[test]
    fn test_other_side() {
        let tile = Tile::new(TileId(1), 2, 3);
        assert_eq!(tile.other_side(3), Some(2));
        assert_eq!(tile.other_side(2), Some(3));
        assert_eq!(tile.other_side(4), None);

        let double = Tile::new(TileId(2), 4, 4);
        assert!(double.is_double());
        assert_eq!(double.other_side(4), Some(4));
    }

    #[test]
    fn test_identity_is_not_value_equality() {
        let a = Tile::new(TileId(1), 3, 4);
        let b = Tile::new(TileId(2), 4, 3);
        assert!(a.same_face(b.low(), b.high()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        assert_eq!(Tile::new(TileId(9), 6, 1).to_string(), "[1|6]");
        assert_eq!(PlayerId::from("p1").to_string(), "p1");
    }

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerId::from("alice")).unwrap();
        assert_eq!(json, "\"alice\"");
    }
}
