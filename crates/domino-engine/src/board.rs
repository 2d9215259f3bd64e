//! The branching domino board.
//!
//! The board is a main line with a `left` and a `right` end, plus two
//! perpendicular branches (`top` and `bottom`) that can only be started off
//! an exposed double. Each end carries the pip value a new tile must match.
//!
//! ```text
//!                 top
//!                  |
//!   left ----- [d|d] ----- right
//!                  |
//!               bottom
//! ```
//!
//! A horizontal end exposes a double while the most recent tile placed on
//! it is a double (a double opening tile exposes both sides). A branch is
//! started by matching an exposed double's value; starting it uses up that
//! branch slot for the rest of the round, after which the branch grows on
//! its own value like any other end.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tile::{Pip, Tile, TileId};

// ---------------------------------------------------------------------------
// End
// ---------------------------------------------------------------------------

/// One of the four connection points of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum End {
    /// Left end of the main line.
    Left,
    /// Right end of the main line.
    Right,
    /// Upper perpendicular branch.
    Top,
    /// Lower perpendicular branch.
    Bottom,
}

impl End {
    /// All ends, main line first.
    pub const ALL: [End; 4] = [End::Left, End::Right, End::Top, End::Bottom];

    /// Whether this is one of the perpendicular branches.
    pub fn is_branch(self) -> bool {
        matches!(self, End::Top | End::Bottom)
    }
}

impl fmt::Display for End {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            End::Left => "left",
            End::Right => "right",
            End::Top => "top",
            End::Bottom => "bottom",
        };
        f.write_str(name)
    }
}

/// A tile on the board together with where it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// The placed tile.
    pub tile: Tile,
    /// The end it was attached to. The opening tile is recorded as `Left`.
    pub end: End,
}

/// Open value of every end; `None` means the end is not open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardEnds {
    /// Left end of the main line.
    pub left: Option<Pip>,
    /// Right end of the main line.
    pub right: Option<Pip>,
    /// Upper branch.
    pub top: Option<Pip>,
    /// Lower branch.
    pub bottom: Option<Pip>,
}

impl BoardEnds {
    /// The value of `end`.
    pub fn get(&self, end: End) -> Option<Pip> {
        match end {
            End::Left => self.left,
            End::Right => self.right,
            End::Top => self.top,
            End::Bottom => self.bottom,
        }
    }
}

/// Reasons a placement is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The opening tile was played twice.
    #[error("board already has an opening tile")]
    NotEmpty,
    /// A regular placement was attempted before the opening tile.
    #[error("board is empty; the first tile must be placed as the opener")]
    Empty,
    /// The targeted end is not open.
    #[error("end {0} is not open")]
    EndNotOpen(End),
    /// The branch slot has no exposed double to grow from.
    #[error("branch {0} can only be started off an exposed double")]
    BranchUnavailable(End),
    /// Neither half of the tile matches the end's value.
    #[error("tile {tile} does not match {end} end value {value}")]
    Mismatch {
        /// The rejected tile.
        tile: Tile,
        /// The targeted end.
        end: End,
        /// The value it had to match.
        value: Pip,
    },
    /// The same tile id is already on the board.
    #[error("tile {0:?} is already on the board")]
    AlreadyPlaced(TileId),
    /// The opening tile cannot show the requested pair of end values.
    #[error("opening tile {tile} cannot show {left} left and {right} right")]
    BadOrientation {
        /// The opening tile.
        tile: Tile,
        /// Requested left end.
        left: Pip,
        /// Requested right end.
        right: Pip,
    },
}

// ---------------------------------------------------------------------------
// BoardGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineEnd {
    value: Pip,
    exposes_double: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Unopened,
    Open(Pip),
}

/// Played tiles plus the four ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardGraph {
    played: Vec<Placement>,
    left: Option<LineEnd>,
    right: Option<LineEnd>,
    top: Branch,
    bottom: Branch,
}

impl Default for BoardGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardGraph {
    /// An empty board.
    pub fn new() -> Self {
        Self {
            played: Vec::new(),
            left: None,
            right: None,
            top: Branch::Unopened,
            bottom: Branch::Unopened,
        }
    }

    /// Rebuild a board from an authoritative snapshot.
    ///
    /// End values are taken as given; which horizontal ends still expose a
    /// double is derived from the placement history.
    pub fn from_snapshot(played: Vec<Placement>, ends: BoardEnds) -> Self {
        let exposes = |end: End| {
            played
                .iter()
                .skip(1)
                .rev()
                .find(|p| p.end == end)
                .or_else(|| played.first())
                .is_some_and(|p| p.tile.is_double())
        };
        let left = ends.left.map(|value| LineEnd {
            value,
            exposes_double: exposes(End::Left),
        });
        let right = ends.right.map(|value| LineEnd {
            value,
            exposes_double: exposes(End::Right),
        });
        let branch = |value: Option<Pip>| value.map_or(Branch::Unopened, Branch::Open);
        Self {
            left,
            right,
            top: branch(ends.top),
            bottom: branch(ends.bottom),
            played,
        }
    }

    /// Clear the board for a new round.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Whether no tile has been placed yet.
    pub fn is_empty(&self) -> bool {
        self.played.is_empty()
    }

    /// Number of tiles on the board.
    pub fn len(&self) -> usize {
        self.played.len()
    }

    /// Placed tiles in play order.
    pub fn played(&self) -> &[Placement] {
        &self.played
    }

    /// Whether the tile with `id` is on the board.
    pub fn contains(&self, id: TileId) -> bool {
        self.played.iter().any(|p| p.tile.id() == id)
    }

    /// Current value of every end.
    pub fn ends(&self) -> BoardEnds {
        let branch = |b: Branch| match b {
            Branch::Open(v) => Some(v),
            Branch::Unopened => None,
        };
        BoardEnds {
            left: self.left.map(|e| e.value),
            right: self.right.map(|e| e.value),
            top: branch(self.top),
            bottom: branch(self.bottom),
        }
    }

    /// Place the opening tile low side left. A double opener exposes its
    /// value on both sides.
    pub fn place_first(&mut self, tile: Tile) -> Result<(), BoardError> {
        self.place_first_oriented(tile, tile.low(), tile.high())
    }

    /// Place the opening tile showing `left` and `right` on the main line,
    /// as laid by whoever owns the table.
    pub fn place_first_oriented(&mut self, tile: Tile, left: Pip, right: Pip) -> Result<(), BoardError> {
        if !self.is_empty() {
            return Err(BoardError::NotEmpty);
        }
        if !tile.same_face(left, right) {
            return Err(BoardError::BadOrientation { tile, left, right });
        }
        let exposes_double = tile.is_double();
        self.left = Some(LineEnd {
            value: left,
            exposes_double,
        });
        self.right = Some(LineEnd {
            value: right,
            exposes_double,
        });
        self.played.push(Placement {
            tile,
            end: End::Left,
        });
        tracing::trace!(%tile, left, right, "opening tile placed");
        Ok(())
    }

    /// Whether `tile` could join the board anywhere.
    pub fn can_place(&self, tile: &Tile) -> bool {
        self.is_empty() || self.open_ends().into_iter().any(|v| tile.matches(v))
    }

    /// Every end `tile` could legally be placed on.
    pub fn legal_ends(&self, tile: &Tile) -> Vec<End> {
        End::ALL
            .into_iter()
            .filter(|&end| self.check(tile, end).is_ok())
            .collect()
    }

    /// Check a placement without performing it.
    pub fn validate(&self, tile: &Tile, end: End) -> Result<(), BoardError> {
        self.check(tile, end).map(|_| ())
    }

    /// Attach `tile` to `end`. On failure the board is unchanged.
    pub fn place(&mut self, tile: Tile, end: End) -> Result<(), BoardError> {
        let exposed = self.check(&tile, end)?;
        match end {
            End::Left | End::Right => {
                let line = LineEnd {
                    value: exposed,
                    exposes_double: tile.is_double(),
                };
                if end == End::Left {
                    self.left = Some(line);
                } else {
                    self.right = Some(line);
                }
            }
            End::Top => self.top = Branch::Open(exposed),
            End::Bottom => self.bottom = Branch::Open(exposed),
        }
        self.played.push(Placement { tile, end });
        tracing::trace!(%tile, %end, exposed, "tile placed");
        Ok(())
    }

    /// Sorted, deduplicated values that some tile could match right now.
    pub fn open_ends(&self) -> Vec<Pip> {
        let ends = self.ends();
        let values: BTreeSet<Pip> = End::ALL.into_iter().filter_map(|e| ends.get(e)).collect();
        values.into_iter().collect()
    }

    /// Whether any of `tiles` can be played.
    pub fn has_any_valid_move(&self, tiles: &[Tile]) -> bool {
        if self.is_empty() {
            return true;
        }
        let open = self.open_ends();
        tiles.iter().any(|t| open.iter().any(|&v| t.matches(v)))
    }

    /// Validate a placement and return the value the end would take.
    fn check(&self, tile: &Tile, end: End) -> Result<Pip, BoardError> {
        if self.is_empty() {
            return Err(BoardError::Empty);
        }
        if self.contains(tile.id()) {
            return Err(BoardError::AlreadyPlaced(tile.id()));
        }
        let value = match end {
            End::Left => self.left.map(|e| e.value),
            End::Right => self.right.map(|e| e.value),
            End::Top => return self.check_branch(tile, end, self.top),
            End::Bottom => return self.check_branch(tile, end, self.bottom),
        }
        .ok_or(BoardError::EndNotOpen(end))?;

        tile.other_side(value).ok_or(BoardError::Mismatch {
            tile: *tile,
            end,
            value,
        })
    }

    fn check_branch(&self, tile: &Tile, end: End, branch: Branch) -> Result<Pip, BoardError> {
        if let Branch::Open(value) = branch {
            return tile.other_side(value).ok_or(BoardError::Mismatch {
                tile: *tile,
                end,
                value,
            });
        }

        let mut doubles = [self.left, self.right]
            .into_iter()
            .flatten()
            .filter(|e| e.exposes_double)
            .map(|e| e.value)
            .peekable();
        let Some(&first) = doubles.peek() else {
            return Err(BoardError::BranchUnavailable(end));
        };
        doubles
            .find_map(|value| tile.other_side(value))
            .ok_or(BoardError::Mismatch {
                tile: *tile,
                end,
                value: first,
            })
    }
}
