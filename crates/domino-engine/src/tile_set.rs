//! Tile inventory, the shuffled draw pile, and player hands.
//!
//! A [`TileSet`] owns the full inventory for one maximum pip value and the
//! draw pile drawn from it. Tiles move between pile, hands and board by
//! value; at every point each inventory tile lives in exactly one place.

use std::collections::VecDeque;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::board::BoardGraph;
use crate::tile::{Pip, PlayerId, Tile, TileId};

/// Largest maximum pip value accepted (double-eighteen sets exist).
pub const MAX_SUPPORTED_PIP: Pip = 18;

/// Number of distinct tiles in a double-`max_pip` set: `(n+1)(n+2)/2`.
pub fn inventory_size(max_pip: Pip) -> usize {
    let n = usize::from(max_pip);
    (n + 1) * (n + 2) / 2
}

/// Errors raised while building a tile set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileSetError {
    /// The requested maximum pip value is outside the supported range.
    #[error("unsupported maximum pip value {0} (limit {MAX_SUPPORTED_PIP})")]
    UnsupportedMaxPip(Pip),
}

// ---------------------------------------------------------------------------
// Hand
// ---------------------------------------------------------------------------

/// A player's unplayed tiles, in the order they were received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    owner: PlayerId,
    tiles: Vec<Tile>,
}

impl Hand {
    /// An empty hand for `owner`.
    pub fn new(owner: PlayerId) -> Self {
        Self {
            owner,
            tiles: Vec::new(),
        }
    }

    /// A hand holding `tiles`.
    pub fn with_tiles(owner: PlayerId, tiles: Vec<Tile>) -> Self {
        Self { owner, tiles }
    }

    /// The player holding this hand.
    pub fn owner(&self) -> &PlayerId {
        &self.owner
    }

    /// The tiles, in receive order.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Number of tiles held.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether the hand is empty.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Add a tile to the end of the hand.
    pub fn push(&mut self, tile: Tile) {
        self.tiles.push(tile);
    }

    /// Remove and return the tile with `id`, if held.
    pub fn remove(&mut self, id: TileId) -> Option<Tile> {
        let index = self.tiles.iter().position(|t| t.id() == id)?;
        Some(self.tiles.remove(index))
    }

    /// Look up a held tile by id.
    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.id() == id)
    }

    /// Whether the tile with `id` is held.
    pub fn contains(&self, id: TileId) -> bool {
        self.get(id).is_some()
    }

    /// Empty the hand, returning its tiles.
    pub fn take_all(&mut self) -> Vec<Tile> {
        std::mem::take(&mut self.tiles)
    }

    /// Sum of pips over all held tiles.
    pub fn pip_total(&self) -> u32 {
        self.tiles.iter().map(Tile::pip_total).sum()
    }

    /// Tiles that could legally join `board` right now.
    pub fn playable<'a>(&'a self, board: &'a BoardGraph) -> impl Iterator<Item = &'a Tile> + 'a {
        self.tiles.iter().filter(move |t| board.can_place(t))
    }

    /// The highest double held, if any.
    pub fn highest_double(&self) -> Option<&Tile> {
        self.tiles
            .iter()
            .filter(|t| t.is_double())
            .max_by_key(|t| t.high())
    }
}

// ---------------------------------------------------------------------------
// TileSet
// ---------------------------------------------------------------------------

/// Full inventory for one maximum pip value plus the draw pile.
pub struct TileSet {
    max_pip: Pip,
    inventory: Vec<Tile>,
    pile: VecDeque<Tile>,
    rng: StdRng,
}

impl TileSet {
    /// Generate every tile `(i, j)` with `0 <= i <= j <= max_pip`, each with
    /// its own id. Ids are unique within the returned set.
    pub fn generate(max_pip: Pip) -> Result<Vec<Tile>, TileSetError> {
        if max_pip > MAX_SUPPORTED_PIP {
            return Err(TileSetError::UnsupportedMaxPip(max_pip));
        }
        let mut tiles = Vec::with_capacity(inventory_size(max_pip));
        let mut next_id = 0u32;
        for i in 0..=max_pip {
            for j in i..=max_pip {
                tiles.push(Tile::new(TileId(next_id), i, j));
                next_id += 1;
            }
        }
        Ok(tiles)
    }

    /// A set with a full, unshuffled pile and an OS-seeded shuffler.
    pub fn new(max_pip: Pip) -> Result<Self, TileSetError> {
        Self::with_rng(max_pip, StdRng::from_os_rng())
    }

    /// A set whose shuffles are reproducible from `seed`.
    pub fn with_seed(max_pip: Pip, seed: u64) -> Result<Self, TileSetError> {
        Self::with_rng(max_pip, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_pip: Pip, rng: StdRng) -> Result<Self, TileSetError> {
        let inventory = Self::generate(max_pip)?;
        let pile = inventory.iter().copied().collect();
        Ok(Self {
            max_pip,
            inventory,
            pile,
            rng,
        })
    }

    /// Highest pip value in this set.
    pub fn max_pip(&self) -> Pip {
        self.max_pip
    }

    /// Every tile of the set, regardless of where it currently is.
    pub fn inventory(&self) -> &[Tile] {
        &self.inventory
    }

    /// Look up the inventory tile with the given values.
    pub fn tile_for(&self, a: Pip, b: Pip) -> Option<Tile> {
        self.inventory.iter().copied().find(|t| t.same_face(a, b))
    }

    /// Look up an inventory tile by id.
    pub fn tile_by_id(&self, id: TileId) -> Option<Tile> {
        self.inventory.iter().copied().find(|t| t.id() == id)
    }

    /// Tiles left in the draw pile.
    pub fn remaining(&self) -> usize {
        self.pile.len()
    }

    /// The draw pile from head to tail.
    pub fn pile(&self) -> impl Iterator<Item = &Tile> {
        self.pile.iter()
    }

    /// Uniformly permute the current draw pile (Fisher-Yates).
    pub fn shuffle(&mut self) {
        self.pile.make_contiguous().shuffle(&mut self.rng);
    }

    /// Refill the pile with the whole inventory and shuffle it.
    ///
    /// Hands and the board must already have been cleared, otherwise their
    /// tiles would exist twice.
    pub fn reset_draw_pile(&mut self) {
        self.pile.clear();
        self.pile.extend(self.inventory.iter().copied());
        self.shuffle();
    }

    /// Remove and return the head of the pile. `None` means the pile is
    /// exhausted, which is a normal game event.
    pub fn draw(&mut self) -> Option<Tile> {
        self.pile.pop_front()
    }

    /// Draw up to `count` tiles, stopping early if the pile runs out.
    pub fn draw_many(&mut self, count: usize) -> Vec<Tile> {
        let take = count.min(self.pile.len());
        self.pile.drain(..take).collect()
    }

    /// Put a tile back at the bottom of the pile.
    pub fn return_tile(&mut self, tile: Tile) {
        self.pile.push_back(tile);
    }

    /// Clear every hand (returning its tiles to the pile), then deal one
    /// tile per player in turn until each holds `tiles_per_player` or the
    /// pile is empty.
    pub fn deal(&mut self, hands: &mut [Hand], tiles_per_player: usize) {
        for hand in hands.iter_mut() {
            for tile in hand.take_all() {
                self.return_tile(tile);
            }
        }

        'rounds: for _ in 0..tiles_per_player {
            for hand in hands.iter_mut() {
                match self.draw() {
                    Some(tile) => hand.push(tile),
                    None => break 'rounds,
                }
            }
        }

        tracing::debug!(
            players = hands.len(),
            tiles_per_player,
            remaining = self.pile.len(),
            "dealt hands"
        );
    }

    /// The player holding the highest double, who opens play by convention.
    pub fn highest_double_owner(hands: &[Hand]) -> Option<PlayerId> {
        hands
            .iter()
            .filter_map(|hand| hand.highest_double().map(|t| (t.high(), hand.owner())))
            .max_by_key(|(value, _)| *value)
            .map(|(_, owner)| owner.clone())
    }
}
