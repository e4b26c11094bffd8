//! Core type definitions used throughout the codebase

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Simulation tick counter
pub type Tick = u64;

/// Micro-tiles per coarse tile edge
pub const TILES_PER_CHUNK: i32 = 4;

/// Unique identifier for goblins. Ids are allocated sequentially and never reused.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "goblin-{}", _0)]
pub struct AgentId(pub u32);

impl AgentId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "outpost-{}", _0)]
pub struct OutpostId(pub u32);

/// Persistent processing task id
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "task-{}", _0)]
pub struct TaskId(pub u32);

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "defense-{}", _0)]
pub struct DefenseId(pub u32);

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "migration-{}", _0)]
pub struct JobId(pub u32);

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "threat-{}", _0)]
pub struct ThreatId(pub u32);

/// Hostile creature id, assigned by the wildlife model
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[display(fmt = "hostile-{}", _0)]
pub struct HostileId(pub u32);

/// Micro-tile position. Ordering is row-major (y, then x) so sorted
/// containers iterate tiles in scanline order.
#[derive(
    Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[display(fmt = "({}, {})", x, y)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl PartialOrd for TilePos {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TilePos {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl TilePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn distance(&self, other: &Self) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    /// King-move distance; 1 means adjacent (diagonals included)
    pub fn chebyshev(&self, other: &Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Coarse tile containing this micro-tile
    pub fn coarse(&self) -> (i32, i32) {
        (
            self.x.div_euclid(TILES_PER_CHUNK),
            self.y.div_euclid(TILES_PER_CHUNK),
        )
    }

    /// Micro-tile at the center of a coarse tile
    pub fn coarse_center(cx: i32, cy: i32) -> Self {
        Self::new(
            cx * TILES_PER_CHUNK + TILES_PER_CHUNK / 2,
            cy * TILES_PER_CHUNK + TILES_PER_CHUNK / 2,
        )
    }

    /// The eight king-move neighbors, in a fixed order
    pub fn neighbors(&self) -> [TilePos; 8] {
        let mut out = [*self; 8];
        for (slot, (dx, dy)) in out.iter_mut().zip(NEIGHBOR_OFFSETS.iter().skip(1)) {
            *slot = self.offset(*dx, *dy);
        }
        out
    }
}

/// Self followed by the eight neighbors
pub const NEIGHBOR_OFFSETS: [(i32, i32); 9] = [
    (0, 0),
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_distance() {
        let a = TilePos::new(0, 0);
        let b = TilePos::new(3, 4);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.chebyshev(&b), 4);
    }

    #[test]
    fn test_coarse_round_trip() {
        let center = TilePos::coarse_center(3, 5);
        assert_eq!(center, TilePos::new(14, 22));
        assert_eq!(center.coarse(), (3, 5));
        assert_eq!(TilePos::new(-1, -5).coarse(), (-1, -2));
    }

    #[test]
    fn test_tile_ordering_is_row_major() {
        let mut tiles = vec![TilePos::new(5, 1), TilePos::new(0, 2), TilePos::new(1, 1)];
        tiles.sort();
        assert_eq!(
            tiles,
            vec![TilePos::new(1, 1), TilePos::new(5, 1), TilePos::new(0, 2)]
        );
    }

    #[test]
    fn test_neighbors_exclude_self() {
        let p = TilePos::new(2, 2);
        let n = p.neighbors();
        assert!(!n.contains(&p));
        assert!(n.iter().all(|q| q.chebyshev(&p) == 1));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(AgentId(7).to_string(), "goblin-7");
        assert_eq!(TilePos::new(1, -2).to_string(), "(1, -2)");
    }
}
