//! World map consumed by the simulation core
//!
//! Terrain is addressed in micro-tiles; hazard is stored per coarse tile
//! (`TILES_PER_CHUNK` micro-tiles on a side). Water tiles are impassable;
//! water *sources* are the walkable drinking spots along their shores.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::city::resource::ResourceKind;
use crate::core::types::{Tick, TilePos, TILES_PER_CHUNK};
use crate::spatial::grid::Grid;

/// Harvestable node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Mushroom,
    Herb,
    Fiber,
    Tree,
    Ore,
    Salvage,
}

impl NodeKind {
    pub fn resource(&self) -> ResourceKind {
        match self {
            NodeKind::Mushroom => ResourceKind::Mushrooms,
            NodeKind::Herb => ResourceKind::Herbs,
            NodeKind::Fiber => ResourceKind::Fiber,
            NodeKind::Tree => ResourceKind::Wood,
            NodeKind::Ore => ResourceKind::MetalOre,
            NodeKind::Salvage => ResourceKind::MetalParts,
        }
    }

    /// Inclusive yield range per harvest before climate scaling
    pub fn yield_range(&self) -> (i32, i32) {
        match self {
            NodeKind::Mushroom | NodeKind::Fiber => (1, 3),
            NodeKind::Herb | NodeKind::Tree | NodeKind::Ore | NodeKind::Salvage => (1, 2),
        }
    }

    pub fn regrow_ticks(&self) -> u64 {
        match self {
            NodeKind::Mushroom => 40,
            NodeKind::Fiber => 45,
            NodeKind::Herb => 50,
            NodeKind::Tree => 70,
            NodeKind::Ore => 90,
            NodeKind::Salvage => 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub kind: NodeKind,
    /// Harvestable again at this tick
    pub ready_at_tick: Tick,
}

impl ResourceNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            ready_at_tick: 0,
        }
    }

    pub fn is_ready(&self, tick: Tick) -> bool {
        self.ready_at_tick <= tick
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMap {
    /// Micro-tile dimensions
    pub width: i32,
    pub height: i32,
    water: Grid<bool>,
    hazard: Grid<f32>,
    pub water_sources: BTreeSet<TilePos>,
    pub nodes: BTreeMap<TilePos, ResourceNode>,
    /// Coarse tiles holding a settlement site
    pub sites: BTreeSet<(i32, i32)>,
}

impl WorldMap {
    /// Empty map of `coarse_width` x `coarse_height` coarse tiles
    pub fn new(coarse_width: i32, coarse_height: i32) -> Self {
        let width = coarse_width * TILES_PER_CHUNK;
        let height = coarse_height * TILES_PER_CHUNK;
        Self {
            width,
            height,
            water: Grid::new(width, height),
            hazard: Grid::new(coarse_width, coarse_height),
            water_sources: BTreeSet::new(),
            nodes: BTreeMap::new(),
            sites: BTreeSet::new(),
        }
    }

    pub fn in_bounds(&self, pos: TilePos) -> bool {
        self.water.contains(pos.x, pos.y)
    }

    pub fn clamp(&self, pos: TilePos) -> TilePos {
        let (x, y) = self.water.clamp(pos.x, pos.y);
        TilePos::new(x, y)
    }

    pub fn is_water(&self, pos: TilePos) -> bool {
        self.water.get(pos.x, pos.y).copied().unwrap_or(false)
    }

    pub fn set_water(&mut self, pos: TilePos, water: bool) {
        self.water.set(pos.x, pos.y, water);
        if water {
            self.water_sources.remove(&pos);
            self.nodes.remove(&pos);
        }
    }

    pub fn is_passable(&self, pos: TilePos) -> bool {
        self.in_bounds(pos) && !self.is_water(pos)
    }

    /// Hazard of the coarse tile containing `pos`, 0 when out of bounds
    pub fn hazard_at(&self, pos: TilePos) -> f32 {
        let (cx, cy) = pos.coarse();
        self.hazard.get(cx, cy).copied().unwrap_or(0.0)
    }

    pub fn set_hazard(&mut self, cx: i32, cy: i32, hazard: f32) {
        self.hazard.set(cx, cy, hazard.clamp(0.0, 1.0));
    }

    pub fn add_water_source(&mut self, pos: TilePos) -> bool {
        if !self.is_passable(pos) {
            return false;
        }
        self.water_sources.insert(pos)
    }

    pub fn add_node(&mut self, pos: TilePos, kind: NodeKind) -> bool {
        if !self.is_passable(pos) || self.nodes.contains_key(&pos) {
            return false;
        }
        self.nodes.insert(pos, ResourceNode::new(kind));
        true
    }

    pub fn add_site(&mut self, center: TilePos) {
        self.sites.insert(center.coarse());
    }

    pub fn is_site_tile(&self, pos: TilePos) -> bool {
        self.sites.contains(&pos.coarse())
    }

    /// Nearest drinking spot; ties resolve to the first in row-major order
    pub fn nearest_water_source(&self, from: TilePos) -> Option<(TilePos, f32)> {
        nearest(self.water_sources.iter().copied(), from)
    }

    /// Nearest node of `kind` that is harvestable at `tick`
    pub fn nearest_ready_node(
        &self,
        from: TilePos,
        kind: NodeKind,
        tick: Tick,
    ) -> Option<(TilePos, f32)> {
        nearest(
            self.nodes
                .iter()
                .filter(|(_, n)| n.kind == kind && n.is_ready(tick))
                .map(|(p, _)| *p),
            from,
        )
    }

    pub fn node_mut(&mut self, pos: TilePos) -> Option<&mut ResourceNode> {
        self.nodes.get_mut(&pos)
    }
}

fn nearest(candidates: impl Iterator<Item = TilePos>, from: TilePos) -> Option<(TilePos, f32)> {
    let mut best: Option<(TilePos, f32)> = None;
    for pos in candidates {
        let d = from.distance(&pos);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((pos, d));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_water_is_impassable() {
        let mut map = WorldMap::new(4, 4);
        let pos = TilePos::new(5, 5);
        assert!(map.is_passable(pos));
        map.set_water(pos, true);
        assert!(!map.is_passable(pos));
        assert!(!map.add_water_source(pos));
        assert!(!map.is_passable(TilePos::new(16, 0)));
    }

    #[test]
    fn test_nearest_ready_node_skips_regrowing() {
        let mut map = WorldMap::new(8, 8);
        let near = TilePos::new(3, 3);
        let far = TilePos::new(10, 3);
        map.add_node(near, NodeKind::Mushroom);
        map.add_node(far, NodeKind::Mushroom);
        map.node_mut(near).unwrap().ready_at_tick = 50;

        let origin = TilePos::new(0, 3);
        assert_eq!(map.nearest_ready_node(origin, NodeKind::Mushroom, 10).map(|n| n.0), Some(far));
        assert_eq!(map.nearest_ready_node(origin, NodeKind::Mushroom, 50).map(|n| n.0), Some(near));
        assert!(map.nearest_ready_node(origin, NodeKind::Ore, 50).is_none());
    }

    #[test]
    fn test_site_tiles_cover_coarse_tile() {
        let mut map = WorldMap::new(8, 8);
        map.add_site(TilePos::coarse_center(2, 2));
        assert!(map.is_site_tile(TilePos::new(8, 8)));
        assert!(map.is_site_tile(TilePos::new(11, 11)));
        assert!(!map.is_site_tile(TilePos::new(12, 11)));
    }

    #[test]
    fn test_hazard_per_coarse_tile() {
        let mut map = WorldMap::new(4, 4);
        map.set_hazard(1, 0, 2.0);
        assert_eq!(map.hazard_at(TilePos::new(5, 2)), 1.0);
        assert_eq!(map.hazard_at(TilePos::new(0, 0)), 0.0);
    }
}
