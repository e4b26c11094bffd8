//! Two-phase tile occupancy
//!
//! Reads consult `current`; each goblin's chosen tile lands in `next`; the
//! tick commits `next` as the new `current` once every goblin has moved.
//! A tile can only be claimed in `next` if neither map holds another
//! goblin there, so two goblins never finish a tick on the same tile.

use ahash::AHashMap;

use crate::core::types::{AgentId, TilePos};

#[derive(Debug, Clone, Default)]
pub struct OccupancyMap {
    current: AHashMap<TilePos, AgentId>,
    next: AHashMap<TilePos, AgentId>,
}

impl OccupancyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild `current` from goblin positions and clear `next`. Callers pass
    /// goblins in ascending id order; on a collision the first one keeps the
    /// tile and the rest are returned.
    pub fn rebuild(&mut self, positions: impl IntoIterator<Item = (AgentId, TilePos)>) -> Vec<AgentId> {
        self.current.clear();
        self.next.clear();
        let mut displaced = Vec::new();
        for (id, pos) in positions {
            if self.current.contains_key(&pos) {
                displaced.push(id);
            } else {
                self.current.insert(pos, id);
            }
        }
        displaced
    }

    pub fn occupant(&self, pos: TilePos) -> Option<AgentId> {
        self.current.get(&pos).copied()
    }

    /// Neither map holds a different goblin at `pos`
    pub fn is_free_for(&self, pos: TilePos, agent: AgentId) -> bool {
        let free_in = |map: &AHashMap<TilePos, AgentId>| map.get(&pos).map_or(true, |a| *a == agent);
        free_in(&self.current) && free_in(&self.next)
    }

    /// Reserve `pos` in the next map. Fails if another goblin holds it in
    /// either map.
    pub fn claim_next(&mut self, pos: TilePos, agent: AgentId) -> bool {
        if !self.is_free_for(pos, agent) {
            return false;
        }
        self.next.insert(pos, agent);
        true
    }

    /// Make `next` authoritative
    pub fn commit(&mut self) {
        self.current = std::mem::take(&mut self.next);
    }

    /// Place a goblin directly into `current` (spawns after commit)
    pub fn place(&mut self, pos: TilePos, agent: AgentId) -> bool {
        if self.current.contains_key(&pos) {
            return false;
        }
        self.current.insert(pos, agent);
        true
    }

    pub fn vacate(&mut self, pos: TilePos, agent: AgentId) {
        if self.current.get(&pos) == Some(&agent) {
            self.current.remove(&pos);
        }
    }

    /// Other goblins in the `(2r+1)^2` window around `pos`
    pub fn local_density(&self, pos: TilePos, radius: i32, exclude: AgentId) -> u32 {
        let mut count = 0;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if let Some(id) = self.current.get(&pos.offset(dx, dy)) {
                    if *id != exclude {
                        count += 1;
                    }
                }
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}
