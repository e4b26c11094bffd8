//! Hostiles and the headless drift model
//!
//! The wildlife model owns hostile movement; the core only reads positions
//! and applies damage. `drift_hostiles` is the minimal stand-in the runner
//! uses to keep pressure on a settlement.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::rng::DetRng;
use crate::core::types::{HostileId, Tick, TilePos};
use crate::world::map::WorldMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostileKind {
    Wolf,
    Barbarian,
}

impl HostileKind {
    /// Weight in local hostile counts
    pub fn threat_weight(&self) -> f32 {
        match self {
            HostileKind::Wolf => 1.0,
            HostileKind::Barbarian => 2.0,
        }
    }

    pub fn max_health(&self) -> f32 {
        match self {
            HostileKind::Wolf => 40.0,
            HostileKind::Barbarian => 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hostile {
    pub id: HostileId,
    pub kind: HostileKind,
    pub pos: TilePos,
    pub health: f32,
    pub alive: bool,
}

impl Hostile {
    pub fn new(id: HostileId, kind: HostileKind, pos: TilePos) -> Self {
        Self {
            id,
            kind,
            pos,
            health: kind.max_health(),
            alive: true,
        }
    }

    /// Apply damage; returns true when this blow killed it
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if !self.alive {
            return false;
        }
        self.health -= amount;
        if self.health <= 0.0 {
            self.health = 0.0;
            self.alive = false;
            return true;
        }
        false
    }
}

/// Nearest living hostile to `pos`; ties go to the lowest id
pub fn nearest_hostile(
    hostiles: &BTreeMap<HostileId, Hostile>,
    pos: TilePos,
) -> Option<(&Hostile, f32)> {
    let mut best: Option<(&Hostile, f32)> = None;
    for hostile in hostiles.values().filter(|h| h.alive) {
        let d = pos.distance(&hostile.pos);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((hostile, d));
        }
    }
    best
}

/// Step every living hostile one tile toward `target` on alternate ticks,
/// with a keyed sidestep so packs spread out.
pub fn drift_hostiles(
    hostiles: &mut BTreeMap<HostileId, Hostile>,
    map: &WorldMap,
    target: TilePos,
    rng: &DetRng,
    tick: Tick,
) {
    for hostile in hostiles.values_mut().filter(|h| h.alive) {
        if (tick + u64::from(hostile.id.0)) % 2 == 1 {
            continue;
        }
        let dx = (target.x - hostile.pos.x).signum();
        let dy = (target.y - hostile.pos.y).signum();
        let side = rng.range("hostile-drift", &[tick, u64::from(hostile.id.0)], -1, 1);
        let mut next = hostile.pos.offset(dx, dy);
        if side != 0 && dx != 0 && dy == 0 {
            next = next.offset(0, side);
        } else if side != 0 && dy != 0 && dx == 0 {
            next = next.offset(side, 0);
        }
        if map.is_passable(next) {
            hostile.pos = next;
        }
    }
}
