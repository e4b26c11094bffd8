//! Outposts - the start settlement and its satellite colonies

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{OutpostId, Tick, TilePos};
use crate::entity::role::Role;

/// Lifecycle posture of an outpost
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutpostStatus {
    Seeded,
    Viable,
    Stable,
    Failing,
    Evacuating,
    Abandoned,
}

impl OutpostStatus {
    /// Accepts new residents
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            OutpostStatus::Seeded | OutpostStatus::Viable | OutpostStatus::Stable
        )
    }
}

/// Orders from the tribe leader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaderDirective {
    Evacuate,
}

/// Per-tick recomputed view of an outpost
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutpostRuntime {
    pub population: u32,
    pub target_population: u32,
    pub deficit_by_role: BTreeMap<Role, u32>,
}

impl OutpostRuntime {
    pub fn total_deficit(&self) -> u32 {
        self.deficit_by_role.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outpost {
    pub id: OutpostId,
    pub name: String,
    pub center: TilePos,
    pub is_start: bool,
    pub target_population: u32,
    /// Desired residents per role
    pub target_mix: BTreeMap<Role, u32>,
    pub status: OutpostStatus,
    pub runtime: OutpostRuntime,
    pub founded_tick: Tick,
    /// First tick of the current unstable streak
    pub unstable_since: Option<Tick>,
    pub failing_since: Option<Tick>,
    pub evacuation_deadline: Option<Tick>,
    pub abandoned_tick: Option<Tick>,
    pub directive: Option<LeaderDirective>,
}

impl Outpost {
    pub fn new(id: OutpostId, name: impl Into<String>, center: TilePos, is_start: bool) -> Self {
        Self {
            id,
            name: name.into(),
            center,
            is_start,
            target_population: 0,
            target_mix: BTreeMap::new(),
            status: if is_start {
                OutpostStatus::Stable
            } else {
                OutpostStatus::Seeded
            },
            runtime: OutpostRuntime::default(),
            founded_tick: 0,
            unstable_since: None,
            failing_since: None,
            evacuation_deadline: None,
            abandoned_tick: None,
            directive: None,
        }
    }

    /// Set the desired role mix; the target population follows it
    pub fn with_target_mix(mut self, mix: impl IntoIterator<Item = (Role, u32)>) -> Self {
        self.target_mix = mix.into_iter().filter(|(_, n)| *n > 0).collect();
        self.target_population = self.target_mix.values().sum();
        self
    }

    /// Home slot `index` around the center, walking square rings outward
    ///
    /// Ring `r` holds `8 * r` tiles; every index maps to a distinct tile.
    pub fn home_slot(&self, index: usize) -> TilePos {
        let mut radius = HOME_MIN_RADIUS;
        let mut index = index as i64;
        while index >= 8 * radius {
            index -= 8 * radius;
            radius += 1;
        }
        let side = 2 * radius;
        let along = index % side - radius;
        let (dx, dy) = match index / side {
            0 => (radius, along),
            1 => (-along, radius),
            2 => (-radius, -along),
            _ => (along, -radius),
        };
        self.center.offset(dx as i32, dy as i32)
    }
}

/// Innermost ring of home slots; the center tiles stay clear
pub const HOME_MIN_RADIUS: i64 = 2;
