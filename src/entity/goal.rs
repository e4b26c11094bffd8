//! Goals: the single thing a goblin is doing this tick
//!
//! Each kind is its own variant carrying only the fields it needs plus the
//! tile the pathfinder steers toward.

use serde::{Deserialize, Serialize};

use crate::city::resource::ResourceKind;
use crate::core::types::{AgentId, DefenseId, HostileId, JobId, OutpostId, TaskId, ThreatId, TilePos};
use crate::world::map::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Goal {
    Idle { target: TilePos },
    Drink { target: TilePos },
    FetchStoredWater { target: TilePos },
    EatStored { target: TilePos },
    Rest { target: TilePos },
    DeliverHome { target: TilePos },
    Gather { target: TilePos, node: NodeKind },
    CollectWater { target: TilePos },
    HaulPickup { target: TilePos, resource: ResourceKind },
    HaulDeliver { target: TilePos },
    Process { target: TilePos, task: TaskId },
    BuildWall { target: TilePos },
    MaintainDefense { target: TilePos, defense: DefenseId },
    Patrol { target: TilePos },
    Guard { target: TilePos },
    InvestigateThreat { target: TilePos, threat: ThreatId },
    Scout { target: TilePos },
    Tend { target: TilePos, patient: AgentId },
    Study { target: TilePos },
    Defend { target: TilePos, hostile: HostileId },
    Flee { target: TilePos, from: TilePos },
    Regroup { target: TilePos },
    Migrate { target: TilePos, job: JobId },
    EstablishColony { target: TilePos, outpost: OutpostId },
    Reproduce { target: TilePos, partner: Option<AgentId> },
}

impl Goal {
    pub fn target(&self) -> TilePos {
        match *self {
            Goal::Idle { target }
            | Goal::Drink { target }
            | Goal::FetchStoredWater { target }
            | Goal::EatStored { target }
            | Goal::Rest { target }
            | Goal::DeliverHome { target }
            | Goal::Gather { target, .. }
            | Goal::CollectWater { target }
            | Goal::HaulPickup { target, .. }
            | Goal::HaulDeliver { target }
            | Goal::Process { target, .. }
            | Goal::BuildWall { target }
            | Goal::MaintainDefense { target, .. }
            | Goal::Patrol { target }
            | Goal::Guard { target }
            | Goal::InvestigateThreat { target, .. }
            | Goal::Scout { target }
            | Goal::Tend { target, .. }
            | Goal::Study { target }
            | Goal::Defend { target, .. }
            | Goal::Flee { target, .. }
            | Goal::Regroup { target }
            | Goal::Migrate { target, .. }
            | Goal::EstablishColony { target, .. }
            | Goal::Reproduce { target, .. } => target,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Goal::Idle { .. } => "idle",
            Goal::Drink { .. } => "drink",
            Goal::FetchStoredWater { .. } => "fetch_stored_water",
            Goal::EatStored { .. } => "eat_stored",
            Goal::Rest { .. } => "rest",
            Goal::DeliverHome { .. } => "deliver_home",
            Goal::Gather { .. } => "gather",
            Goal::CollectWater { .. } => "collect_water",
            Goal::HaulPickup { .. } => "haul_pickup",
            Goal::HaulDeliver { .. } => "haul_deliver",
            Goal::Process { .. } => "process",
            Goal::BuildWall { .. } => "build_wall",
            Goal::MaintainDefense { .. } => "maintain_defense",
            Goal::Patrol { .. } => "patrol",
            Goal::Guard { .. } => "guard",
            Goal::InvestigateThreat { .. } => "investigate_threat",
            Goal::Scout { .. } => "scout",
            Goal::Tend { .. } => "tend",
            Goal::Study { .. } => "study",
            Goal::Defend { .. } => "defend",
            Goal::Flee { .. } => "flee",
            Goal::Regroup { .. } => "regroup",
            Goal::Migrate { .. } => "migrate",
            Goal::EstablishColony { .. } => "establish_colony",
            Goal::Reproduce { .. } => "reproduce",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Goal::Idle { .. })
    }

    /// Same kind of goal, ignoring targets and ids
    pub fn same_kind(&self, other: &Goal) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Why a goblin could not do what its role asked
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockedReason {
    NoNodeReady,
    StorageUnavailable,
    NoPath,
    NoTaskAvailable,
    NoWater,
    CarryFull,
    NoStationInput,
}

impl BlockedReason {
    pub fn code(&self) -> &'static str {
        match self {
            BlockedReason::NoNodeReady => "NO_NODE_READY",
            BlockedReason::StorageUnavailable => "STORAGE_UNAVAILABLE",
            BlockedReason::NoPath => "NO_PATH",
            BlockedReason::NoTaskAvailable => "NO_TASK_AVAILABLE",
            BlockedReason::NoWater => "NO_WATER",
            BlockedReason::CarryFull => "CARRY_FULL",
            BlockedReason::NoStationInput => "NO_STATION_INPUT",
        }
    }
}
