//! Structured events emitted by the tick
//!
//! Every event carries the tick, the goblins involved and a one-line
//! summary for the chronicle. The `type` tag is the external contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::city::outpost::OutpostStatus;
use crate::city::resource::ResourceKind;
use crate::core::types::{AgentId, DefenseId, HostileId, JobId, OutpostId, ThreatId, Tick, TilePos};
use crate::entity::agent::ThreatMode;
use crate::entity::goal::BlockedReason;
use crate::entity::role::Role;
use crate::simulation::crisis::CrisisTier;
use crate::tasks::defense::DefenseStatus;
use crate::tasks::migration::FailureReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: Tick,
    #[serde(flatten)]
    pub kind: EventKind,
    pub agents: Vec<AgentId>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    RoleTaskBlocked {
        role: Role,
        reason: BlockedReason,
    },
    RoleTaskClaimed {
        role: Role,
        goal: String,
        target: TilePos,
    },
    RoleReassigned {
        from: Role,
        to: Role,
        reason: String,
    },
    ResourceGathered {
        resource: ResourceKind,
        amount: u32,
        /// Left at the node for haulers instead of carried home
        staged: bool,
    },
    ResourceDelivered {
        resource: ResourceKind,
        amount: u32,
    },
    ResourceDropped {
        resource: ResourceKind,
        amount: u32,
        pos: TilePos,
    },
    ProcessingCompleted {
        recipe: String,
        outputs: Vec<(ResourceKind, u32)>,
    },
    WallPlanCreated {
        radius: i32,
        tiles: usize,
        continuity_gaps: u32,
        reason: String,
    },
    WallSegmentBuilt {
        pos: TilePos,
        repaired: bool,
    },
    WallBreached {
        pos: TilePos,
    },
    WallCompleted {
        radius: i32,
        segments: usize,
    },
    DefenseFired {
        defense: DefenseId,
        hostile: HostileId,
        damage: f32,
        killed: bool,
    },
    DefenseStatusChanged {
        defense: DefenseId,
        from: DefenseStatus,
        to: DefenseStatus,
    },
    DefenseMaintained {
        defense: DefenseId,
    },
    ThreatSpotted {
        threat: ThreatId,
        hostile: HostileId,
        pos: TilePos,
    },
    ThreatInvestigated {
        threat: ThreatId,
        cleared: bool,
    },
    ThreatModeChanged {
        from: ThreatMode,
        to: ThreatMode,
    },
    ThreatResponseSuppressed {
        until: Tick,
    },
    HostileSlain {
        hostile: HostileId,
    },
    OutpostStatusChanged {
        outpost: OutpostId,
        from: OutpostStatus,
        to: OutpostStatus,
    },
    MigrationStarted {
        job: JobId,
        from: OutpostId,
        to: OutpostId,
        evacuation: bool,
    },
    MigrationRerouted {
        job: JobId,
        slot: TilePos,
    },
    MigrationRetargeted {
        job: JobId,
        to: OutpostId,
    },
    MigrationCompleted {
        job: JobId,
        outpost: OutpostId,
    },
    MigrationFailed {
        job: JobId,
        reason: FailureReason,
    },
    ColonistSettled {
        outpost: OutpostId,
    },
    CrisisTierChanged {
        from: CrisisTier,
        to: CrisisTier,
    },
    PairFormed,
    PairBroken,
    GoblinBorn {
        child: AgentId,
        forced: bool,
    },
    GoblinDied,
    LoreRecorded,
    SocialInteraction,
    IdleWander {
        target: TilePos,
    },
}

impl EventKind {
    /// The serialized `type` tag
    pub fn code(&self) -> &'static str {
        match self {
            EventKind::RoleTaskBlocked { .. } => "ROLE_TASK_BLOCKED",
            EventKind::RoleTaskClaimed { .. } => "ROLE_TASK_CLAIMED",
            EventKind::RoleReassigned { .. } => "ROLE_REASSIGNED",
            EventKind::ResourceGathered { .. } => "RESOURCE_GATHERED",
            EventKind::ResourceDelivered { .. } => "RESOURCE_DELIVERED",
            EventKind::ResourceDropped { .. } => "RESOURCE_DROPPED",
            EventKind::ProcessingCompleted { .. } => "PROCESSING_COMPLETED",
            EventKind::WallPlanCreated { .. } => "WALL_PLAN_CREATED",
            EventKind::WallSegmentBuilt { .. } => "WALL_SEGMENT_BUILT",
            EventKind::WallBreached { .. } => "WALL_BREACHED",
            EventKind::WallCompleted { .. } => "WALL_COMPLETED",
            EventKind::DefenseFired { .. } => "DEFENSE_FIRED",
            EventKind::DefenseStatusChanged { .. } => "DEFENSE_STATUS_CHANGED",
            EventKind::DefenseMaintained { .. } => "DEFENSE_MAINTAINED",
            EventKind::ThreatSpotted { .. } => "THREAT_SPOTTED",
            EventKind::ThreatInvestigated { .. } => "THREAT_INVESTIGATED",
            EventKind::ThreatModeChanged { .. } => "THREAT_MODE_CHANGED",
            EventKind::ThreatResponseSuppressed { .. } => "THREAT_RESPONSE_SUPPRESSED",
            EventKind::HostileSlain { .. } => "HOSTILE_SLAIN",
            EventKind::OutpostStatusChanged { .. } => "OUTPOST_STATUS_CHANGED",
            EventKind::MigrationStarted { .. } => "MIGRATION_STARTED",
            EventKind::MigrationRerouted { .. } => "MIGRATION_REROUTED",
            EventKind::MigrationRetargeted { .. } => "MIGRATION_RETARGETED",
            EventKind::MigrationCompleted { .. } => "MIGRATION_COMPLETED",
            EventKind::MigrationFailed { .. } => "MIGRATION_FAILED",
            EventKind::ColonistSettled { .. } => "COLONIST_SETTLED",
            EventKind::CrisisTierChanged { .. } => "CRISIS_TIER_CHANGED",
            EventKind::PairFormed => "PAIR_FORMED",
            EventKind::PairBroken => "PAIR_BROKEN",
            EventKind::GoblinBorn { .. } => "GOBLIN_BORN",
            EventKind::GoblinDied => "GOBLIN_DIED",
            EventKind::LoreRecorded => "LORE_RECORDED",
            EventKind::SocialInteraction => "SOCIAL_INTERACTION",
            EventKind::IdleWander { .. } => "IDLE_WANDER",
        }
    }
}

/// Tribe-wide counters, updated as events are emitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimMetrics {
    pub births: u32,
    pub deaths: u32,
    pub blocked: BTreeMap<BlockedReason, u32>,
    pub gathered: u32,
    pub delivered: u32,
    pub processing_completed: u32,
    pub wall_segments_built: u32,
    pub wall_breaches: u32,
    pub wall_replans: u32,
    pub defense_shots: u32,
    pub hostiles_killed: u32,
    pub role_reassignments: u32,
    pub threat_suppressions: u32,
    pub social_interactions: u32,
}

impl SimMetrics {
    pub fn record(&mut self, kind: &EventKind) {
        match kind {
            EventKind::RoleTaskBlocked { reason, .. } => {
                *self.blocked.entry(*reason).or_insert(0) += 1;
            }
            EventKind::ResourceGathered { amount, .. } => self.gathered += amount,
            EventKind::ResourceDelivered { amount, .. } => self.delivered += amount,
            EventKind::ProcessingCompleted { .. } => self.processing_completed += 1,
            EventKind::WallSegmentBuilt { .. } => self.wall_segments_built += 1,
            EventKind::WallBreached { .. } => self.wall_breaches += 1,
            EventKind::WallPlanCreated { .. } => self.wall_replans += 1,
            EventKind::DefenseFired { killed, .. } => {
                self.defense_shots += 1;
                if *killed {
                    self.hostiles_killed += 1;
                }
            }
            EventKind::HostileSlain { .. } => self.hostiles_killed += 1,
            EventKind::RoleReassigned { .. } => self.role_reassignments += 1,
            EventKind::ThreatResponseSuppressed { .. } => self.threat_suppressions += 1,
            EventKind::GoblinBorn { .. } => self.births += 1,
            EventKind::GoblinDied => self.deaths += 1,
            EventKind::SocialInteraction => self.social_interactions += 1,
            EventKind::RoleTaskClaimed { .. }
            | EventKind::ResourceDropped { .. }
            | EventKind::WallCompleted { .. }
            | EventKind::DefenseStatusChanged { .. }
            | EventKind::DefenseMaintained { .. }
            | EventKind::ThreatSpotted { .. }
            | EventKind::ThreatInvestigated { .. }
            | EventKind::ThreatModeChanged { .. }
            | EventKind::OutpostStatusChanged { .. }
            | EventKind::MigrationStarted { .. }
            | EventKind::MigrationRerouted { .. }
            | EventKind::MigrationRetargeted { .. }
            | EventKind::MigrationCompleted { .. }
            | EventKind::MigrationFailed { .. }
            | EventKind::ColonistSettled { .. }
            | EventKind::CrisisTierChanged { .. }
            | EventKind::PairFormed
            | EventKind::PairBroken
            | EventKind::LoreRecorded
            | EventKind::IdleWander { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SimEvent {
            tick: 12,
            kind: EventKind::RoleTaskBlocked {
                role: Role::Forager,
                reason: BlockedReason::NoNodeReady,
            },
            agents: vec![AgentId(3)],
            summary: "goblin-3 found no ready node".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ROLE_TASK_BLOCKED");
        assert_eq!(json["reason"], "NO_NODE_READY");
        assert_eq!(json["role"], "forager");
        assert_eq!(json["tick"], 12);
        assert_eq!(json["type"], event.kind.code());
    }

    #[test]
    fn test_metrics_count_blocked_by_reason() {
        let mut metrics = SimMetrics::default();
        let blocked = EventKind::RoleTaskBlocked {
            role: Role::Hauler,
            reason: BlockedReason::NoTaskAvailable,
        };
        metrics.record(&blocked);
        metrics.record(&blocked);
        metrics.record(&EventKind::GoblinBorn {
            child: AgentId(9),
            forced: false,
        });
        assert_eq!(metrics.blocked[&BlockedReason::NoTaskAvailable], 2);
        assert_eq!(metrics.births, 1);
    }
}
