//! Goblin agents

use serde::{Deserialize, Serialize};

use crate::city::resource::ResourceKind;
use crate::core::types::{AgentId, HostileId, OutpostId, Tick, TilePos};
use crate::entity::goal::{BlockedReason, Goal};
use crate::entity::needs::{Needs, Vitals};
use crate::entity::role::Role;

/// Resources a goblin carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cargo {
    pub resource: ResourceKind,
    pub amount: u32,
    /// Picked up from a drop rather than harvested
    pub hauled: bool,
}

/// Role bookkeeping: current goal, assignment, carried goods
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleState {
    pub goal: Goal,
    /// Tick the current role was assigned
    pub assigned_tick: Tick,
    /// Set by the player; the balancer never moves a locked goblin
    pub manual_lock: bool,
    pub cargo: Option<Cargo>,
    pub last_blocked: Option<(BlockedReason, Tick)>,
    /// Tick the last `RoleTaskClaimed` event was sent for the current goal kind
    pub goal_started_tick: Tick,
    /// Next waypoint on patrol and scout rings
    pub patrol_cursor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatMode {
    None,
    Defend,
    Flee,
    Regroup,
}

/// Threat-response sub-state, owned by the threat FSM
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreatResponse {
    pub mode: ThreatMode,
    pub hostile: Option<HostileId>,
    /// Where the response is headed
    pub target: Option<TilePos>,
    /// What a fleeing goblin runs from
    pub from: Option<TilePos>,
    pub score: f32,
    pub last_seen_tick: Option<Tick>,
    pub last_event_tick: Option<Tick>,
    /// Best distance-to-target so far in this mode
    pub best_distance: f32,
    pub last_progress_tick: Tick,
    /// Threat response is ignored until this tick
    pub suppressed_until: Tick,
}

impl Default for ThreatResponse {
    fn default() -> Self {
        Self {
            mode: ThreatMode::None,
            hostile: None,
            target: None,
            from: None,
            score: 0.0,
            last_seen_tick: None,
            last_event_tick: None,
            best_distance: f32::MAX,
            last_progress_tick: 0,
            suppressed_until: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialState {
    pub last_interaction_tick: Option<Tick>,
    pub last_wander_event_tick: Option<Tick>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub pos: TilePos,
    pub home: TilePos,
    pub home_outpost: OutpostId,
    pub role: Role,
    pub role_state: RoleState,
    pub threat: ThreatResponse,
    pub needs: Needs,
    pub vitals: Vitals,
    /// Drawn once in `[-threshold_jitter, +threshold_jitter]`
    pub threshold_jitter: f32,
    pub alive: bool,
    pub missing: bool,
    pub born_tick: Tick,
    pub last_reproduction_tick: Option<Tick>,
    pub social: SocialState,
}

impl Agent {
    /// A goblin standing at its home tile
    pub fn new(
        id: AgentId,
        name: impl Into<String>,
        home: TilePos,
        home_outpost: OutpostId,
        role: Role,
        tick: Tick,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            pos: home,
            home,
            home_outpost,
            role,
            role_state: RoleState {
                goal: Goal::Idle { target: home },
                assigned_tick: tick,
                manual_lock: false,
                cargo: None,
                last_blocked: None,
                goal_started_tick: tick,
                patrol_cursor: 0,
            },
            threat: ThreatResponse::default(),
            needs: Needs::default(),
            vitals: Vitals::default(),
            threshold_jitter: 0.0,
            alive: true,
            missing: false,
            born_tick: tick,
            last_reproduction_tick: None,
            social: SocialState::default(),
        }
    }

    /// Alive and present on the map
    pub fn is_active(&self) -> bool {
        self.alive && !self.missing
    }

    pub fn is_carrying(&self) -> bool {
        self.role_state.cargo.is_some_and(|c| c.amount > 0)
    }

    /// Within one king move of home
    pub fn is_home(&self) -> bool {
        self.pos.chebyshev(&self.home) <= 1
    }

    /// Role-adjusted, jittered threshold for thirst
    pub fn thirst_threshold(&self, base: f32) -> f32 {
        base + self.role.thirst_offset() + self.threshold_jitter
    }

    pub fn fatigue_threshold(&self, base: f32) -> f32 {
        base + self.role.fatigue_offset() + self.threshold_jitter
    }

    /// Change role, resetting the goal and assignment clock
    pub fn assign_role(&mut self, role: Role, tick: Tick) {
        self.role = role;
        self.role_state.assigned_tick = tick;
        self.role_state.goal = Goal::Idle { target: self.home };
        self.role_state.patrol_cursor = 0;
    }
}
