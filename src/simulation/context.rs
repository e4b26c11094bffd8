//! Simulation context - all mutable tick state in one place
//!
//! Every subsystem takes `&mut SimulationContext`. During the per-goblin
//! pass the goblin being processed is taken out of `agents` and put back
//! afterwards, so subsystems can hold it mutably while still reading the
//! rest of the tribe.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::city::drops::ResourceDrops;
use crate::city::outpost::{Outpost, OutpostStatus};
use crate::city::recipe::{RecipeCatalog, Station};
use crate::city::stockpile::Stockpile;
use crate::core::config::SimulationConfig;
use crate::core::error::{Result, SimError};
use crate::core::rng::DetRng;
use crate::core::types::{AgentId, HostileId, OutpostId, Tick, TilePos};
use crate::entity::agent::Agent;
use crate::entity::goal::BlockedReason;
use crate::entity::role::Role;
use crate::simulation::crisis::CrisisState;
use crate::simulation::events::{EventKind, SimEvent, SimMetrics};
use crate::simulation::reproduction::ReproductionState;
use crate::simulation::threat::ThreatMemory;
use crate::spatial::occupancy::OccupancyMap;
use crate::tasks::defense::DefenseRegistry;
use crate::tasks::haul::HaulQueue;
use crate::tasks::migration::MigrationRegistry;
use crate::tasks::processing::ProcessingQueue;
use crate::tasks::wall::{WallPlan, WallRegistry};
use crate::world::climate::ClimateModifiers;
use crate::world::hostile::{Hostile, HostileKind};
use crate::world::map::WorldMap;

#[derive(Debug, Clone)]
pub struct SimulationContext {
    pub tick: Tick,
    pub config: SimulationConfig,
    pub rng: DetRng,
    pub map: WorldMap,
    pub climate: ClimateModifiers,

    pub agents: BTreeMap<AgentId, Agent>,
    next_agent_id: u32,
    pub outposts: BTreeMap<OutpostId, Outpost>,
    pub start_outpost: OutpostId,
    next_outpost_id: u32,
    pub hostiles: BTreeMap<HostileId, Hostile>,
    next_hostile_id: u32,

    pub stockpile: Stockpile,
    pub drops: ResourceDrops,
    pub catalog: RecipeCatalog,

    pub haul: HaulQueue,
    pub processing: ProcessingQueue,
    pub wall_plan: Option<WallPlan>,
    pub walls: WallRegistry,
    pub defenses: DefenseRegistry,
    pub migrations: MigrationRegistry,

    pub threat_memory: ThreatMemory,
    /// Highest threat score across the tribe this tick, 0-100
    pub alert_level: f32,
    pub crisis: CrisisState,
    /// Desired goblins per role from the last planner pass
    pub role_plan: BTreeMap<Role, u32>,
    pub reproduction: ReproductionState,

    pub occupancy: OccupancyMap,
    pub metrics: SimMetrics,
    /// Events emitted so far this tick
    pub events: Vec<SimEvent>,
}

impl SimulationContext {
    /// Context with a single start outpost at `start_center`
    pub fn new(
        config: SimulationConfig,
        map: WorldMap,
        rng: DetRng,
        start_name: &str,
        start_center: TilePos,
    ) -> Result<Self> {
        if !map.in_bounds(start_center) {
            return Err(SimError::OutOfBounds(start_center));
        }
        let mut ctx = Self {
            tick: 0,
            config,
            rng,
            map,
            climate: ClimateModifiers::default(),
            agents: BTreeMap::new(),
            next_agent_id: 0,
            outposts: BTreeMap::new(),
            start_outpost: OutpostId(0),
            next_outpost_id: 0,
            hostiles: BTreeMap::new(),
            next_hostile_id: 0,
            stockpile: Stockpile::starting_tribe(),
            drops: ResourceDrops::new(),
            catalog: RecipeCatalog::with_defaults(),
            haul: HaulQueue::new(),
            processing: ProcessingQueue::new(),
            wall_plan: None,
            walls: WallRegistry::new(),
            defenses: DefenseRegistry::new(),
            migrations: MigrationRegistry::new(),
            threat_memory: ThreatMemory::new(),
            alert_level: 0.0,
            crisis: CrisisState::default(),
            role_plan: BTreeMap::new(),
            reproduction: ReproductionState::default(),
            occupancy: OccupancyMap::new(),
            metrics: SimMetrics::default(),
            events: Vec::new(),
        };
        ctx.start_outpost = ctx.insert_outpost(Outpost::new(
            OutpostId(0),
            start_name,
            start_center,
            true,
        ));
        Ok(ctx)
    }

    fn insert_outpost(&mut self, mut outpost: Outpost) -> OutpostId {
        let id = OutpostId(self.next_outpost_id);
        self.next_outpost_id += 1;
        outpost.id = id;
        outpost.founded_tick = self.tick;
        self.map.add_site(outpost.center);
        self.outposts.insert(id, outpost);
        id
    }

    /// Found a satellite outpost with a desired role mix
    pub fn add_outpost(
        &mut self,
        name: &str,
        center: TilePos,
        mix: impl IntoIterator<Item = (Role, u32)>,
    ) -> Result<OutpostId> {
        if !self.map.in_bounds(center) {
            return Err(SimError::OutOfBounds(center));
        }
        let outpost = Outpost::new(OutpostId(0), name, center, false).with_target_mix(mix);
        Ok(self.insert_outpost(outpost))
    }

    pub fn start_center(&self) -> TilePos {
        self.outposts
            .get(&self.start_outpost)
            .map(|o| o.center)
            .unwrap_or_default()
    }

    /// Where regrouping goblins gather
    pub fn rally_point(&self) -> TilePos {
        self.start_center()
    }

    pub fn station_tile(&self, station: Station) -> TilePos {
        let (dx, dy) = station.offset();
        self.map.clamp(self.start_center().offset(dx, dy))
    }

    pub fn living_count(&self) -> usize {
        self.agents.values().filter(|a| a.is_active()).count()
    }

    /// Living goblins per role; every role present, zeros included
    pub fn role_counts(&self) -> BTreeMap<Role, u32> {
        let mut counts: BTreeMap<Role, u32> = Role::ALL.iter().map(|r| (*r, 0)).collect();
        for agent in self.agents.values().filter(|a| a.is_active()) {
            *counts.entry(agent.role).or_insert(0) += 1;
        }
        counts
    }

    pub fn residents(&self, outpost: OutpostId) -> impl Iterator<Item = &Agent> {
        self.agents
            .values()
            .filter(move |a| a.is_active() && a.home_outpost == outpost)
    }

    /// First home slot at `outpost` that is walkable and nobody calls home
    pub fn free_home_slot(&self, outpost: OutpostId, skip: Option<TilePos>) -> Option<TilePos> {
        let outpost = self.outposts.get(&outpost)?;
        (0..64)
            .map(|i| outpost.home_slot(i))
            .find(|slot| {
                Some(*slot) != skip
                    && self.map.is_passable(*slot)
                    && !self.agents.values().any(|a| a.alive && a.home == *slot)
            })
    }

    /// Nearest tile to `pos` (itself first) that is walkable and free in
    /// the current occupancy map
    pub fn nearest_free_tile(&self, pos: TilePos) -> Option<TilePos> {
        for radius in 0i32..6 {
            let ring = (-radius..=radius)
                .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
                .filter(|(dx, dy)| dx.abs().max(dy.abs()) == radius)
                .map(|(dx, dy)| pos.offset(dx, dy))
                .filter(|c| self.map.is_passable(*c) && self.occupancy.occupant(*c).is_none());
            if let Some(found) = ring.min_by_key(|c| (OrderedFloat(c.distance(&pos)), c.y, c.x)) {
                return Some(found);
            }
        }
        None
    }

    fn next_id(&mut self) -> AgentId {
        let id = AgentId(self.next_agent_id);
        self.next_agent_id += 1;
        id
    }

    fn jitter_for(&self, id: AgentId) -> f32 {
        let j = self.config.needs.threshold_jitter;
        (self.rng.roll("threshold-jitter", &[u64::from(id.0)]) * 2.0 - 1.0) * j
    }

    /// Spawn a goblin at a free home slot of `outpost`
    pub fn spawn_agent(&mut self, name: &str, outpost: OutpostId, role: Role) -> Result<AgentId> {
        if !self.outposts.contains_key(&outpost) {
            return Err(SimError::OutpostNotFound(outpost));
        }
        let home = self
            .free_home_slot(outpost, None)
            .ok_or_else(|| SimError::InvalidConfig(format!("{outpost} has no free home slot")))?;
        let pos = self
            .nearest_free_tile(home)
            .ok_or(SimError::TileOccupied(home))?;
        let id = self.insert_agent(name, home, pos, outpost, role);
        Ok(id)
    }

    /// Spawn a goblin on an exact tile, which also becomes its home
    pub fn spawn_agent_at(
        &mut self,
        name: &str,
        pos: TilePos,
        outpost: OutpostId,
        role: Role,
    ) -> Result<AgentId> {
        if !self.outposts.contains_key(&outpost) {
            return Err(SimError::OutpostNotFound(outpost));
        }
        if !self.map.in_bounds(pos) {
            return Err(SimError::OutOfBounds(pos));
        }
        if !self.map.is_passable(pos) || self.occupancy.occupant(pos).is_some() {
            return Err(SimError::TileOccupied(pos));
        }
        Ok(self.insert_agent(name, pos, pos, outpost, role))
    }

    pub(crate) fn insert_agent(
        &mut self,
        name: &str,
        home: TilePos,
        pos: TilePos,
        outpost: OutpostId,
        role: Role,
    ) -> AgentId {
        let id = self.next_id();
        let mut agent = Agent::new(id, name, home, outpost, role, self.tick);
        agent.pos = pos;
        agent.threshold_jitter = self.jitter_for(id);
        self.occupancy.place(pos, id);
        self.agents.insert(id, agent);
        tracing::debug!("Spawned {} ({}) at {}", id, role, pos);
        id
    }

    pub fn spawn_hostile(&mut self, kind: HostileKind, pos: TilePos) -> HostileId {
        let id = HostileId(self.next_hostile_id);
        self.next_hostile_id += 1;
        self.hostiles.insert(id, Hostile::new(id, kind, pos));
        id
    }

    pub fn is_outpost_open(&self, id: OutpostId) -> bool {
        self.outposts.get(&id).is_some_and(|o| o.status.is_open())
    }

    pub fn outpost_status(&self, id: OutpostId) -> Option<OutpostStatus> {
        self.outposts.get(&id).map(|o| o.status)
    }

    /// Drop every task claim a goblin holds
    pub fn release_claims(&mut self, agent: AgentId) {
        self.haul.release_agent(agent);
        self.processing.release_agent(agent);
        self.defenses.release_agent(agent);
        if let Some(plan) = self.wall_plan.as_mut() {
            plan.release_agent(agent);
        }
    }

    pub fn emit(&mut self, kind: EventKind, agents: Vec<AgentId>, summary: impl Into<String>) {
        self.metrics.record(&kind);
        self.events.push(SimEvent {
            tick: self.tick,
            kind,
            agents,
            summary: summary.into(),
        });
    }

    /// Emit `RoleTaskBlocked` unless the same reason went out for this
    /// goblin within the cooldown
    pub fn emit_blocked(&mut self, agent: &mut Agent, reason: BlockedReason) {
        let cooldown = self.config.tasks.blocked_event_cooldown;
        if let Some((last, at)) = agent.role_state.last_blocked {
            if last == reason && self.tick.saturating_sub(at) < cooldown {
                return;
            }
        }
        agent.role_state.last_blocked = Some((reason, self.tick));
        self.emit(
            EventKind::RoleTaskBlocked {
                role: agent.role,
                reason,
            },
            vec![agent.id],
            format!("{} ({}) blocked: {}", agent.name, agent.role, reason.code()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SimulationContext {
        SimulationContext::new(
            SimulationConfig::default(),
            WorldMap::new(16, 16),
            DetRng::new(1),
            "Ashcap",
            TilePos::new(32, 32),
        )
        .unwrap()
    }

    #[test]
    fn test_spawned_goblins_get_distinct_homes() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        let a = ctx.spawn_agent("Grib", start, Role::Forager).unwrap();
        let b = ctx.spawn_agent("Snag", start, Role::Hauler).unwrap();
        assert_ne!(ctx.agents[&a].home, ctx.agents[&b].home);
        assert_ne!(ctx.agents[&a].pos, ctx.agents[&b].pos);
        assert_eq!(ctx.living_count(), 2);
        assert_eq!(ctx.role_counts()[&Role::Hauler], 1);
    }

    #[test]
    fn test_spawn_errors_at_boundary() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        assert!(matches!(
            ctx.spawn_agent_at("Far", TilePos::new(-1, 4), start, Role::Scout),
            Err(SimError::OutOfBounds(_))
        ));
        assert!(matches!(
            ctx.spawn_agent("Lost", OutpostId(9), Role::Scout),
            Err(SimError::OutpostNotFound(_))
        ));
        ctx.spawn_agent_at("One", TilePos::new(5, 5), start, Role::Scout).unwrap();
        assert!(matches!(
            ctx.spawn_agent_at("Two", TilePos::new(5, 5), start, Role::Scout),
            Err(SimError::TileOccupied(_))
        ));
    }

    #[test]
    fn test_nearest_free_tile_scans_whole_ring() {
        let mut ctx = context();
        let pos = TilePos::new(10, 10);
        let mut next = 100;
        for dy in -2..=2i32 {
            for dx in -2..=2i32 {
                let on_ray = dx == 0 || dy == 0 || dx.abs() == dy.abs();
                if on_ray {
                    ctx.occupancy.place(pos.offset(dx, dy), AgentId(next));
                    next += 1;
                }
            }
        }
        assert_eq!(ctx.nearest_free_tile(pos), Some(TilePos::new(9, 8)));
    }

    #[test]
    fn test_blocked_events_are_rate_limited() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        let id = ctx.spawn_agent("Grib", start, Role::Forager).unwrap();
        let mut agent = ctx.agents.remove(&id).unwrap();
        ctx.emit_blocked(&mut agent, BlockedReason::NoNodeReady);
        ctx.tick = 11;
        ctx.emit_blocked(&mut agent, BlockedReason::NoNodeReady);
        ctx.emit_blocked(&mut agent, BlockedReason::NoPath);
        ctx.tick = 22;
        ctx.emit_blocked(&mut agent, BlockedReason::NoPath);
        assert_eq!(ctx.events.len(), 2);
        ctx.tick = 23;
        ctx.emit_blocked(&mut agent, BlockedReason::NoPath);
        assert_eq!(ctx.events.len(), 3);
    }
}
