//! Tick system - orchestrates simulation updates
//!
//! Each tick runs the tribe-wide subsystems first (queues, wall, threat
//! memory, defenses, outposts, migration, crisis, roles), then walks every
//! living goblin in id order: goal selection -> pathfinding -> occupancy
//! claim -> goal execution -> social moment. Moves land in the "next"
//! occupancy map and are committed together once everyone has acted.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::city::outpost::Outpost;
use crate::city::resource::ResourceKind;
use crate::core::error::Result;
use crate::core::types::{AgentId, Tick};
use crate::entity::agent::Agent;
use crate::entity::goal::BlockedReason;
use crate::entity::needs::{LinearNeedsModel, NeedsModel};
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::crisis::{update_crisis, CrisisTier};
use crate::simulation::events::{EventKind, SimEvent, SimMetrics};
use crate::simulation::execute::{execute_goal, social_moment};
use crate::simulation::fortifications::{complete_walls, update_fortifications, wall_coverage};
use crate::simulation::goal_select::select_goal;
use crate::simulation::migration::update_migrations;
use crate::simulation::outposts::update_outposts;
use crate::simulation::reproduction::update_reproduction;
use crate::simulation::roles::balance_roles;
use crate::simulation::threat::{ingest_threats, update_threat_responses};
use crate::spatial::pathfinder::{Pathfinder, StepOutcome, StepQuery};
use crate::tasks::migration::MigrationMetrics;
use crate::tasks::processing::DemandSignals;
use crate::tasks::wall::WallTileStatus;

/// Run one tick against the context and return the events it produced.
/// The caller advances `ctx.tick` and applies needs beforehand.
pub fn run_tick(ctx: &mut SimulationContext) -> Vec<SimEvent> {
    ctx.events.clear();

    refresh_occupancy(ctx);
    refresh_queues(ctx);

    update_fortifications(ctx);
    ingest_threats(ctx);
    update_outposts(ctx);
    update_migrations(ctx);
    update_crisis(ctx);
    balance_roles(ctx);

    update_threat_responses(ctx);
    act_all(ctx);
    ctx.occupancy.commit();

    update_reproduction(ctx);
    complete_walls(ctx);

    std::mem::take(&mut ctx.events)
}

/// Rebuild current occupancy; goblins stacked on a tile are nudged to the
/// nearest free one
fn refresh_occupancy(ctx: &mut SimulationContext) {
    let positions: Vec<(AgentId, _)> = ctx
        .agents
        .values()
        .filter(|a| a.is_active())
        .map(|a| (a.id, a.pos))
        .collect();
    let displaced = ctx.occupancy.rebuild(positions);
    for id in displaced {
        let Some(pos) = ctx.agents.get(&id).map(|a| a.pos) else {
            continue;
        };
        let Some(free) = ctx.nearest_free_tile(pos) else {
            tracing::warn!("No free tile near {} for displaced {}", pos, id);
            continue;
        };
        ctx.occupancy.place(free, id);
        if let Some(agent) = ctx.agents.get_mut(&id) {
            agent.pos = free;
        }
    }
}

fn refresh_queues(ctx: &mut SimulationContext) {
    let tick = ctx.tick;
    ctx.haul.regenerate(&ctx.drops, &ctx.stockpile, tick);
    let signals = DemandSignals {
        population: ctx.living_count(),
        alert: ctx.alert_level,
        survival_only: ctx.crisis.tier >= CrisisTier::Severe,
    };
    let cfg = &ctx.config.tasks;
    ctx.processing.refresh(
        &ctx.catalog,
        &ctx.stockpile,
        signals,
        tick,
        cfg.processing_min_in_flight,
        cfg.processing_population_divisor,
    );
}

fn act_all(ctx: &mut SimulationContext) {
    let ids: Vec<AgentId> = ctx
        .agents
        .values()
        .filter(|a| a.is_active())
        .map(|a| a.id)
        .collect();
    for id in ids {
        let Some(mut agent) = ctx.agents.remove(&id) else {
            continue;
        };
        act(ctx, &mut agent);
        ctx.agents.insert(id, agent);
    }
}

fn act(ctx: &mut SimulationContext, agent: &mut Agent) {
    let goal = select_goal(ctx, agent);
    agent.role_state.goal = goal;

    let outcome = Pathfinder {
        map: &ctx.map,
        occupancy: &ctx.occupancy,
        rng: &ctx.rng,
        config: &ctx.config.path,
        climate: &ctx.climate,
    }
    .next_step(StepQuery {
        agent: agent.id,
        from: agent.pos,
        home: agent.home,
        goal: &goal,
        tick: ctx.tick,
    });

    match outcome {
        StepOutcome::Move(to) if ctx.occupancy.claim_next(to, agent.id) => agent.pos = to,
        StepOutcome::NoPath => {
            ctx.occupancy.claim_next(agent.pos, agent.id);
            ctx.emit_blocked(agent, BlockedReason::NoPath);
        }
        _ => {
            ctx.occupancy.claim_next(agent.pos, agent.id);
        }
    }

    execute_goal(ctx, agent);
    social_moment(ctx, agent);
}

/// Simulation driver: owns the context, the needs model and the chronicle
pub struct Simulation {
    pub ctx: SimulationContext,
    needs: Box<dyn NeedsModel>,
    chronicle: VecDeque<SimEvent>,
}

impl Simulation {
    pub fn new(ctx: SimulationContext) -> Self {
        let needs = LinearNeedsModel::from_config(&ctx.config.needs);
        Self::with_needs_model(ctx, Box::new(needs))
    }

    pub fn with_needs_model(ctx: SimulationContext, needs: Box<dyn NeedsModel>) -> Self {
        Self {
            ctx,
            needs,
            chronicle: VecDeque::new(),
        }
    }

    pub fn tick(&self) -> Tick {
        self.ctx.tick
    }

    /// Advance the clock, apply needs, run the tick
    pub fn step(&mut self) -> Vec<SimEvent> {
        self.ctx.tick += 1;
        let tick = self.ctx.tick;

        let mut died = Vec::new();
        for agent in self.ctx.agents.values_mut().filter(|a| a.is_active()) {
            self.needs.apply(agent, tick);
            if !agent.alive {
                died.push((agent.id, agent.name.clone()));
            }
        }

        let mut events = Vec::new();
        for (id, name) in died {
            self.ctx.release_claims(id);
            tracing::info!("{} died at tick {}", id, tick);
            self.ctx.emit(EventKind::GoblinDied, vec![id], format!("{} has died", name));
        }
        events.append(&mut self.ctx.events);
        events.extend(run_tick(&mut self.ctx));

        let limit = self.ctx.config.chronicle_limit;
        for event in &events {
            if self.chronicle.len() >= limit {
                self.chronicle.pop_front();
            }
            self.chronicle.push_back(event.clone());
        }
        events
    }

    /// Run `ticks` steps, returning every event in order
    pub fn run(&mut self, ticks: u64) -> Vec<SimEvent> {
        let mut all = Vec::new();
        for _ in 0..ticks {
            all.extend(self.step());
        }
        all
    }

    /// Most recent events, oldest first
    pub fn chronicle(&self) -> impl Iterator<Item = &SimEvent> {
        self.chronicle.iter()
    }

    pub fn snapshot(&self) -> SimSnapshot {
        SimSnapshot::capture(&self.ctx)
    }

    pub fn summary_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallSummary {
    pub radius: i32,
    pub built: usize,
    pub backlog: usize,
    pub coverage: f32,
    pub continuity_gaps: u32,
    pub completed_at_tick: Option<Tick>,
}

/// Serializable view of the tribe at the end of a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub tick: Tick,
    pub population: usize,
    pub agents: Vec<Agent>,
    pub roles: BTreeMap<Role, u32>,
    pub outposts: Vec<Outpost>,
    pub stockpile: BTreeMap<ResourceKind, u32>,
    pub drops: u32,
    pub hostiles_alive: usize,
    pub alert_level: f32,
    pub crisis: CrisisTier,
    pub wall: Option<WallSummary>,
    pub defenses_active: usize,
    pub metrics: SimMetrics,
    pub migrations: MigrationMetrics,
}

impl SimSnapshot {
    pub fn capture(ctx: &SimulationContext) -> Self {
        Self {
            tick: ctx.tick,
            population: ctx.living_count(),
            agents: ctx.agents.values().cloned().collect(),
            roles: ctx.role_counts(),
            outposts: ctx.outposts.values().cloned().collect(),
            stockpile: ctx.stockpile.iter().collect(),
            drops: ctx.drops.iter().map(|(_, _, amount)| amount).sum(),
            hostiles_alive: ctx.hostiles.values().filter(|h| h.alive).count(),
            alert_level: ctx.alert_level,
            crisis: ctx.crisis.tier,
            wall: ctx.wall_plan.as_ref().map(|plan| WallSummary {
                radius: plan.radius,
                built: plan.count(WallTileStatus::Built),
                backlog: plan.backlog(),
                coverage: wall_coverage(Some(plan)),
                continuity_gaps: plan.continuity_gaps,
                completed_at_tick: plan.completed_at_tick,
            }),
            defenses_active: ctx.defenses.active_count(),
            metrics: ctx.metrics.clone(),
            migrations: ctx.migrations.metrics,
        }
    }
}
