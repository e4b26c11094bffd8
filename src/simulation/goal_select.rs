//! Goal selection: the ladder every goblin climbs once per tick
//!
//! First match wins: threat response, crisis duty, thirst, hunger, cargo,
//! rest, migration, the role's own work, and finally wandering near home.
//! Role branches that come up empty report a `BlockedReason` (rate limited
//! per goblin) and fall through to wandering.

use crate::city::recipe::Station;
use crate::city::resource::ResourceKind;
use crate::core::types::TilePos;
use crate::entity::agent::{Agent, ThreatMode};
use crate::entity::goal::{BlockedReason, Goal};
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::events::EventKind;
use crate::tasks::haul::HaulFilter;
use crate::tasks::processing::ProcessStatus;
use crate::world::map::NodeKind;

/// Woodcutters switch to ore once ore is further below its reserve than wood
const WOOD_RESERVE: u32 = 30;
const ORE_RESERVE: u32 = 12;
/// Idle wander targets hold for this many ticks
const WANDER_REFRESH: u64 = 10;
const PATROL_POINTS: u32 = 8;
const LOOKOUT_RING: f32 = 7.0;
const SCOUT_RING_MIN: i32 = 10;
const SCOUT_RING_MAX: i32 = 16;

/// Pick this tick's goal, emitting `RoleTaskClaimed` when a new kind of
/// task starts
pub fn select_goal(ctx: &mut SimulationContext, agent: &mut Agent) -> Goal {
    let goal = choose(ctx, agent);
    let previous = agent.role_state.goal;
    if !goal.same_kind(&previous) {
        agent.role_state.goal_started_tick = ctx.tick;
        if is_task(&goal) {
            ctx.emit(
                EventKind::RoleTaskClaimed {
                    role: agent.role,
                    goal: goal.label().to_string(),
                    target: goal.target(),
                },
                vec![agent.id],
                format!("{} ({}) takes up {}", agent.name, agent.role, goal.label()),
            );
        }
    }
    goal
}

fn is_task(goal: &Goal) -> bool {
    matches!(
        goal,
        Goal::Gather { .. }
            | Goal::CollectWater { .. }
            | Goal::HaulPickup { .. }
            | Goal::Process { .. }
            | Goal::BuildWall { .. }
            | Goal::MaintainDefense { .. }
            | Goal::InvestigateThreat { .. }
            | Goal::Tend { .. }
            | Goal::EstablishColony { .. }
    )
}

fn choose(ctx: &mut SimulationContext, agent: &mut Agent) -> Goal {
    if let Some(goal) = threat_goal(ctx, agent) {
        return goal;
    }

    let suppressed = ctx.crisis.tier.suppresses(agent.role);
    if suppressed {
        if let Some(goal) = crisis_goal(ctx, agent) {
            return goal;
        }
    }

    if let Some(goal) = hydration_goal(ctx, agent) {
        return goal;
    }
    if let Some(goal) = hunger_goal(ctx, agent) {
        return goal;
    }
    if let Some(goal) = cargo_goal(ctx, agent) {
        return goal;
    }
    if let Some(goal) = rest_goal(ctx, agent) {
        return goal;
    }
    if let Some(job) = ctx.migrations.active_for(agent.id) {
        return Goal::Migrate {
            target: job.slot,
            job: job.id,
        };
    }
    if !suppressed {
        if let Some(goal) = role_goal(ctx, agent) {
            return goal;
        }
    }
    wander_goal(ctx, agent)
}

fn threat_goal(ctx: &SimulationContext, agent: &Agent) -> Option<Goal> {
    let threat = &agent.threat;
    match threat.mode {
        ThreatMode::None => None,
        ThreatMode::Defend => {
            let hostile = threat.hostile?;
            let target = ctx
                .hostiles
                .get(&hostile)
                .filter(|h| h.alive)
                .map(|h| h.pos)?;
            Some(Goal::Defend { target, hostile })
        }
        ThreatMode::Flee => Some(Goal::Flee {
            target: threat.target.unwrap_or(agent.home),
            from: threat.from.unwrap_or(agent.pos),
        }),
        ThreatMode::Regroup => Some(Goal::Regroup {
            target: threat.target.unwrap_or_else(|| ctx.rally_point()),
        }),
    }
}

/// Survival duty for goblins whose role the crisis has suspended
fn crisis_goal(ctx: &mut SimulationContext, agent: &mut Agent) -> Option<Goal> {
    if let Some(goal) = hydration_goal(ctx, agent) {
        return Some(goal);
    }
    if let Some(goal) = hunger_goal(ctx, agent) {
        return Some(goal);
    }
    if let Some(goal) = cargo_goal(ctx, agent) {
        return Some(goal);
    }
    if let Some(goal) = haul_goal(ctx, agent, HaulFilter::SurvivalOnly) {
        return Some(goal);
    }
    if let Some(goal) = gather_goal(ctx, agent, &[NodeKind::Mushroom]) {
        return Some(goal);
    }
    collect_water_goal(ctx, agent)
}

fn hydration_goal(ctx: &mut SimulationContext, agent: &mut Agent) -> Option<Goal> {
    let cfg = &ctx.config.needs;
    let thirst = agent.needs.thirst;
    let seek = agent.thirst_threshold(cfg.thirst_seek);
    let high = agent.thirst_threshold(cfg.thirst_high);
    let critical = agent.thirst_threshold(cfg.thirst_critical);
    let continuing = matches!(
        agent.role_state.goal,
        Goal::Drink { .. } | Goal::FetchStoredWater { .. }
    ) && thirst > cfg.drink_sated;
    if thirst < seek && !continuing {
        return None;
    }

    let stored = ctx.stockpile.get(ResourceKind::Water) > 0;
    let source = ctx.map.nearest_water_source(agent.pos);
    let near = source.filter(|(_, d)| *d <= cfg.water_seek_radius);

    if let Some((target, _)) = near {
        return Some(Goal::Drink { target });
    }
    if thirst >= critical && stored {
        return Some(Goal::FetchStoredWater { target: agent.home });
    }
    if let Some((target, _)) = source.filter(|_| thirst >= high || continuing) {
        return Some(Goal::Drink { target });
    }
    if matches!(agent.role_state.goal, Goal::FetchStoredWater { .. }) && continuing && stored {
        return Some(Goal::FetchStoredWater { target: agent.home });
    }
    if thirst >= high {
        ctx.emit_blocked(agent, BlockedReason::NoWater);
    }
    None
}

fn hunger_goal(ctx: &SimulationContext, agent: &Agent) -> Option<Goal> {
    let cfg = &ctx.config.needs;
    let continuing =
        matches!(agent.role_state.goal, Goal::EatStored { .. }) && agent.needs.hunger > cfg.eat_sated;
    if agent.needs.hunger < cfg.hunger_seek && !continuing {
        return None;
    }
    let has_food = ctx.stockpile.get(ResourceKind::Food) > 0
        || ctx.stockpile.get(ResourceKind::Mushrooms) > 0;
    has_food.then_some(Goal::EatStored { target: agent.home })
}

fn cargo_goal(ctx: &SimulationContext, agent: &Agent) -> Option<Goal> {
    let cargo = agent.role_state.cargo.filter(|c| c.amount > 0)?;
    if cargo.hauled {
        Some(Goal::HaulDeliver {
            target: ctx.start_center(),
        })
    } else {
        Some(Goal::DeliverHome { target: agent.home })
    }
}

fn rest_goal(ctx: &SimulationContext, agent: &Agent) -> Option<Goal> {
    let cfg = &ctx.config.needs;
    let fatigue = agent.needs.fatigue;
    if let Goal::Rest { target } = agent.role_state.goal {
        if fatigue > cfg.rest_sated {
            return Some(Goal::Rest { target });
        }
    }
    if fatigue >= agent.fatigue_threshold(cfg.fatigue_high) {
        return Some(Goal::Rest { target: agent.pos });
    }
    if fatigue >= agent.fatigue_threshold(cfg.fatigue_seek) {
        return Some(Goal::Rest { target: agent.home });
    }
    None
}

fn role_goal(ctx: &mut SimulationContext, agent: &mut Agent) -> Option<Goal> {
    match agent.role {
        Role::Forager => {
            let per_capita =
                ctx.stockpile.get(ResourceKind::Food) as f32 / (ctx.living_count().max(1) as f32);
            let food_low = per_capita < ctx.config.crisis.elevated_per_capita;
            let kinds: &[NodeKind] = if food_low || ctx.crisis.tier.is_active() {
                &[NodeKind::Mushroom, NodeKind::Herb, NodeKind::Fiber]
            } else {
                &[NodeKind::Herb, NodeKind::Fiber, NodeKind::Mushroom]
            };
            gather_or_block(ctx, agent, kinds)
        }
        Role::WaterRunner => {
            if ctx.stockpile.room(ResourceKind::Water) == 0 {
                ctx.emit_blocked(agent, BlockedReason::StorageUnavailable);
                return None;
            }
            let goal = collect_water_goal(ctx, agent);
            if goal.is_none() {
                ctx.emit_blocked(agent, BlockedReason::NoWater);
            }
            goal
        }
        Role::Woodcutter => {
            let wood_gap = WOOD_RESERVE.saturating_sub(ctx.stockpile.get(ResourceKind::Wood));
            let ore_gap = ORE_RESERVE.saturating_sub(ctx.stockpile.get(ResourceKind::MetalOre));
            let kinds: &[NodeKind] = if ore_gap > wood_gap {
                &[NodeKind::Ore, NodeKind::Salvage, NodeKind::Tree]
            } else {
                &[NodeKind::Tree]
            };
            gather_or_block(ctx, agent, kinds)
        }
        Role::Miner => gather_or_block(ctx, agent, &[NodeKind::Ore, NodeKind::Salvage]),
        Role::Scavenger => gather_goal(ctx, agent, &[NodeKind::Salvage])
            .or_else(|| haul_goal(ctx, agent, HaulFilter::Any))
            .or_else(|| {
                ctx.emit_blocked(agent, BlockedReason::NoNodeReady);
                None
            }),
        Role::Builder => wall_goal(ctx, agent)
            .or_else(|| maintenance_goal(ctx, agent))
            .or_else(|| {
                ctx.emit_blocked(agent, BlockedReason::NoTaskAvailable);
                None
            }),
        Role::Hauler => {
            let filter = if ctx.crisis.tier.is_active() {
                HaulFilter::PreferSurvival
            } else {
                HaulFilter::Any
            };
            haul_goal(ctx, agent, filter).or_else(|| {
                ctx.emit_blocked(agent, BlockedReason::NoTaskAvailable);
                None
            })
        }
        Role::Sentinel => investigate_goal(ctx, agent).or_else(|| Some(guard_goal(ctx, agent))),
        Role::Lookout => investigate_goal(ctx, agent).or_else(|| Some(patrol_goal(ctx, agent))),
        Role::Scout => Some(scout_goal(ctx, agent)),
        Role::Smelter
        | Role::Carpenter
        | Role::RopeMaker
        | Role::CharcoalBurner
        | Role::Fletcher
        | Role::Tinkerer
        | Role::Cook
        | Role::Herbalist => {
            let station = agent.role.station();
            process_or_block(ctx, agent, station, false)
        }
        Role::Caretaker => tend_goal(ctx, agent)
            .or_else(|| process_or_block(ctx, agent, Some(Station::Apothecary), false)),
        Role::Quartermaster => {
            let crisis = ctx.crisis.tier.is_active();
            let filter = if crisis {
                HaulFilter::SurvivalOnly
            } else {
                HaulFilter::PreferSurvival
            };
            haul_goal(ctx, agent, filter).or_else(|| process_or_block(ctx, agent, None, crisis))
        }
        Role::Mechanist => maintenance_goal(ctx, agent)
            .or_else(|| process_or_block(ctx, agent, Some(Station::Workbench), false)),
        Role::Reproducer => match ctx.reproduction.partner_of(agent.id) {
            Some(partner) => {
                let target = ctx.agents.get(&partner).map_or(agent.home, |p| p.pos);
                Some(Goal::Reproduce {
                    target,
                    partner: Some(partner),
                })
            }
            None => Some(Goal::Rest { target: agent.home }),
        },
        Role::Colonizer => colony_goal(ctx)
            .or_else(|| haul_goal(ctx, agent, HaulFilter::Any))
            .or_else(|| {
                ctx.emit_blocked(agent, BlockedReason::NoTaskAvailable);
                None
            }),
        Role::Lorekeeper => Some(Goal::Study { target: agent.home }),
    }
}

fn gather_goal(ctx: &SimulationContext, agent: &Agent, kinds: &[NodeKind]) -> Option<Goal> {
    kinds.iter().find_map(|kind| {
        ctx.map
            .nearest_ready_node(agent.pos, *kind, ctx.tick)
            .map(|(target, _)| Goal::Gather { target, node: *kind })
    })
}

fn gather_or_block(ctx: &mut SimulationContext, agent: &mut Agent, kinds: &[NodeKind]) -> Option<Goal> {
    let goal = gather_goal(ctx, agent, kinds);
    if goal.is_none() {
        ctx.emit_blocked(agent, BlockedReason::NoNodeReady);
    }
    goal
}

fn collect_water_goal(ctx: &SimulationContext, agent: &Agent) -> Option<Goal> {
    ctx.map
        .nearest_water_source(agent.pos)
        .map(|(target, _)| Goal::CollectWater { target })
}

fn haul_goal(ctx: &mut SimulationContext, agent: &Agent, filter: HaulFilter) -> Option<Goal> {
    let lease = ctx.config.tasks.haul_lease_ticks;
    ctx.haul
        .claim(agent.id, agent.pos, ctx.tick, lease, filter)
        .map(|task| Goal::HaulPickup {
            target: task.pos,
            resource: task.resource,
        })
}

fn process_or_block(
    ctx: &mut SimulationContext,
    agent: &mut Agent,
    station: Option<Station>,
    survival_only: bool,
) -> Option<Goal> {
    let lease = ctx.config.tasks.processing_lease_ticks;
    let claimed = ctx.processing.claim(
        agent.id,
        station,
        ctx.tick,
        lease,
        survival_only,
        &ctx.catalog,
    );
    if let Some(task) = claimed.and_then(|id| ctx.processing.get(id)) {
        return Some(Goal::Process {
            target: ctx.station_tile(task.station),
            task: task.id,
        });
    }
    let starved = ctx.processing.tasks().any(|t| {
        t.status == ProcessStatus::Blocked && station.map_or(true, |s| t.station == s)
    });
    let reason = if starved {
        BlockedReason::NoStationInput
    } else {
        BlockedReason::NoTaskAvailable
    };
    ctx.emit_blocked(agent, reason);
    None
}

fn wall_goal(ctx: &mut SimulationContext, agent: &mut Agent) -> Option<Goal> {
    let plan = ctx.wall_plan.as_ref()?;
    if plan.backlog() == 0 {
        return None;
    }
    if ctx.stockpile.get(ResourceKind::Wood) < ctx.config.wall.wood_per_segment {
        ctx.emit_blocked(agent, BlockedReason::NoStationInput);
        return None;
    }
    let focus = ctx
        .threat_memory
        .recent_breaches
        .back()
        .map(|(pos, _)| *pos)
        .or_else(|| ctx.threat_memory.strongest(0.5).map(|r| r.pos));
    let lease = ctx.config.tasks.wall_reservation_ticks;
    let tick = ctx.tick;
    let target = ctx
        .wall_plan
        .as_mut()?
        .claim_segment(agent.id, agent.pos, focus, tick, lease)?;
    Some(Goal::BuildWall { target })
}

fn maintenance_goal(ctx: &mut SimulationContext, agent: &Agent) -> Option<Goal> {
    let lease = ctx.config.tasks.defense_lease_ticks;
    let id = ctx.defenses.claim_maintenance(
        agent.id,
        agent.pos,
        ctx.tick,
        lease,
        &ctx.config.defense,
        &ctx.stockpile,
    )?;
    let target = ctx.defenses.get(id)?.pos;
    Some(Goal::MaintainDefense { target, defense: id })
}

fn investigate_goal(ctx: &SimulationContext, agent: &Agent) -> Option<Goal> {
    let record = ctx
        .threat_memory
        .strongest(ctx.config.threat.investigate_min_confidence)?;
    // Watchers do not chase across the map
    if record.pos.distance(&agent.home) > ctx.config.threat.home_alert_radius * 1.5 {
        return None;
    }
    Some(Goal::InvestigateThreat {
        target: record.pos,
        threat: record.id,
    })
}

fn guard_goal(ctx: &SimulationContext, agent: &Agent) -> Goal {
    let rally = ctx.rally_point();
    let id = u64::from(agent.id.0);
    let dx = ctx.rng.range("guard-post", &[id, 0], -2, 2);
    let dy = ctx.rng.range("guard-post", &[id, 1], -2, 2);
    Goal::Guard {
        target: ctx.map.clamp(rally.offset(dx, dy)),
    }
}

fn ring_point(center: TilePos, radius: f32, index: u32) -> TilePos {
    let angle = std::f32::consts::TAU * (index % PATROL_POINTS) as f32 / PATROL_POINTS as f32;
    center.offset(
        (angle.cos() * radius).round() as i32,
        (angle.sin() * radius).round() as i32,
    )
}

/// Next waypoint on the lookout ring; walkable or the center
fn patrol_goal(ctx: &SimulationContext, agent: &Agent) -> Goal {
    let center = ctx.start_center();
    let offset = agent.id.0 % PATROL_POINTS;
    let point = ring_point(center, LOOKOUT_RING, agent.role_state.patrol_cursor + offset);
    let target = if ctx.map.is_passable(point) { point } else { center };
    Goal::Patrol { target }
}

fn scout_goal(ctx: &SimulationContext, agent: &Agent) -> Goal {
    let center = ctx.start_center();
    let cursor = agent.role_state.patrol_cursor;
    let radius = ctx.rng.range(
        "scout-ring",
        &[u64::from(agent.id.0), u64::from(cursor)],
        SCOUT_RING_MIN,
        SCOUT_RING_MAX,
    );
    let point = ctx.map.clamp(ring_point(center, radius as f32, cursor + agent.id.0));
    let target = if ctx.map.is_passable(point) { point } else { center };
    Goal::Scout { target }
}

/// Most depleted goblin below the care threshold, other than the carer
fn tend_goal(ctx: &SimulationContext, agent: &Agent) -> Option<Goal> {
    use crate::simulation::roles::CARE_VITALITY;
    ctx.agents
        .values()
        .filter(|a| a.is_active() && a.id != agent.id && a.vitals.vitality < CARE_VITALITY)
        .min_by(|a, b| {
            a.vitals
                .vitality
                .total_cmp(&b.vitals.vitality)
                .then(a.id.cmp(&b.id))
        })
        .map(|patient| Goal::Tend {
            target: patient.pos,
            patient: patient.id,
        })
}

/// Walk to the open satellite outpost that is furthest below its mix
fn colony_goal(ctx: &SimulationContext) -> Option<Goal> {
    ctx.outposts
        .values()
        .filter(|o| !o.is_start && o.status.is_open() && o.runtime.total_deficit() > 0)
        .max_by_key(|o| (o.runtime.total_deficit(), std::cmp::Reverse(o.id)))
        .map(|o| Goal::EstablishColony {
            target: o.center,
            outpost: o.id,
        })
}

/// Keyed spot near home, stable for `WANDER_REFRESH` ticks
fn wander_goal(ctx: &mut SimulationContext, agent: &mut Agent) -> Goal {
    let radius = ctx.config.path.wander_radius.round() as i32;
    let window = ctx.tick / WANDER_REFRESH;
    let id = u64::from(agent.id.0);
    let dx = ctx.rng.range("wander", &[window, id, 0], -radius, radius);
    let dy = ctx.rng.range("wander", &[window, id, 1], -radius, radius);
    let spot = ctx.map.clamp(agent.home.offset(dx, dy));
    let target = if ctx.map.is_passable(spot) { spot } else { agent.home };

    let interval = ctx.config.social.wander_event_interval;
    let fresh = agent.role_state.goal != (Goal::Idle { target });
    let due = agent
        .social
        .last_wander_event_tick
        .map_or(true, |last| ctx.tick.saturating_sub(last) >= interval);
    if fresh && due && target != agent.pos {
        agent.social.last_wander_event_tick = Some(ctx.tick);
        ctx.emit(
            EventKind::IdleWander { target },
            vec![agent.id],
            format!("{} wanders toward {}", agent.name, target),
        );
    }
    Goal::Idle { target }
}
