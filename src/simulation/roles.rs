//! Role demand planner and balancer
//!
//! `plan_role_demand` is pure: it turns a snapshot of tribe pressures into
//! desired counts per role that sum exactly to the population. The
//! balancer then moves a few unlocked goblins toward that plan.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;

use crate::city::recipe::Station;
use crate::city::resource::ResourceKind;
use crate::core::types::AgentId;
use crate::entity::agent::Agent;
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::crisis::CrisisTier;
use crate::simulation::events::EventKind;
use crate::simulation::reproduction::is_safe;
use crate::tasks::wall::WallTileStatus;

/// Everything the planner looks at
#[derive(Debug, Clone, PartialEq)]
pub struct RoleDemandInputs {
    pub population: u32,
    pub food_per_capita: f32,
    pub water_per_capita: f32,
    /// Planned wall tiles still to build
    pub wall_backlog: usize,
    pub alert: f32,
    /// Share of live hostiles the tribe is tracking, 0-1
    pub intel_coverage: f32,
    pub processing_depth: usize,
    pub haul_depth: usize,
    /// Goblins below the care threshold
    pub care_need: u32,
    pub defenses_needing_maintenance: usize,
    pub reproduction_safe: bool,
    pub reproduction_room: bool,
    pub outpost_deficit: u32,
    pub crisis: CrisisTier,
    /// Queued processing tasks per station
    pub station_demand: BTreeMap<Station, usize>,
}

impl Default for RoleDemandInputs {
    fn default() -> Self {
        Self {
            population: 0,
            food_per_capita: 5.0,
            water_per_capita: 5.0,
            wall_backlog: 0,
            alert: 0.0,
            intel_coverage: 1.0,
            processing_depth: 0,
            haul_depth: 0,
            care_need: 0,
            defenses_needing_maintenance: 0,
            reproduction_safe: true,
            reproduction_room: true,
            outpost_deficit: 0,
            crisis: CrisisTier::None,
            station_demand: BTreeMap::new(),
        }
    }
}

/// Goblins whose vitality is below this want a caretaker
pub const CARE_VITALITY: f32 = 60.0;

fn station_score(inputs: &RoleDemandInputs, role: Role) -> f32 {
    role.station()
        .map(|s| inputs.station_demand.get(&s).copied().unwrap_or(0) as f32 * 0.5)
        .unwrap_or(0.0)
}

/// Relative demand for one role
fn role_score(inputs: &RoleDemandInputs, role: Role) -> f32 {
    let food_gap = (3.0 - inputs.food_per_capita).max(0.0);
    let water_gap = (3.0 - inputs.water_per_capita).max(0.0);
    let backlog = inputs.wall_backlog.min(40) as f32;
    let blind = (1.0 - inputs.intel_coverage).clamp(0.0, 1.0);

    match role {
        Role::Forager => 3.0 + food_gap * 1.5,
        Role::WaterRunner => 2.0 + water_gap * 1.5,
        Role::Woodcutter => 1.2 + backlog * 0.03,
        Role::Miner => 0.6,
        Role::Scavenger => 0.4,
        Role::Builder => 0.3 + backlog * 0.06,
        Role::Hauler => 0.8 + (inputs.haul_depth as f32 * 0.3).min(2.0),
        Role::Sentinel => 0.4 + inputs.alert / 25.0,
        Role::Lookout => 0.3 + blind + inputs.alert / 50.0,
        Role::Scout => 0.2 + blind * 0.5,
        Role::Smelter
        | Role::Carpenter
        | Role::RopeMaker
        | Role::CharcoalBurner
        | Role::Fletcher
        | Role::Tinkerer
        | Role::Herbalist => 0.1 + station_score(inputs, role),
        Role::Cook => 0.3 + station_score(inputs, role) + food_gap * 0.3,
        Role::Caretaker => inputs.care_need as f32 * 0.5,
        Role::Quartermaster => 0.2 + inputs.processing_depth.min(8) as f32 * 0.05,
        Role::Mechanist => inputs.defenses_needing_maintenance as f32 * 0.6,
        Role::Reproducer => {
            if inputs.reproduction_safe && inputs.reproduction_room {
                0.6
            } else {
                0.0
            }
        }
        Role::Colonizer => inputs.outpost_deficit.min(6) as f32 * 0.3,
        Role::Lorekeeper => 0.15,
    }
}

fn crisis_multiplier(tier: CrisisTier, role: Role) -> f32 {
    if tier.suppresses(role) {
        return 0.0;
    }
    let boost = match tier {
        CrisisTier::None => 0.0,
        CrisisTier::Elevated => 0.5,
        CrisisTier::Severe => 1.0,
        CrisisTier::Critical => 2.0,
    };
    match role {
        Role::Forager | Role::WaterRunner | Role::Hauler | Role::Cook => 1.0 + boost,
        _ => 1.0,
    }
}

/// Desired goblins per role. Every role is present; the counts sum to
/// `population` exactly.
pub fn plan_role_demand(inputs: &RoleDemandInputs) -> BTreeMap<Role, u32> {
    let mut plan: BTreeMap<Role, u32> = Role::ALL.iter().map(|r| (*r, 0)).collect();
    let population = inputs.population;
    if population == 0 {
        return plan;
    }

    let scores: Vec<(Role, f32)> = Role::ALL
        .iter()
        .map(|r| (*r, (role_score(inputs, *r) * crisis_multiplier(inputs.crisis, *r)).max(0.0)))
        .collect();
    let total: f32 = scores.iter().map(|(_, s)| s).sum();

    // Largest remainder allocation
    let mut remainders = Vec::with_capacity(scores.len());
    let mut assigned = 0u32;
    for (role, score) in &scores {
        let quota = if total > 0.0 {
            population as f32 * score / total
        } else {
            0.0
        };
        let whole = quota.floor() as u32;
        plan.insert(*role, whole);
        assigned += whole;
        remainders.push((*role, quota - whole as f32));
    }
    remainders.sort_by_key(|(role, rem)| (std::cmp::Reverse(OrderedFloat(*rem)), *role));
    for (role, _) in remainders.iter().cycle().take(population.saturating_sub(assigned) as usize) {
        *plan.entry(*role).or_insert(0) += 1;
    }

    // Survival floors, paid for by the largest other allocation
    let mut floors = vec![(Role::Forager, 1)];
    if population >= 4 {
        floors.push((Role::WaterRunner, 1));
    }
    let floor_of = |role: Role, floors: &[(Role, u32)]| {
        floors.iter().find(|(r, _)| *r == role).map_or(0, |(_, f)| *f)
    };
    for &(role, floor) in &floors {
        while plan[&role] < floor {
            let donor = plan
                .iter()
                .filter(|(r, n)| **r != role && **n > floor_of(**r, &floors))
                .max_by_key(|(r, n)| (**n, std::cmp::Reverse(**r)))
                .map(|(r, _)| *r);
            let Some(donor) = donor else {
                break;
            };
            *plan.entry(donor).or_insert(0) -= 1;
            *plan.entry(role).or_insert(0) += 1;
        }
    }

    plan
}

pub fn demand_inputs(ctx: &SimulationContext) -> RoleDemandInputs {
    let population = ctx.living_count() as u32;
    let per_capita = |amount: u32| amount as f32 / population.max(1) as f32;
    let stations: Vec<Station> = Role::ALL.iter().filter_map(|r| r.station()).collect();
    RoleDemandInputs {
        population,
        food_per_capita: per_capita(
            ctx.stockpile.get(ResourceKind::Food) + ctx.stockpile.get(ResourceKind::Mushrooms),
        ),
        water_per_capita: per_capita(ctx.stockpile.get(ResourceKind::Water)),
        wall_backlog: ctx
            .wall_plan
            .as_ref()
            .map_or(0, |plan| plan.count(WallTileStatus::Planned)),
        alert: ctx.alert_level,
        intel_coverage: ctx.threat_memory.intel_coverage(&ctx.hostiles),
        processing_depth: ctx.processing.depth(),
        haul_depth: ctx.haul.len(),
        care_need: ctx
            .agents
            .values()
            .filter(|a| a.is_active() && a.vitals.vitality < CARE_VITALITY)
            .count() as u32,
        defenses_needing_maintenance: ctx
            .defenses
            .iter()
            .filter(|d| d.is_worn(&ctx.config.defense))
            .count(),
        reproduction_safe: is_safe(ctx),
        reproduction_room: (population as usize) < ctx.config.reproduction.population_cap,
        outpost_deficit: ctx
            .outposts
            .values()
            .filter(|o| !o.is_start && o.status.is_open())
            .map(|o| o.runtime.total_deficit())
            .sum(),
        crisis: ctx.crisis.tier,
        station_demand: stations
            .into_iter()
            .map(|s| (s, ctx.processing.waiting_at(s)))
            .collect(),
    }
}

fn family(role: Role) -> u8 {
    match role {
        Role::Forager | Role::WaterRunner | Role::Woodcutter | Role::Miner | Role::Scavenger => 0,
        Role::Builder | Role::Hauler | Role::Quartermaster | Role::Mechanist => 1,
        Role::Sentinel | Role::Lookout | Role::Scout => 2,
        Role::Smelter
        | Role::Carpenter
        | Role::RopeMaker
        | Role::CharcoalBurner
        | Role::Fletcher
        | Role::Tinkerer
        | Role::Herbalist
        | Role::Cook => 3,
        Role::Caretaker | Role::Reproducer | Role::Colonizer | Role::Lorekeeper => 4,
    }
}

/// How well a goblin in a surplus role fits `to`
fn suitability(agent: &Agent, surplus: i64, to: Role) -> f32 {
    let mut score = surplus as f32;
    if family(agent.role) == family(to) {
        score += 0.5;
    }
    if matches!(to, Role::Sentinel | Role::Builder | Role::Woodcutter | Role::Miner) {
        score += agent.vitals.vitality / 100.0;
    }
    score - agent.needs.fatigue / 200.0
}

pub(crate) fn is_movable(agent: &Agent, ctx: &SimulationContext) -> bool {
    agent.is_active()
        && !agent.role_state.manual_lock
        && !agent.is_carrying()
        && ctx.tick.saturating_sub(agent.role_state.assigned_tick) >= ctx.config.roles.min_role_hold_ticks
        && ctx.migrations.active_for(agent.id).is_none()
}

/// Refresh the plan and move up to `max_moves_per_pass` goblins toward it.
/// Runs on ticks divisible by `balance_interval`.
pub fn balance_roles(ctx: &mut SimulationContext) {
    let cfg = ctx.config.roles.clone();
    if cfg.balance_interval == 0 || ctx.tick % cfg.balance_interval != 0 {
        return;
    }
    ctx.role_plan = plan_role_demand(&demand_inputs(ctx));
    let mut counts = ctx.role_counts();

    for _ in 0..cfg.max_moves_per_pass {
        let gap = |role: Role, counts: &BTreeMap<Role, u32>, plan: &BTreeMap<Role, u32>| {
            i64::from(plan.get(&role).copied().unwrap_or(0))
                - i64::from(counts.get(&role).copied().unwrap_or(0))
        };
        let target = Role::ALL
            .iter()
            .copied()
            .filter(|r| gap(*r, &counts, &ctx.role_plan) > 0)
            .max_by_key(|r| (gap(*r, &counts, &ctx.role_plan), std::cmp::Reverse(*r)));
        let Some(to) = target else {
            break;
        };

        let candidate = ctx
            .agents
            .values()
            .filter(|a| is_movable(a, ctx))
            .filter_map(|a| {
                let surplus = -gap(a.role, &counts, &ctx.role_plan);
                (surplus > 0).then(|| (a.id, suitability(a, surplus, to)))
            })
            .max_by_key(|(id, score)| (OrderedFloat(*score), std::cmp::Reverse(*id)))
            .map(|(id, _)| id);
        let Some(id) = candidate else {
            break;
        };
        reassign(ctx, id, to, "demand");
        counts = ctx.role_counts();
    }
}

/// Move a goblin to `to`, dropping any claims from its old role
pub fn reassign(ctx: &mut SimulationContext, id: AgentId, to: Role, reason: &str) {
    let tick = ctx.tick;
    let Some(agent) = ctx.agents.get_mut(&id) else {
        return;
    };
    let from = agent.role;
    if from == to {
        return;
    }
    agent.assign_role(to, tick);
    let name = agent.name.clone();
    ctx.release_claims(id);
    tracing::debug!("Reassigned {} from {} to {} ({})", id, from, to, reason);
    ctx.emit(
        EventKind::RoleReassigned {
            from,
            to,
            reason: reason.to_string(),
        },
        vec![id],
        format!("{} moves from {} to {}", name, from, to),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfig;
    use crate::core::rng::DetRng;
    use crate::core::types::TilePos;
    use crate::world::map::WorldMap;
    use proptest::prelude::*;

    #[test]
    fn test_plan_sums_to_population_with_floors() {
        let inputs = RoleDemandInputs {
            population: 12,
            ..Default::default()
        };
        let plan = plan_role_demand(&inputs);
        assert_eq!(plan.values().sum::<u32>(), 12);
        assert!(plan[&Role::Forager] >= 1);
        assert!(plan[&Role::WaterRunner] >= 1);
        assert_eq!(plan.len(), Role::ALL.len());
    }

    #[test]
    fn test_single_goblin_forages() {
        let inputs = RoleDemandInputs {
            population: 1,
            ..Default::default()
        };
        let plan = plan_role_demand(&inputs);
        assert_eq!(plan[&Role::Forager], 1);
    }

    #[test]
    fn test_crisis_zeroes_suppressed_roles() {
        let inputs = RoleDemandInputs {
            population: 30,
            crisis: CrisisTier::Critical,
            wall_backlog: 40,
            ..Default::default()
        };
        let plan = plan_role_demand(&inputs);
        assert_eq!(plan[&Role::Builder], 0);
        assert_eq!(plan[&Role::Lorekeeper], 0);
        assert_eq!(plan.values().sum::<u32>(), 30);
    }

    #[test]
    fn test_wall_backlog_raises_builders() {
        let calm = plan_role_demand(&RoleDemandInputs {
            population: 20,
            ..Default::default()
        });
        let busy = plan_role_demand(&RoleDemandInputs {
            population: 20,
            wall_backlog: 40,
            ..Default::default()
        });
        assert!(busy[&Role::Builder] > calm[&Role::Builder]);
    }

    #[test]
    fn test_balancer_respects_locks_and_move_limit() {
        let mut ctx = SimulationContext::new(
            SimulationConfig::default(),
            WorldMap::new(16, 16),
            DetRng::new(2),
            "Ashcap",
            TilePos::new(32, 32),
        )
        .unwrap();
        let start = ctx.start_outpost;
        let mut ids = Vec::new();
        for i in 0..6 {
            ids.push(ctx.spawn_agent(&format!("L{i}"), start, Role::Lorekeeper).unwrap());
        }
        ctx.agents.get_mut(&ids[0]).unwrap().role_state.manual_lock = true;

        ctx.tick = 12;
        balance_roles(&mut ctx);
        // hold window not over yet
        assert_eq!(ctx.role_counts()[&Role::Lorekeeper], 6);

        ctx.tick = 96;
        balance_roles(&mut ctx);
        assert_eq!(ctx.role_counts()[&Role::Lorekeeper], 4);
        assert_eq!(ctx.agents[&ids[0]].role, Role::Lorekeeper);
        assert_eq!(ctx.role_counts().values().sum::<u32>(), 6);
        assert_eq!(ctx.metrics.role_reassignments, 2);
    }

    proptest! {
        #[test]
        fn prop_plan_conserves_population(
            population in 0u32..80,
            food in 0.0f32..10.0,
            water in 0.0f32..10.0,
            backlog in 0usize..60,
            alert in 0.0f32..100.0,
            care in 0u32..10,
            tier in 0u8..4,
        ) {
            let crisis = match tier {
                0 => CrisisTier::None,
                1 => CrisisTier::Elevated,
                2 => CrisisTier::Severe,
                _ => CrisisTier::Critical,
            };
            let inputs = RoleDemandInputs {
                population,
                food_per_capita: food,
                water_per_capita: water,
                wall_backlog: backlog,
                alert,
                care_need: care,
                crisis,
                ..Default::default()
            };
            let plan = plan_role_demand(&inputs);
            prop_assert_eq!(plan.values().sum::<u32>(), population);
            if population >= 1 {
                prop_assert!(plan[&Role::Forager] >= 1);
            }
            if population >= 4 {
                prop_assert!(plan[&Role::WaterRunner] >= 1);
            }
        }
    }
}
