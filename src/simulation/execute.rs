//! Goal execution: what a goblin does once it reaches its target
//!
//! Effects apply when the goblin stands within one king move of the goal
//! target, after this tick's step. Goals with nothing to do on arrival
//! (idle, regroup, flee, migrate) are no-ops here.

use crate::city::resource::ResourceKind;
use crate::core::rng::coord_part;
use crate::core::types::{AgentId, DefenseId, HostileId, OutpostId, TaskId, ThreatId, TilePos};
use crate::entity::agent::{Agent, Cargo, ThreatMode};
use crate::entity::goal::{BlockedReason, Goal};
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::events::EventKind;
use crate::tasks::defense::MaintainOutcome;
use crate::tasks::processing::WorkOutcome;
use crate::tasks::wall::BuildOutcome;
use crate::world::map::NodeKind;

/// A lorekeeper records one lore per this many study ticks
const STUDY_TICKS: u64 = 20;
/// An investigator clears a record unless its hostile is this close to it
const INVESTIGATE_RADIUS: f32 = 3.0;
const TEND_VITALITY: f32 = 3.0;
const HERBAL_TEND_VITALITY: f32 = 6.0;

pub fn execute_goal(ctx: &mut SimulationContext, agent: &mut Agent) {
    let goal = agent.role_state.goal;
    if agent.pos.chebyshev(&goal.target()) > 1 {
        return;
    }
    match goal {
        Goal::Idle { .. }
        | Goal::Flee { .. }
        | Goal::Regroup { .. }
        | Goal::Guard { .. }
        | Goal::Migrate { .. }
        | Goal::Reproduce { .. } => {}
        Goal::Drink { .. } => drink(ctx, agent),
        Goal::FetchStoredWater { .. } => drink_stored(ctx, agent),
        Goal::EatStored { .. } => eat(ctx, agent),
        Goal::Rest { target } => rest(ctx, agent, target),
        Goal::DeliverHome { target } | Goal::HaulDeliver { target } => deliver(ctx, agent, target),
        Goal::Gather { target, node } => gather(ctx, agent, target, node),
        Goal::CollectWater { .. } => collect_water(ctx, agent),
        Goal::HaulPickup { target, resource } => pickup(ctx, agent, target, resource),
        Goal::Process { task, .. } => process(ctx, agent, task),
        Goal::BuildWall { target } => build_wall(ctx, agent, target),
        Goal::MaintainDefense { defense, .. } => maintain(ctx, agent, defense),
        Goal::Patrol { .. } | Goal::Scout { .. } => {
            agent.role_state.patrol_cursor = agent.role_state.patrol_cursor.wrapping_add(1);
        }
        Goal::InvestigateThreat { threat, .. } => investigate(ctx, agent, threat),
        Goal::Tend { patient, .. } => tend(ctx, agent, patient),
        Goal::Study { .. } => study(ctx, agent),
        Goal::Defend { hostile, .. } => defend(ctx, agent, hostile),
        Goal::EstablishColony { outpost, .. } => settle(ctx, agent, outpost),
    }
}

fn drink(ctx: &SimulationContext, agent: &mut Agent) {
    let cfg = &ctx.config.needs;
    agent.needs.relieve_thirst(cfg.drink_relief);
    // A source satisfies completely
    if agent.needs.thirst <= cfg.drink_sated {
        agent.needs.thirst = 0.0;
    }
}

fn drink_stored(ctx: &mut SimulationContext, agent: &mut Agent) {
    if ctx.stockpile.remove(ResourceKind::Water, 1) == 0 {
        ctx.emit_blocked(agent, BlockedReason::NoWater);
        return;
    }
    agent.needs.relieve_thirst(ctx.config.needs.stored_water_relief);
}

fn eat(ctx: &mut SimulationContext, agent: &mut Agent) {
    let ate = ctx.stockpile.remove(ResourceKind::Food, 1) > 0
        || ctx.stockpile.remove(ResourceKind::Mushrooms, 1) > 0;
    if ate {
        agent.needs.relieve_hunger(ctx.config.needs.food_relief);
    }
}

fn rest(ctx: &SimulationContext, agent: &mut Agent, target: TilePos) {
    let relief = ctx.config.needs.rest_relief;
    // Resting rough recovers at half pace
    let relief = if target == agent.home { relief } else { relief * 0.5 };
    agent.needs.relieve_fatigue(relief);
    agent.vitals.adjust_stress(-0.5);
}

/// Hand cargo to the ledger; whatever does not fit is dropped here
fn deliver(ctx: &mut SimulationContext, agent: &mut Agent, at: TilePos) {
    let Some(cargo) = agent.role_state.cargo.take() else {
        return;
    };
    let stored = ctx.stockpile.add(cargo.resource, cargo.amount);
    if stored > 0 {
        ctx.emit(
            EventKind::ResourceDelivered {
                resource: cargo.resource,
                amount: stored,
            },
            vec![agent.id],
            format!("{} delivers {} {}", agent.name, stored, cargo.resource),
        );
    }
    let leftover = cargo.amount - stored;
    if leftover > 0 {
        ctx.drops.deposit(at, cargo.resource, leftover);
        ctx.emit_blocked(agent, BlockedReason::StorageUnavailable);
        ctx.emit(
            EventKind::ResourceDropped {
                resource: cargo.resource,
                amount: leftover,
                pos: at,
            },
            vec![agent.id],
            format!("{} leaves {} {} at {}", agent.name, leftover, cargo.resource, at),
        );
    }
}

fn gather(ctx: &mut SimulationContext, agent: &mut Agent, at: TilePos, kind: NodeKind) {
    let tick = ctx.tick;
    let ready = ctx.map.nodes.get(&at).is_some_and(|n| n.kind == kind && n.is_ready(tick));
    if !ready {
        ctx.emit_blocked(agent, BlockedReason::NoNodeReady);
        return;
    }
    if agent.is_carrying() {
        ctx.emit_blocked(agent, BlockedReason::CarryFull);
        return;
    }
    let (lo, hi) = kind.yield_range();
    let base = ctx.rng.range(
        "gather-yield",
        &[tick, u64::from(agent.id.0), coord_part(at.x), coord_part(at.y)],
        lo,
        hi,
    );
    let amount = ctx.climate.scaled_yield(base.max(0) as u32).max(1);
    if let Some(node) = ctx.map.node_mut(at) {
        node.ready_at_tick = tick + kind.regrow_ticks();
    }

    let resource = kind.resource();
    let staged = agent.home.distance(&at) > ctx.config.tasks.stage_distance;
    if staged {
        ctx.drops.deposit(at, resource, amount);
    } else {
        agent.role_state.cargo = Some(Cargo {
            resource,
            amount,
            hauled: false,
        });
    }
    ctx.emit(
        EventKind::ResourceGathered {
            resource,
            amount,
            staged,
        },
        vec![agent.id],
        format!("{} gathers {} {}", agent.name, amount, resource),
    );
}

fn collect_water(ctx: &mut SimulationContext, agent: &mut Agent) {
    if agent.is_carrying() {
        ctx.emit_blocked(agent, BlockedReason::CarryFull);
        return;
    }
    let amount = ctx.config.tasks.water_fill;
    agent.role_state.cargo = Some(Cargo {
        resource: ResourceKind::Water,
        amount,
        hauled: false,
    });
    ctx.emit(
        EventKind::ResourceGathered {
            resource: ResourceKind::Water,
            amount,
            staged: false,
        },
        vec![agent.id],
        format!("{} fills {} water", agent.name, amount),
    );
}

fn pickup(ctx: &mut SimulationContext, agent: &mut Agent, at: TilePos, resource: ResourceKind) {
    let tick = ctx.tick;
    if ctx.haul.holder((at, resource), tick) != Some(agent.id) {
        return;
    }
    if agent.is_carrying() {
        ctx.emit_blocked(agent, BlockedReason::CarryFull);
        return;
    }
    let taken = ctx
        .drops
        .take(at, resource, ctx.config.tasks.haul_carry_capacity);
    ctx.haul.complete((at, resource));
    if taken > 0 {
        agent.role_state.cargo = Some(Cargo {
            resource,
            amount: taken,
            hauled: true,
        });
    }
}

fn process(ctx: &mut SimulationContext, agent: &mut Agent, task: TaskId) {
    let lease = ctx.config.tasks.processing_lease_ticks;
    let outcome = ctx.processing.work(
        task,
        agent.id,
        &mut ctx.stockpile,
        &ctx.catalog,
        ctx.tick,
        lease,
    );
    match outcome {
        WorkOutcome::Progressed | WorkOutcome::NotHeld => {}
        WorkOutcome::Blocked => ctx.emit_blocked(agent, BlockedReason::NoStationInput),
        WorkOutcome::Completed { recipe_id, outputs } => {
            tracing::debug!("{} finished {} at tick {}", agent.id, recipe_id, ctx.tick);
            ctx.emit(
                EventKind::ProcessingCompleted {
                    recipe: recipe_id.clone(),
                    outputs,
                },
                vec![agent.id],
                format!("{} completes {}", agent.name, recipe_id),
            );
        }
    }
}

fn build_wall(ctx: &mut SimulationContext, agent: &mut Agent, at: TilePos) {
    let cost = ctx.config.wall.wood_per_segment;
    if ctx.stockpile.get(ResourceKind::Wood) < cost {
        ctx.emit_blocked(agent, BlockedReason::NoStationInput);
        return;
    }
    let tick = ctx.tick;
    let Some(plan) = ctx.wall_plan.as_mut() else {
        return;
    };
    if let BuildOutcome::Built { repaired } = plan.build(at, agent.id, tick, &mut ctx.walls) {
        ctx.stockpile.remove(ResourceKind::Wood, cost);
        ctx.emit(
            EventKind::WallSegmentBuilt { pos: at, repaired },
            vec![agent.id],
            format!("{} raises the palisade at {}", agent.name, at),
        );
    }
}

fn maintain(ctx: &mut SimulationContext, agent: &mut Agent, defense: DefenseId) {
    let lease = ctx.config.tasks.defense_lease_ticks;
    let outcome = ctx.defenses.maintain(
        defense,
        agent.id,
        &mut ctx.stockpile,
        ctx.tick,
        lease,
        &ctx.config.defense,
    );
    match outcome {
        MaintainOutcome::Restocked { .. } => ctx.emit(
            EventKind::DefenseMaintained { defense },
            vec![agent.id],
            format!("{} restocks {}", agent.name, defense),
        ),
        MaintainOutcome::NothingAvailable => ctx.emit_blocked(agent, BlockedReason::NoStationInput),
        MaintainOutcome::NotHeld => {}
    }
}

fn investigate(ctx: &mut SimulationContext, agent: &mut Agent, threat: ThreatId) {
    let cleared = ctx
        .threat_memory
        .investigate(threat, &ctx.hostiles, INVESTIGATE_RADIUS);
    ctx.emit(
        EventKind::ThreatInvestigated { threat, cleared },
        vec![agent.id],
        format!(
            "{} checks {}: {}",
            agent.name,
            threat,
            if cleared { "nothing there" } else { "still there" }
        ),
    );
}

fn tend(ctx: &mut SimulationContext, agent: &mut Agent, patient: AgentId) {
    let herbal = ctx.stockpile.remove(ResourceKind::Herbs, 1) == 1;
    let Some(target) = ctx.agents.get_mut(&patient).filter(|p| p.is_active()) else {
        return;
    };
    let boost = if herbal { HERBAL_TEND_VITALITY } else { TEND_VITALITY };
    target.vitals.adjust_vitality(boost);
    target.vitals.adjust_stress(-2.0);
    agent.vitals.adjust_morale(0.5);
}

fn study(ctx: &mut SimulationContext, agent: &mut Agent) {
    let studied = ctx.tick.saturating_sub(agent.role_state.goal_started_tick);
    if studied == 0 || studied % STUDY_TICKS != 0 {
        return;
    }
    if ctx.stockpile.add(ResourceKind::Lore, 1) == 1 {
        ctx.emit(
            EventKind::LoreRecorded,
            vec![agent.id],
            format!("{} records a tale", agent.name),
        );
    }
}

fn defend(ctx: &mut SimulationContext, agent: &mut Agent, hostile: HostileId) {
    let cfg = &ctx.config.threat;
    let Some(pos) = ctx.hostiles.get(&hostile).filter(|h| h.alive).map(|h| h.pos) else {
        return;
    };
    let allies = ctx
        .agents
        .values()
        .filter(|a| {
            a.is_active() && a.threat.mode == ThreatMode::Defend && a.pos.chebyshev(&pos) <= 2
        })
        .count() as f32;
    let mut damage = cfg.defend_damage + allies * cfg.defend_assist;
    if agent.role == Role::Sentinel {
        damage *= 1.25;
    }
    agent.vitals.adjust_stress(1.0);
    let killed = ctx
        .hostiles
        .get_mut(&hostile)
        .is_some_and(|h| h.take_damage(damage));
    if killed {
        tracing::info!("{} slew {}", agent.id, hostile);
        agent.vitals.adjust_morale(5.0);
        ctx.emit(
            EventKind::HostileSlain { hostile },
            vec![agent.id],
            format!("{} slays {}", agent.name, hostile),
        );
    }
}

/// Rehome a colonizer at its outpost in the role the outpost lacks most
fn settle(ctx: &mut SimulationContext, agent: &mut Agent, outpost: OutpostId) {
    if !ctx.is_outpost_open(outpost) || agent.home_outpost == outpost {
        return;
    }
    let Some(slot) = ctx.free_home_slot(outpost, None) else {
        return;
    };
    let role = ctx
        .outposts
        .get(&outpost)
        .and_then(|o| {
            o.runtime
                .deficit_by_role
                .iter()
                .filter(|(_, n)| **n > 0)
                .max_by_key(|(r, n)| (**n, std::cmp::Reverse(**r)))
                .map(|(r, _)| *r)
        })
        .unwrap_or(Role::Forager);

    let from = agent.role;
    agent.home = slot;
    agent.home_outpost = outpost;
    agent.assign_role(role, ctx.tick);
    ctx.release_claims(agent.id);
    if let Some(o) = ctx.outposts.get_mut(&outpost) {
        o.runtime.population += 1;
        if let Some(deficit) = o.runtime.deficit_by_role.get_mut(&role) {
            *deficit = deficit.saturating_sub(1);
        }
    }
    tracing::info!("{} settled at {} as {}", agent.id, outpost, role);
    ctx.emit(
        EventKind::ColonistSettled { outpost },
        vec![agent.id],
        format!("{} settles at {}", agent.name, outpost),
    );
    ctx.emit(
        EventKind::RoleReassigned {
            from,
            to: role,
            reason: "colony".into(),
        },
        vec![agent.id],
        format!("{} takes up {} at the new outpost", agent.name, role),
    );
}

/// Chance of a friendly moment with the nearest goblin in reach
pub fn social_moment(ctx: &mut SimulationContext, agent: &mut Agent) {
    let cfg = ctx.config.social.clone();
    let tick = ctx.tick;
    if agent.threat.mode != ThreatMode::None {
        return;
    }
    if agent
        .social
        .last_interaction_tick
        .is_some_and(|last| tick.saturating_sub(last) < cfg.interaction_cooldown)
    {
        return;
    }
    let partner = ctx
        .agents
        .values()
        .filter(|a| {
            a.is_active()
                && a.pos.distance(&agent.pos) <= cfg.interaction_radius
                && a.social
                    .last_interaction_tick
                    .map_or(true, |last| tick.saturating_sub(last) >= cfg.interaction_cooldown)
        })
        .min_by(|a, b| {
            a.pos
                .distance(&agent.pos)
                .total_cmp(&b.pos.distance(&agent.pos))
                .then(a.id.cmp(&b.id))
        })
        .map(|a| a.id);
    let Some(partner) = partner else {
        return;
    };
    if !ctx
        .rng
        .chance("social", &[tick, u64::from(agent.id.0)], cfg.interaction_chance)
    {
        return;
    }
    agent.social.last_interaction_tick = Some(tick);
    agent.vitals.adjust_morale(cfg.morale_gain);
    let partner_name = match ctx.agents.get_mut(&partner) {
        Some(other) => {
            other.social.last_interaction_tick = Some(tick);
            other.vitals.adjust_morale(cfg.morale_gain);
            other.name.clone()
        }
        None => return,
    };
    ctx.emit(
        EventKind::SocialInteraction,
        vec![agent.id, partner],
        format!("{} shares a moment with {}", agent.name, partner_name),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfig;
    use crate::core::rng::DetRng;
    use crate::world::hostile::HostileKind;
    use crate::world::map::WorldMap;

    fn context() -> SimulationContext {
        SimulationContext::new(
            SimulationConfig::default(),
            WorldMap::new(16, 16),
            DetRng::new(21),
            "Ashcap",
            TilePos::new(32, 32),
        )
        .unwrap()
    }

    fn take(ctx: &mut SimulationContext, role: Role, pos: TilePos) -> Agent {
        let start = ctx.start_outpost;
        let id = ctx.spawn_agent_at("Grib", pos, start, role).unwrap();
        ctx.agents.remove(&id).unwrap()
    }

    #[test]
    fn test_drink_at_source_satisfies_to_zero() {
        let mut ctx = context();
        let mut agent = take(&mut ctx, Role::Forager, TilePos::new(10, 10));
        agent.needs.thirst = 42.0;
        agent.role_state.goal = Goal::Drink { target: TilePos::new(11, 10) };
        execute_goal(&mut ctx, &mut agent);
        assert_eq!(agent.needs.thirst, 0.0);
    }

    #[test]
    fn test_nothing_happens_out_of_reach() {
        let mut ctx = context();
        let mut agent = take(&mut ctx, Role::Forager, TilePos::new(10, 10));
        agent.needs.thirst = 60.0;
        agent.role_state.goal = Goal::Drink { target: TilePos::new(14, 10) };
        execute_goal(&mut ctx, &mut agent);
        assert_eq!(agent.needs.thirst, 60.0);
    }

    #[test]
    fn test_far_gather_is_staged_as_drop() {
        let mut ctx = context();
        let node = TilePos::new(12, 10);
        ctx.map.add_node(node, NodeKind::Tree);
        let mut agent = take(&mut ctx, Role::Woodcutter, TilePos::new(11, 10));
        agent.home = TilePos::new(32, 32);
        agent.role_state.goal = Goal::Gather { target: node, node: NodeKind::Tree };
        execute_goal(&mut ctx, &mut agent);
        assert!(!agent.is_carrying());
        assert!(ctx.drops.amount(node, ResourceKind::Wood) >= 1);
        assert!(!ctx.map.nodes[&node].is_ready(ctx.tick));
    }

    #[test]
    fn test_near_gather_fills_cargo() {
        let mut ctx = context();
        let node = TilePos::new(12, 10);
        ctx.map.add_node(node, NodeKind::Mushroom);
        let mut agent = take(&mut ctx, Role::Forager, TilePos::new(11, 10));
        agent.role_state.goal = Goal::Gather { target: node, node: NodeKind::Mushroom };
        execute_goal(&mut ctx, &mut agent);
        let cargo = agent.role_state.cargo.unwrap();
        assert_eq!(cargo.resource, ResourceKind::Mushrooms);
        assert!((1..=3).contains(&cargo.amount));
    }

    #[test]
    fn test_full_storage_drops_cargo_at_home() {
        let mut ctx = context();
        ctx.stockpile.set_capacity(ResourceKind::Wood, 20);
        let mut agent = take(&mut ctx, Role::Woodcutter, TilePos::new(10, 10));
        agent.role_state.cargo = Some(Cargo {
            resource: ResourceKind::Wood,
            amount: 4,
            hauled: false,
        });
        agent.role_state.goal = Goal::DeliverHome { target: agent.home };
        execute_goal(&mut ctx, &mut agent);
        assert_eq!(ctx.stockpile.get(ResourceKind::Wood), 20);
        assert_eq!(ctx.drops.amount(agent.home, ResourceKind::Wood), 2);
        assert!(!agent.is_carrying());
        assert!(ctx.events.iter().any(|e| matches!(
            e.kind,
            EventKind::RoleTaskBlocked { reason: BlockedReason::StorageUnavailable, .. }
        )));
    }

    #[test]
    fn test_haul_pickup_requires_claim() {
        let mut ctx = context();
        let pile = TilePos::new(11, 10);
        ctx.drops.deposit(pile, ResourceKind::Wood, 6);
        ctx.haul.regenerate(&ctx.drops, &ctx.stockpile, 0);
        let mut agent = take(&mut ctx, Role::Hauler, TilePos::new(10, 10));
        agent.role_state.goal = Goal::HaulPickup { target: pile, resource: ResourceKind::Wood };
        execute_goal(&mut ctx, &mut agent);
        assert!(!agent.is_carrying());

        ctx.haul
            .claim(agent.id, agent.pos, 0, 16, crate::tasks::haul::HaulFilter::Any)
            .unwrap();
        execute_goal(&mut ctx, &mut agent);
        assert_eq!(agent.role_state.cargo.map(|c| c.amount), Some(4));
        assert_eq!(ctx.drops.amount(pile, ResourceKind::Wood), 2);
    }

    #[test]
    fn test_defenders_kill_hostile() {
        let mut ctx = context();
        let wolf = ctx.spawn_hostile(HostileKind::Wolf, TilePos::new(11, 10));
        let mut agent = take(&mut ctx, Role::Sentinel, TilePos::new(10, 10));
        agent.role_state.goal = Goal::Defend { target: TilePos::new(11, 10), hostile: wolf };
        for _ in 0..4 {
            execute_goal(&mut ctx, &mut agent);
        }
        assert!(!ctx.hostiles[&wolf].alive);
        assert_eq!(ctx.metrics.hostiles_killed, 1);
    }

    #[test]
    fn test_study_records_lore_periodically() {
        let mut ctx = context();
        let mut agent = take(&mut ctx, Role::Lorekeeper, TilePos::new(10, 10));
        agent.role_state.goal = Goal::Study { target: agent.home };
        agent.role_state.goal_started_tick = 0;
        let before = ctx.stockpile.get(ResourceKind::Lore);
        for tick in 1..=40 {
            ctx.tick = tick;
            execute_goal(&mut ctx, &mut agent);
        }
        assert_eq!(ctx.stockpile.get(ResourceKind::Lore), before + 2);
    }

    #[test]
    fn test_colonizer_settles_in_deficit_role() {
        let mut ctx = context();
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(50, 50), [(Role::Miner, 3)])
            .unwrap();
        ctx.outposts
            .get_mut(&outpost)
            .unwrap()
            .runtime
            .deficit_by_role
            .insert(Role::Miner, 3);
        let mut agent = take(&mut ctx, Role::Colonizer, TilePos::new(50, 51));
        agent.role_state.goal = Goal::EstablishColony { target: TilePos::new(50, 50), outpost };
        execute_goal(&mut ctx, &mut agent);
        assert_eq!(agent.home_outpost, outpost);
        assert_eq!(agent.role, Role::Miner);
        assert!(agent.home.distance(&TilePos::new(50, 50)) < 4.0);
    }
}
