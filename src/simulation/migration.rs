//! Migration planner: watches active jobs and opens voluntary ones
//!
//! Job watchdog per tick: a vanished migrant fails the job, arrival
//! rehomes the goblin, a stalled migrant gets a new home slot and then a
//! new destination before the job is given up.

use crate::core::types::{AgentId, JobId, OutpostId, TilePos};
use crate::simulation::context::SimulationContext;
use crate::simulation::events::EventKind;
use crate::simulation::roles::is_movable;
use crate::tasks::migration::{FailureReason, Progress};

pub fn update_migrations(ctx: &mut SimulationContext) {
    for job in ctx.migrations.active_ids() {
        watch_job(ctx, job);
    }
    plan_voluntary(ctx);
}

fn watch_job(ctx: &mut SimulationContext, id: JobId) {
    let Some(job) = ctx.migrations.get(id) else {
        return;
    };
    let (agent, to) = (job.agent, job.to);
    let Some(pos) = ctx.agents.get(&agent).filter(|a| a.is_active()).map(|a| a.pos) else {
        fail(ctx, id, agent, FailureReason::GoblinUnavailable);
        return;
    };
    if !ctx.is_outpost_open(to) {
        retarget_or_fail(ctx, id, agent, pos, FailureReason::DestinationMissing);
        return;
    }

    let tick = ctx.tick;
    let cfg = ctx.config.migration.clone();
    let Some(job) = ctx.migrations.get_mut(id) else {
        return;
    };
    match job.observe(pos, tick, &cfg) {
        Progress::Advancing => {}
        Progress::Arrived => arrive(ctx, id),
        Progress::TimedOut => fail(ctx, id, agent, FailureReason::Timeout),
        Progress::Stalled => {
            let (reroutes, slot) = (job.reroutes, job.slot);
            if reroutes >= cfg.max_reroutes {
                retarget_or_fail(ctx, id, agent, pos, FailureReason::DestinationMissing);
                return;
            }
            let Some(new_slot) = ctx.free_home_slot(to, Some(slot)) else {
                retarget_or_fail(ctx, id, agent, pos, FailureReason::DestinationMissing);
                return;
            };
            if let Some(job) = ctx.migrations.get_mut(id) {
                job.reroute(new_slot, tick, &cfg);
            }
            ctx.migrations.metrics.rerouted += 1;
            tracing::debug!("Migration {} rerouted to {}", id, new_slot);
            ctx.emit(
                EventKind::MigrationRerouted { job: id, slot: new_slot },
                vec![agent],
                format!("{} tries another home slot at {}", agent, new_slot),
            );
        }
    }
}

/// Nearest other open outpost with room, by center distance
fn alternative(ctx: &SimulationContext, from: OutpostId, to: OutpostId, pos: TilePos) -> Option<(OutpostId, TilePos)> {
    ctx.outposts
        .values()
        .filter(|o| o.id != to && o.id != from && o.status.is_open())
        .filter_map(|o| ctx.free_home_slot(o.id, None).map(|slot| (o, slot)))
        .min_by(|(a, _), (b, _)| {
            a.center
                .distance(&pos)
                .total_cmp(&b.center.distance(&pos))
                .then(a.id.cmp(&b.id))
        })
        .map(|(o, slot)| (o.id, slot))
}

fn retarget_or_fail(ctx: &mut SimulationContext, id: JobId, agent: AgentId, pos: TilePos, reason: FailureReason) {
    let cfg = ctx.config.migration.clone();
    let Some(job) = ctx.migrations.get(id) else {
        return;
    };
    if job.retargets >= cfg.max_retargets {
        fail(ctx, id, agent, reason);
        return;
    }
    let Some((to, slot)) = alternative(ctx, job.from, job.to, pos) else {
        fail(ctx, id, agent, reason);
        return;
    };
    let tick = ctx.tick;
    if let Some(job) = ctx.migrations.get_mut(id) {
        job.retarget(to, slot, tick, &cfg);
    }
    ctx.migrations.metrics.retargeted += 1;
    tracing::debug!("Migration {} retargeted to {}", id, to);
    ctx.emit(
        EventKind::MigrationRetargeted { job: id, to },
        vec![agent],
        format!("{} heads for {} instead", agent, to),
    );
}

fn fail(ctx: &mut SimulationContext, id: JobId, agent: AgentId, reason: FailureReason) {
    ctx.migrations.fail(id, reason);
    tracing::warn!("Migration {} for {} failed: {}", id, agent, reason);
    ctx.emit(
        EventKind::MigrationFailed { job: id, reason },
        vec![agent],
        format!("{} gives up migrating ({})", agent, reason),
    );
}

fn arrive(ctx: &mut SimulationContext, id: JobId) {
    let Some(job) = ctx.migrations.get(id) else {
        return;
    };
    let (agent_id, to, slot) = (job.agent, job.to, job.slot);
    ctx.migrations.complete(id);
    if let Some(agent) = ctx.agents.get_mut(&agent_id) {
        agent.home = slot;
        agent.home_outpost = to;
    }
    tracing::info!("{} settled at {} after migrating", agent_id, to);
    ctx.emit(
        EventKind::MigrationCompleted { job: id, outpost: to },
        vec![agent_id],
        format!("{} arrives at {}", agent_id, to),
    );
}

/// Open at most one voluntary job per planning pass toward the most
/// deficient open outpost
fn plan_voluntary(ctx: &mut SimulationContext) {
    let cfg = ctx.config.migration.clone();
    if cfg.plan_interval == 0 || ctx.tick % cfg.plan_interval != 0 {
        return;
    }
    if ctx.migrations.voluntary_count() >= cfg.max_active_jobs {
        return;
    }
    let start = ctx.start_outpost;
    if ctx.residents(start).count() < cfg.min_start_population {
        return;
    }

    let target = ctx
        .outposts
        .values()
        .filter(|o| !o.is_start && o.status.is_open() && o.runtime.total_deficit() > 0)
        .max_by_key(|o| (o.runtime.total_deficit(), std::cmp::Reverse(o.id)));
    let Some(target) = target else {
        return;
    };
    let (to, wanted) = (target.id, target.runtime.deficit_by_role.clone());
    let Some(slot) = ctx.free_home_slot(to, None) else {
        return;
    };

    let candidates: Vec<_> = ctx
        .residents(start)
        .filter(|a| is_movable(a, ctx) && !a.role.is_survival())
        .map(|a| (a.id, wanted.contains_key(&a.role)))
        .collect();
    // Prefer a goblin whose role the outpost lacks
    let Some(agent) = candidates
        .iter()
        .find(|(_, fits)| *fits)
        .or_else(|| candidates.first())
        .map(|(id, _)| *id)
    else {
        return;
    };

    let tick = ctx.tick;
    if let Some(job) = ctx.migrations.start(agent, start, to, slot, tick, false, &cfg) {
        tracing::debug!("Migration {} opened: {} -> {}", job, agent, to);
        ctx.emit(
            EventKind::MigrationStarted {
                job,
                from: start,
                to,
                evacuation: false,
            },
            vec![agent],
            format!("{} sets out for {}", agent, to),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::city::outpost::OutpostStatus;
    use crate::core::config::SimulationConfig;
    use crate::core::rng::DetRng;
    use crate::entity::role::Role;
    use crate::simulation::outposts::update_outposts;
    use crate::tasks::migration::MigrationStatus;
    use crate::world::map::WorldMap;

    fn context() -> SimulationContext {
        SimulationContext::new(
            SimulationConfig::default(),
            WorldMap::new(24, 24),
            DetRng::new(8),
            "Ashcap",
            TilePos::new(30, 30),
        )
        .unwrap()
    }

    fn tribe(ctx: &mut SimulationContext, n: usize) -> Vec<AgentId> {
        let start = ctx.start_outpost;
        (0..n)
            .map(|i| {
                let role = if i % 2 == 0 { Role::Miner } else { Role::Smelter };
                ctx.spawn_agent(&format!("G{}", i), start, role).unwrap()
            })
            .collect()
    }

    fn start_job(ctx: &mut SimulationContext, agent: AgentId, to: OutpostId) -> JobId {
        let cfg = ctx.config.migration.clone();
        let slot = ctx.free_home_slot(to, None).unwrap();
        let start = ctx.start_outpost;
        ctx.migrations
            .start(agent, start, to, slot, ctx.tick, false, &cfg)
            .unwrap()
    }

    #[test]
    fn test_planner_sends_matching_role() {
        let mut ctx = context();
        tribe(&mut ctx, 6);
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(60, 60), [(Role::Smelter, 2)])
            .unwrap();
        update_outposts(&mut ctx);
        ctx.tick = 90;
        update_migrations(&mut ctx);
        let job = ctx.migrations.jobs().next().unwrap();
        assert_eq!(job.to, outpost);
        assert!(!job.evacuation);
        assert_eq!(ctx.agents[&job.agent].role, Role::Smelter);
    }

    #[test]
    fn test_planner_waits_for_population() {
        let mut ctx = context();
        tribe(&mut ctx, 5);
        ctx.add_outpost("Mossden", TilePos::new(60, 60), [(Role::Smelter, 2)])
            .unwrap();
        update_outposts(&mut ctx);
        ctx.tick = 90;
        update_migrations(&mut ctx);
        assert_eq!(ctx.migrations.active_count(), 0);
    }

    #[test]
    fn test_arrival_rehomes() {
        let mut ctx = context();
        let goblins = tribe(&mut ctx, 1);
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(60, 60), [(Role::Miner, 2)])
            .unwrap();
        let job = start_job(&mut ctx, goblins[0], outpost);
        let slot = ctx.migrations.get(job).unwrap().slot;
        ctx.agents.get_mut(&goblins[0]).unwrap().pos = slot;
        ctx.tick = 1;
        update_migrations(&mut ctx);
        assert_eq!(ctx.migrations.get(job).unwrap().status, MigrationStatus::Completed);
        assert_eq!(ctx.agents[&goblins[0]].home_outpost, outpost);
        assert_eq!(ctx.agents[&goblins[0]].home, slot);
    }

    #[test]
    fn test_dead_migrant_fails_job() {
        let mut ctx = context();
        let goblins = tribe(&mut ctx, 1);
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(60, 60), [(Role::Miner, 2)])
            .unwrap();
        let job = start_job(&mut ctx, goblins[0], outpost);
        ctx.agents.get_mut(&goblins[0]).unwrap().alive = false;
        update_migrations(&mut ctx);
        assert_eq!(
            ctx.migrations.get(job).unwrap().status,
            MigrationStatus::Failed(FailureReason::GoblinUnavailable)
        );
        assert_eq!(ctx.migrations.metrics.failed_goblin_unavailable, 1);
    }

    #[test]
    fn test_stall_reroutes_then_gives_up() {
        let mut ctx = context();
        let goblins = tribe(&mut ctx, 1);
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(60, 60), [(Role::Miner, 2)])
            .unwrap();
        let job = start_job(&mut ctx, goblins[0], outpost);
        // Standing still: progress is only recorded once
        for tick in 0..=400 {
            ctx.tick = tick;
            update_migrations(&mut ctx);
        }
        let job = ctx.migrations.get(job).unwrap();
        assert_eq!(job.status, MigrationStatus::Failed(FailureReason::DestinationMissing));
        assert_eq!(ctx.migrations.metrics.rerouted, 3);
        assert!(ctx
            .events
            .iter()
            .any(|e| matches!(e.kind, EventKind::MigrationFailed { .. })));
    }

    #[test]
    fn test_closed_destination_retargets() {
        let mut ctx = context();
        let goblins = tribe(&mut ctx, 1);
        let first = ctx
            .add_outpost("Mossden", TilePos::new(60, 60), [(Role::Miner, 2)])
            .unwrap();
        let second = ctx
            .add_outpost("Fungle", TilePos::new(70, 30), [(Role::Miner, 2)])
            .unwrap();
        let job = start_job(&mut ctx, goblins[0], first);
        ctx.outposts.get_mut(&first).unwrap().status = OutpostStatus::Abandoned;
        update_migrations(&mut ctx);
        let job = ctx.migrations.get(job).unwrap();
        assert!(job.is_active());
        assert_eq!(job.to, second);
        assert_eq!(job.retargets, 1);
    }
}
