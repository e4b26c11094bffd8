//! Outpost lifecycle
//!
//! Non-start outposts move between Seeded, Viable and Stable with their
//! population. A sustained shortfall marks an outpost Failing; a long
//! failure (or a leader directive) evacuates it back to the start
//! outpost, and an empty or overdue evacuation ends Abandoned.

use std::collections::BTreeMap;

use crate::city::outpost::{LeaderDirective, Outpost, OutpostStatus};
use crate::core::config::OutpostConfig;
use crate::core::types::{AgentId, OutpostId, Tick};
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::events::EventKind;

/// Status from population alone, before hysteresis
pub fn provisional_status(population: u32, target: u32, cfg: &OutpostConfig) -> OutpostStatus {
    if target == 0 {
        return OutpostStatus::Stable;
    }
    let ratio = population as f32 / target as f32;
    if ratio < cfg.seeded_ratio {
        OutpostStatus::Seeded
    } else if ratio < cfg.viable_ratio {
        OutpostStatus::Viable
    } else {
        OutpostStatus::Stable
    }
}

pub fn is_unstable(outpost: &Outpost, cfg: &OutpostConfig) -> bool {
    let runtime = &outpost.runtime;
    if runtime.target_population == 0 {
        return false;
    }
    let ratio = runtime.population as f32 / runtime.target_population as f32;
    ratio < cfg.unstable_ratio || runtime.total_deficit() >= cfg.unstable_deficit
}

/// Next status for an outpost whose runtime is current
pub fn next_status(outpost: &mut Outpost, tick: Tick, cfg: &OutpostConfig) -> OutpostStatus {
    if outpost.is_start {
        return OutpostStatus::Stable;
    }
    let unstable = is_unstable(outpost, cfg);
    let provisional = provisional_status(
        outpost.runtime.population,
        outpost.runtime.target_population,
        cfg,
    );
    let evacuate = outpost.directive == Some(LeaderDirective::Evacuate);

    match outpost.status {
        OutpostStatus::Abandoned => OutpostStatus::Abandoned,
        OutpostStatus::Evacuating => {
            let overdue = outpost.evacuation_deadline.is_some_and(|d| tick >= d);
            if outpost.runtime.population == 0 || overdue {
                OutpostStatus::Abandoned
            } else {
                OutpostStatus::Evacuating
            }
        }
        _ if evacuate => OutpostStatus::Evacuating,
        OutpostStatus::Failing => {
            if !unstable {
                outpost.unstable_since = None;
                return provisional;
            }
            let since = outpost.failing_since.unwrap_or(tick);
            if tick.saturating_sub(since) >= cfg.evacuate_after_ticks {
                OutpostStatus::Evacuating
            } else {
                OutpostStatus::Failing
            }
        }
        OutpostStatus::Seeded | OutpostStatus::Viable | OutpostStatus::Stable => {
            if !unstable {
                outpost.unstable_since = None;
                return provisional;
            }
            let since = *outpost.unstable_since.get_or_insert(tick);
            if tick.saturating_sub(since) >= cfg.failing_after_ticks {
                OutpostStatus::Failing
            } else {
                provisional
            }
        }
    }
}

fn refresh_runtime(ctx: &mut SimulationContext) {
    let mut counts: BTreeMap<OutpostId, BTreeMap<Role, u32>> = BTreeMap::new();
    for agent in ctx.agents.values().filter(|a| a.is_active()) {
        *counts
            .entry(agent.home_outpost)
            .or_default()
            .entry(agent.role)
            .or_insert(0) += 1;
    }
    for outpost in ctx.outposts.values_mut() {
        let present = counts.remove(&outpost.id).unwrap_or_default();
        outpost.runtime.population = present.values().sum();
        outpost.runtime.target_population = outpost.target_population;
        outpost.runtime.deficit_by_role = outpost
            .target_mix
            .iter()
            .map(|(role, want)| (*role, want.saturating_sub(present.get(role).copied().unwrap_or(0))))
            .filter(|(_, gap)| *gap > 0)
            .collect();
    }
}

pub fn update_outposts(ctx: &mut SimulationContext) {
    refresh_runtime(ctx);
    let cfg = ctx.config.outposts.clone();
    let tick = ctx.tick;
    let ids: Vec<OutpostId> = ctx.outposts.keys().copied().collect();

    for id in ids {
        let Some(outpost) = ctx.outposts.get_mut(&id) else {
            continue;
        };
        let from = outpost.status;
        let to = next_status(outpost, tick, &cfg);
        if to != from {
            match to {
                OutpostStatus::Failing => outpost.failing_since = Some(tick),
                OutpostStatus::Evacuating => {
                    outpost.evacuation_deadline = Some(tick + cfg.evacuation_deadline_ticks);
                }
                OutpostStatus::Abandoned => outpost.abandoned_tick = Some(tick),
                _ => outpost.failing_since = None,
            }
            outpost.status = to;
            let name = outpost.name.clone();
            tracing::info!("Outpost {} ({}) {:?} -> {:?} at tick {}", name, id, from, to, tick);
            ctx.emit(
                EventKind::OutpostStatusChanged { outpost: id, from, to },
                Vec::new(),
                format!("{} is now {:?}", name, to),
            );
            if to == OutpostStatus::Abandoned {
                force_home(ctx, id);
            }
        }
        if to == OutpostStatus::Evacuating {
            start_evacuation(ctx, id);
        }
    }
}

/// Open evacuation jobs for residents that have none
fn start_evacuation(ctx: &mut SimulationContext, outpost: OutpostId) {
    let start = ctx.start_outpost;
    let residents: Vec<AgentId> = ctx
        .residents(outpost)
        .filter(|a| ctx.migrations.active_for(a.id).is_none())
        .map(|a| a.id)
        .collect();
    let mut skip = None;
    for agent in residents {
        let Some(slot) = ctx.free_home_slot(start, skip) else {
            break;
        };
        skip = Some(slot);
        let tick = ctx.tick;
        let cfg = ctx.config.migration.clone();
        if let Some(job) = ctx
            .migrations
            .start(agent, outpost, start, slot, tick, true, &cfg)
        {
            ctx.emit(
                EventKind::MigrationStarted {
                    job,
                    from: outpost,
                    to: start,
                    evacuation: true,
                },
                vec![agent],
                format!("{} evacuates toward the start outpost", agent),
            );
        }
    }
}

/// Residents still out when an outpost is abandoned go home at once
fn force_home(ctx: &mut SimulationContext, outpost: OutpostId) {
    let start = ctx.start_outpost;
    let residents: Vec<AgentId> = ctx.residents(outpost).map(|a| a.id).collect();
    for id in residents {
        let Some(slot) = ctx.free_home_slot(start, None) else {
            tracing::warn!("No home slot left at the start outpost for {}", id);
            continue;
        };
        let pos = ctx.nearest_free_tile(slot).unwrap_or(slot);
        if let Some(job) = ctx.migrations.active_for(id).map(|j| j.id) {
            ctx.migrations.complete(job);
        }
        ctx.release_claims(id);
        let tick = ctx.tick;
        let Some(agent) = ctx.agents.get_mut(&id) else {
            continue;
        };
        let old = agent.pos;
        agent.home = slot;
        agent.home_outpost = start;
        agent.pos = pos;
        let role = agent.role;
        agent.assign_role(role, tick);
        ctx.occupancy.vacate(old, id);
        ctx.occupancy.place(pos, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfig;
    use crate::core::rng::DetRng;
    use crate::core::types::TilePos;
    use crate::world::map::WorldMap;

    fn context() -> SimulationContext {
        SimulationContext::new(
            SimulationConfig::default(),
            WorldMap::new(24, 24),
            DetRng::new(5),
            "Ashcap",
            TilePos::new(40, 40),
        )
        .unwrap()
    }

    fn staffed(ctx: &mut SimulationContext, outpost: OutpostId, n: usize) -> Vec<AgentId> {
        (0..n)
            .map(|i| ctx.spawn_agent(&format!("G{}", i), outpost, Role::Forager).unwrap())
            .collect()
    }

    #[test]
    fn test_status_follows_population() {
        let mut ctx = context();
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(70, 70), [(Role::Forager, 4)])
            .unwrap();
        update_outposts(&mut ctx);
        assert_eq!(ctx.outpost_status(outpost), Some(OutpostStatus::Seeded));

        staffed(&mut ctx, outpost, 2);
        update_outposts(&mut ctx);
        assert_eq!(ctx.outpost_status(outpost), Some(OutpostStatus::Viable));

        staffed(&mut ctx, outpost, 2);
        update_outposts(&mut ctx);
        assert_eq!(ctx.outpost_status(outpost), Some(OutpostStatus::Stable));
        assert_eq!(ctx.outposts[&outpost].runtime.total_deficit(), 0);
    }

    #[test]
    fn test_failing_needs_a_full_unstable_window() {
        let mut ctx = context();
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(70, 70), [(Role::Forager, 4)])
            .unwrap();
        for tick in 0..120 {
            ctx.tick = tick;
            update_outposts(&mut ctx);
            assert_ne!(ctx.outpost_status(outpost), Some(OutpostStatus::Failing));
        }
        ctx.tick = 120;
        update_outposts(&mut ctx);
        assert_eq!(ctx.outpost_status(outpost), Some(OutpostStatus::Failing));
    }

    #[test]
    fn test_recovery_resets_unstable_streak() {
        let mut ctx = context();
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(70, 70), [(Role::Forager, 2)])
            .unwrap();
        ctx.tick = 0;
        update_outposts(&mut ctx);
        let goblins = staffed(&mut ctx, outpost, 2);
        ctx.tick = 100;
        update_outposts(&mut ctx);
        assert!(ctx.outposts[&outpost].unstable_since.is_none());

        ctx.agents.get_mut(&goblins[0]).unwrap().alive = false;
        ctx.agents.get_mut(&goblins[1]).unwrap().alive = false;
        ctx.tick = 150;
        update_outposts(&mut ctx);
        assert_ne!(ctx.outpost_status(outpost), Some(OutpostStatus::Failing));
    }

    #[test]
    fn test_directive_evacuates_and_empty_outpost_is_abandoned() {
        let mut ctx = context();
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(70, 70), [(Role::Forager, 2)])
            .unwrap();
        let goblins = staffed(&mut ctx, outpost, 2);
        ctx.outposts.get_mut(&outpost).unwrap().directive = Some(LeaderDirective::Evacuate);
        ctx.tick = 5;
        update_outposts(&mut ctx);
        assert_eq!(ctx.outpost_status(outpost), Some(OutpostStatus::Evacuating));
        assert_eq!(ctx.outposts[&outpost].evacuation_deadline, Some(205));
        for id in &goblins {
            assert!(ctx.migrations.active_for(*id).is_some_and(|j| j.evacuation));
        }

        for id in &goblins {
            let start = ctx.start_outpost;
            ctx.agents.get_mut(id).unwrap().home_outpost = start;
        }
        ctx.tick = 6;
        update_outposts(&mut ctx);
        assert_eq!(ctx.outpost_status(outpost), Some(OutpostStatus::Abandoned));
    }

    #[test]
    fn test_overdue_evacuation_forces_residents_home() {
        let mut ctx = context();
        let outpost = ctx
            .add_outpost("Mossden", TilePos::new(70, 70), [(Role::Forager, 2)])
            .unwrap();
        let goblins = staffed(&mut ctx, outpost, 1);
        ctx.outposts.get_mut(&outpost).unwrap().directive = Some(LeaderDirective::Evacuate);
        update_outposts(&mut ctx);
        ctx.tick = 200;
        update_outposts(&mut ctx);
        assert_eq!(ctx.outpost_status(outpost), Some(OutpostStatus::Abandoned));
        let agent = &ctx.agents[&goblins[0]];
        assert_eq!(agent.home_outpost, ctx.start_outpost);
        assert!(agent.pos.distance(&TilePos::new(40, 40)) < 5.0);
    }

    #[test]
    fn test_start_outpost_stays_stable() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        ctx.outposts.get_mut(&start).unwrap().directive = Some(LeaderDirective::Evacuate);
        for tick in 0..300 {
            ctx.tick = tick;
            update_outposts(&mut ctx);
        }
        assert_eq!(ctx.outpost_status(start), Some(OutpostStatus::Stable));
    }
}
