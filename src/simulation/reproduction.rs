//! Reproduction scheduler
//!
//! Reproducers pair up when the settlement is safe, stay close for the
//! pairing window and produce one child. A lone reproducer has a small
//! chance per tick of a solo birth. If nobody has been born for a long
//! stretch, a birth is forced so a dwindling tribe can recover.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::types::{AgentId, Tick, TilePos};
use crate::entity::agent::Agent;
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::crisis::has_critical_need;
use crate::simulation::events::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pairing {
    pub a: AgentId,
    pub b: AgentId,
    pub started_tick: Tick,
    pub completes_at: Tick,
}

impl Pairing {
    pub fn other(&self, agent: AgentId) -> Option<AgentId> {
        if self.a == agent {
            Some(self.b)
        } else if self.b == agent {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproductionState {
    /// Keyed by the lower agent id of the pair
    pub pairings: BTreeMap<AgentId, Pairing>,
    pub last_birth_tick: Tick,
}

impl ReproductionState {
    pub fn partner_of(&self, agent: AgentId) -> Option<AgentId> {
        self.pairings.values().find_map(|p| p.other(agent))
    }

    fn is_paired(&self, agent: AgentId) -> bool {
        self.partner_of(agent).is_some()
    }
}

/// No hostile near the start outpost, or the wall mostly built
pub fn is_safe(ctx: &SimulationContext) -> bool {
    let cfg = &ctx.config.reproduction;
    let center = ctx.start_center();
    let clear = !ctx
        .hostiles
        .values()
        .any(|h| h.alive && h.pos.distance(&center) <= cfg.safe_radius);
    let walled = ctx
        .wall_plan
        .as_ref()
        .is_some_and(|plan| plan.coverage() >= cfg.wall_coverage_gate);
    clear || walled
}

pub fn is_eligible(agent: &Agent, ctx: &SimulationContext) -> bool {
    let cooldown = ctx.config.reproduction.cooldown_ticks;
    agent.is_active()
        && agent.role == Role::Reproducer
        && !agent.is_carrying()
        && !has_critical_need(agent, ctx)
        && agent
            .last_reproduction_tick
            .map_or(true, |last| ctx.tick.saturating_sub(last) >= cooldown)
}

/// Role the tribe is shortest on, per the last plan
fn child_role(ctx: &SimulationContext) -> Role {
    let counts = ctx.role_counts();
    ctx.role_plan
        .iter()
        .map(|(role, want)| (*role, i64::from(*want) - i64::from(counts.get(role).copied().unwrap_or(0))))
        .filter(|(_, gap)| *gap > 0)
        .max_by_key(|(role, gap)| (*gap, std::cmp::Reverse(*role)))
        .map(|(role, _)| role)
        .unwrap_or(Role::Forager)
}

fn give_birth(ctx: &mut SimulationContext, parents: &[AgentId], forced: bool) -> Option<AgentId> {
    let first = *parents.first()?;
    let (outpost, near, parent_name) = {
        let parent = ctx.agents.get(&first)?;
        (parent.home_outpost, parent.pos, parent.name.clone())
    };
    let home = ctx.free_home_slot(outpost, None).unwrap_or(near);
    let pos: TilePos = ctx.nearest_free_tile(near)?;
    let role = child_role(ctx);
    let tick = ctx.tick;
    let child = ctx.insert_agent(&format!("{}'s whelp", parent_name), home, pos, outpost, role);

    let mut stream = ctx.rng.stream("child-vitals", &[tick, u64::from(child.0)]);
    if let Some(agent) = ctx.agents.get_mut(&child) {
        agent.vitals.vitality = stream.gen_range(62.0..82.0);
        agent.vitals.morale = stream.gen_range(50.0..70.0);
        agent.last_reproduction_tick = Some(tick);
    }
    for parent in parents {
        if let Some(agent) = ctx.agents.get_mut(parent) {
            agent.last_reproduction_tick = Some(tick);
        }
    }
    ctx.reproduction.last_birth_tick = tick;

    tracing::info!("{} born at {} ({} parents, forced {})", child, pos, parents.len(), forced);
    let mut involved = parents.to_vec();
    involved.push(child);
    ctx.emit(
        EventKind::GoblinBorn { child, forced },
        involved,
        format!("a whelp is born to {}", parent_name),
    );
    Some(child)
}

pub fn update_reproduction(ctx: &mut SimulationContext) {
    let cfg = ctx.config.reproduction.clone();
    let tick = ctx.tick;
    let safe = is_safe(ctx);
    let under_cap = ctx.living_count() < cfg.population_cap;

    // Break or resolve existing pairings
    let pairings: Vec<Pairing> = ctx.reproduction.pairings.values().copied().collect();
    for pairing in pairings {
        let together = match (ctx.agents.get(&pairing.a), ctx.agents.get(&pairing.b)) {
            (Some(a), Some(b)) => {
                a.is_active()
                    && b.is_active()
                    && a.role == Role::Reproducer
                    && b.role == Role::Reproducer
                    && a.pos.distance(&b.pos) <= cfg.pair_break_distance
            }
            _ => false,
        };
        if !together {
            ctx.reproduction.pairings.remove(&pairing.a);
            tracing::debug!("Pair {} / {} broken", pairing.a, pairing.b);
            ctx.emit(
                EventKind::PairBroken,
                vec![pairing.a, pairing.b],
                format!("{} and {} drift apart", pairing.a, pairing.b),
            );
            continue;
        }
        if tick >= pairing.completes_at
            && safe
            && ctx.living_count() < cfg.population_cap
        {
            ctx.reproduction.pairings.remove(&pairing.a);
            give_birth(ctx, &[pairing.a, pairing.b], false);
        }
    }

    if safe && under_cap {
        let eligible: Vec<AgentId> = ctx
            .agents
            .values()
            .filter(|a| is_eligible(a, ctx) && !ctx.reproduction.is_paired(a.id))
            .map(|a| a.id)
            .collect();

        let mut taken: Vec<AgentId> = Vec::new();
        for (i, &a) in eligible.iter().enumerate() {
            if taken.contains(&a) {
                continue;
            }
            let Some(pos_a) = ctx.agents.get(&a).map(|x| x.pos) else {
                continue;
            };
            let partner = eligible[i + 1..].iter().copied().find(|b| {
                !taken.contains(b)
                    && ctx
                        .agents
                        .get(b)
                        .is_some_and(|x| x.pos.distance(&pos_a) <= cfg.pair_distance)
            });
            if let Some(b) = partner {
                taken.push(a);
                taken.push(b);
                ctx.reproduction.pairings.insert(
                    a,
                    Pairing {
                        a,
                        b,
                        started_tick: tick,
                        completes_at: tick + cfg.pair_duration_ticks,
                    },
                );
                ctx.emit(
                    EventKind::PairFormed,
                    vec![a, b],
                    format!("{} and {} pair up", a, b),
                );
            }
        }

        for a in eligible.into_iter().filter(|a| !taken.contains(a)) {
            if ctx.living_count() >= cfg.population_cap {
                break;
            }
            if ctx.rng.chance("reproduce-solo", &[tick, u64::from(a.0)], cfg.solo_chance) {
                give_birth(ctx, &[a], false);
            }
        }
    }

    let stalled = tick.saturating_sub(ctx.reproduction.last_birth_tick) >= cfg.stall_ticks;
    if stalled && (ctx.living_count() < cfg.population_cap || cfg.stall_ignores_cap) {
        let parent = ctx.agents.values().find(|a| a.is_active()).map(|a| a.id);
        if let Some(parent) = parent {
            tracing::info!("No birth for {} ticks, forcing one", cfg.stall_ticks);
            give_birth(ctx, &[parent], true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfig;
    use crate::core::rng::DetRng;
    use crate::world::hostile::HostileKind;
    use crate::world::map::WorldMap;

    fn context() -> SimulationContext {
        let mut config = SimulationConfig::default();
        config.reproduction.solo_chance = 0.0;
        SimulationContext::new(config, WorldMap::new(16, 16), DetRng::new(11), "Ashcap", TilePos::new(32, 32))
            .unwrap()
    }

    #[test]
    fn test_unsafe_settlement_blocks_pairing() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        ctx.spawn_agent_at("A", TilePos::new(30, 30), start, Role::Reproducer).unwrap();
        ctx.spawn_agent_at("B", TilePos::new(32, 30), start, Role::Reproducer).unwrap();
        ctx.spawn_hostile(HostileKind::Wolf, TilePos::new(36, 36));
        ctx.tick = 1;
        update_reproduction(&mut ctx);
        assert!(ctx.reproduction.pairings.is_empty());
    }

    #[test]
    fn test_pair_breaks_when_apart() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        let a = ctx.spawn_agent_at("A", TilePos::new(30, 30), start, Role::Reproducer).unwrap();
        let b = ctx.spawn_agent_at("B", TilePos::new(33, 30), start, Role::Reproducer).unwrap();
        ctx.tick = 1;
        update_reproduction(&mut ctx);
        assert_eq!(ctx.reproduction.partner_of(b), Some(a));

        ctx.agents.get_mut(&b).unwrap().pos = TilePos::new(50, 30);
        ctx.tick = 2;
        update_reproduction(&mut ctx);
        assert!(ctx.reproduction.partner_of(a).is_none());
        assert!(ctx.events.iter().any(|e| e.kind == EventKind::PairBroken));
    }

    #[test]
    fn test_stall_breaker_forces_birth() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        ctx.spawn_agent("A", start, Role::Forager).unwrap();
        ctx.tick = 2399;
        update_reproduction(&mut ctx);
        assert_eq!(ctx.living_count(), 1);
        ctx.tick = 2400;
        update_reproduction(&mut ctx);
        assert_eq!(ctx.living_count(), 2);
        assert!(ctx
            .events
            .iter()
            .any(|e| matches!(e.kind, EventKind::GoblinBorn { forced: true, .. })));
    }

    #[test]
    fn test_cap_blocks_stall_birth_unless_ignored() {
        let mut ctx = context();
        ctx.config.reproduction.population_cap = 1;
        let start = ctx.start_outpost;
        ctx.spawn_agent("A", start, Role::Forager).unwrap();
        ctx.tick = 2400;
        update_reproduction(&mut ctx);
        assert_eq!(ctx.living_count(), 1);

        ctx.config.reproduction.stall_ignores_cap = true;
        update_reproduction(&mut ctx);
        assert_eq!(ctx.living_count(), 2);
    }
}
