//! Critical-needs crisis tiers and the quartermaster override

use serde::{Deserialize, Serialize};

use crate::city::resource::ResourceKind;
use crate::core::types::{AgentId, Tick};
use crate::entity::agent::Agent;
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::events::EventKind;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CrisisTier {
    #[default]
    None,
    Elevated,
    Severe,
    Critical,
}

impl CrisisTier {
    pub fn is_active(&self) -> bool {
        *self != CrisisTier::None
    }

    /// Roles pulled off their branch at this tier
    pub fn suppresses(&self, role: Role) -> bool {
        let elevated = matches!(role, Role::Lorekeeper | Role::Scout | Role::Reproducer);
        let severe = elevated
            || (role.station().is_some() && role != Role::Cook)
            || matches!(role, Role::Colonizer | Role::Lookout | Role::Mechanist);
        match self {
            CrisisTier::None => false,
            CrisisTier::Elevated => elevated,
            CrisisTier::Severe => severe,
            CrisisTier::Critical => !role.is_survival() && role != Role::Cook,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisState {
    pub tier: CrisisTier,
    pub since: Tick,
    /// Goblin drafted as emergency quartermaster, if any
    pub quartermaster: Option<AgentId>,
}

/// Thirst or hunger at the critical level
pub fn has_critical_need(agent: &Agent, ctx: &SimulationContext) -> bool {
    let needs = &ctx.config.needs;
    agent.needs.thirst >= agent.thirst_threshold(needs.thirst_critical)
        || agent.needs.hunger >= needs.hunger_critical
}

/// Tier from the share of goblins in critical need and survival stock
/// per capita
pub fn assess_tier(ctx: &SimulationContext) -> CrisisTier {
    let living: Vec<&Agent> = ctx.agents.values().filter(|a| a.is_active()).collect();
    if living.is_empty() {
        return CrisisTier::None;
    }
    let cfg = &ctx.config.crisis;
    let critical = living.iter().filter(|a| has_critical_need(a, ctx)).count();
    let critical_fraction = critical as f32 / living.len() as f32;

    let population = living.len() as f32;
    let food = (ctx.stockpile.get(ResourceKind::Food) + ctx.stockpile.get(ResourceKind::Mushrooms))
        as f32
        / population;
    let water = ctx.stockpile.get(ResourceKind::Water) as f32 / population;
    let per_capita = food.min(water);

    let stock_tier = if per_capita < cfg.severe_per_capita {
        CrisisTier::Severe
    } else if per_capita < cfg.elevated_per_capita {
        CrisisTier::Elevated
    } else {
        CrisisTier::None
    };

    if critical_fraction >= cfg.critical_fraction {
        if stock_tier == CrisisTier::Severe {
            return CrisisTier::Critical;
        }
        return stock_tier.max(CrisisTier::Elevated);
    }
    stock_tier
}

pub fn update_crisis(ctx: &mut SimulationContext) {
    let tier = assess_tier(ctx);
    let previous = ctx.crisis.tier;
    if tier != previous {
        ctx.crisis.tier = tier;
        ctx.crisis.since = ctx.tick;
        tracing::info!("Crisis tier {:?} -> {:?} at tick {}", previous, tier, ctx.tick);
        ctx.emit(
            EventKind::CrisisTierChanged { from: previous, to: tier },
            Vec::new(),
            format!("crisis tier now {:?}", tier),
        );
    }

    if tier < CrisisTier::Severe {
        return;
    }
    let staffed = ctx
        .crisis
        .quartermaster
        .and_then(|id| ctx.agents.get(&id))
        .is_some_and(|a| a.is_active() && a.role == Role::Quartermaster)
        || ctx
            .agents
            .values()
            .any(|a| a.is_active() && a.role == Role::Quartermaster);
    if staffed {
        return;
    }

    // Lowest id wins; hold locks do not apply to the override
    let draftee = ctx
        .agents
        .values()
        .find(|a| a.is_active() && !a.role.is_survival() && !a.is_carrying())
        .map(|a| a.id);
    let Some(id) = draftee else {
        return;
    };
    let tick = ctx.tick;
    let Some(agent) = ctx.agents.get_mut(&id) else {
        return;
    };
    let from = agent.role;
    agent.assign_role(Role::Quartermaster, tick);
    let name = agent.name.clone();
    ctx.crisis.quartermaster = Some(id);
    ctx.release_claims(id);
    tracing::debug!("{} drafted as quartermaster from {}", id, from);
    ctx.emit(
        EventKind::RoleReassigned {
            from,
            to: Role::Quartermaster,
            reason: "crisis_override".into(),
        },
        vec![id],
        format!("{} drafted as quartermaster", name),
    );
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
            WorldMap::new(16, 16),
            DetRng::new(3),
            "Ashcap",
            TilePos::new(32, 32),
        )
        .unwrap()
    }

    #[test]
    fn test_tiers_suppress_progressively() {
        assert!(!CrisisTier::None.suppresses(Role::Lorekeeper));
        assert!(CrisisTier::Elevated.suppresses(Role::Lorekeeper));
        assert!(!CrisisTier::Elevated.suppresses(Role::Smelter));
        assert!(CrisisTier::Severe.suppresses(Role::Smelter));
        assert!(!CrisisTier::Severe.suppresses(Role::Cook));
        assert!(!CrisisTier::Severe.suppresses(Role::Builder));
        assert!(CrisisTier::Critical.suppresses(Role::Builder));
        assert!(!CrisisTier::Critical.suppresses(Role::Forager));
        assert!(!CrisisTier::Critical.suppresses(Role::Cook));
    }

    #[test]
    fn test_stock_tiers() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        for name in ["A", "B", "C", "D"] {
            ctx.spawn_agent(name, start, Role::Forager).unwrap();
        }
        ctx.stockpile.remove(ResourceKind::Food, u32::MAX);
        ctx.stockpile.remove(ResourceKind::Mushrooms, u32::MAX);
        ctx.stockpile.remove(ResourceKind::Water, u32::MAX);
        ctx.stockpile.add(ResourceKind::Water, 100);
        assert_eq!(assess_tier(&ctx), CrisisTier::Severe);

        ctx.stockpile.add(ResourceKind::Food, 4);
        assert_eq!(assess_tier(&ctx), CrisisTier::Elevated);

        ctx.stockpile.add(ResourceKind::Food, 20);
        assert_eq!(assess_tier(&ctx), CrisisTier::None);

        for agent in ctx.agents.values_mut() {
            agent.needs.hunger = 95.0;
        }
        assert_eq!(assess_tier(&ctx), CrisisTier::Elevated);
    }

    #[test]
    fn test_severe_crisis_drafts_quartermaster() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        ctx.spawn_agent("Forager", start, Role::Forager).unwrap();
        let lore = ctx.spawn_agent("Lore", start, Role::Lorekeeper).unwrap();
        let smelt = ctx.spawn_agent("Smelt", start, Role::Smelter).unwrap();
        ctx.agents.get_mut(&lore).unwrap().role_state.manual_lock = true;
        ctx.stockpile.remove(ResourceKind::Food, u32::MAX);
        ctx.stockpile.remove(ResourceKind::Mushrooms, u32::MAX);

        update_crisis(&mut ctx);
        assert_eq!(ctx.crisis.tier, CrisisTier::Severe);
        assert_eq!(ctx.agents[&lore].role, Role::Quartermaster);
        assert_eq!(ctx.agents[&smelt].role, Role::Smelter);
        assert_eq!(ctx.crisis.quartermaster, Some(lore));

        update_crisis(&mut ctx);
        assert_eq!(ctx.agents[&smelt].role, Role::Smelter);
        let overrides = ctx
            .events
            .iter()
            .filter(|e| matches!(&e.kind, EventKind::RoleReassigned { reason, .. } if reason == "crisis_override"))
            .count();
        assert_eq!(overrides, 1);
    }
}
