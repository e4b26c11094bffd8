//! Haul queue, rebuilt from resource drops every tick
//!
//! Task identity is `(tile, resource)`; claims live in a lease table keyed
//! by that identity so they survive regeneration.

use std::collections::{BTreeMap, BTreeSet};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::city::drops::ResourceDrops;
use crate::city::resource::ResourceKind;
use crate::city::stockpile::Stockpile;
use crate::core::types::{AgentId, Tick, TilePos};
use crate::tasks::Lease;

pub type HaulKey = (TilePos, ResourceKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaulTask {
    pub pos: TilePos,
    pub resource: ResourceKind,
    pub amount: u32,
}

impl HaulTask {
    pub fn key(&self) -> HaulKey {
        (self.pos, self.resource)
    }
}

/// Which drops a claimant will take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaulFilter {
    Any,
    /// Survival resources first, then the rest
    PreferSurvival,
    SurvivalOnly,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HaulQueue {
    tasks: Vec<HaulTask>,
    leases: BTreeMap<HaulKey, Lease>,
}

impl HaulQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild tasks from drops whose resource still has storage room, and
    /// forget leases on vanished piles or lapsed claims.
    pub fn regenerate(&mut self, drops: &ResourceDrops, stockpile: &Stockpile, tick: Tick) {
        self.tasks = drops
            .iter()
            .filter(|(_, resource, _)| stockpile.room(*resource) > 0)
            .map(|(pos, resource, amount)| HaulTask { pos, resource, amount })
            .collect();
        let live: BTreeSet<HaulKey> = self.tasks.iter().map(HaulTask::key).collect();
        self.leases
            .retain(|key, lease| live.contains(key) && lease.holder(tick).is_some());
    }

    pub fn tasks(&self) -> &[HaulTask] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn holder(&self, key: HaulKey, tick: Tick) -> Option<AgentId> {
        self.leases.get(&key).and_then(|l| l.holder(tick))
    }

    /// Task this agent currently holds
    pub fn held_by(&self, agent: AgentId, tick: Tick) -> Option<HaulTask> {
        self.tasks
            .iter()
            .find(|t| self.holder(t.key(), tick) == Some(agent))
            .copied()
    }

    /// Keep an existing claim, or claim the nearest eligible unclaimed task
    pub fn claim(
        &mut self,
        agent: AgentId,
        from: TilePos,
        tick: Tick,
        lease_ticks: u64,
        filter: HaulFilter,
    ) -> Option<HaulTask> {
        if let Some(task) = self.held_by(agent, tick) {
            if filter != HaulFilter::SurvivalOnly || task.resource.is_survival() {
                return Some(task);
            }
        }

        let best = self
            .tasks
            .iter()
            .filter(|t| filter != HaulFilter::SurvivalOnly || t.resource.is_survival())
            .filter(|t| {
                self.leases
                    .get(&t.key())
                    .map_or(true, |l| l.is_claimable_by(agent, tick))
            })
            .min_by_key(|t| {
                let tier = match filter {
                    HaulFilter::PreferSurvival => u8::from(!t.resource.is_survival()),
                    HaulFilter::Any | HaulFilter::SurvivalOnly => 0,
                };
                (tier, OrderedFloat(from.distance(&t.pos)), t.pos, t.resource)
            })
            .copied()?;

        self.release_agent(agent);
        self.leases
            .entry(best.key())
            .or_default()
            .claim(agent, tick, lease_ticks)
            .then_some(best)
    }

    /// Drop every claim the agent holds
    pub fn release_agent(&mut self, agent: AgentId) {
        for lease in self.leases.values_mut() {
            if lease.claimed_by == Some(agent) {
                lease.release();
            }
        }
    }

    pub fn complete(&mut self, key: HaulKey) {
        self.leases.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn queue_with(piles: &[(TilePos, ResourceKind, u32)]) -> HaulQueue {
        let mut drops = ResourceDrops::new();
        for (pos, res, amount) in piles {
            drops.deposit(*pos, *res, *amount);
        }
        let mut queue = HaulQueue::new();
        queue.regenerate(&drops, &Stockpile::new(), 0);
        queue
    }

    #[test]
    fn test_claim_expires_for_second_hauler() {
        let pile = TilePos::new(4, 4);
        let mut queue = queue_with(&[(pile, ResourceKind::Wood, 5)]);
        let a = AgentId(1);
        let b = AgentId(2);

        assert!(queue.claim(a, TilePos::new(0, 0), 10, 16, HaulFilter::Any).is_some());
        assert!(queue.claim(b, TilePos::new(0, 0), 25, 16, HaulFilter::Any).is_none());
        let task = queue.claim(b, TilePos::new(0, 0), 26, 16, HaulFilter::Any).unwrap();
        assert_eq!(task.pos, pile);
        assert_eq!(queue.holder(task.key(), 26), Some(b));
    }

    #[test]
    fn test_prefer_survival_resources() {
        let near = TilePos::new(1, 0);
        let far = TilePos::new(9, 0);
        let mut queue = queue_with(&[(near, ResourceKind::Wood, 3), (far, ResourceKind::Water, 3)]);
        let origin = TilePos::new(0, 0);

        let task = queue.claim(AgentId(1), origin, 0, 16, HaulFilter::PreferSurvival).unwrap();
        assert_eq!(task.resource, ResourceKind::Water);
        let task = queue.claim(AgentId(2), origin, 0, 16, HaulFilter::Any).unwrap();
        assert_eq!(task.resource, ResourceKind::Wood);
        assert!(queue.claim(AgentId(3), origin, 0, 16, HaulFilter::SurvivalOnly).is_none());
    }

    #[test]
    fn test_full_storage_hides_tasks() {
        let mut drops = ResourceDrops::new();
        drops.deposit(TilePos::new(2, 2), ResourceKind::Wood, 3);
        let mut stockpile = Stockpile::new();
        stockpile.set_capacity(ResourceKind::Wood, 0);
        let mut queue = HaulQueue::new();
        queue.regenerate(&drops, &stockpile, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_regenerate_keeps_live_leases() {
        let pile = TilePos::new(4, 4);
        let mut drops = ResourceDrops::new();
        drops.deposit(pile, ResourceKind::Fiber, 2);
        let mut queue = HaulQueue::new();
        queue.regenerate(&drops, &Stockpile::new(), 0);
        queue.claim(AgentId(7), pile, 0, 16, HaulFilter::Any);

        queue.regenerate(&drops, &Stockpile::new(), 5);
        assert_eq!(queue.holder((pile, ResourceKind::Fiber), 5), Some(AgentId(7)));

        drops.take(pile, ResourceKind::Fiber, 2);
        queue.regenerate(&drops, &Stockpile::new(), 6);
        assert_eq!(queue.holder((pile, ResourceKind::Fiber), 6), None);
    }

    proptest! {
        #[test]
        fn prop_claims_exclusive(
            attempts in proptest::collection::vec((0u32..5, 0u64..3, 0i32..4), 1..60),
        ) {
            let piles: Vec<_> = (0..4)
                .map(|i| (TilePos::new(i * 3, 0), ResourceKind::Wood, 2))
                .collect();
            let mut queue = queue_with(&piles);
            let mut tick = 0;
            for (agent, advance, x) in attempts {
                tick += advance;
                queue.claim(AgentId(agent), TilePos::new(x, 0), tick, 16, HaulFilter::Any);

                let mut holders = BTreeSet::new();
                for task in queue.tasks() {
                    if let Some(holder) = queue.holder(task.key(), tick) {
                        // one agent holds at most one haul task
                        prop_assert!(holders.insert(holder));
                    }
                }
            }
        }
    }
}
