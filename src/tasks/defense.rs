//! Automated defenses: bolt throwers that fire at hostiles on their own
//!
//! Each structure runs a small status machine driven by its ammo and
//! durability counters and two timers (fire cooldown, trigger lockout).
//! Builders and mechanists keep them stocked through maintenance claims.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::city::resource::ResourceKind;
use crate::city::stockpile::Stockpile;
use crate::core::config::DefenseConfig;
use crate::core::types::{AgentId, DefenseId, HostileId, Tick, TilePos};
use crate::tasks::Lease;
use crate::world::hostile::Hostile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefenseStatus {
    Active,
    InactiveNoAmmo,
    InactiveNoParts,
    /// A hostile got inside the minimum range and jammed the mechanism
    InactiveTriggered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomatedDefense {
    pub id: DefenseId,
    pub pos: TilePos,
    pub ammo: u32,
    pub max_ammo: u32,
    pub durability: u32,
    pub max_durability: u32,
    /// Spare parts, spent automatically when durability runs out
    pub parts: u32,
    pub status: DefenseStatus,
    pub cooldown_until: Tick,
    pub triggered_until: Tick,
    pub lease: Lease,
}

impl AutomatedDefense {
    pub fn new(id: DefenseId, pos: TilePos, config: &DefenseConfig) -> Self {
        Self {
            id,
            pos,
            ammo: config.max_ammo,
            max_ammo: config.max_ammo,
            durability: config.max_durability,
            max_durability: config.max_durability,
            parts: 0,
            status: DefenseStatus::Active,
            cooldown_until: 0,
            triggered_until: 0,
            lease: Lease::default(),
        }
    }

    /// Re-derive status from counters and timers, spending a spare part if
    /// the frame is worn through
    fn settle(&mut self, tick: Tick, config: &DefenseConfig) {
        if self.durability == 0 && self.parts > 0 {
            self.parts -= 1;
            self.durability = config.durability_per_part.min(self.max_durability);
        }
        self.status = if tick < self.triggered_until {
            DefenseStatus::InactiveTriggered
        } else if self.durability == 0 {
            DefenseStatus::InactiveNoParts
        } else if self.ammo == 0 {
            DefenseStatus::InactiveNoAmmo
        } else {
            DefenseStatus::Active
        };
    }

    fn low_ammo(&self) -> bool {
        self.ammo * 2 < self.max_ammo
    }

    fn low_durability(&self) -> bool {
        self.durability * 2 < self.max_durability
    }

    fn short_of_parts(&self, config: &DefenseConfig) -> bool {
        self.parts < config.max_spare_parts.min(1)
    }

    /// Counters are running down, whether or not stores can help
    pub fn is_worn(&self, config: &DefenseConfig) -> bool {
        self.low_ammo() || self.low_durability() || self.short_of_parts(config)
    }

    /// Worn in a way the ledger can currently fix
    pub fn needs_maintenance(&self, config: &DefenseConfig, stockpile: &Stockpile) -> bool {
        (self.low_ammo() && stockpile.get(ResourceKind::AmmoBolts) > 0)
            || (self.low_durability() && stockpile.get(ResourceKind::MetalParts) > 0)
            || (self.short_of_parts(config) && stockpile.get(ResourceKind::Springs) > 0)
    }
}

/// Something a defense did this tick
#[derive(Debug, Clone, PartialEq)]
pub enum DefenseEvent {
    Fired {
        defense: DefenseId,
        hostile: HostileId,
        damage: f32,
        killed: bool,
    },
    StatusChanged {
        defense: DefenseId,
        from: DefenseStatus,
        to: DefenseStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintainOutcome {
    /// Restocked; `done` when nothing is left to top up
    Restocked { done: bool },
    /// Nothing in stores that this defense can use
    NothingAvailable,
    NotHeld,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefenseRegistry {
    defenses: BTreeMap<DefenseId, AutomatedDefense>,
    next_id: u32,
}

impl DefenseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pos: TilePos, config: &DefenseConfig) -> DefenseId {
        let id = DefenseId(self.next_id);
        self.next_id += 1;
        self.defenses.insert(id, AutomatedDefense::new(id, pos, config));
        id
    }

    pub fn get(&self, id: DefenseId) -> Option<&AutomatedDefense> {
        self.defenses.get(&id)
    }

    pub fn get_mut(&mut self, id: DefenseId) -> Option<&mut AutomatedDefense> {
        self.defenses.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AutomatedDefense> {
        self.defenses.values()
    }

    pub fn len(&self) -> usize {
        self.defenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defenses.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.defenses
            .values()
            .filter(|d| d.status == DefenseStatus::Active)
            .count()
    }

    /// Advance every defense one tick: triggers, status, then firing in id order
    pub fn update(
        &mut self,
        hostiles: &mut BTreeMap<HostileId, Hostile>,
        tick: Tick,
        config: &DefenseConfig,
    ) -> Vec<DefenseEvent> {
        let mut events = Vec::new();

        for defense in self.defenses.values_mut() {
            defense.lease.expire(tick);
            let before = defense.status;
            let jammed = hostiles
                .values()
                .any(|h| h.alive && h.pos.distance(&defense.pos) <= config.trigger_radius);
            if jammed {
                defense.triggered_until = tick + config.trigger_ticks;
            }
            defense.settle(tick, config);
            if defense.status != before {
                events.push(DefenseEvent::StatusChanged {
                    defense: defense.id,
                    from: before,
                    to: defense.status,
                });
            }
        }

        let active: Vec<(DefenseId, TilePos)> = self
            .defenses
            .values()
            .filter(|d| d.status == DefenseStatus::Active)
            .map(|d| (d.id, d.pos))
            .collect();

        for (id, pos) in &active {
            let Some(defense) = self.defenses.get_mut(id) else {
                continue;
            };
            if tick < defense.cooldown_until {
                continue;
            }
            let target = hostiles
                .values()
                .filter(|h| h.alive && h.pos.distance(pos) <= config.range)
                .min_by_key(|h| (OrderedFloat(h.pos.distance(pos)), h.id))
                .map(|h| h.id);
            let Some(hostile_id) = target else {
                continue;
            };
            let Some(hostile) = hostiles.get_mut(&hostile_id) else {
                continue;
            };

            let assists = active
                .iter()
                .filter(|(other, other_pos)| {
                    other != id && other_pos.distance(&hostile.pos) <= config.assist_radius
                })
                .count();
            let damage =
                (config.base_damage + assists as f32 * config.assist_damage).min(config.damage_cap);
            let killed = hostile.take_damage(damage);

            defense.ammo = defense.ammo.saturating_sub(1);
            defense.durability = defense.durability.saturating_sub(1);
            defense.cooldown_until = tick + config.cooldown_ticks;
            events.push(DefenseEvent::Fired {
                defense: *id,
                hostile: hostile_id,
                damage,
                killed,
            });

            let before = defense.status;
            defense.settle(tick, config);
            if defense.status != before {
                events.push(DefenseEvent::StatusChanged {
                    defense: *id,
                    from: before,
                    to: defense.status,
                });
            }
        }
        events
    }

    /// Keep the agent's claim, or claim the nearest defense needing upkeep
    pub fn claim_maintenance(
        &mut self,
        agent: AgentId,
        from: TilePos,
        tick: Tick,
        lease_ticks: u64,
        config: &DefenseConfig,
        stockpile: &Stockpile,
    ) -> Option<DefenseId> {
        if let Some(defense) = self.defenses.values().find(|d| d.lease.is_held_by(agent, tick)) {
            return Some(defense.id);
        }
        let best = self
            .defenses
            .values()
            .filter(|d| d.needs_maintenance(config, stockpile) && d.lease.is_claimable_by(agent, tick))
            .min_by_key(|d| (OrderedFloat(from.distance(&d.pos)), d.id))
            .map(|d| d.id)?;
        self.release_agent(agent);
        let defense = self.defenses.get_mut(&best)?;
        defense.lease.claim(agent, tick, lease_ticks).then_some(best)
    }

    /// Top up ammo, durability and spare parts from the ledger
    pub fn maintain(
        &mut self,
        id: DefenseId,
        agent: AgentId,
        stockpile: &mut Stockpile,
        tick: Tick,
        lease_ticks: u64,
        config: &DefenseConfig,
    ) -> MaintainOutcome {
        let Some(defense) = self.defenses.get_mut(&id) else {
            return MaintainOutcome::NotHeld;
        };
        if !defense.lease.is_held_by(agent, tick) {
            return MaintainOutcome::NotHeld;
        }

        let mut restocked = false;
        let missing_ammo = defense.max_ammo - defense.ammo.min(defense.max_ammo);
        if missing_ammo > 0 && config.ammo_per_bolt > 0 {
            let bolts_needed = missing_ammo.div_ceil(config.ammo_per_bolt);
            let bolts = stockpile.remove(ResourceKind::AmmoBolts, bolts_needed);
            if bolts > 0 {
                defense.ammo = (defense.ammo + bolts * config.ammo_per_bolt).min(defense.max_ammo);
                restocked = true;
            }
        }
        if defense.durability < defense.max_durability
            && stockpile.remove(ResourceKind::MetalParts, 1) == 1
        {
            defense.durability =
                (defense.durability + config.durability_per_part).min(defense.max_durability);
            restocked = true;
        }
        if defense.parts < config.max_spare_parts && stockpile.remove(ResourceKind::Springs, 1) == 1 {
            defense.parts += 1;
            restocked = true;
        }

        if !restocked {
            defense.lease.release();
            return MaintainOutcome::NothingAvailable;
        }
        defense.settle(tick, config);
        let done = !defense.needs_maintenance(config, stockpile);
        if done {
            defense.lease.release();
        } else {
            defense.lease.renew(agent, tick, lease_ticks);
        }
        MaintainOutcome::Restocked { done }
    }

    pub fn release_agent(&mut self, agent: AgentId) {
        for defense in self.defenses.values_mut() {
            if defense.lease.claimed_by == Some(agent) {
                defense.lease.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::hostile::HostileKind;

    fn wolf_at(id: u32, pos: TilePos) -> (HostileId, Hostile) {
        (HostileId(id), Hostile::new(HostileId(id), HostileKind::Wolf, pos))
    }

    #[test]
    fn test_fires_at_nearest_in_range() {
        let config = DefenseConfig::default();
        let mut registry = DefenseRegistry::new();
        let id = registry.add(TilePos::new(10, 10), &config);
        let mut hostiles: BTreeMap<_, _> = [
            wolf_at(1, TilePos::new(15, 10)),
            wolf_at(2, TilePos::new(13, 10)),
            wolf_at(3, TilePos::new(30, 10)),
        ]
        .into_iter()
        .collect();

        let events = registry.update(&mut hostiles, 0, &config);
        assert_eq!(
            events,
            vec![DefenseEvent::Fired {
                defense: id,
                hostile: HostileId(2),
                damage: 18.0,
                killed: false
            }]
        );
        let defense = registry.get(id).unwrap();
        assert_eq!(defense.ammo, config.max_ammo - 1);
        assert_eq!(defense.durability, config.max_durability - 1);

        // cooling down
        assert!(registry.update(&mut hostiles, 1, &config).is_empty());
        assert_eq!(registry.update(&mut hostiles, 3, &config).len(), 1);
    }

    #[test]
    fn test_group_assist_is_capped() {
        let config = DefenseConfig::default();
        let mut registry = DefenseRegistry::new();
        for x in [8, 9, 11, 12] {
            registry.add(TilePos::new(x, 6), &config);
        }
        let mut hostiles: BTreeMap<_, _> = [(
            HostileId(1),
            Hostile::new(HostileId(1), HostileKind::Barbarian, TilePos::new(10, 10)),
        )]
        .into_iter()
        .collect();

        let events = registry.update(&mut hostiles, 0, &config);
        let first = events
            .iter()
            .find_map(|e| match e {
                DefenseEvent::Fired { damage, .. } => Some(*damage),
                DefenseEvent::StatusChanged { .. } => None,
            })
            .unwrap();
        // 18 + 3 * 6 = 36, exactly the cap
        assert_eq!(first, 36.0);
        assert!(!hostiles[&HostileId(1)].alive);
    }

    #[test]
    fn test_adjacent_hostile_triggers_lockout() {
        let config = DefenseConfig::default();
        let mut registry = DefenseRegistry::new();
        let id = registry.add(TilePos::new(10, 10), &config);
        let mut hostiles: BTreeMap<_, _> = [wolf_at(1, TilePos::new(11, 10))].into_iter().collect();

        let events = registry.update(&mut hostiles, 0, &config);
        assert!(events.contains(&DefenseEvent::StatusChanged {
            defense: id,
            from: DefenseStatus::Active,
            to: DefenseStatus::InactiveTriggered,
        }));
        assert!(!events.iter().any(|e| matches!(e, DefenseEvent::Fired { .. })));

        hostiles.clear();
        registry.update(&mut hostiles, 9, &config);
        assert_eq!(registry.get(id).unwrap().status, DefenseStatus::InactiveTriggered);
        registry.update(&mut hostiles, 10, &config);
        assert_eq!(registry.get(id).unwrap().status, DefenseStatus::Active);
    }

    #[test]
    fn test_runs_dry_then_maintenance_restores() {
        let config = DefenseConfig::default();
        let mut registry = DefenseRegistry::new();
        let id = registry.add(TilePos::new(10, 10), &config);
        registry.get_mut(id).unwrap().ammo = 1;
        let mut hostiles: BTreeMap<_, _> = [(
            HostileId(1),
            Hostile::new(HostileId(1), HostileKind::Barbarian, TilePos::new(14, 10)),
        )]
        .into_iter()
        .collect();

        registry.update(&mut hostiles, 0, &config);
        assert_eq!(registry.get(id).unwrap().status, DefenseStatus::InactiveNoAmmo);

        // Nothing in stores: no one is sent to fiddle with it
        let mechanic = AgentId(3);
        let mut stockpile = Stockpile::new();
        assert_eq!(
            registry.claim_maintenance(mechanic, TilePos::new(0, 0), 1, 20, &config, &stockpile),
            None
        );
        assert!(registry.get(id).unwrap().is_worn(&config));

        stockpile.add(ResourceKind::AmmoBolts, 10);
        stockpile.add(ResourceKind::Springs, 1);
        assert_eq!(
            registry.claim_maintenance(mechanic, TilePos::new(0, 0), 3, 20, &config, &stockpile),
            Some(id)
        );
        assert_eq!(
            registry.claim_maintenance(AgentId(4), TilePos::new(0, 0), 3, 20, &config, &stockpile),
            None
        );

        // Stores emptied between claim and work
        let mut empty = Stockpile::new();
        assert_eq!(
            registry.maintain(id, mechanic, &mut empty, 3, 20, &config),
            MaintainOutcome::NothingAvailable
        );

        registry.claim_maintenance(mechanic, TilePos::new(0, 0), 3, 20, &config, &stockpile);
        let outcome = registry.maintain(id, mechanic, &mut stockpile, 4, 20, &config);
        assert_eq!(outcome, MaintainOutcome::Restocked { done: true });
        let defense = registry.get(id).unwrap();
        assert_eq!(defense.ammo, config.max_ammo);
        assert_eq!(defense.status, DefenseStatus::Active);
        assert_eq!(stockpile.get(ResourceKind::AmmoBolts), 4);
        assert_eq!(defense.parts, 1);
    }

    #[test]
    fn test_spare_part_revives_worn_frame() {
        let config = DefenseConfig::default();
        let mut registry = DefenseRegistry::new();
        let id = registry.add(TilePos::new(10, 10), &config);
        {
            let defense = registry.get_mut(id).unwrap();
            defense.durability = 1;
            defense.parts = 1;
        }
        let mut hostiles: BTreeMap<_, _> = [wolf_at(1, TilePos::new(14, 10))].into_iter().collect();
        registry.update(&mut hostiles, 0, &config);
        let defense = registry.get(id).unwrap();
        assert_eq!(defense.parts, 0);
        assert_eq!(defense.durability, config.durability_per_part);
        assert_eq!(defense.status, DefenseStatus::Active);
    }
}
