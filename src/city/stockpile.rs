//! Stockpile - the tribe's shared resource ledger

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::city::resource::ResourceKind;

/// Tribe-level resource storage. Resources without an explicit capacity are unbounded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stockpile {
    amounts: BTreeMap<ResourceKind, u32>,
    capacities: BTreeMap<ResourceKind, u32>,
}

impl Stockpile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starting stock of a fresh tribe
    pub fn starting_tribe() -> Self {
        let mut stockpile = Self::new();
        for (resource, amount) in [
            (ResourceKind::Food, 80),
            (ResourceKind::Water, 90),
            (ResourceKind::Wood, 18),
            (ResourceKind::Mushrooms, 6),
            (ResourceKind::MetalOre, 10),
            (ResourceKind::Lore, 5),
        ] {
            stockpile.add(resource, amount);
        }
        stockpile
    }

    pub fn set_capacity(&mut self, resource: ResourceKind, capacity: u32) {
        self.capacities.insert(resource, capacity);
        if let Some(current) = self.amounts.get_mut(&resource) {
            *current = (*current).min(capacity);
        }
    }

    pub fn get(&self, resource: ResourceKind) -> u32 {
        self.amounts.get(&resource).copied().unwrap_or(0)
    }

    pub fn capacity(&self, resource: ResourceKind) -> Option<u32> {
        self.capacities.get(&resource).copied()
    }

    /// Space left before the cap; `u32::MAX` when uncapped
    pub fn room(&self, resource: ResourceKind) -> u32 {
        match self.capacity(resource) {
            Some(cap) => cap.saturating_sub(self.get(resource)),
            None => u32::MAX,
        }
    }

    /// Try to add resources, returns amount actually added
    pub fn add(&mut self, resource: ResourceKind, amount: u32) -> u32 {
        let added = amount.min(self.room(resource));
        if added > 0 {
            *self.amounts.entry(resource).or_insert(0) += added;
        }
        added
    }

    /// Try to remove resources, returns amount actually removed
    pub fn remove(&mut self, resource: ResourceKind, amount: u32) -> u32 {
        match self.amounts.get_mut(&resource) {
            Some(current) => {
                let removed = amount.min(*current);
                *current -= removed;
                removed
            }
            None => 0,
        }
    }

    pub fn has_materials(&self, requirements: &[(ResourceKind, u32)]) -> bool {
        requirements.iter().all(|(res, amount)| self.get(*res) >= *amount)
    }

    /// Consume all requirements or nothing
    pub fn consume_materials(&mut self, requirements: &[(ResourceKind, u32)]) -> bool {
        if !self.has_materials(requirements) {
            return false;
        }
        for (res, amount) in requirements {
            self.remove(*res, *amount);
        }
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        self.amounts.iter().map(|(r, a)| (*r, *a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stockpile_add_remove() {
        let mut stockpile = Stockpile::new();
        stockpile.set_capacity(ResourceKind::Wood, 50);

        assert_eq!(stockpile.add(ResourceKind::Wood, 30), 30);
        assert_eq!(stockpile.add(ResourceKind::Wood, 30), 20);
        assert_eq!(stockpile.get(ResourceKind::Wood), 50);
        assert_eq!(stockpile.room(ResourceKind::Wood), 0);

        assert_eq!(stockpile.remove(ResourceKind::Wood, 70), 50);
        assert_eq!(stockpile.get(ResourceKind::Wood), 0);
    }

    #[test]
    fn test_uncapped_resources() {
        let mut stockpile = Stockpile::new();
        assert_eq!(stockpile.add(ResourceKind::Food, 10_000), 10_000);
        assert_eq!(stockpile.room(ResourceKind::Food), u32::MAX);
    }

    #[test]
    fn test_consume_materials_all_or_nothing() {
        let mut stockpile = Stockpile::new();
        stockpile.add(ResourceKind::MetalOre, 2);
        stockpile.add(ResourceKind::Charcoal, 0);

        let requirements = [(ResourceKind::MetalOre, 2), (ResourceKind::Charcoal, 1)];
        assert!(!stockpile.consume_materials(&requirements));
        assert_eq!(stockpile.get(ResourceKind::MetalOre), 2);

        stockpile.add(ResourceKind::Charcoal, 1);
        assert!(stockpile.consume_materials(&requirements));
        assert_eq!(stockpile.get(ResourceKind::MetalOre), 0);
    }

    #[test]
    fn test_starting_tribe() {
        let stockpile = Stockpile::starting_tribe();
        assert_eq!(stockpile.get(ResourceKind::Water), 90);
        assert_eq!(stockpile.get(ResourceKind::Food), 80);
    }
}
