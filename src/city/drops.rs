//! Resource drops: staged resources waiting on the ground for a hauler

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::city::resource::ResourceKind;
use crate::core::types::TilePos;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDrops {
    piles: BTreeMap<(TilePos, ResourceKind), u32>,
}

impl ResourceDrops {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to the pile at a tile, creating it on first deposit
    pub fn deposit(&mut self, pos: TilePos, resource: ResourceKind, amount: u32) {
        if amount == 0 {
            return;
        }
        *self.piles.entry((pos, resource)).or_insert(0) += amount;
    }

    /// Take up to `max` units; the pile disappears when emptied
    pub fn take(&mut self, pos: TilePos, resource: ResourceKind, max: u32) -> u32 {
        let key = (pos, resource);
        let Some(amount) = self.piles.get_mut(&key) else {
            return 0;
        };
        let taken = (*amount).min(max);
        *amount -= taken;
        if *amount == 0 {
            self.piles.remove(&key);
        }
        taken
    }

    pub fn amount(&self, pos: TilePos, resource: ResourceKind) -> u32 {
        self.piles.get(&(pos, resource)).copied().unwrap_or(0)
    }

    pub fn total(&self, resource: ResourceKind) -> u32 {
        self.piles
            .iter()
            .filter(|((_, r), _)| *r == resource)
            .map(|(_, a)| *a)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TilePos, ResourceKind, u32)> + '_ {
        self.piles.iter().map(|((p, r), a)| (*p, *r, *a))
    }

    pub fn len(&self) -> usize {
        self.piles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.piles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_created_and_removed() {
        let mut drops = ResourceDrops::new();
        let pos = TilePos::new(3, 3);
        drops.deposit(pos, ResourceKind::Wood, 3);
        drops.deposit(pos, ResourceKind::Wood, 2);
        assert_eq!(drops.amount(pos, ResourceKind::Wood), 5);

        assert_eq!(drops.take(pos, ResourceKind::Wood, 4), 4);
        assert_eq!(drops.len(), 1);
        assert_eq!(drops.take(pos, ResourceKind::Wood, 4), 1);
        assert!(drops.is_empty());
        assert_eq!(drops.take(pos, ResourceKind::Wood, 4), 0);
    }

    #[test]
    fn test_zero_deposit_creates_nothing() {
        let mut drops = ResourceDrops::new();
        drops.deposit(TilePos::new(0, 0), ResourceKind::Food, 0);
        assert!(drops.is_empty());
    }
}
