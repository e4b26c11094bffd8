//! Resource kinds tracked by the tribe ledger

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Every stockable resource. Ordering is the ledger's iteration order.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    #[display(fmt = "food")]
    Food,
    #[display(fmt = "water")]
    Water,
    #[display(fmt = "wood")]
    Wood,
    #[display(fmt = "mushrooms")]
    Mushrooms,
    #[display(fmt = "metal_ore")]
    MetalOre,
    #[display(fmt = "metal_parts")]
    MetalParts,
    #[display(fmt = "fiber")]
    Fiber,
    #[display(fmt = "rope")]
    Rope,
    #[display(fmt = "wood_planks")]
    WoodPlanks,
    #[display(fmt = "charcoal")]
    Charcoal,
    #[display(fmt = "ammo_bolts")]
    AmmoBolts,
    #[display(fmt = "springs")]
    Springs,
    #[display(fmt = "herbs")]
    Herbs,
    #[display(fmt = "fuel")]
    Fuel,
    #[display(fmt = "lore")]
    Lore,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 15] = [
        ResourceKind::Food,
        ResourceKind::Water,
        ResourceKind::Wood,
        ResourceKind::Mushrooms,
        ResourceKind::MetalOre,
        ResourceKind::MetalParts,
        ResourceKind::Fiber,
        ResourceKind::Rope,
        ResourceKind::WoodPlanks,
        ResourceKind::Charcoal,
        ResourceKind::AmmoBolts,
        ResourceKind::Springs,
        ResourceKind::Herbs,
        ResourceKind::Fuel,
        ResourceKind::Lore,
    ];

    /// Food and water, plus anything eaten raw
    pub fn is_survival(&self) -> bool {
        matches!(
            self,
            ResourceKind::Food | ResourceKind::Water | ResourceKind::Mushrooms
        )
    }

    /// Parse the snake_case key used in data files
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.to_string() == key.trim().to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::from_key(&kind.to_string()), Some(kind));
        }
        assert_eq!(ResourceKind::from_key("unobtanium"), None);
    }

    #[test]
    fn test_survival_resources() {
        assert!(ResourceKind::Water.is_survival());
        assert!(ResourceKind::Mushrooms.is_survival());
        assert!(!ResourceKind::Wood.is_survival());
    }
}
