//! Colony roles

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::city::recipe::Station;

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[display(fmt = "forager")]
    Forager,
    #[display(fmt = "water_runner")]
    WaterRunner,
    #[display(fmt = "woodcutter")]
    Woodcutter,
    #[display(fmt = "miner")]
    Miner,
    #[display(fmt = "scavenger")]
    Scavenger,
    #[display(fmt = "builder")]
    Builder,
    #[display(fmt = "hauler")]
    Hauler,
    #[display(fmt = "sentinel")]
    Sentinel,
    #[display(fmt = "lookout")]
    Lookout,
    #[display(fmt = "scout")]
    Scout,
    #[display(fmt = "smelter")]
    Smelter,
    #[display(fmt = "carpenter")]
    Carpenter,
    #[display(fmt = "rope_maker")]
    RopeMaker,
    #[display(fmt = "charcoal_burner")]
    CharcoalBurner,
    #[display(fmt = "fletcher")]
    Fletcher,
    #[display(fmt = "tinkerer")]
    Tinkerer,
    #[display(fmt = "herbalist")]
    Herbalist,
    #[display(fmt = "caretaker")]
    Caretaker,
    #[display(fmt = "cook")]
    Cook,
    #[display(fmt = "quartermaster")]
    Quartermaster,
    #[display(fmt = "mechanist")]
    Mechanist,
    #[display(fmt = "reproducer")]
    Reproducer,
    #[display(fmt = "colonizer")]
    Colonizer,
    #[display(fmt = "lorekeeper")]
    Lorekeeper,
}

impl Role {
    pub const ALL: [Role; 24] = [
        Role::Forager,
        Role::WaterRunner,
        Role::Woodcutter,
        Role::Miner,
        Role::Scavenger,
        Role::Builder,
        Role::Hauler,
        Role::Sentinel,
        Role::Lookout,
        Role::Scout,
        Role::Smelter,
        Role::Carpenter,
        Role::RopeMaker,
        Role::CharcoalBurner,
        Role::Fletcher,
        Role::Tinkerer,
        Role::Herbalist,
        Role::Caretaker,
        Role::Cook,
        Role::Quartermaster,
        Role::Mechanist,
        Role::Reproducer,
        Role::Colonizer,
        Role::Lorekeeper,
    ];

    /// Workshop station a processing role works at
    pub fn station(&self) -> Option<Station> {
        match self {
            Role::Smelter => Some(Station::Smelter),
            Role::Carpenter => Some(Station::Sawpit),
            Role::RopeMaker => Some(Station::Ropewalk),
            Role::CharcoalBurner => Some(Station::Kiln),
            Role::Fletcher => Some(Station::Fletchery),
            Role::Tinkerer => Some(Station::Workbench),
            Role::Herbalist => Some(Station::Apothecary),
            Role::Cook => Some(Station::Kitchen),
            Role::Forager
            | Role::WaterRunner
            | Role::Woodcutter
            | Role::Miner
            | Role::Scavenger
            | Role::Builder
            | Role::Hauler
            | Role::Sentinel
            | Role::Lookout
            | Role::Scout
            | Role::Caretaker
            | Role::Quartermaster
            | Role::Mechanist
            | Role::Reproducer
            | Role::Colonizer
            | Role::Lorekeeper => None,
        }
    }

    /// Roles that keep the tribe fed, watered and standing
    pub fn is_survival(&self) -> bool {
        matches!(
            self,
            Role::Forager | Role::WaterRunner | Role::Hauler | Role::Sentinel | Role::Caretaker
        )
    }

    /// Shift applied to thirst thresholds; field roles tolerate more
    pub fn thirst_offset(&self) -> f32 {
        match self {
            Role::Scout => 8.0,
            Role::Sentinel | Role::Lookout => 5.0,
            Role::Builder | Role::Woodcutter | Role::Miner => 2.0,
            Role::WaterRunner => -4.0,
            _ => 0.0,
        }
    }

    pub fn fatigue_offset(&self) -> f32 {
        match self {
            Role::Scout | Role::Sentinel => 4.0,
            Role::Builder | Role::Miner | Role::Hauler => -3.0,
            _ => 0.0,
        }
    }
}
