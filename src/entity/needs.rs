//! Goblin needs and vitals, and the needs-model seam
//!
//! The core reads needs to pick goals and lowers them when goals execute
//! (drinking, eating, resting). How needs *rise* each tick belongs to the
//! needs model collaborator behind [`NeedsModel`].

use serde::{Deserialize, Serialize};

use crate::core::config::NeedsConfig;
use crate::core::types::Tick;
use crate::entity::agent::Agent;

/// 0 = satisfied, 100 = desperate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Needs {
    pub thirst: f32,
    pub hunger: f32,
    pub fatigue: f32,
}

impl Default for Needs {
    fn default() -> Self {
        Self {
            thirst: 20.0,
            hunger: 20.0,
            fatigue: 15.0,
        }
    }
}

impl Needs {
    pub fn relieve_thirst(&mut self, amount: f32) {
        self.thirst = (self.thirst - amount).clamp(0.0, 100.0);
    }

    pub fn relieve_hunger(&mut self, amount: f32) {
        self.hunger = (self.hunger - amount).clamp(0.0, 100.0);
    }

    pub fn relieve_fatigue(&mut self, amount: f32) {
        self.fatigue = (self.fatigue - amount).clamp(0.0, 100.0);
    }
}

/// Physical and emotional condition, 0-100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    pub vitality: f32,
    pub morale: f32,
    pub stress: f32,
}

impl Default for Vitals {
    fn default() -> Self {
        Self {
            vitality: 80.0,
            morale: 60.0,
            stress: 20.0,
        }
    }
}

impl Vitals {
    pub fn adjust_morale(&mut self, delta: f32) {
        self.morale = (self.morale + delta).clamp(0.0, 100.0);
    }

    pub fn adjust_stress(&mut self, delta: f32) {
        self.stress = (self.stress + delta).clamp(0.0, 100.0);
    }

    pub fn adjust_vitality(&mut self, delta: f32) {
        self.vitality = (self.vitality + delta).clamp(0.0, 100.0);
    }
}

/// Per-tick needs drift, applied to every living goblin before the core runs
pub trait NeedsModel {
    fn apply(&self, agent: &mut Agent, tick: Tick);
}

/// Constant-rate needs growth with starvation damage at the ceiling
#[derive(Debug, Clone)]
pub struct LinearNeedsModel {
    thirst_rate: f32,
    hunger_rate: f32,
    fatigue_rate: f32,
    vitality_regen: f32,
    starvation_damage: f32,
    stress_recovery: f32,
}

impl LinearNeedsModel {
    pub fn from_config(config: &NeedsConfig) -> Self {
        Self {
            thirst_rate: config.thirst_rate,
            hunger_rate: config.hunger_rate,
            fatigue_rate: config.fatigue_rate,
            vitality_regen: config.vitality_regen,
            starvation_damage: config.starvation_damage,
            stress_recovery: config.stress_recovery,
        }
    }
}

impl Default for LinearNeedsModel {
    fn default() -> Self {
        Self::from_config(&NeedsConfig::default())
    }
}

impl NeedsModel for LinearNeedsModel {
    fn apply(&self, agent: &mut Agent, _tick: Tick) {
        if !agent.is_active() {
            return;
        }
        let needs = &mut agent.needs;
        needs.thirst = (needs.thirst + self.thirst_rate).min(100.0);
        needs.hunger = (needs.hunger + self.hunger_rate).min(100.0);
        needs.fatigue = (needs.fatigue + self.fatigue_rate).min(100.0);

        let starving = needs.thirst >= 100.0 || needs.hunger >= 100.0;
        let comfortable = needs.thirst < 50.0 && needs.hunger < 50.0;
        let vitals = &mut agent.vitals;
        if starving {
            vitals.adjust_vitality(-self.starvation_damage);
            vitals.adjust_stress(1.0);
        } else if comfortable {
            vitals.adjust_vitality(self.vitality_regen);
            vitals.adjust_stress(-self.stress_recovery);
        }

        if vitals.vitality <= 0.0 {
            agent.alive = false;
        }
    }
}
