use serde::{Deserialize, Serialize};

/// Multipliers published by the climate model for the current tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimateModifiers {
    /// Scales gather yields
    pub yield_mul: f32,
    /// Scales tile hazard in path scoring
    pub hazard_mul: f32,
    /// Probability a goblin may take a step this tick
    pub travel_mul: f32,
}

impl Default for ClimateModifiers {
    fn default() -> Self {
        Self {
            yield_mul: 1.0,
            hazard_mul: 1.0,
            travel_mul: 1.0,
        }
    }
}

impl ClimateModifiers {
    pub fn scaled_yield(&self, base: u32) -> u32 {
        ((base as f32) * self.yield_mul.max(0.0)).round() as u32
    }
}
