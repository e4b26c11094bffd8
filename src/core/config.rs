//! Simulation configuration with documented constants
//!
//! All tuned numbers live here, grouped per subsystem. Every group
//! deserializes with `#[serde(default)]`, so a TOML file only needs the
//! keys it overrides.

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, SimError};

/// Configuration for the whole tick pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub needs: NeedsConfig,
    pub path: PathConfig,
    pub tasks: TaskConfig,
    pub wall: WallConfig,
    pub defense: DefenseConfig,
    pub threat: ThreatConfig,
    pub migration: MigrationConfig,
    pub outposts: OutpostConfig,
    pub roles: RoleConfig,
    pub reproduction: ReproductionConfig,
    pub crisis: CrisisConfig,
    pub social: SocialConfig,
    /// Maximum events retained by `Simulation`'s chronicle
    pub chronicle_limit: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            needs: NeedsConfig::default(),
            path: PathConfig::default(),
            tasks: TaskConfig::default(),
            wall: WallConfig::default(),
            defense: DefenseConfig::default(),
            threat: ThreatConfig::default(),
            migration: MigrationConfig::default(),
            outposts: OutpostConfig::default(),
            roles: RoleConfig::default(),
            reproduction: ReproductionConfig::default(),
            crisis: CrisisConfig::default(),
            social: SocialConfig::default(),
            chronicle_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NeedsConfig {
    // === HYDRATION ===
    /// Thirst at which a goblin drinks if a source is within `water_seek_radius`
    pub thirst_seek: f32,
    /// Thirst at which a goblin walks to any reachable source
    pub thirst_high: f32,
    /// Thirst at which stored water is also acceptable
    pub thirst_critical: f32,
    /// A drinking goblin keeps drinking until thirst falls to this
    pub drink_sated: f32,
    /// Thirst removed per tick at a natural source
    pub drink_relief: f32,
    /// Thirst removed per unit of stored water consumed
    pub stored_water_relief: f32,
    pub water_seek_radius: f32,

    // === HUNGER ===
    pub hunger_seek: f32,
    /// Hunger counted as a critical need by the crisis assessment
    pub hunger_critical: f32,
    pub eat_sated: f32,
    /// Hunger removed per unit of stored food consumed
    pub food_relief: f32,

    // === FATIGUE ===
    pub fatigue_seek: f32,
    pub fatigue_high: f32,
    pub rest_sated: f32,
    /// Fatigue removed per tick resting at home
    pub rest_relief: f32,

    /// Per-goblin threshold jitter, drawn once in `[-jitter, +jitter]`
    pub threshold_jitter: f32,

    // === LINEAR NEEDS MODEL ===
    pub thirst_rate: f32,
    pub hunger_rate: f32,
    pub fatigue_rate: f32,
    /// Vitality regained per tick while thirst and hunger are below 50
    pub vitality_regen: f32,
    /// Vitality lost per tick while any need is at 100
    pub starvation_damage: f32,
    pub stress_recovery: f32,
}

impl Default for NeedsConfig {
    fn default() -> Self {
        Self {
            thirst_seek: 55.0,
            thirst_high: 68.0,
            thirst_critical: 80.0,
            drink_sated: 4.0,
            drink_relief: 40.0,
            stored_water_relief: 35.0,
            water_seek_radius: 14.0,
            hunger_seek: 70.0,
            hunger_critical: 88.0,
            eat_sated: 25.0,
            food_relief: 30.0,
            fatigue_seek: 72.0,
            fatigue_high: 84.0,
            rest_sated: 15.0,
            rest_relief: 8.0,
            threshold_jitter: 6.0,
            thirst_rate: 0.65,
            hunger_rate: 0.55,
            fatigue_rate: 0.5,
            vitality_regen: 0.2,
            starvation_damage: 0.5,
            stress_recovery: 0.3,
        }
    }
}

/// Greedy step scoring and the BFS fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub bfs_max_depth: u32,
    pub bfs_max_visited: usize,
    pub progress_weight: f32,
    pub hazard_weight: f32,
    pub grouping_weight: f32,
    pub home_pull: f32,
    pub jitter: f32,
    /// Flee bonus per tile of distance from the threat
    pub flee_push: f32,
    /// A stalled non-idle goblin farther than this from its target triggers the fallback
    pub stall_distance: f32,
    /// Half-width of idle wander targets around home
    pub wander_radius: f32,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            bfs_max_depth: 18,
            bfs_max_visited: 420,
            progress_weight: 0.9,
            hazard_weight: 0.55,
            grouping_weight: 0.24,
            home_pull: 0.02,
            jitter: 0.2,
            flee_push: 0.35,
            stall_distance: 1.1,
            wander_radius: 4.0,
        }
    }
}

/// Claim leases and carrying limits shared by the task registries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub haul_lease_ticks: u64,
    pub haul_carry_capacity: u32,
    pub processing_lease_ticks: u64,
    pub wall_reservation_ticks: u64,
    pub defense_lease_ticks: u64,
    /// Same blocked reason is not re-emitted within this window
    pub blocked_event_cooldown: u64,
    /// Gatherers farther than this from home stage their yield as a drop
    pub stage_distance: f32,
    /// Water units a runner fills per trip
    pub water_fill: u32,
    /// In-flight processing tasks are bounded by `max(min, population / divisor)`
    pub processing_min_in_flight: usize,
    pub processing_population_divisor: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            haul_lease_ticks: 16,
            haul_carry_capacity: 4,
            processing_lease_ticks: 24,
            wall_reservation_ticks: 18,
            defense_lease_ticks: 20,
            blocked_event_cooldown: 12,
            stage_distance: 10.0,
            water_fill: 3,
            processing_min_in_flight: 2,
            processing_population_divisor: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WallConfig {
    pub base_radius: i32,
    pub max_radius: i32,
    /// Plans with a larger blocked fraction escalate the radius
    pub max_blocked_ratio: f32,
    pub texture_jitter: f32,
    pub min_samples: usize,
    pub samples_per_radius: usize,
    /// Anchors within `radius + anchor_margin` pull the perimeter outward
    pub anchor_margin: f32,
    pub anchor_pull: f32,
    pub wood_per_segment: u32,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            base_radius: 8,
            max_radius: 12,
            max_blocked_ratio: 0.35,
            texture_jitter: 0.85,
            min_samples: 56,
            samples_per_radius: 28,
            anchor_margin: 4.0,
            anchor_pull: 0.7,
            wood_per_segment: 1,
        }
    }
}

/// Automated defenses (bolt throwers)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefenseConfig {
    pub range: f32,
    pub base_damage: f32,
    /// Extra damage per other active defense near the target
    pub assist_damage: f32,
    pub assist_radius: f32,
    pub damage_cap: f32,
    pub cooldown_ticks: u64,
    /// A hostile this close jams the defense
    pub trigger_radius: f32,
    pub trigger_ticks: u64,
    pub max_ammo: u32,
    pub max_durability: u32,
    pub ammo_per_bolt: u32,
    pub durability_per_part: u32,
    pub max_spare_parts: u32,
}

impl Default for DefenseConfig {
    fn default() -> Self {
        Self {
            range: 6.0,
            base_damage: 18.0,
            assist_damage: 6.0,
            assist_radius: 5.0,
            damage_cap: 36.0,
            cooldown_ticks: 3,
            trigger_radius: 1.5,
            trigger_ticks: 10,
            max_ammo: 12,
            max_durability: 30,
            ammo_per_bolt: 2,
            durability_per_part: 15,
            max_spare_parts: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatConfig {
    // === RESPONSE FSM ===
    pub direct_radius: f32,
    pub local_radius: f32,
    /// Regroup persists this long after the last sighting
    pub response_memory_ticks: u64,
    pub mode_event_cooldown: u64,
    pub min_vitality: f32,
    pub min_morale: f32,
    pub max_stress: f32,
    /// Weighted hostile count (barbarians count double) a defender tolerates
    pub max_local_hostiles: f32,
    pub sentinel_vitality_bonus: f32,
    pub deadlock_ticks: u64,
    pub suppression_ticks: u64,
    /// Built walls within this distance of home are flee targets
    pub flee_wall_radius: f32,
    pub defend_damage: f32,
    /// Extra melee damage per other defender near the hostile
    pub defend_assist: f32,
    pub memory_regroup_score: f32,
    /// Score added per hostile beyond the first within `local_radius`
    pub cluster_score: f32,

    // === MEMORY ===
    pub memory_decay_ticks: u64,
    pub home_alert_radius: f32,
    pub lookout_detection_radius: f32,
    pub spot_event_interval: u64,
    pub investigate_min_confidence: f32,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            direct_radius: 4.5,
            local_radius: 9.0,
            response_memory_ticks: 14,
            mode_event_cooldown: 6,
            min_vitality: 58.0,
            min_morale: 42.0,
            max_stress: 72.0,
            max_local_hostiles: 2.0,
            sentinel_vitality_bonus: 10.0,
            deadlock_ticks: 24,
            suppression_ticks: 40,
            flee_wall_radius: 6.0,
            defend_damage: 10.0,
            defend_assist: 3.0,
            memory_regroup_score: 20.0,
            cluster_score: 0.18,
            memory_decay_ticks: 160,
            home_alert_radius: 20.0,
            lookout_detection_radius: 11.0,
            spot_event_interval: 10,
            investigate_min_confidence: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub no_progress_ticks: u64,
    pub max_reroutes: u32,
    pub max_retargets: u32,
    pub timeout_ticks: u64,
    /// Ticks between voluntary migration planning passes
    pub plan_interval: u64,
    pub max_active_jobs: usize,
    /// The start outpost never drops below this many residents through migration
    pub min_start_population: usize,
    pub arrival_radius: f32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            no_progress_ticks: 40,
            max_reroutes: 3,
            max_retargets: 2,
            timeout_ticks: 600,
            plan_interval: 30,
            max_active_jobs: 3,
            min_start_population: 6,
            arrival_radius: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutpostConfig {
    pub seeded_ratio: f32,
    pub viable_ratio: f32,
    pub unstable_ratio: f32,
    pub unstable_deficit: u32,
    /// Consecutive unstable ticks before an outpost is failing
    pub failing_after_ticks: u64,
    /// Consecutive failing ticks before evacuation
    pub evacuate_after_ticks: u64,
    pub evacuation_deadline_ticks: u64,
}

impl Default for OutpostConfig {
    fn default() -> Self {
        Self {
            seeded_ratio: 0.35,
            viable_ratio: 0.75,
            unstable_ratio: 0.5,
            unstable_deficit: 3,
            failing_after_ticks: 120,
            evacuate_after_ticks: 240,
            evacuation_deadline_ticks: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    pub balance_interval: u64,
    pub max_moves_per_pass: usize,
    pub min_role_hold_ticks: u64,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            balance_interval: 12,
            max_moves_per_pass: 2,
            min_role_hold_ticks: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReproductionConfig {
    /// No live hostile within this radius of the start outpost counts as safe
    pub safe_radius: f32,
    /// Built fraction of the wall plan that also counts as safe
    pub wall_coverage_gate: f32,
    pub cooldown_ticks: u64,
    pub population_cap: usize,
    pub solo_chance: f32,
    pub pair_distance: f32,
    pub pair_break_distance: f32,
    pub pair_duration_ticks: u64,
    /// Ticks without a birth before a forced birth
    pub stall_ticks: u64,
    pub stall_ignores_cap: bool,
}

impl Default for ReproductionConfig {
    fn default() -> Self {
        Self {
            safe_radius: 12.0,
            wall_coverage_gate: 0.6,
            cooldown_ticks: 300,
            population_cap: 60,
            solo_chance: 0.01,
            pair_distance: 6.0,
            pair_break_distance: 10.0,
            pair_duration_ticks: 30,
            stall_ticks: 2400,
            stall_ignores_cap: false,
        }
    }
}

/// Survival-stock crisis tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrisisConfig {
    /// Food or water per capita below this is an elevated crisis
    pub elevated_per_capita: f32,
    pub severe_per_capita: f32,
    /// Fraction of goblins at critical thirst that also triggers elevated
    pub critical_fraction: f32,
}

impl Default for CrisisConfig {
    fn default() -> Self {
        Self {
            elevated_per_capita: 1.5,
            severe_per_capita: 0.5,
            critical_fraction: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialConfig {
    pub interaction_radius: f32,
    pub interaction_cooldown: u64,
    pub interaction_chance: f32,
    pub morale_gain: f32,
    /// Moving goblins report a wander event at most this often
    pub wander_event_interval: u64,
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            interaction_radius: 2.0,
            interaction_cooldown: 16,
            interaction_chance: 0.11,
            morale_gain: 3.0,
            wander_event_interval: 10,
        }
    }
}

impl SimulationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)?;
        config.validate().map_err(SimError::InvalidConfig)?;
        Ok(config)
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Validate that configuration values are sensible
    pub fn validate(&self) -> std::result::Result<(), String> {
        let n = &self.needs;
        if !(n.thirst_seek < n.thirst_high && n.thirst_high <= n.thirst_critical) {
            return Err(format!(
                "thirst thresholds must be ordered: seek ({}) < high ({}) <= critical ({})",
                n.thirst_seek, n.thirst_high, n.thirst_critical
            ));
        }
        if n.fatigue_seek >= n.fatigue_high {
            return Err(format!(
                "fatigue_seek ({}) should be < fatigue_high ({})",
                n.fatigue_seek, n.fatigue_high
            ));
        }
        if n.drink_sated >= n.thirst_seek || n.rest_sated >= n.fatigue_seek {
            return Err("sated levels must sit below their seek thresholds".into());
        }

        if self.wall.base_radius < 2 || self.wall.max_radius < self.wall.base_radius {
            return Err(format!(
                "wall radius range invalid: base {} max {}",
                self.wall.base_radius, self.wall.max_radius
            ));
        }

        // Threat radii nest: direct contact is inside the local regroup zone
        if self.threat.direct_radius >= self.threat.local_radius {
            return Err(format!(
                "direct_radius ({}) should be < local_radius ({})",
                self.threat.direct_radius, self.threat.local_radius
            ));
        }

        let o = &self.outposts;
        if !(o.seeded_ratio < o.viable_ratio && o.viable_ratio <= 1.0) {
            return Err("outpost ratios must satisfy seeded < viable <= 1".into());
        }

        let r = &self.reproduction;
        if r.pair_distance > r.pair_break_distance {
            return Err(format!(
                "pair_distance ({}) should be <= pair_break_distance ({})",
                r.pair_distance, r.pair_break_distance
            ));
        }

        if self.tasks.haul_carry_capacity == 0 || self.tasks.processing_population_divisor == 0 {
            return Err("carry capacity and processing divisor must be positive".into());
        }

        if self.crisis.severe_per_capita >= self.crisis.elevated_per_capita {
            return Err("severe crisis threshold must be below the elevated one".into());
        }

        Ok(())
    }
}
