//! Single-step pathfinding
//!
//! Each tick a goblin scores its own tile and its eight neighbors and takes
//! the best. When the best is to stay put while still far from a non-idle
//! target, a bounded breadth-first search looks for any route to a tile
//! strictly closer to the target and returns its first step.

use std::collections::VecDeque;

use ahash::AHashSet;
use ordered_float::OrderedFloat;

use crate::core::config::PathConfig;
use crate::core::rng::DetRng;
use crate::core::types::{AgentId, Tick, TilePos, NEIGHBOR_OFFSETS};
use crate::entity::goal::Goal;
use crate::spatial::occupancy::OccupancyMap;
use crate::world::climate::ClimateModifiers;
use crate::world::map::WorldMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Move(TilePos),
    /// Arrived, idling, or held back this tick
    Stay,
    /// Far from the target with no usable step
    NoPath,
}

#[derive(Debug, Clone, Copy)]
pub struct StepQuery<'a> {
    pub agent: AgentId,
    pub from: TilePos,
    pub home: TilePos,
    pub goal: &'a Goal,
    pub tick: Tick,
}

pub struct Pathfinder<'a> {
    pub map: &'a WorldMap,
    pub occupancy: &'a OccupancyMap,
    pub rng: &'a DetRng,
    pub config: &'a PathConfig,
    pub climate: &'a ClimateModifiers,
}

impl<'a> Pathfinder<'a> {
    fn is_open(&self, pos: TilePos, agent: AgentId) -> bool {
        self.map.is_passable(pos) && self.occupancy.is_free_for(pos, agent)
    }

    pub fn next_step(&self, query: StepQuery<'_>) -> StepOutcome {
        let agent_part = u64::from(query.agent.0);
        if self.climate.travel_mul < 1.0
            && !self
                .rng
                .chance("travel", &[query.tick, agent_part], self.climate.travel_mul)
        {
            return StepOutcome::Stay;
        }

        let target = query.goal.target();
        let here = query.from.distance(&target);
        let mut best: Option<(OrderedFloat<f32>, TilePos)> = None;

        for (index, (dx, dy)) in NEIGHBOR_OFFSETS.iter().enumerate() {
            let candidate = query.from.offset(*dx, *dy);
            if !self.map.is_passable(candidate) {
                continue;
            }
            if candidate != query.from && !self.occupancy.is_free_for(candidate, query.agent) {
                continue;
            }
            let score = self.score(&query, candidate, here, index as u64);
            // Strict comparison keeps the earliest offset on ties, so "stay" wins ties
            if best.map_or(true, |(s, _)| OrderedFloat(score) > s) {
                best = Some((OrderedFloat(score), candidate));
            }
        }

        match best {
            Some((_, step)) if step != query.from => StepOutcome::Move(step),
            _ => {
                if query.goal.is_idle()
                    || here <= self.config.stall_distance
                    || query.from.chebyshev(&target) <= 1
                {
                    return StepOutcome::Stay;
                }
                match self.bfs_first_step(query.agent, query.from, target) {
                    Some(step) => StepOutcome::Move(step),
                    None => StepOutcome::NoPath,
                }
            }
        }
    }

    fn score(&self, query: &StepQuery<'_>, candidate: TilePos, here: f32, index: u64) -> f32 {
        let cfg = self.config;
        let target = query.goal.target();
        let dist = candidate.distance(&target);
        let progress = here - dist;
        let hazard = self.map.hazard_at(candidate) * self.climate.hazard_mul;
        let density =
            (self.occupancy.local_density(candidate, 2, query.agent) as f32 / 8.0).min(1.0);
        let grouping = density * cfg.grouping_weight;
        let jitter = self.rng.roll(
            "step-jitter",
            &[query.tick, u64::from(query.agent.0), index],
        ) * cfg.jitter;

        let mut score = progress * cfg.progress_weight + grouping
            - candidate.distance(&query.home) * cfg.home_pull
            + jitter
            - hazard * cfg.hazard_weight;

        match query.goal {
            Goal::Idle { .. } => score += grouping * 0.4,
            Goal::Regroup { .. } => score += grouping * 0.55,
            Goal::Defend { .. } => score += grouping * 0.25,
            Goal::Flee { from, .. } => {
                score += candidate.distance(from) * cfg.flee_push - hazard * 0.4;
            }
            _ => {}
        }
        score
    }

    /// Breadth-first search over open tiles for the first step toward any
    /// tile strictly closer to `target` than `start`.
    fn bfs_first_step(&self, agent: AgentId, start: TilePos, target: TilePos) -> Option<TilePos> {
        let start_dist = start.distance(&target);
        let mut visited: AHashSet<TilePos> = AHashSet::new();
        let mut queue: VecDeque<(TilePos, u32, TilePos)> = VecDeque::new();
        visited.insert(start);

        for next in start.neighbors() {
            if self.is_open(next, agent) && visited.insert(next) {
                queue.push_back((next, 1, next));
            }
        }

        while let Some((pos, depth, first)) = queue.pop_front() {
            if pos.distance(&target) < start_dist - 1e-3 {
                return Some(first);
            }
            if depth >= self.config.bfs_max_depth {
                continue;
            }
            for next in pos.neighbors() {
                if visited.len() >= self.config.bfs_max_visited {
                    return None;
                }
                if self.is_open(next, agent) && visited.insert(next) {
                    queue.push_back((next, depth + 1, first));
                }
            }
        }
        None
    }
}
