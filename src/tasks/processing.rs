//! Processing queue - recipe batches worked at stations
//!
//! Each refresh:
//! 1. Prunes finished batches and lapsed claims
//! 2. Unblocks batches whose inputs are back in stock
//! 3. Drops unstarted batches whose recipe no longer has demand
//! 4. Enqueues the highest-demand recipes up to the in-flight budget
//!
//! A claimed batch consumes its inputs on the first work tick or goes
//! Blocked; it completes after `duration_ticks` work ticks.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::city::recipe::{Recipe, RecipeCatalog, Station};
use crate::city::resource::ResourceKind;
use crate::city::stockpile::Stockpile;
use crate::core::types::{AgentId, TaskId, Tick};
use crate::tasks::Lease;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Queued,
    Active,
    Blocked,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTask {
    pub id: TaskId,
    pub recipe_id: String,
    pub station: Station,
    pub status: ProcessStatus,
    pub progress: u32,
    pub duration: u32,
    pub inputs_consumed: bool,
    pub lease: Lease,
    pub score: f32,
    pub created_tick: Tick,
}

/// What one tick of work on a batch did
#[derive(Debug, Clone, PartialEq)]
pub enum WorkOutcome {
    Progressed,
    Completed {
        recipe_id: String,
        outputs: Vec<(ResourceKind, u32)>,
    },
    /// Inputs missing when the batch tried to start
    Blocked,
    /// The batch is gone or held by someone else
    NotHeld,
}

/// Tribe state that shapes recipe demand
#[derive(Debug, Clone, Copy)]
pub struct DemandSignals {
    pub population: usize,
    /// Tribe alert level, 0-100
    pub alert: f32,
    /// Quartermaster override: only survival recipes are worked
    pub survival_only: bool,
}

/// Demand for a recipe: primary-output gap against its target stock,
/// plus a threat bonus for defense recipes and the shortage of any recipe
/// that consumes this one's output.
pub fn demand_score(recipe: &Recipe, catalog: &RecipeCatalog, stockpile: &Stockpile, alert: f32) -> f32 {
    let Some(output) = recipe.primary_output() else {
        return 0.0;
    };
    let gap = output_gap(recipe, stockpile);
    let mut score = gap * recipe.weight;
    if recipe.defense && alert > 0.0 {
        score += (alert / 100.0) * 0.5;
    }
    for downstream in catalog.all().iter().filter(|r| r.consumes(output)) {
        score += output_gap(downstream, stockpile) * downstream.weight * 0.25;
    }
    score
}

fn output_gap(recipe: &Recipe, stockpile: &Stockpile) -> f32 {
    let Some(output) = recipe.primary_output() else {
        return 0.0;
    };
    let target = recipe.target_stock.max(1) as f32;
    ((target - stockpile.get(output) as f32) / target).max(0.0)
}

/// Recipes whose primary output keeps goblins alive
pub fn is_survival_recipe(recipe: &Recipe) -> bool {
    recipe.primary_output().is_some_and(|r| r.is_survival())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingQueue {
    tasks: BTreeMap<TaskId, ProcessingTask>,
    next_id: u32,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the queue; returns ids of newly queued batches
    pub fn refresh(
        &mut self,
        catalog: &RecipeCatalog,
        stockpile: &Stockpile,
        signals: DemandSignals,
        tick: Tick,
        min_in_flight: usize,
        population_divisor: usize,
    ) -> Vec<TaskId> {
        self.tasks.retain(|_, t| t.status != ProcessStatus::Done);

        let scores: BTreeMap<&str, f32> = catalog
            .all()
            .iter()
            .map(|r| (r.id.as_str(), demand_score(r, catalog, stockpile, signals.alert)))
            .collect();

        for task in self.tasks.values_mut() {
            task.lease.expire(tick);
            task.score = scores.get(task.recipe_id.as_str()).copied().unwrap_or(0.0);
            if task.status == ProcessStatus::Blocked {
                let ready = catalog
                    .get(&task.recipe_id)
                    .is_some_and(|r| stockpile.has_materials(&r.inputs));
                if ready {
                    task.status = ProcessStatus::Queued;
                }
            }
        }

        // Unstarted batches without demand are withdrawn
        self.tasks.retain(|_, t| {
            t.inputs_consumed || t.lease.holder(tick).is_some() || t.score > 0.0
        });

        let budget = min_in_flight.max(signals.population / population_divisor.max(1));
        let mut ranked: Vec<&Recipe> = catalog
            .all()
            .iter()
            .filter(|r| scores.get(r.id.as_str()).copied().unwrap_or(0.0) > 0.0)
            .filter(|r| !signals.survival_only || is_survival_recipe(r))
            .collect();
        ranked.sort_by_key(|r| {
            (
                std::cmp::Reverse(OrderedFloat(scores.get(r.id.as_str()).copied().unwrap_or(0.0))),
                r.id.clone(),
            )
        });

        let mut queued = Vec::new();
        for recipe in ranked {
            if self.in_flight(tick) >= budget {
                break;
            }
            if self.tasks.values().any(|t| t.recipe_id == recipe.id) {
                continue;
            }
            // Parked batches give way to a recipe that can start now
            if self.tasks.len() >= budget {
                if !stockpile.has_materials(&recipe.inputs) {
                    continue;
                }
                let Some(parked) = self.lowest_parked(tick) else {
                    continue;
                };
                self.tasks.remove(&parked);
            }
            let id = TaskId(self.next_id);
            self.next_id += 1;
            self.tasks.insert(
                id,
                ProcessingTask {
                    id,
                    recipe_id: recipe.id.clone(),
                    station: recipe.station,
                    status: ProcessStatus::Queued,
                    progress: 0,
                    duration: recipe.duration_ticks.max(1),
                    inputs_consumed: false,
                    lease: Lease::default(),
                    score: scores.get(recipe.id.as_str()).copied().unwrap_or(0.0),
                    created_tick: tick,
                },
            );
            queued.push(id);
        }
        queued
    }

    /// Blocked before starting and unclaimed
    fn is_parked(task: &ProcessingTask, tick: Tick) -> bool {
        task.status == ProcessStatus::Blocked
            && !task.inputs_consumed
            && task.lease.holder(tick).is_none()
    }

    /// Batches holding a slot of the in-flight budget
    fn in_flight(&self, tick: Tick) -> usize {
        self.tasks.values().filter(|t| !Self::is_parked(t, tick)).count()
    }

    fn lowest_parked(&self, tick: Tick) -> Option<TaskId> {
        self.tasks
            .values()
            .filter(|t| Self::is_parked(t, tick))
            .min_by_key(|t| (OrderedFloat(t.score), std::cmp::Reverse(t.id)))
            .map(|t| t.id)
    }

    pub fn get(&self, id: TaskId) -> Option<&ProcessingTask> {
        self.tasks.get(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &ProcessingTask> {
        self.tasks.values()
    }

    /// Batches waiting for a worker or for inputs
    pub fn depth(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| matches!(t.status, ProcessStatus::Queued | ProcessStatus::Blocked))
            .count()
    }

    pub fn waiting_at(&self, station: Station) -> usize {
        self.tasks
            .values()
            .filter(|t| t.station == station && t.status != ProcessStatus::Done)
            .count()
    }

    /// Keep the agent's current batch, or claim the best open batch at
    /// `station` (any station when `None`). Blocked batches are skipped.
    pub fn claim(
        &mut self,
        agent: AgentId,
        station: Option<Station>,
        tick: Tick,
        lease_ticks: u64,
        survival_only: bool,
        catalog: &RecipeCatalog,
    ) -> Option<TaskId> {
        let eligible = |t: &ProcessingTask| {
            station.map_or(true, |s| t.station == s)
                && matches!(t.status, ProcessStatus::Queued | ProcessStatus::Active)
                && (!survival_only || catalog.get(&t.recipe_id).is_some_and(is_survival_recipe))
        };

        if let Some(task) = self
            .tasks
            .values()
            .find(|t| t.lease.is_held_by(agent, tick) && eligible(t))
        {
            return Some(task.id);
        }

        let best = self
            .tasks
            .values()
            .filter(|t| eligible(t) && t.lease.is_claimable_by(agent, tick))
            .max_by_key(|t| (OrderedFloat(t.score), std::cmp::Reverse(t.id)))
            .map(|t| t.id)?;

        self.release_agent(agent);
        let task = self.tasks.get_mut(&best)?;
        task.lease.claim(agent, tick, lease_ticks).then_some(best)
    }

    /// One tick of work by the claimant
    pub fn work(
        &mut self,
        id: TaskId,
        agent: AgentId,
        stockpile: &mut Stockpile,
        catalog: &RecipeCatalog,
        tick: Tick,
        lease_ticks: u64,
    ) -> WorkOutcome {
        let Some(task) = self.tasks.get_mut(&id) else {
            return WorkOutcome::NotHeld;
        };
        if !task.lease.is_held_by(agent, tick) || task.status == ProcessStatus::Done {
            return WorkOutcome::NotHeld;
        }
        let Some(recipe) = catalog.get(&task.recipe_id) else {
            task.status = ProcessStatus::Done;
            return WorkOutcome::NotHeld;
        };

        if !task.inputs_consumed {
            if !stockpile.consume_materials(&recipe.inputs) {
                task.status = ProcessStatus::Blocked;
                task.lease.release();
                return WorkOutcome::Blocked;
            }
            task.inputs_consumed = true;
            task.status = ProcessStatus::Active;
        }

        task.progress += 1;
        task.lease.renew(agent, tick, lease_ticks);
        if task.progress < task.duration {
            return WorkOutcome::Progressed;
        }

        let outputs = recipe
            .outputs
            .iter()
            .map(|(res, amount)| (*res, stockpile.add(*res, *amount)))
            .collect();
        task.status = ProcessStatus::Done;
        task.lease.release();
        WorkOutcome::Completed {
            recipe_id: task.recipe_id.clone(),
            outputs,
        }
    }

    pub fn release_agent(&mut self, agent: AgentId) {
        for task in self.tasks.values_mut() {
            if task.lease.claimed_by == Some(agent) {
                task.lease.release();
            }
        }
    }
}
