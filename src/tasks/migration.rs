//! Migration jobs: moving a goblin's home to another outpost
//!
//! A job's lease doubles as its progress watchdog. It is claimed for
//! `no_progress_ticks` and renewed whenever the migrant gets closer to its
//! destination slot than ever before, so a lapsed lease means the goblin
//! has been stuck for the whole window.

use std::collections::BTreeMap;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::core::config::MigrationConfig;
use crate::core::types::{AgentId, JobId, OutpostId, Tick, TilePos};
use crate::tasks::Lease;

#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    #[display(fmt = "NO_PROGRESS")]
    NoProgress,
    #[display(fmt = "TIMEOUT")]
    Timeout,
    #[display(fmt = "DESTINATION_MISSING")]
    DestinationMissing,
    #[display(fmt = "GOBLIN_UNAVAILABLE")]
    GoblinUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum MigrationStatus {
    Active,
    Completed,
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub id: JobId,
    pub agent: AgentId,
    pub from: OutpostId,
    pub to: OutpostId,
    /// Home slot reserved at the destination
    pub slot: TilePos,
    pub started_tick: Tick,
    pub best_distance: f32,
    pub last_progress_tick: Tick,
    pub reroutes: u32,
    pub retargets: u32,
    pub status: MigrationStatus,
    /// Part of an evacuation rather than a voluntary move
    pub evacuation: bool,
    pub lease: Lease,
}

/// Result of checking a migrant's position against its job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Advancing,
    Arrived,
    /// Lease lapsed without getting closer
    Stalled,
    TimedOut,
}

impl MigrationJob {
    pub fn is_active(&self) -> bool {
        self.status == MigrationStatus::Active
    }

    /// Compare the migrant's position with its best so far
    pub fn observe(&mut self, pos: TilePos, tick: Tick, config: &MigrationConfig) -> Progress {
        if tick.saturating_sub(self.started_tick) > config.timeout_ticks {
            return Progress::TimedOut;
        }
        let distance = pos.distance(&self.slot);
        if distance <= config.arrival_radius {
            return Progress::Arrived;
        }
        if distance < self.best_distance - 1e-3 {
            self.best_distance = distance;
            self.last_progress_tick = tick;
            self.lease.claim(self.agent, tick, config.no_progress_ticks);
            return Progress::Advancing;
        }
        if self.lease.holder(tick).is_none() {
            return Progress::Stalled;
        }
        Progress::Advancing
    }

    /// New home slot at the same destination
    pub fn reroute(&mut self, slot: TilePos, tick: Tick, config: &MigrationConfig) {
        self.reroutes += 1;
        self.restart(slot, tick, config);
    }

    /// New destination outpost; the reroute budget starts over
    pub fn retarget(&mut self, to: OutpostId, slot: TilePos, tick: Tick, config: &MigrationConfig) {
        self.retargets += 1;
        self.reroutes = 0;
        self.to = to;
        self.restart(slot, tick, config);
    }

    fn restart(&mut self, slot: TilePos, tick: Tick, config: &MigrationConfig) {
        self.slot = slot;
        self.best_distance = f32::MAX;
        self.last_progress_tick = tick;
        self.lease.release();
        self.lease.claim(self.agent, tick, config.no_progress_ticks);
    }
}

/// Running totals across all migration jobs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationMetrics {
    pub started: u32,
    pub completed: u32,
    pub rerouted: u32,
    pub retargeted: u32,
    pub failed_timeout: u32,
    pub failed_destination_missing: u32,
    pub failed_goblin_unavailable: u32,
}

impl MigrationMetrics {
    pub fn record_failure(&mut self, reason: FailureReason) {
        match reason {
            FailureReason::Timeout => self.failed_timeout += 1,
            FailureReason::DestinationMissing | FailureReason::NoProgress => {
                self.failed_destination_missing += 1
            }
            FailureReason::GoblinUnavailable => self.failed_goblin_unavailable += 1,
        }
    }

    pub fn failed(&self) -> u32 {
        self.failed_timeout + self.failed_destination_missing + self.failed_goblin_unavailable
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationRegistry {
    jobs: BTreeMap<JobId, MigrationJob>,
    next_id: u32,
    pub metrics: MigrationMetrics,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a job; `None` if the agent already has an active one
    pub fn start(
        &mut self,
        agent: AgentId,
        from: OutpostId,
        to: OutpostId,
        slot: TilePos,
        tick: Tick,
        evacuation: bool,
        config: &MigrationConfig,
    ) -> Option<JobId> {
        if self.active_for(agent).is_some() {
            return None;
        }
        let id = JobId(self.next_id);
        self.next_id += 1;
        let mut lease = Lease::default();
        lease.claim(agent, tick, config.no_progress_ticks);
        self.jobs.insert(
            id,
            MigrationJob {
                id,
                agent,
                from,
                to,
                slot,
                started_tick: tick,
                best_distance: f32::MAX,
                last_progress_tick: tick,
                reroutes: 0,
                retargets: 0,
                status: MigrationStatus::Active,
                evacuation,
                lease,
            },
        );
        self.metrics.started += 1;
        Some(id)
    }

    pub fn get(&self, id: JobId) -> Option<&MigrationJob> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut MigrationJob> {
        self.jobs.get_mut(&id)
    }

    pub fn active_for(&self, agent: AgentId) -> Option<&MigrationJob> {
        self.jobs.values().find(|j| j.agent == agent && j.is_active())
    }

    pub fn active_ids(&self) -> Vec<JobId> {
        self.jobs
            .values()
            .filter(|j| j.is_active())
            .map(|j| j.id)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.jobs.values().filter(|j| j.is_active()).count()
    }

    /// Voluntary (non-evacuation) jobs in flight
    pub fn voluntary_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.is_active() && !j.evacuation)
            .count()
    }

    pub fn complete(&mut self, id: JobId) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.status = MigrationStatus::Completed;
            job.lease.release();
            self.metrics.completed += 1;
        }
    }

    pub fn fail(&mut self, id: JobId, reason: FailureReason) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.status = MigrationStatus::Failed(reason);
            job.lease.release();
            self.metrics.record_failure(reason);
        }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &MigrationJob> {
        self.jobs.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_job(config: &MigrationConfig) -> (MigrationRegistry, JobId) {
        let mut registry = MigrationRegistry::new();
        let id = registry
            .start(AgentId(1), OutpostId(0), OutpostId(1), TilePos::new(40, 0), 0, false, config)
            .unwrap();
        (registry, id)
    }

    #[test]
    fn test_one_active_job_per_agent() {
        let config = MigrationConfig::default();
        let (mut registry, id) = registry_with_job(&config);
        assert!(registry
            .start(AgentId(1), OutpostId(0), OutpostId(2), TilePos::new(0, 40), 1, false, &config)
            .is_none());
        registry.complete(id);
        assert!(registry.active_for(AgentId(1)).is_none());
        assert_eq!(registry.metrics.completed, 1);
    }

    #[test]
    fn test_progress_renews_and_stall_lapses() {
        let config = MigrationConfig::default();
        let (mut registry, id) = registry_with_job(&config);
        let job = registry.get_mut(id).unwrap();

        assert_eq!(job.observe(TilePos::new(0, 0), 0, &config), Progress::Advancing);
        assert_eq!(job.observe(TilePos::new(5, 0), 10, &config), Progress::Advancing);
        assert_eq!(job.last_progress_tick, 10);
        // stuck at x=5 until the lease lapses at 10 + 40
        assert_eq!(job.observe(TilePos::new(5, 0), 49, &config), Progress::Advancing);
        assert_eq!(job.observe(TilePos::new(5, 0), 50, &config), Progress::Stalled);

        job.reroute(TilePos::new(40, 2), 50, &config);
        assert_eq!(job.reroutes, 1);
        assert_eq!(job.observe(TilePos::new(5, 0), 51, &config), Progress::Advancing);
    }

    #[test]
    fn test_arrival_and_timeout() {
        let config = MigrationConfig::default();
        let (mut registry, id) = registry_with_job(&config);
        let job = registry.get_mut(id).unwrap();
        assert_eq!(job.observe(TilePos::new(39, 1), 5, &config), Progress::Arrived);
        assert_eq!(job.observe(TilePos::new(0, 0), 601, &config), Progress::TimedOut);
    }

    #[test]
    fn test_retarget_resets_reroutes() {
        let config = MigrationConfig::default();
        let (mut registry, id) = registry_with_job(&config);
        let job = registry.get_mut(id).unwrap();
        job.reroute(TilePos::new(41, 0), 40, &config);
        job.reroute(TilePos::new(42, 0), 80, &config);
        job.retarget(OutpostId(2), TilePos::new(0, 40), 120, &config);
        assert_eq!((job.reroutes, job.retargets, job.to), (0, 1, OutpostId(2)));

        registry.fail(id, FailureReason::Timeout);
        assert_eq!(registry.metrics.failed_timeout, 1);
        assert_eq!(registry.metrics.failed(), 1);
        assert_eq!(
            registry.get(id).unwrap().status,
            MigrationStatus::Failed(FailureReason::Timeout)
        );
    }
}
