//! Threat memory and the per-goblin threat response machine
//!
//! Memory holds what the tribe knows: hostiles spotted from home or by
//! lookouts, and recent wall breaches. Confidence fades linearly after the
//! last sighting. The response machine moves each goblin between `None`,
//! `Defend`, `Flee` and `Regroup` from hostile distance and fitness, with a
//! deadlock breaker for goblins that cannot close on their target.

use std::collections::{BTreeMap, VecDeque};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::core::config::ThreatConfig;
use crate::core::types::{AgentId, HostileId, ThreatId, Tick, TilePos};
use crate::entity::agent::{Agent, ThreatMode};
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::events::EventKind;
use crate::world::hostile::{nearest_hostile, Hostile};

const MAX_RECENT_BREACHES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    Hostile,
    Breach,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub id: ThreatId,
    pub kind: ThreatKind,
    pub source: Option<HostileId>,
    pub pos: TilePos,
    /// 0-1; 1 on the tick of the last sighting
    pub confidence: f32,
    pub first_seen: Tick,
    pub last_seen: Tick,
    /// Last tick a `ThreatSpotted` event went out for this record
    pub last_reported: Tick,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatMemory {
    records: BTreeMap<ThreatId, ThreatRecord>,
    next_id: u32,
    pub recent_breaches: VecDeque<(TilePos, Tick)>,
}

/// A sighting that deserves a chronicle entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub threat: ThreatId,
    pub hostile: HostileId,
    pub pos: TilePos,
}

impl ThreatMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> ThreatId {
        let id = ThreatId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Update or create the record for a seen hostile. Returns a sighting
    /// when the record is new or the last report is older than `interval`.
    pub fn observe_hostile(
        &mut self,
        hostile: &Hostile,
        tick: Tick,
        interval: u64,
    ) -> Option<Sighting> {
        let existing = self
            .records
            .values_mut()
            .find(|r| r.source == Some(hostile.id));
        let record = match existing {
            Some(record) => record,
            None => {
                let id = self.allocate();
                self.records.insert(
                    id,
                    ThreatRecord {
                        id,
                        kind: ThreatKind::Hostile,
                        source: Some(hostile.id),
                        pos: hostile.pos,
                        confidence: 1.0,
                        first_seen: tick,
                        last_seen: tick,
                        last_reported: tick,
                    },
                );
                return Some(Sighting {
                    threat: id,
                    hostile: hostile.id,
                    pos: hostile.pos,
                });
            }
        };
        record.pos = hostile.pos;
        record.confidence = 1.0;
        record.last_seen = tick;
        if tick.saturating_sub(record.last_reported) >= interval {
            record.last_reported = tick;
            return Some(Sighting {
                threat: record.id,
                hostile: hostile.id,
                pos: hostile.pos,
            });
        }
        None
    }

    pub fn record_breach(&mut self, pos: TilePos, tick: Tick) -> ThreatId {
        let id = self.allocate();
        self.records.insert(
            id,
            ThreatRecord {
                id,
                kind: ThreatKind::Breach,
                source: None,
                pos,
                confidence: 0.8,
                first_seen: tick,
                last_seen: tick,
                last_reported: tick,
            },
        );
        self.recent_breaches.push_back((pos, tick));
        while self.recent_breaches.len() > MAX_RECENT_BREACHES {
            self.recent_breaches.pop_front();
        }
        id
    }

    /// Fade confidence and forget dead hostiles and stale records
    pub fn decay(&mut self, hostiles: &BTreeMap<HostileId, Hostile>, tick: Tick, config: &ThreatConfig) {
        let window = config.memory_decay_ticks.max(1) as f32;
        self.records.retain(|_, record| {
            if let Some(source) = record.source {
                if !hostiles.get(&source).is_some_and(|h| h.alive) {
                    return false;
                }
            }
            let age = tick.saturating_sub(record.last_seen) as f32;
            let base = match record.kind {
                ThreatKind::Hostile => 1.0,
                ThreatKind::Breach => 0.8,
            };
            record.confidence = base * (1.0 - age / window);
            record.confidence > 0.0
        });
    }

    /// Most confident record at or above `min_confidence`; ties go to the
    /// most recent, then the lowest id
    pub fn strongest(&self, min_confidence: f32) -> Option<&ThreatRecord> {
        self.records
            .values()
            .filter(|r| r.confidence >= min_confidence)
            .max_by_key(|r| (OrderedFloat(r.confidence), r.last_seen, std::cmp::Reverse(r.id)))
    }

    pub fn get(&self, id: ThreatId) -> Option<&ThreatRecord> {
        self.records.get(&id)
    }

    /// An investigator reached the spot; drop the record unless its
    /// hostile is still right there
    pub fn investigate(
        &mut self,
        id: ThreatId,
        hostiles: &BTreeMap<HostileId, Hostile>,
        radius: f32,
    ) -> bool {
        let Some(record) = self.records.get(&id) else {
            return true;
        };
        let still_there = record
            .source
            .and_then(|s| hostiles.get(&s))
            .is_some_and(|h| h.alive && h.pos.distance(&record.pos) <= radius);
        if !still_there {
            self.records.remove(&id);
        }
        !still_there
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Share of living hostiles the tribe currently tracks with good confidence
    pub fn intel_coverage(&self, hostiles: &BTreeMap<HostileId, Hostile>) -> f32 {
        let live: Vec<HostileId> = hostiles.values().filter(|h| h.alive).map(|h| h.id).collect();
        if live.is_empty() {
            return 1.0;
        }
        let tracked = live
            .iter()
            .filter(|id| {
                self.records
                    .values()
                    .any(|r| r.source == Some(**id) && r.confidence >= 0.5)
            })
            .count();
        tracked as f32 / live.len() as f32
    }
}

/// Sweep for hostiles visible from home or from any lookout, scout or
/// sentinel, then decay memory
pub fn ingest_threats(ctx: &mut SimulationContext) {
    let cfg = ctx.config.threat.clone();
    let home = ctx.start_center();
    let watchers: Vec<(AgentId, TilePos)> = ctx
        .agents
        .values()
        .filter(|a| a.is_active() && matches!(a.role, Role::Lookout | Role::Scout | Role::Sentinel))
        .map(|a| (a.id, a.pos))
        .collect();

    let mut sightings = Vec::new();
    for hostile in ctx.hostiles.values().filter(|h| h.alive) {
        let near_home = hostile.pos.distance(&home) <= cfg.home_alert_radius;
        let spotter = watchers
            .iter()
            .find(|(_, pos)| pos.distance(&hostile.pos) <= cfg.lookout_detection_radius)
            .map(|(id, _)| *id);
        if !near_home && spotter.is_none() {
            continue;
        }
        if let Some(sighting) =
            ctx.threat_memory
                .observe_hostile(hostile, ctx.tick, cfg.spot_event_interval)
        {
            sightings.push((sighting, spotter));
        }
    }
    for (sighting, spotter) in sightings {
        ctx.emit(
            EventKind::ThreatSpotted {
                threat: sighting.threat,
                hostile: sighting.hostile,
                pos: sighting.pos,
            },
            spotter.into_iter().collect(),
            format!("{} spotted at {}", sighting.hostile, sighting.pos),
        );
    }

    let tick = ctx.tick;
    ctx.threat_memory.decay(&ctx.hostiles, tick, &cfg);
}

/// Weighted count of living hostiles within `radius`
fn local_hostile_weight(hostiles: &BTreeMap<HostileId, Hostile>, pos: TilePos, radius: f32) -> f32 {
    hostiles
        .values()
        .filter(|h| h.alive && h.pos.distance(&pos) <= radius)
        .map(|h| h.kind.threat_weight())
        .sum()
}

/// Fit to stand and fight: vitals within limits and not outnumbered
pub fn is_fit_to_defend(agent: &Agent, local_weight: f32, config: &ThreatConfig) -> bool {
    let bonus = if agent.role == Role::Sentinel {
        config.sentinel_vitality_bonus
    } else {
        0.0
    };
    agent.vitals.vitality + bonus >= config.min_vitality
        && agent.vitals.morale >= config.min_morale
        && agent.vitals.stress <= config.max_stress
        && local_weight <= config.max_local_hostiles
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Decision {
    mode: ThreatMode,
    hostile: Option<HostileId>,
    target: Option<TilePos>,
    from: Option<TilePos>,
    score: f32,
}

impl Decision {
    fn none() -> Self {
        Self {
            mode: ThreatMode::None,
            hostile: None,
            target: None,
            from: None,
            score: 0.0,
        }
    }
}

/// 0-100: closeness within the local radius plus a bonus per extra
/// hostile in the cluster
pub fn threat_score(distance: f32, local_weight: f32, config: &ThreatConfig) -> f32 {
    let radius = config.local_radius.max(f32::EPSILON);
    let closeness = (config.local_radius - distance).max(0.0) / radius;
    let cluster = (local_weight - 1.0).max(0.0) * config.cluster_score;
    ((closeness + cluster) * 100.0).clamp(0.0, 100.0)
}

/// Nearest built wall within reach of home, else home itself
fn flee_target(ctx: &SimulationContext, agent: &Agent) -> TilePos {
    let radius = ctx.config.threat.flee_wall_radius;
    ctx.walls
        .iter()
        .filter(|w| w.distance(&agent.home) <= radius && ctx.occupancy.is_free_for(*w, agent.id))
        .min_by_key(|w| (OrderedFloat(w.distance(&agent.pos)), *w))
        .unwrap_or(agent.home)
}

fn decide(ctx: &SimulationContext, agent: &Agent) -> Decision {
    let cfg = &ctx.config.threat;
    let Some((hostile, distance)) = nearest_hostile(&ctx.hostiles, agent.pos) else {
        return memory_decision(ctx, agent);
    };

    if distance > cfg.local_radius {
        return memory_decision(ctx, agent);
    }
    let local = local_hostile_weight(&ctx.hostiles, agent.pos, cfg.local_radius);
    let score = threat_score(distance, local, cfg);
    if distance > cfg.direct_radius {
        return Decision {
            mode: ThreatMode::Regroup,
            hostile: Some(hostile.id),
            target: Some(ctx.rally_point()),
            from: None,
            score,
        };
    }
    if is_fit_to_defend(agent, local, cfg) {
        return Decision {
            mode: ThreatMode::Defend,
            hostile: Some(hostile.id),
            target: Some(hostile.pos),
            from: None,
            score,
        };
    }
    Decision {
        mode: ThreatMode::Flee,
        hostile: Some(hostile.id),
        target: Some(flee_target(ctx, agent)),
        from: Some(hostile.pos),
        score,
    }
}

fn memory_decision(ctx: &SimulationContext, agent: &Agent) -> Decision {
    let cfg = &ctx.config.threat;
    match agent.threat.last_seen_tick {
        Some(seen) if ctx.tick.saturating_sub(seen) <= cfg.response_memory_ticks => Decision {
            mode: ThreatMode::Regroup,
            hostile: agent.threat.hostile,
            target: Some(ctx.rally_point()),
            from: None,
            score: cfg.memory_regroup_score,
        },
        _ => Decision::none(),
    }
}

/// Run the response machine for every living goblin and set the tribe
/// alert level to the highest score
pub fn update_threat_responses(ctx: &mut SimulationContext) {
    let ids: Vec<AgentId> = ctx.agents.keys().copied().collect();
    let cfg = ctx.config.threat.clone();
    let tick = ctx.tick;
    let mut alert: f32 = 0.0;

    for id in ids {
        let Some(mut agent) = ctx.agents.remove(&id) else {
            continue;
        };
        if !agent.is_active() {
            ctx.agents.insert(id, agent);
            continue;
        }

        let previous = agent.threat.mode;
        let decision = if tick < agent.threat.suppressed_until {
            Decision::none()
        } else {
            decide(ctx, &agent)
        };

        if let Some((_, d)) = nearest_hostile(&ctx.hostiles, agent.pos) {
            if d <= cfg.local_radius && tick >= agent.threat.suppressed_until {
                agent.threat.last_seen_tick = Some(tick);
            }
        }

        let threat = &mut agent.threat;
        threat.mode = decision.mode;
        threat.hostile = decision.hostile;
        threat.target = decision.target;
        threat.from = decision.from;
        threat.score = decision.score;

        if threat.mode != previous {
            threat.best_distance = f32::MAX;
            threat.last_progress_tick = tick;
        }

        let mut suppressed = false;
        if let Some(target) = threat.target.filter(|_| threat.mode != ThreatMode::None) {
            let distance = agent.pos.distance(&target);
            if distance < threat.best_distance - 1e-3 || agent.pos.chebyshev(&target) <= 1 {
                threat.best_distance = threat.best_distance.min(distance);
                threat.last_progress_tick = tick;
            } else if tick.saturating_sub(threat.last_progress_tick) >= cfg.deadlock_ticks {
                threat.mode = ThreatMode::None;
                threat.hostile = None;
                threat.target = None;
                threat.from = None;
                threat.score = 0.0;
                threat.suppressed_until = tick + cfg.suppression_ticks;
                threat.last_seen_tick = None;
                suppressed = true;
            }
        }

        alert = alert.max(agent.threat.score);
        let mode = agent.threat.mode;
        if suppressed {
            let until = agent.threat.suppressed_until;
            tracing::debug!("{} gave up threat response until tick {}", agent.id, until);
            ctx.emit(
                EventKind::ThreatResponseSuppressed { until },
                vec![agent.id],
                format!("{} cannot reach the threat and stands down", agent.name),
            );
        }
        if mode != previous {
            let due = agent
                .threat
                .last_event_tick
                .map_or(true, |last| tick.saturating_sub(last) >= cfg.mode_event_cooldown);
            if due {
                agent.threat.last_event_tick = Some(tick);
                ctx.emit(
                    EventKind::ThreatModeChanged {
                        from: previous,
                        to: mode,
                    },
                    vec![agent.id],
                    format!("{} switches from {:?} to {:?}", agent.name, previous, mode),
                );
            }
        }
        ctx.agents.insert(id, agent);
    }
    ctx.alert_level = alert.clamp(0.0, 100.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::SimulationConfig;
    use crate::core::rng::DetRng;
    use crate::world::hostile::HostileKind;
    use crate::world::map::WorldMap;

    fn context() -> SimulationContext {
        SimulationContext::new(
            SimulationConfig::default(),
            WorldMap::new(16, 16),
            DetRng::new(5),
            "Ashcap",
            TilePos::new(32, 32),
        )
        .unwrap()
    }

    #[test]
    fn test_fit_goblin_defends_and_weak_goblin_flees() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        let brave = ctx.spawn_agent_at("Brave", TilePos::new(20, 20), start, Role::Sentinel).unwrap();
        let weak = ctx.spawn_agent_at("Weak", TilePos::new(24, 20), start, Role::Forager).unwrap();
        ctx.agents.get_mut(&weak).unwrap().vitals.vitality = 30.0;
        ctx.spawn_hostile(HostileKind::Wolf, TilePos::new(22, 22));

        update_threat_responses(&mut ctx);
        assert_eq!(ctx.agents[&brave].threat.mode, ThreatMode::Defend);
        assert_eq!(ctx.agents[&weak].threat.mode, ThreatMode::Flee);
        let expected = threat_score(TilePos::new(20, 20).distance(&TilePos::new(22, 22)), 1.0, &ctx.config.threat);
        assert!((ctx.alert_level - expected).abs() < 1e-4);
        assert_eq!(
            ctx.events
                .iter()
                .filter(|e| matches!(e.kind, EventKind::ThreatModeChanged { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_threat_score_grows_with_closeness_and_cluster() {
        let cfg = ThreatConfig::default();
        assert_eq!(threat_score(cfg.local_radius, 1.0, &cfg), 0.0);
        assert!((threat_score(4.5, 1.0, &cfg) - 50.0).abs() < 1e-4);
        // Two wolves add one cluster step; a barbarian weighs as two
        assert!((threat_score(4.5, 2.0, &cfg) - 68.0).abs() < 1e-4);
        assert_eq!(threat_score(0.0, 4.0, &cfg), 100.0);
    }

    #[test]
    fn test_local_hostile_regroups_then_memory_fades() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        let id = ctx.spawn_agent_at("Grib", TilePos::new(10, 10), start, Role::Forager).unwrap();
        let wolf = ctx.spawn_hostile(HostileKind::Wolf, TilePos::new(17, 10));

        ctx.tick = 1;
        update_threat_responses(&mut ctx);
        assert_eq!(ctx.agents[&id].threat.mode, ThreatMode::Regroup);

        ctx.hostiles.get_mut(&wolf).unwrap().alive = false;
        ctx.tick = 15;
        update_threat_responses(&mut ctx);
        assert_eq!(ctx.agents[&id].threat.mode, ThreatMode::Regroup);
        ctx.tick = 16;
        update_threat_responses(&mut ctx);
        assert_eq!(ctx.agents[&id].threat.mode, ThreatMode::None);
    }

    #[test]
    fn test_deadlock_breaker_suppresses_response() {
        let mut ctx = context();
        let start = ctx.start_outpost;
        let id = ctx.spawn_agent_at("Stuck", TilePos::new(10, 10), start, Role::Sentinel).unwrap();
        ctx.spawn_hostile(HostileKind::Wolf, TilePos::new(13, 10));

        // the goblin never moves, so after the first tick there is no progress
        for tick in 1..=25 {
            ctx.tick = tick;
            update_threat_responses(&mut ctx);
        }
        let agent = &ctx.agents[&id];
        assert_eq!(agent.threat.mode, ThreatMode::None);
        assert_eq!(agent.threat.suppressed_until, 25 + 40);
        assert!(ctx
            .events
            .iter()
            .any(|e| matches!(e.kind, EventKind::ThreatResponseSuppressed { .. })));

        ctx.tick = 30;
        update_threat_responses(&mut ctx);
        assert_eq!(ctx.agents[&id].threat.mode, ThreatMode::None);
    }

    #[test]
    fn test_memory_tracks_and_forgets() {
        let config = ThreatConfig::default();
        let mut memory = ThreatMemory::new();
        let mut hostiles = BTreeMap::new();
        let wolf = Hostile::new(HostileId(1), HostileKind::Wolf, TilePos::new(3, 3));
        hostiles.insert(wolf.id, wolf.clone());

        assert!(memory.observe_hostile(&wolf, 0, 10).is_some());
        assert!(memory.observe_hostile(&wolf, 5, 10).is_none());
        assert!(memory.observe_hostile(&wolf, 10, 10).is_some());
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.intel_coverage(&hostiles), 1.0);

        memory.decay(&hostiles, 90, &config);
        let record = memory.strongest(0.0).unwrap();
        assert!((record.confidence - 0.5).abs() < 1e-4);
        assert_eq!(memory.intel_coverage(&hostiles), 1.0);

        hostiles.get_mut(&HostileId(1)).unwrap().alive = false;
        memory.decay(&hostiles, 91, &config);
        assert!(memory.is_empty());
    }
}
