//! Wall plans: a textured, closed palisade ring around the start outpost
//!
//! `create_wall_plan` samples a noisy polar perimeter, rasterizes it,
//! bridges gaps with straight-line insertions, checks the active tiles form
//! a single 8-connected component, prunes dangling caps, and escalates the
//! radius until the ring is whole with an acceptable blocked fraction.

use std::collections::{BTreeMap, BTreeSet};
use std::f32::consts::TAU;

use ordered_float::OrderedFloat;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::config::WallConfig;
use crate::core::rng::{coord_part, DetRng};
use crate::core::types::{AgentId, Tick, TilePos};
use crate::tasks::Lease;
use crate::world::map::WorldMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WallTileStatus {
    Blocked,
    Planned,
    /// Planned and reserved by a builder
    Reserved,
    Built,
}

impl WallTileStatus {
    /// Counts toward ring continuity
    pub fn is_active(&self) -> bool {
        !matches!(self, WallTileStatus::Blocked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WallTile {
    pub status: WallTileStatus,
    pub reservation: Lease,
    /// Set when a built segment went missing; cleared on repair
    pub breached_tick: Option<Tick>,
}

impl WallTile {
    fn new(status: WallTileStatus) -> Self {
        Self {
            status,
            reservation: Lease::default(),
            breached_tick: None,
        }
    }
}

/// Authoritative record of standing wall segments. Hostiles and tests
/// remove segments here; the plan notices on its next refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WallRegistry {
    segments: BTreeMap<TilePos, Tick>,
}

impl WallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pos: TilePos, tick: Tick) {
        self.segments.insert(pos, tick);
    }

    pub fn remove(&mut self, pos: TilePos) -> bool {
        self.segments.remove(&pos).is_some()
    }

    pub fn contains(&self, pos: TilePos) -> bool {
        self.segments.contains_key(&pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = TilePos> + '_ {
        self.segments.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Inputs for plan generation
pub struct PlanInputs<'a> {
    pub map: &'a WorldMap,
    pub center: TilePos,
    /// Outlying homes and outpost centers the ring should enclose
    pub anchors: &'a [TilePos],
    pub registry: &'a WallRegistry,
    pub rng: &'a DetRng,
    pub footprint: u64,
    pub tick: Tick,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallPlan {
    pub center: TilePos,
    pub radius: i32,
    /// Perimeter keys in angular order
    pub order: Vec<TilePos>,
    pub tiles: BTreeMap<TilePos, WallTile>,
    pub continuity_gaps: u32,
    pub blocked_ratio: f32,
    pub completed_at_tick: Option<Tick>,
    pub footprint: u64,
    pub created_tick: Tick,
}

/// What a per-tick refresh found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub breaches: Vec<TilePos>,
    pub needs_replan: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built { repaired: bool },
    NotReserved,
}

/// Tiles a wall can never occupy
pub fn is_wall_blocked(map: &WorldMap, center: TilePos, pos: TilePos) -> bool {
    !map.in_bounds(pos) || map.is_water(pos) || pos == center || map.is_site_tile(pos)
}

/// Integer line from `a` to `b`, both endpoints included
pub fn bresenham(a: TilePos, b: TilePos) -> Vec<TilePos> {
    let mut points = Vec::new();
    let (mut x, mut y) = (a.x, a.y);
    let dx = (b.x - a.x).abs();
    let dy = -(b.y - a.y).abs();
    let sx = if a.x < b.x { 1 } else { -1 };
    let sy = if a.y < b.y { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        points.push(TilePos::new(x, y));
        if x == b.x && y == b.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
    points
}

fn angle_key(center: TilePos, pos: TilePos) -> (OrderedFloat<f32>, i32, i32) {
    let dx = (pos.x - center.x) as f32;
    let dy = (pos.y - center.y) as f32;
    (OrderedFloat(dx.atan2(-dy)), pos.y, pos.x)
}

/// Generate a plan, escalating the radius until the ring is whole and
/// mostly buildable; falls back to the largest-radius attempt.
pub fn create_wall_plan(inputs: &PlanInputs<'_>, config: &WallConfig) -> WallPlan {
    let mut radius = config.base_radius;
    loop {
        let plan = plan_at_radius(inputs, config, radius);
        let acceptable =
            plan.continuity_gaps == 0 && plan.blocked_ratio <= config.max_blocked_ratio;
        if acceptable || radius >= config.max_radius {
            return plan;
        }
        radius += 1;
    }
}

fn plan_at_radius(inputs: &PlanInputs<'_>, config: &WallConfig, radius: i32) -> WallPlan {
    let center = inputs.center;
    let mut stream = inputs.rng.stream(
        "wall-texture",
        &[coord_part(center.x), coord_part(center.y), radius as u64],
    );
    let samples = config
        .min_samples
        .max(radius.max(1) as usize * config.samples_per_radius);

    let mut points = Vec::with_capacity(samples);
    for i in 0..samples {
        let angle = i as f32 / samples as f32 * TAU;
        let noise: f32 = stream.gen();
        let mut r = (radius as f32 + (noise - 0.5) * config.texture_jitter * 2.0).max(1.5);

        for anchor in inputs.anchors {
            let d = anchor.distance(&center);
            if d <= r || d > radius as f32 + config.anchor_margin {
                continue;
            }
            let anchor_angle = ((anchor.y - center.y) as f32).atan2((anchor.x - center.x) as f32);
            let mut delta = (angle - anchor_angle).abs() % TAU;
            if delta > TAU / 2.0 {
                delta = TAU - delta;
            }
            if delta < 0.35 {
                r += (d + 1.5 - r) * config.anchor_pull * (1.0 - delta / 0.35);
            }
        }

        points.push(TilePos::new(
            center.x + (angle.cos() * r).round() as i32,
            center.y + (angle.sin() * r).round() as i32,
        ));
    }

    let mut keys: BTreeSet<TilePos> = BTreeSet::new();
    for (i, point) in points.iter().enumerate() {
        let next = points[(i + 1) % points.len()];
        keys.extend(bresenham(*point, next));
    }

    let mut plan = WallPlan {
        center,
        radius,
        order: Vec::new(),
        tiles: BTreeMap::new(),
        continuity_gaps: 0,
        blocked_ratio: 0.0,
        completed_at_tick: None,
        footprint: inputs.footprint,
        created_tick: inputs.tick,
    };
    for key in keys {
        let status = if is_wall_blocked(inputs.map, center, key) {
            WallTileStatus::Blocked
        } else if inputs.registry.contains(key) {
            WallTileStatus::Built
        } else {
            WallTileStatus::Planned
        };
        plan.tiles.insert(key, WallTile::new(status));
    }
    plan.sort_order();

    plan.continuity_gaps = plan.enforce_continuity(inputs.map);
    plan.prune_caps();
    plan.update_blocked_ratio();
    plan
}

impl WallPlan {
    fn sort_order(&mut self) {
        let center = self.center;
        let mut order: Vec<TilePos> = self.tiles.keys().copied().collect();
        order.sort_by_key(|p| angle_key(center, *p));
        self.order = order;
    }

    fn is_active(&self, pos: TilePos) -> bool {
        self.tiles.get(&pos).is_some_and(|t| t.status.is_active())
    }

    fn active_neighbors(&self, pos: TilePos) -> usize {
        pos.neighbors().iter().filter(|n| self.is_active(**n)).count()
    }

    /// Bridge consecutive active keys; returns the number of gaps left
    fn enforce_continuity(&mut self, map: &WorldMap) -> u32 {
        let active: Vec<TilePos> = self
            .order
            .iter()
            .copied()
            .filter(|p| self.is_active(*p))
            .collect();
        if active.is_empty() {
            return 1;
        }

        let mut gaps = 0;
        for (i, a) in active.iter().enumerate() {
            let b = active[(i + 1) % active.len()];
            if a.chebyshev(&b) <= 1 {
                continue;
            }
            let line = bresenham(*a, b);
            if line.iter().any(|p| is_wall_blocked(map, self.center, *p)) {
                gaps += 1;
                continue;
            }
            for p in line {
                let tile = self
                    .tiles
                    .entry(p)
                    .or_insert_with(|| WallTile::new(WallTileStatus::Planned));
                if !tile.status.is_active() {
                    tile.status = WallTileStatus::Planned;
                }
            }
        }
        self.sort_order();

        let components = self.component_count();
        gaps + components.saturating_sub(1) as u32
    }

    /// 8-connected components among active tiles
    pub fn component_count(&self) -> usize {
        let mut seen: BTreeSet<TilePos> = BTreeSet::new();
        let mut components = 0;
        for start in self.tiles.iter().filter(|(_, t)| t.status.is_active()).map(|(p, _)| *p) {
            if !seen.insert(start) {
                continue;
            }
            components += 1;
            let mut stack = vec![start];
            while let Some(pos) = stack.pop() {
                for n in pos.neighbors() {
                    if self.is_active(n) && seen.insert(n) {
                        stack.push(n);
                    }
                }
            }
        }
        components
    }

    /// Planned tiles with at most one active neighbor become blocked, to a fixpoint
    fn prune_caps(&mut self) {
        loop {
            let caps: Vec<TilePos> = self
                .tiles
                .iter()
                .filter(|(p, t)| t.status == WallTileStatus::Planned && self.active_neighbors(**p) <= 1)
                .map(|(p, _)| *p)
                .collect();
            if caps.is_empty() {
                break;
            }
            for pos in caps {
                if let Some(tile) = self.tiles.get_mut(&pos) {
                    tile.status = WallTileStatus::Blocked;
                }
            }
        }
    }

    fn update_blocked_ratio(&mut self) {
        let blocked = self
            .tiles
            .values()
            .filter(|t| t.status == WallTileStatus::Blocked)
            .count();
        self.blocked_ratio = if self.tiles.is_empty() {
            1.0
        } else {
            blocked as f32 / self.tiles.len() as f32
        };
    }

    /// Per-tick upkeep: expire reservations, block planned tiles whose
    /// terrain changed, reopen breached segments, detect a broken ring.
    pub fn refresh(&mut self, map: &WorldMap, registry: &WallRegistry, tick: Tick) -> RefreshReport {
        let mut report = RefreshReport::default();
        let center = self.center;
        for (pos, tile) in self.tiles.iter_mut() {
            if tile.reservation.expire(tick) && tile.status == WallTileStatus::Reserved {
                tile.status = WallTileStatus::Planned;
            }
            match tile.status {
                WallTileStatus::Planned | WallTileStatus::Reserved => {
                    if is_wall_blocked(map, center, *pos) {
                        if tile.status == WallTileStatus::Reserved {
                            report.needs_replan = true;
                        }
                        tile.status = WallTileStatus::Blocked;
                        tile.reservation.release();
                    } else if registry.contains(*pos) {
                        tile.status = WallTileStatus::Built;
                        tile.reservation.release();
                    }
                }
                WallTileStatus::Built => {
                    if !registry.contains(*pos) {
                        tile.status = WallTileStatus::Planned;
                        tile.breached_tick = Some(tick);
                        report.breaches.push(*pos);
                    }
                }
                WallTileStatus::Blocked => {}
            }
        }
        if !report.breaches.is_empty() {
            self.completed_at_tick = None;
        }
        if self.continuity_gaps == 0 && self.component_count() > 1 {
            report.needs_replan = true;
        }
        self.update_blocked_ratio();
        report
    }

    /// Keep the agent's reservation or reserve the best open segment:
    /// breached first, then nearest the threat (or the builder)
    pub fn claim_segment(
        &mut self,
        agent: AgentId,
        from: TilePos,
        threat: Option<TilePos>,
        tick: Tick,
        lease_ticks: u64,
    ) -> Option<TilePos> {
        if let Some((pos, _)) = self
            .tiles
            .iter()
            .find(|(_, t)| t.status == WallTileStatus::Reserved && t.reservation.is_held_by(agent, tick))
        {
            return Some(*pos);
        }

        let focus = threat.unwrap_or(from);
        let best = self
            .tiles
            .iter()
            .filter(|(_, t)| {
                t.status == WallTileStatus::Planned
                    || (t.status == WallTileStatus::Reserved && t.reservation.is_claimable_by(agent, tick))
            })
            .min_by_key(|(p, t)| (t.breached_tick.is_none(), OrderedFloat(focus.distance(p)), **p))
            .map(|(p, _)| *p)?;

        self.release_agent(agent);
        let tile = self.tiles.get_mut(&best)?;
        tile.status = WallTileStatus::Reserved;
        tile.reservation.claim(agent, tick, lease_ticks).then_some(best)
    }

    /// Finish a reserved segment
    pub fn build(
        &mut self,
        pos: TilePos,
        agent: AgentId,
        tick: Tick,
        registry: &mut WallRegistry,
    ) -> BuildOutcome {
        let Some(tile) = self.tiles.get_mut(&pos) else {
            return BuildOutcome::NotReserved;
        };
        if tile.status != WallTileStatus::Reserved || !tile.reservation.is_held_by(agent, tick) {
            return BuildOutcome::NotReserved;
        }
        let repaired = tile.breached_tick.take().is_some();
        tile.status = WallTileStatus::Built;
        tile.reservation.release();
        registry.insert(pos, tick);
        BuildOutcome::Built { repaired }
    }

    pub fn release_agent(&mut self, agent: AgentId) {
        for tile in self.tiles.values_mut() {
            if tile.status == WallTileStatus::Reserved && tile.reservation.claimed_by == Some(agent) {
                tile.status = WallTileStatus::Planned;
                tile.reservation.release();
            }
        }
    }

    pub fn count(&self, status: WallTileStatus) -> usize {
        self.tiles.values().filter(|t| t.status == status).count()
    }

    /// Segments still to build
    pub fn backlog(&self) -> usize {
        self.count(WallTileStatus::Planned) + self.count(WallTileStatus::Reserved)
    }

    /// Built fraction of the buildable ring
    pub fn coverage(&self) -> f32 {
        let built = self.count(WallTileStatus::Built);
        let total = built + self.backlog();
        if total == 0 {
            0.0
        } else {
            built as f32 / total as f32
        }
    }

    /// Stamp completion once nothing is left to build; true on the stamping tick
    pub fn maybe_complete(&mut self, tick: Tick) -> bool {
        if self.completed_at_tick.is_none()
            && self.backlog() == 0
            && self.count(WallTileStatus::Built) > 0
        {
            self.completed_at_tick = Some(tick);
            return true;
        }
        false
    }

    pub fn breached(&self) -> impl Iterator<Item = TilePos> + '_ {
        self.tiles
            .iter()
            .filter(|(_, t)| t.breached_tick.is_some())
            .map(|(p, _)| *p)
    }
}
