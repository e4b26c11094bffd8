//! Scenario builder: a small world and starting tribe for the runner and
//! integration tests
//!
//! The map is either hand-placed (water sources, nodes) or scattered from
//! the seed, or both. The starting tribe is staffed from the role planner
//! so the first tick already has a sensible mix.

use rand::Rng;

use crate::core::config::SimulationConfig;
use crate::core::error::{Result, SimError};
use crate::core::rng::DetRng;
use crate::core::types::TilePos;
use crate::entity::role::Role;
use crate::simulation::context::SimulationContext;
use crate::simulation::roles::{plan_role_demand, RoleDemandInputs};
use crate::simulation::tick::Simulation;
use crate::world::hostile::HostileKind;
use crate::world::map::{NodeKind, WorldMap};

const SYLLABLES: [&str; 16] = [
    "gr", "sn", "zik", "mog", "rat", "bl", "ug", "nak", "sk", "ib", "org", "lug", "wex", "tup", "dro", "ka",
];

/// Scattered node counts per kind
const SCATTER: [(NodeKind, usize); 6] = [
    (NodeKind::Mushroom, 6),
    (NodeKind::Herb, 4),
    (NodeKind::Fiber, 4),
    (NodeKind::Tree, 6),
    (NodeKind::Ore, 3),
    (NodeKind::Salvage, 2),
];
const SCATTER_WATER: usize = 3;

pub struct ScenarioBuilder {
    rng: DetRng,
    config: SimulationConfig,
    coarse_size: (i32, i32),
    center: Option<TilePos>,
    population: usize,
    scatter: bool,
    water: Vec<TilePos>,
    nodes: Vec<(TilePos, NodeKind)>,
    outposts: Vec<(String, TilePos, Vec<(Role, u32)>)>,
    hostiles: Vec<(HostileKind, TilePos)>,
    defenses: Vec<TilePos>,
}

impl ScenarioBuilder {
    /// Seeds are free text; the same text always builds the same world
    pub fn new(seed: &str) -> Self {
        Self {
            rng: DetRng::from_text(seed),
            config: SimulationConfig::default(),
            coarse_size: (16, 16),
            center: None,
            population: 12,
            scatter: true,
            water: Vec::new(),
            nodes: Vec::new(),
            outposts: Vec::new(),
            hostiles: Vec::new(),
            defenses: Vec::new(),
        }
    }

    pub fn population(mut self, n: usize) -> Self {
        self.population = n;
        self
    }

    /// Map size in coarse tiles
    pub fn size(mut self, coarse_width: i32, coarse_height: i32) -> Self {
        self.coarse_size = (coarse_width, coarse_height);
        self
    }

    pub fn center(mut self, center: TilePos) -> Self {
        self.center = Some(center);
        self
    }

    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Only hand-placed features
    pub fn without_scatter(mut self) -> Self {
        self.scatter = false;
        self
    }

    pub fn water_source(mut self, pos: TilePos) -> Self {
        self.water.push(pos);
        self
    }

    pub fn node(mut self, pos: TilePos, kind: NodeKind) -> Self {
        self.nodes.push((pos, kind));
        self
    }

    pub fn outpost(mut self, name: &str, center: TilePos, mix: &[(Role, u32)]) -> Self {
        self.outposts.push((name.to_string(), center, mix.to_vec()));
        self
    }

    pub fn hostile(mut self, kind: HostileKind, pos: TilePos) -> Self {
        self.hostiles.push((kind, pos));
        self
    }

    pub fn defense(mut self, pos: TilePos) -> Self {
        self.defenses.push(pos);
        self
    }

    pub fn build(self) -> Result<Simulation> {
        self.config.validate().map_err(SimError::InvalidConfig)?;

        let (cw, ch) = self.coarse_size;
        let mut map = WorldMap::new(cw, ch);
        let center = self
            .center
            .unwrap_or_else(|| TilePos::new(map.width / 2, map.height / 2));
        if !map.in_bounds(center) {
            return Err(SimError::OutOfBounds(center));
        }
        if self.scatter {
            scatter_features(&mut map, &self.rng, center);
        }
        for pos in &self.water {
            if !map.add_water_source(*pos) {
                return Err(SimError::OutOfBounds(*pos));
            }
        }
        for (pos, kind) in &self.nodes {
            if !map.add_node(*pos, *kind) {
                return Err(SimError::OutOfBounds(*pos));
            }
        }

        let mut ctx = SimulationContext::new(self.config, map, self.rng, "Ashcap", center)?;
        for (name, pos, mix) in &self.outposts {
            ctx.add_outpost(name, *pos, mix.iter().copied())?;
        }

        let plan = plan_role_demand(&RoleDemandInputs {
            population: self.population as u32,
            ..RoleDemandInputs::default()
        });
        let start = ctx.start_outpost;
        let roles: Vec<Role> = plan
            .iter()
            .flat_map(|(role, n)| std::iter::repeat(*role).take(*n as usize))
            .collect();
        for (i, role) in roles.into_iter().enumerate() {
            let name = goblin_name(&ctx.rng, i as u64);
            ctx.spawn_agent(&name, start, role)?;
        }
        ctx.role_plan = plan;

        for (kind, pos) in &self.hostiles {
            if !ctx.map.in_bounds(*pos) {
                return Err(SimError::OutOfBounds(*pos));
            }
            ctx.spawn_hostile(*kind, *pos);
        }
        let defense_config = ctx.config.defense.clone();
        for pos in &self.defenses {
            ctx.defenses.add(*pos, &defense_config);
        }

        tracing::info!(
            "Scenario built: {} goblins, {} outposts, {} hostiles",
            ctx.living_count(),
            ctx.outposts.len(),
            ctx.hostiles.len()
        );
        Ok(Simulation::new(ctx))
    }
}

fn goblin_name(rng: &DetRng, index: u64) -> String {
    let mut stream = rng.stream("goblin-name", &[index]);
    let parts = stream.gen_range(2..=3);
    let mut name: String = (0..parts)
        .map(|_| SYLLABLES[stream.gen_range(0..SYLLABLES.len())])
        .collect();
    if let Some(first) = name.get(..1).map(str::to_uppercase) {
        name.replace_range(..1, &first);
    }
    name
}

/// Water sources and resource nodes on rings around the center
fn scatter_features(map: &mut WorldMap, rng: &DetRng, center: TilePos) {
    let mut stream = rng.stream("scatter", &[]);
    let mut place = |map: &mut WorldMap, min: f32, max: f32| -> Option<TilePos> {
        for _ in 0..16 {
            let angle: f32 = stream.gen_range(0.0..std::f32::consts::TAU);
            let r: f32 = stream.gen_range(min..max);
            let pos = TilePos::new(
                center.x + (angle.cos() * r).round() as i32,
                center.y + (angle.sin() * r).round() as i32,
            );
            if map.is_passable(pos) && !map.nodes.contains_key(&pos) && !map.water_sources.contains(&pos) {
                return Some(pos);
            }
        }
        None
    };
    for _ in 0..SCATTER_WATER {
        if let Some(pos) = place(map, 4.0, 11.0) {
            map.add_water_source(pos);
        }
    }
    for (kind, count) in SCATTER {
        for _ in 0..count {
            if let Some(pos) = place(map, 5.0, 20.0) {
                map.add_node(pos, kind);
            }
        }
    }
}
