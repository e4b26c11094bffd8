//! Palisade and automated defense upkeep for the tick

use crate::core::rng::coord_part;
use crate::core::types::TilePos;
use crate::simulation::context::SimulationContext;
use crate::simulation::events::EventKind;
use crate::tasks::defense::DefenseEvent;
use crate::tasks::wall::{create_wall_plan, PlanInputs, WallPlan};

/// Tiles the ring should reach for: outlying homes and open outposts
pub fn wall_anchors(ctx: &SimulationContext) -> Vec<TilePos> {
    let center = ctx.start_center();
    let base = ctx.config.wall.base_radius as f32;
    let mut anchors: Vec<TilePos> = ctx
        .residents(ctx.start_outpost)
        .map(|a| a.home)
        .filter(|home| home.distance(&center) > base)
        .chain(
            ctx.outposts
                .values()
                .filter(|o| !o.is_start && o.status.is_open())
                .map(|o| o.center),
        )
        .collect();
    anchors.sort();
    anchors.dedup();
    anchors
}

fn footprint(ctx: &SimulationContext, anchors: &[TilePos]) -> u64 {
    let parts: Vec<u64> = anchors
        .iter()
        .flat_map(|a| [coord_part(a.x), coord_part(a.y)])
        .collect();
    ctx.rng.key("wall-footprint", &parts)
}

fn replan(ctx: &mut SimulationContext, anchors: &[TilePos], footprint: u64, reason: &str) {
    let plan = create_wall_plan(
        &PlanInputs {
            map: &ctx.map,
            center: ctx.start_center(),
            anchors,
            registry: &ctx.walls,
            rng: &ctx.rng,
            footprint,
            tick: ctx.tick,
        },
        &ctx.config.wall,
    );
    let tiles = plan.tiles.values().filter(|t| t.status.is_active()).count();
    let (radius, gaps) = (plan.radius, plan.continuity_gaps);
    ctx.wall_plan = Some(plan);
    tracing::debug!("Wall replanned ({}): radius {}, {} tiles, {} gaps", reason, radius, tiles, gaps);
    ctx.emit(
        EventKind::WallPlanCreated {
            radius,
            tiles,
            continuity_gaps: gaps,
            reason: reason.to_string(),
        },
        Vec::new(),
        format!("palisade laid out at radius {}", radius),
    );
}

/// Refresh the wall plan (breaches, replans) and run the defenses
pub fn update_fortifications(ctx: &mut SimulationContext) {
    let anchors = wall_anchors(ctx);
    let footprint = footprint(ctx, &anchors);
    match ctx.wall_plan.as_ref().map(|p| p.footprint) {
        None => replan(ctx, &anchors, footprint, "initial"),
        Some(current) if current != footprint => replan(ctx, &anchors, footprint, "footprint"),
        Some(_) => {}
    }

    let tick = ctx.tick;
    let report = match ctx.wall_plan.as_mut() {
        Some(plan) => plan.refresh(&ctx.map, &ctx.walls, tick),
        None => return,
    };
    for pos in &report.breaches {
        ctx.threat_memory.record_breach(*pos, tick);
        tracing::info!("Wall breached at {} on tick {}", pos, tick);
        ctx.emit(
            EventKind::WallBreached { pos: *pos },
            Vec::new(),
            format!("the palisade is breached at {}", pos),
        );
    }
    if report.needs_replan {
        replan(ctx, &anchors, footprint, "continuity");
    }

    let cfg = ctx.config.defense.clone();
    for event in ctx.defenses.update(&mut ctx.hostiles, tick, &cfg) {
        match event {
            DefenseEvent::Fired {
                defense,
                hostile,
                damage,
                killed,
            } => ctx.emit(
                EventKind::DefenseFired {
                    defense,
                    hostile,
                    damage,
                    killed,
                },
                Vec::new(),
                format!("{} looses a bolt at {} for {:.0}", defense, hostile, damage),
            ),
            DefenseEvent::StatusChanged { defense, from, to } => {
                tracing::debug!("{} {:?} -> {:?}", defense, from, to);
                ctx.emit(
                    EventKind::DefenseStatusChanged { defense, from, to },
                    Vec::new(),
                    format!("{} is now {:?}", defense, to),
                );
            }
        }
    }
}

/// End-of-tick completion stamp for a fully built ring
pub fn complete_walls(ctx: &mut SimulationContext) {
    let tick = ctx.tick;
    let Some(plan) = ctx.wall_plan.as_mut() else {
        return;
    };
    if !plan.maybe_complete(tick) {
        return;
    }
    let (radius, segments) = (plan.radius, plan.count(crate::tasks::wall::WallTileStatus::Built));
    tracing::info!("Palisade complete at tick {} ({} segments)", tick, segments);
    ctx.emit(
        EventKind::WallCompleted { radius, segments },
        Vec::new(),
        format!("the palisade is complete with {} segments", segments),
    );
}

/// Built share of the current ring, zero without a plan
pub fn wall_coverage(plan: Option<&WallPlan>) -> f32 {
    plan.map_or(0.0, WallPlan::coverage)
}
