//! Headless Ashcap runner
//!
//! Builds a scenario from a seed, runs it for N ticks and prints a JSON
//! summary of the tribe. Identical arguments print identical output.

use std::path::PathBuf;

use ashcap::core::error::Result;
use ashcap::core::types::TilePos;
use ashcap::world::hostile::{drift_hostiles, HostileKind};
use ashcap::{ScenarioBuilder, SimulationConfig};
use clap::Parser;
use serde::Serialize;

/// Headless Ashcap runner - deterministic goblin colony ticks
#[derive(Parser, Debug)]
#[command(name = "ashcap")]
#[command(about = "Run the goblin colony simulation and print a JSON summary")]
struct Args {
    /// Run seed; any text
    #[arg(long, default_value = "det-1")]
    seed: String,

    /// Ticks to simulate
    #[arg(long, default_value_t = 200)]
    ticks: u64,

    /// Starting goblins
    #[arg(long, default_value_t = 12)]
    population: usize,

    /// TOML file overriding tuned constants
    #[arg(long)]
    config: Option<PathBuf>,

    /// Wolves placed at the map edge
    #[arg(long, default_value_t = 0)]
    hostiles: u32,

    /// Pretty-print the JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct RunOutput {
    seed: String,
    ticks: u64,
    events: usize,
    summary: serde_json::Value,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ashcap=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };

    let mut builder = ScenarioBuilder::new(&args.seed)
        .population(args.population)
        .config(config);
    for i in 0..args.hostiles {
        builder = builder.hostile(HostileKind::Wolf, TilePos::new(2 + 3 * i as i32, 2));
    }
    let mut sim = builder.build()?;
    tracing::info!("Ashcap run '{}' for {} ticks", args.seed, args.ticks);

    let mut events = 0;
    for _ in 0..args.ticks {
        let ctx = &mut sim.ctx;
        let rally = ctx.rally_point();
        drift_hostiles(&mut ctx.hostiles, &ctx.map, rally, &ctx.rng, ctx.tick);
        events += sim.step().len();
    }

    let output = RunOutput {
        seed: args.seed.clone(),
        ticks: sim.tick(),
        events,
        summary: serde_json::to_value(sim.snapshot())?,
    };
    let json = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", json);
    Ok(())
}
