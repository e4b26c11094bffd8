//! Per-tick simulation: the context, the subsystems and the orchestrator

pub mod context;
pub mod crisis;
pub mod events;
pub mod execute;
pub mod fortifications;
pub mod goal_select;
pub mod migration;
pub mod outposts;
pub mod reproduction;
pub mod roles;
pub mod scenario;
pub mod threat;
pub mod tick;

pub use context::SimulationContext;
pub use crisis::{CrisisState, CrisisTier};
pub use events::{EventKind, SimEvent, SimMetrics};
pub use roles::{plan_role_demand, RoleDemandInputs};
pub use scenario::ScenarioBuilder;
pub use threat::{ThreatMemory, ThreatRecord};
pub use tick::{run_tick, SimSnapshot, Simulation};
