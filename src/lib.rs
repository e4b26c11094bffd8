//! Ashcap - goblin colony simulation core
//!
//! A deterministic, single-threaded tick over a tribe of goblins: role
//! planning, goal selection, movement, and the task registries they work
//! through. Everything that varies between runs is keyed off one seed.

pub mod city;
pub mod core;
pub mod entity;
pub mod simulation;
pub mod spatial;
pub mod tasks;
pub mod world;

pub use crate::core::config::SimulationConfig;
pub use crate::core::error::{Result, SimError};
pub use crate::core::rng::DetRng;
pub use crate::simulation::{ScenarioBuilder, SimEvent, Simulation};
