//! Spatial indexing and movement

pub mod grid;
pub mod occupancy;
pub mod pathfinder;

pub use grid::Grid;
pub use occupancy::OccupancyMap;
pub use pathfinder::{Pathfinder, StepOutcome, StepQuery};
