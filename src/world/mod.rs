//! World inputs: terrain, resource nodes, climate and hostiles

pub mod climate;
pub mod hostile;
pub mod map;

pub use climate::ClimateModifiers;
pub use hostile::{Hostile, HostileKind};
pub use map::{NodeKind, ResourceNode, WorldMap};
