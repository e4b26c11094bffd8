//! Goblins: identity, role, goal, needs

pub mod agent;
pub mod goal;
pub mod needs;
pub mod role;

pub use agent::{Agent, Cargo, RoleState, ThreatMode, ThreatResponse};
pub use goal::{BlockedReason, Goal};
pub use needs::{LinearNeedsModel, Needs, NeedsModel, Vitals};
pub use role::Role;
