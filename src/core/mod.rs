pub mod config;
pub mod error;
pub mod rng;
pub mod types;

pub use config::SimulationConfig;
pub use error::{Result, SimError};
pub use rng::DetRng;
