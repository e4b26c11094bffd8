use thiserror::Error;

use crate::core::types::{OutpostId, TilePos};

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Outpost not found: {0}")]
    OutpostNotFound(OutpostId),

    #[error("Tile out of bounds: {0}")]
    OutOfBounds(TilePos),

    #[error("Tile occupied: {0}")]
    TileOccupied(TilePos),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Recipe error: {0}")]
    Recipe(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
