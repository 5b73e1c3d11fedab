use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TerrainError {
    #[error("Terrain resolution must be at least 1, got {0}")]
    InvalidResolution(u32),
    #[error("Terrain mod is invalid: {0}")]
    InvalidMod(String),
}
