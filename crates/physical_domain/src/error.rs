use crate::entity::EntityId;

/// Errors raised inside the domain.
///
/// Public mutation entry points log these and degrade; configuration loading and the
/// domain thread return them to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Failed to parse domain config: {0}")]
    Config(#[from] ron::error::SpannedError),
    #[error("Failed to read domain config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Entity {0} has no position")]
    MissingPosition(EntityId),
    #[error("Entity {0} is not in the domain")]
    UnknownEntity(EntityId),
    #[error("Entity {0} is already in the domain")]
    DuplicateEntity(EntityId),
    #[error("Entity {0} cannot be planted on itself")]
    SelfPlanting(EntityId),
    #[error("Entity {0} has a non-convex shape and cannot be swept for placement")]
    NonConvexPlacement(EntityId),
    #[error("Invalid property '{name}': {reason}")]
    InvalidProperty { name: String, reason: String },
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),
    #[error("Terrain error: {0}")]
    Terrain(#[from] domain_terrain::TerrainError),
    #[error("Failed to spawn domain thread: {0}")]
    ThreadSpawn(String),
    #[error("Domain thread panicked")]
    ThreadPanicked,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShapeError {
    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),
    #[error("Degenerate mesh: {0}")]
    DegenerateMesh(String),
    #[error("Convex hull computation failed")]
    ConvexHullFailed,
    #[error("Unknown geometry type '{0}'")]
    UnknownGeometry(String),
}
