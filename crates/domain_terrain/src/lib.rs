//! Segmented height-field terrain.
//!
//! Heights are defined by a sparse grid of base points spaced `resolution` units apart.
//! Every square of four base points becomes a [`Segment`] holding a dense
//! `(resolution + 1)²` sample grid, which is what the physics side turns into
//! height-field colliders.
//!
//! # Features
//!
//! - Bilinear interpolation between base points
//! - Per-owner [`TerrainMod`]s (levelling and adjusting) applied in owner order
//! - Dirty [`Area`] reporting so callers can rebuild only what changed

mod area;
mod error;
mod modifier;
mod segment;
mod terrain;

pub use area::Area;
pub use error::TerrainError;
pub use modifier::{ModKind, ModShape, TerrainMod, TerrainModSpec};
pub use segment::{Segment, SegmentKey};
pub use terrain::Terrain;

/// Default distance between base points, in world units.
pub const DEFAULT_RESOLUTION: u32 = 64;
