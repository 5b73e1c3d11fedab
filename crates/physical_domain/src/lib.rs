//! # Physical Domain
//!
//! Spatial simulation for entities placed inside a container entity. This crate provides
//! the rigid-body stepping, placement, water submersion, terrain collision and
//! area-of-interest tracking used by the game layer, plus a thread runner that can host
//! a domain on its own.

mod closeness;
pub mod config;
pub mod domain;
pub mod entity;
pub mod error;
pub mod filter;
pub mod mode;
pub mod notify;
mod registry;
pub mod runner;
pub mod schedule;
pub mod shape;
mod terrain;
mod visibility;
pub mod world;

pub use closeness::{ClosenessCallback, ObservationId};
pub use config::DomainConfig;
pub use domain::{CollisionEntry, PhysicalDomain, TransformData};
pub use entity::{BBox, Entity, EntityId, Location, PropertyValue, Visibility};
pub use error::{DomainError, ShapeError};
pub use mode::{Mode, ModeData};
pub use notify::{HitInfo, LocationUpdate, Notification};
pub use runner::{DomainCommand, DomainThread};
pub use schedule::{TickOp, TICK_ARG};

pub use domain_terrain;
pub use nalgebra;
