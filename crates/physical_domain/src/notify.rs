//! Outbound change notifications.

use std::collections::BTreeMap;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::entity::{EntityId, PropertyValue};
use crate::mode::Mode;

/// The parts of a location that changed since the last broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub entity: EntityId,
    pub seq: u64,
    pub pos: Option<Point3<f32>>,
    pub velocity: Option<Vector3<f32>>,
    pub orientation: Option<UnitQuaternion<f32>>,
    pub angular_velocity: Option<Vector3<f32>>,
    pub mode: Option<Mode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitInfo {
    /// The projectile's originator, or the struck entity when none was recorded.
    pub attacker: EntityId,
    pub pos: Point3<f32>,
    /// The domain the hit happened in.
    pub loc: EntityId,
    pub extra: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// `to` sees an entity's location change.
    Sight { to: EntityId, update: LocationUpdate },
    Appearance { to: EntityId, entities: Vec<EntityId> },
    Disappearance { to: EntityId, entities: Vec<EntityId> },
    Hit { from: EntityId, to: EntityId, hit: HitInfo },
    /// The ground under `to` changed; it should re-evaluate its position.
    Move { to: EntityId, pos: Point3<f32> },
}

impl Notification {
    pub fn recipient(&self) -> EntityId {
        match self {
            Notification::Sight { to, .. }
            | Notification::Appearance { to, .. }
            | Notification::Disappearance { to, .. }
            | Notification::Hit { to, .. }
            | Notification::Move { to, .. } => *to,
        }
    }
}
