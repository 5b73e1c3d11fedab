//! Per-entity records owned by the domain.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::{ColliderHandle, RigidBodyHandle};

use crate::closeness::ObservationId;
use crate::entity::{Entity, EntityId};
use crate::mode::Mode;
use crate::shape::BuiltShape;

/// Pending change to an AOI edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Edit {
    Add,
    Remove,
}

/// Relationship between an entry and the water bodies around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaterProximity {
    Clear,
    Near(EntityId),
    /// Left a water body since the last submersion check.
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct Speeds {
    pub ground: f32,
    pub water: f32,
    pub flight: f32,
    pub jump: f32,
}

/// What observers were last told about an entry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct LastSent {
    pub pos: Option<Point3<f32>>,
    pub velocity: Option<Vector3<f32>>,
    pub orientation: Option<UnitQuaternion<f32>>,
    pub angular_velocity: Option<Vector3<f32>>,
    pub time: f64,
}

pub(crate) struct DomainEntry {
    pub entity: Entity,
    pub body: Option<RigidBodyHandle>,
    pub collider: Option<ColliderHandle>,
    pub shape: Option<BuiltShape>,
    pub mass: f32,
    pub mode: Mode,
    pub is_water: bool,
    pub last_sent: LastSent,
    pub mode_changed: bool,
    pub attached: BTreeSet<EntityId>,
    pub observing_this: BTreeSet<EntityId>,
    pub observed_by_this: BTreeSet<EntityId>,
    pub observing_this_changes: BTreeMap<EntityId, Edit>,
    pub observed_by_this_changes: BTreeMap<EntityId, Edit>,
    pub closeness: BTreeSet<ObservationId>,
    pub water: WaterProximity,
    pub view_sphere: Option<ColliderHandle>,
    pub visibility_sphere: Option<ColliderHandle>,
    pub vis_radius: f32,
    pub speeds: Speeds,
    pub jumping: bool,
    pub moving_this_frame: bool,
    pub in_moving_list: bool,
    pub queued_for_visibility: bool,
    pub last_pose: Option<Isometry3<f32>>,
}

impl DomainEntry {
    pub fn new(entity: Entity) -> Self {
        let mode = entity.mode;
        Self {
            entity,
            body: None,
            collider: None,
            shape: None,
            mass: 0.0,
            mode,
            is_water: false,
            last_sent: LastSent::default(),
            mode_changed: false,
            attached: BTreeSet::new(),
            observing_this: BTreeSet::new(),
            observed_by_this: BTreeSet::new(),
            observing_this_changes: BTreeMap::new(),
            observed_by_this_changes: BTreeMap::new(),
            closeness: BTreeSet::new(),
            water: WaterProximity::Clear,
            view_sphere: None,
            visibility_sphere: None,
            vis_radius: 0.0,
            speeds: Speeds::default(),
            jumping: false,
            moving_this_frame: false,
            in_moving_list: false,
            queued_for_visibility: false,
            last_pose: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.entity.id
    }

    pub fn pos(&self) -> Option<Point3<f32>> {
        self.entity.location.pos
    }

    /// Entity pose built from its location.
    pub fn pose(&self) -> Option<Isometry3<f32>> {
        let pos = self.pos()?;
        Some(Isometry3::from_parts(
            pos.coords.into(),
            self.entity.location.orientation_or_identity(),
        ))
    }

    /// World center of the collision shape, falling back to the entity position.
    pub fn center(&self) -> Option<Point3<f32>> {
        let pose = self.pose()?;
        Some(match &self.shape {
            Some(shape) => shape.pose(&pose) * Point3::origin(),
            None => pose * Point3::origin(),
        })
    }

    pub fn is_dynamic(&self) -> bool {
        !self.is_water && !self.mode.is_static() && self.mass > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::build_shape;

    #[test]
    fn test_center_uses_shape_offset() {
        let entity = Entity::new(5)
            .with_pos(1.0, 2.0, 3.0)
            .with_bbox([-1.0, 0.0, -1.0], [1.0, 2.0, 1.0]);
        let mut entry = DomainEntry::new(entity);
        assert_eq!(entry.center(), Some(Point3::new(1.0, 2.0, 3.0)));

        let bbox = entry.entity.location.bbox.unwrap();
        entry.shape = Some(build_shape(&bbox, None, true).unwrap());
        assert_eq!(entry.center(), Some(Point3::new(1.0, 3.0, 3.0)));
    }

    #[test]
    fn test_dynamic_requires_mass_and_free_mode() {
        let mut entry = DomainEntry::new(Entity::new(1).with_mode(Mode::Planted));
        entry.mass = 10.0;
        assert!(!entry.is_dynamic());
        entry.mode = Mode::Free;
        assert!(entry.is_dynamic());
        entry.mass = 0.0;
        assert!(!entry.is_dynamic());
    }
}
