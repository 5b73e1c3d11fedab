use std::collections::BTreeSet;

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use rapier3d::parry::query::{self as parry_query, ShapeCastOptions};
use rapier3d::prelude::QueryFilter;

use super::PhysicalDomain;
use crate::entity::EntityId;
use crate::error::DomainError;
use crate::filter::CollisionProfile;
use crate::mode::{ModeData, Placement};

/// Orientation changes smaller than this (radians) are ignored.
const ORIENTATION_EPSILON: f32 = 0.001;

/// A requested change to an entity's transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformData {
    pub orientation: Option<UnitQuaternion<f32>>,
    pub pos: Option<Point3<f32>>,
    pub impulse_velocity: Option<Vector3<f32>>,
    /// New support for the entity; `None` keeps the current one.
    pub planted_on: Option<EntityId>,
}

impl PhysicalDomain {
    /// Moves, rotates or pushes an entity. Entities resting on it are carried along.
    pub fn apply_transform(&mut self, id: EntityId, data: TransformData) {
        if !self.entries.contains_key(&id) {
            tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::UnknownEntity(id));
            return;
        }
        match data.planted_on {
            Some(target) if target == id => {
                tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::SelfPlanting(id));
            }
            Some(target) => self.plant_on(id, Some(target)),
            None => {}
        }

        let mut transformed = BTreeSet::new();
        self.apply_transform_internal(
            id,
            data.orientation,
            data.pos,
            data.impulse_velocity,
            &mut transformed,
            true,
        );
    }

    pub(crate) fn apply_transform_internal(
        &mut self,
        id: EntityId,
        orientation: Option<UnitQuaternion<f32>>,
        pos: Option<Point3<f32>>,
        impulse: Option<Vector3<f32>>,
        transformed: &mut BTreeSet<EntityId>,
        calculate: bool,
    ) {
        transformed.insert(id);
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let old_pos = entry.pos();
        let old_orientation = entry.entity.location.orientation_or_identity();

        let mut rotation = UnitQuaternion::identity();
        let mut rotated = false;
        if let Some(orientation) = orientation {
            let changed = match entry.entity.location.orientation {
                Some(current) => current.angle_to(&orientation) > ORIENTATION_EPSILON,
                None => true,
            };
            if changed {
                rotation = orientation * old_orientation.inverse();
                entry.entity.location.orientation = Some(orientation);
                rotated = true;
            }
        }

        match pos {
            Some(pos) => self.apply_new_position(id, pos, calculate),
            None if rotated => self.sync_body_pose(id),
            None => {}
        }

        if let Some(impulse) = impulse {
            let body = self.entries.get(&id).and_then(|e| e.body);
            if let Some(rb) = body.and_then(|b| self.world.body_mut(b)) {
                rb.apply_impulse(impulse, true);
            }
        }

        let new_pos = self.entries.get(&id).and_then(|e| e.pos());
        let moved = new_pos != old_pos;
        if !(moved || rotated) {
            return;
        }

        let is_water = self.entries.get(&id).is_some_and(|e| e.is_water);
        if is_water {
            self.rescan_water();
        } else {
            self.probe_water(id);
        }

        if let (Some(old_pos), Some(new_pos)) = (old_pos, new_pos) {
            self.transform_resting_entities(id, old_pos, new_pos, rotation, transformed);
        }
        self.process_moved_entity(id);
    }

    /// Carries attached entities, and dynamic bodies lying on top, along with a moved
    /// support.
    fn transform_resting_entities(
        &mut self,
        id: EntityId,
        old_pos: Point3<f32>,
        new_pos: Point3<f32>,
        rotation: UnitQuaternion<f32>,
        transformed: &mut BTreeSet<EntityId>,
    ) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let mut resting: BTreeSet<EntityId> = entry.attached.clone();
        if let Some(collider) = entry.collider {
            for (other, normal) in self.contact_normals(collider) {
                if normal.y <= 0.5 {
                    continue;
                }
                let Some(owner) = self.world.owner(other) else {
                    continue;
                };
                let on_dynamic = self
                    .entries
                    .get(&owner)
                    .and_then(|e| e.body)
                    .and_then(|b| self.world.body(b))
                    .is_some_and(|b| b.is_dynamic());
                if on_dynamic {
                    resting.insert(owner);
                }
            }
        }

        let rotated = rotation.angle() > ORIENTATION_EPSILON;
        for other in resting {
            if transformed.contains(&other) {
                continue;
            }
            let Some(other_entry) = self.entries.get(&other) else {
                continue;
            };
            let Some(pos) = other_entry.pos() else {
                continue;
            };
            let orientation = other_entry.entity.location.orientation_or_identity();
            let moved_pos = new_pos + rotation * (pos - old_pos);
            let moved_orientation = rotated.then(|| rotation * orientation);
            self.apply_transform_internal(other, moved_orientation, Some(moved_pos), None, transformed, false);
        }
    }

    /// Stores a new position, optionally running it through the mode's placement rule
    /// first, and moves the engine body and visibility spheres to match.
    pub(crate) fn apply_new_position(&mut self, id: EntityId, pos: Point3<f32>, calculate: bool) {
        let pos = if calculate {
            self.calculate_position(id, pos)
        } else {
            pos
        };
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.entity.location.pos = Some(pos);
        }
        self.sync_body_pose(id);
        self.move_spheres(id);
        self.queue_visibility(id);
    }

    /// Teleports the engine body to the entity's location.
    pub(crate) fn sync_body_pose(&mut self, id: EntityId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let (Some(pose), Some(body), Some(collider)) = (entry.pose(), entry.body, entry.collider) else {
            return;
        };
        entry.last_pose = Some(pose);
        self.world.teleport(body, collider, pose);
    }

    /// Resolves the height an entity should have at `pos` according to its mode.
    pub(crate) fn calculate_position(&mut self, id: EntityId, pos: Point3<f32>) -> Point3<f32> {
        let Some(entry) = self.entries.get(&id) else {
            return pos;
        };
        let ground = self.ground_height(&pos);
        let mut resolved = pos;

        match entry.mode.placement() {
            Placement::Keep => {}
            Placement::AboveTerrain => resolved.y = resolved.y.max(ground),
            Placement::Plant => {
                let target = entry.entity.mode_data.planted_on();
                let offset = entry.entity.f32_property("planted_offset").unwrap_or(0.0);
                let scaled_offset = entry
                    .entity
                    .f32_property("planted_scaled_offset")
                    .unwrap_or(0.0);
                let height = entry
                    .entity
                    .location
                    .valid_bbox()
                    .map(|b| b.height())
                    .unwrap_or(0.0);

                let mut support = None;
                match target {
                    Some(target) if target == id => {
                        tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::SelfPlanting(id));
                    }
                    Some(target) if target == self.container => {
                        support = Some((target, ground));
                    }
                    Some(target) => support = self.support_from_target(id, target, pos, ground),
                    None => {}
                }
                if support.is_none() {
                    support = self.sweep_for_support(id, pos, ground);
                }
                let (support, y) = support.unwrap_or((self.container, ground));

                self.plant_on(id, Some(support));
                resolved.y = y + offset + scaled_offset * height;
            }
        }
        resolved
    }

    fn support_from_target(
        &mut self,
        id: EntityId,
        target: EntityId,
        pos: Point3<f32>,
        ground: f32,
    ) -> Option<(EntityId, f32)> {
        let target_entry = self.entries.get(&target)?;
        if target_entry.is_water {
            let surface = target_entry.pos()?.y
                + target_entry
                    .entity
                    .location
                    .valid_bbox()
                    .map(|b| b.high.y)
                    .unwrap_or(0.0);
            return (surface > ground).then_some((target, surface));
        }
        self.sweep_onto_target(id, target, pos, ground)
            .map(|surface| (target, surface.max(ground)))
    }

    /// Sweeps the entity's shape straight down onto one specific target.
    fn sweep_onto_target(&self, id: EntityId, target: EntityId, pos: Point3<f32>, ground: f32) -> Option<f32> {
        let entry = self.entries.get(&id)?;
        let shape = entry.shape.as_ref()?;
        let target_collider = self.world.collider(self.entries.get(&target)?.collider?)?;

        let pose = Isometry3::from_parts(pos.coords.into(), entry.entity.location.orientation_or_identity());
        let start = shape.pose(&pose);
        let target_pose = target_collider.position();

        if matches!(
            parry_query::intersection_test(&start, &*shape.shape, target_pose, target_collider.shape()),
            Ok(true)
        ) {
            return Some(target_collider.compute_aabb().maxs.y);
        }

        let distance = pos.y - ground;
        if distance <= 0.0 {
            return None;
        }
        let bottom = shape.shape.compute_aabb(&start).mins.y - pos.y;
        let hit = parry_query::cast_shapes(
            &start,
            &-Vector3::y(),
            &*shape.shape,
            target_pose,
            &Vector3::zeros(),
            target_collider.shape(),
            ShapeCastOptions::with_max_time_of_impact(distance),
        )
        .ok()
        .flatten()?;
        Some(pos.y - hit.time_of_impact + bottom)
    }

    /// Sweeps the entity's shape down from `pos` to the ground, returning the highest
    /// static collider it would land on.
    fn sweep_for_support(&mut self, id: EntityId, pos: Point3<f32>, ground: f32) -> Option<(EntityId, f32)> {
        let entry = self.entries.get(&id)?;
        let shape = entry.shape.clone()?;
        if !shape.convex {
            tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::NonConvexPlacement(id));
            return None;
        }
        let distance = pos.y - ground;
        if distance <= 0.0 {
            return None;
        }

        let pose = Isometry3::from_parts(pos.coords.into(), entry.entity.location.orientation_or_identity());
        let start = shape.pose(&pose);
        let bottom = shape.shape.compute_aabb(&start).mins.y - pos.y;

        let mut filter = QueryFilter::default()
            .groups(CollisionProfile::PLANT_SWEEP.groups())
            .exclude_sensors();
        if let Some(own) = entry.collider {
            filter = filter.exclude_collider(own);
        }

        let (handle, toi) = self
            .world
            .cast_shape(&start, &-Vector3::y(), &*shape.shape, distance, filter)?;
        let support = self.world.owner(handle)?;
        if support == id {
            return None;
        }
        Some((support, pos.y - toi + bottom))
    }

    /// Records `target` as the entity's support, keeping the support's attached set in
    /// step. `None` releases the entity from any support.
    pub(crate) fn plant_on(&mut self, id: EntityId, target: Option<EntityId>) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let current = entry.entity.mode_data.planted_on();
        if current.is_none() && target.is_none() {
            return;
        }
        if let Some(old) = current.filter(|old| Some(*old) != target) {
            if let Some(old_entry) = self.entries.get_mut(&old) {
                old_entry.attached.remove(&id);
            }
        }

        match target {
            Some(target) => {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.entity.mode_data = ModeData::Planted { on: target };
                }
                if let Some(support) = self.entries.get_mut(&target) {
                    support.attached.insert(id);
                }
            }
            None => {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.entity.mode_data = ModeData::None;
                }
            }
        }
    }
}
