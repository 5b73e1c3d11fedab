//! Collision world used only for area-of-interest.
//!
//! Holds one view sphere per perceiving entity and one visibility sphere per
//! observable entity. Everything is scaled down so large visibility radii stay within
//! comfortable engine ranges.

use nalgebra::{Isometry3, Point3};
use rapier3d::prelude::*;

use crate::entity::EntityId;
use crate::filter::CollisionProfile;

pub struct VisibilityWorld {
    scale: f32,
    bodies: RigidBodySet,
    islands: IslandManager,
    colliders: ColliderSet,
    query: QueryPipeline,
    dirty: bool,
}

impl VisibilityWorld {
    pub fn new(scale: f32) -> Self {
        Self {
            scale,
            bodies: RigidBodySet::new(),
            islands: IslandManager::new(),
            colliders: ColliderSet::new(),
            query: QueryPipeline::new(),
            dirty: false,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn insert_sphere(
        &mut self,
        owner: EntityId,
        center: Point3<f32>,
        radius: f32,
        profile: CollisionProfile,
    ) -> ColliderHandle {
        let scaled = center.coords * self.scale;
        let collider = ColliderBuilder::ball(radius * self.scale)
            .translation(scaled)
            .collision_groups(profile.groups())
            .sensor(true)
            .user_data(owner.0 as u128)
            .build();
        self.dirty = true;
        self.colliders.insert(collider)
    }

    pub fn move_sphere(&mut self, handle: ColliderHandle, center: Point3<f32>) {
        if let Some(collider) = self.colliders.get_mut(handle) {
            collider.set_translation(center.coords * self.scale);
            self.dirty = true;
        }
    }

    pub fn resize_sphere(&mut self, handle: ColliderHandle, radius: f32) {
        if let Some(collider) = self.colliders.get_mut(handle) {
            collider.set_shape(SharedShape::ball(radius * self.scale));
            self.dirty = true;
        }
    }

    pub fn set_profile(&mut self, handle: ColliderHandle, profile: CollisionProfile) {
        if let Some(collider) = self.colliders.get_mut(handle) {
            collider.set_collision_groups(profile.groups());
            self.dirty = true;
        }
    }

    pub fn remove_sphere(&mut self, handle: ColliderHandle) {
        if self
            .colliders
            .remove(handle, &mut self.islands, &mut self.bodies, false)
            .is_some()
        {
            self.dirty = true;
        }
    }

    /// Owners of every sphere overlapping `handle` whose groups interact with it.
    pub fn overlapping(&mut self, handle: ColliderHandle) -> Vec<EntityId> {
        if self.dirty {
            self.query.update(&self.colliders);
            self.dirty = false;
        }
        let Some(collider) = self.colliders.get(handle) else {
            return Vec::new();
        };
        let pose: Isometry3<f32> = *collider.position();
        let filter = QueryFilter::default()
            .groups(collider.collision_groups())
            .exclude_collider(handle);

        let mut found = Vec::new();
        self.query.intersections_with_shape(
            &self.bodies,
            &self.colliders,
            &pose,
            collider.shape(),
            filter,
            |other| {
                if let Some(c) = self.colliders.get(other) {
                    found.push(EntityId(c.user_data as u64));
                }
                true
            },
        );
        found.sort_unstable();
        found.dedup();
        found
    }
}
