//! Rigid-body world wrapper.
//!
//! # Design
//!
//! The domain never registers engine callbacks of its own. After a step, the contacts of
//! a collider are read back from the narrow phase with [`PhysicsWorld::touching`].

use nalgebra::{Isometry3, Point3, Vector3};
use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::prelude::*;

use crate::entity::EntityId;

/// A contact pair touching at the end of a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactEvent {
    pub collider1: ColliderHandle,
    pub collider2: ColliderHandle,
    /// World-space contact point on each collider.
    pub point1: Point3<f32>,
    pub point2: Point3<f32>,
}

pub struct PhysicsWorld {
    gravity: Vector3<f32>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    query: QueryPipeline,
    queries_dirty: bool,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector3<f32>) -> Self {
        Self {
            gravity,
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query: QueryPipeline::new(),
            queries_dirty: false,
        }
    }

    pub fn gravity(&self) -> Vector3<f32> {
        self.gravity
    }

    /// Advances the world by one sub-step.
    pub fn step(&mut self, dt: f32) {
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query),
            &(),
            &(),
        );
        self.queries_dirty = false;
    }

    pub fn insert_body(&mut self, body: RigidBody, collider: Collider) -> (RigidBodyHandle, ColliderHandle) {
        let body_handle = self.bodies.insert(body);
        let collider_handle = self
            .colliders
            .insert_with_parent(collider, body_handle, &mut self.bodies);
        // Fresh colliders only pick up the parent pose during the next step.
        if let (Some(body), Some(collider)) = (
            self.bodies.get(body_handle),
            self.colliders.get_mut(collider_handle),
        ) {
            let local = collider
                .position_wrt_parent()
                .copied()
                .unwrap_or_else(Isometry3::identity);
            collider.set_position(body.position() * local);
        }
        self.queries_dirty = true;
        (body_handle, collider_handle)
    }

    /// Removes a body with its colliders, returning the body for re-insertion.
    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> Option<RigidBody> {
        self.queries_dirty = true;
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        )
    }

    pub fn insert_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.queries_dirty = true;
        self.colliders.insert(collider)
    }

    pub fn remove_collider(&mut self, handle: ColliderHandle) -> Option<Collider> {
        self.queries_dirty = true;
        self.colliders
            .remove(handle, &mut self.islands, &mut self.bodies, true)
    }

    pub fn body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn collider(&self, handle: ColliderHandle) -> Option<&Collider> {
        self.colliders.get(handle)
    }

    pub fn collider_mut(&mut self, handle: ColliderHandle) -> Option<&mut Collider> {
        self.colliders.get_mut(handle)
    }

    /// Teleports a body and its collider without waiting for the next step.
    pub fn teleport(&mut self, body: RigidBodyHandle, collider: ColliderHandle, pose: Isometry3<f32>) {
        if let Some(rb) = self.bodies.get_mut(body) {
            rb.set_position(pose, true);
        }
        if let Some(col) = self.colliders.get_mut(collider) {
            let local = col
                .position_wrt_parent()
                .copied()
                .unwrap_or_else(Isometry3::identity);
            col.set_position(pose * local);
        }
        self.queries_dirty = true;
    }

    pub fn owner(&self, handle: ColliderHandle) -> Option<EntityId> {
        self.colliders
            .get(handle)
            .map(|c| EntityId(c.user_data as u64))
    }

    pub fn active_dynamic_bodies(&self) -> Vec<RigidBodyHandle> {
        self.islands.active_dynamic_bodies().to_vec()
    }

    pub fn contact_pairs_with(&self, collider: ColliderHandle) -> impl Iterator<Item = &ContactPair> {
        self.narrow_phase.contact_pairs_with(collider)
    }

    /// Every pair with at least one active contact point involving `collider`.
    pub fn touching(&self, collider: ColliderHandle) -> Vec<ContactEvent> {
        self.narrow_phase
            .contact_pairs_with(collider)
            .filter(|pair| pair.has_any_active_contact)
            .filter_map(|pair| self.contact_event(pair))
            .collect()
    }

    fn contact_event(&self, pair: &ContactPair) -> Option<ContactEvent> {
        let c1 = self.colliders.get(pair.collider1)?;
        let c2 = self.colliders.get(pair.collider2)?;
        let (point1, point2) = match pair.find_deepest_contact() {
            Some((_, contact)) => (c1.position() * contact.local_p1, c2.position() * contact.local_p2),
            None => {
                let mid = nalgebra::center(
                    &Point3::from(c1.translation().clone_owned()),
                    &Point3::from(c2.translation().clone_owned()),
                );
                (mid, mid)
            }
        };
        Some(ContactEvent {
            collider1: pair.collider1,
            collider2: pair.collider2,
            point1,
            point2,
        })
    }

    pub fn refresh_queries(&mut self) {
        if self.queries_dirty {
            self.query.update(&self.colliders);
            self.queries_dirty = false;
        }
    }

    /// First collider hit by `shape` moving from `pose` along `direction`.
    pub fn cast_shape(
        &mut self,
        pose: &Isometry3<f32>,
        direction: &Vector3<f32>,
        shape: &dyn Shape,
        max_distance: f32,
        filter: QueryFilter,
    ) -> Option<(ColliderHandle, f32)> {
        self.refresh_queries();
        self.query
            .cast_shape(
                &self.bodies,
                &self.colliders,
                pose,
                direction,
                shape,
                ShapeCastOptions::with_max_time_of_impact(max_distance),
                filter,
            )
            .map(|(handle, hit)| (handle, hit.time_of_impact))
    }

    pub fn cast_ray(&mut self, ray: &Ray, max_distance: f32, filter: QueryFilter) -> Option<(ColliderHandle, f32)> {
        self.refresh_queries();
        self.query
            .cast_ray(&self.bodies, &self.colliders, ray, max_distance, true, filter)
    }

    /// Every collider intersecting `shape` at `pose`.
    pub fn intersecting(&mut self, pose: &Isometry3<f32>, shape: &dyn Shape, filter: QueryFilter) -> Vec<ColliderHandle> {
        self.refresh_queries();
        let mut found = Vec::new();
        self.query.intersections_with_shape(
            &self.bodies,
            &self.colliders,
            pose,
            shape,
            filter,
            |handle| {
                found.push(handle);
                true
            },
        );
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground(world: &mut PhysicsWorld) -> ColliderHandle {
        world.insert_collider(
            ColliderBuilder::cuboid(50.0, 0.5, 50.0)
                .translation(vector![0.0, -0.5, 0.0])
                .user_data(99)
                .build(),
        )
    }

    #[test]
    fn test_body_falls_and_lands() {
        let mut world = PhysicsWorld::new(Vector3::new(0.0, -9.81, 0.0));
        ground(&mut world);
        let (body, _) = world.insert_body(
            RigidBodyBuilder::dynamic().translation(vector![0.0, 5.0, 0.0]).build(),
            ColliderBuilder::cuboid(0.5, 0.5, 0.5).build(),
        );

        for _ in 0..240 {
            world.step(1.0 / 60.0);
        }
        let y = world.body(body).unwrap().translation().y;
        assert!((y - 0.5).abs() < 0.05, "resting height was {y}");
    }

    #[test]
    fn test_touching_reports_resting_contacts() {
        let mut world = PhysicsWorld::new(Vector3::new(0.0, -9.81, 0.0));
        let floor = ground(&mut world);
        let (_, ball) = world.insert_body(
            RigidBodyBuilder::dynamic().translation(vector![0.0, 1.0, 0.0]).build(),
            ColliderBuilder::ball(0.25).build(),
        );

        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }
        // Still reported once the ball has come to rest.
        for _ in 0..10 {
            world.step(1.0 / 60.0);
            let contacts = world.touching(ball);
            assert_eq!(contacts.len(), 1);
            let contact = contacts[0];
            assert!(
                (contact.collider1 == ball && contact.collider2 == floor)
                    || (contact.collider1 == floor && contact.collider2 == ball)
            );
            assert!(contact.point1.y.abs() < 0.1);
        }
        assert!(world.touching(floor).len() == 1);
        assert_eq!(world.owner(floor), Some(EntityId(99)));
    }

    #[test]
    fn test_queries_see_inserted_colliders_before_stepping() {
        let mut world = PhysicsWorld::new(Vector3::zeros());
        let floor = ground(&mut world);
        let ray = Ray::new(point![0.0, 10.0, 0.0], vector![0.0, -1.0, 0.0]);
        let hit = world.cast_ray(&ray, 100.0, QueryFilter::default());
        assert_eq!(hit.map(|(h, _)| h), Some(floor));
        assert!((hit.unwrap().1 - 10.0).abs() < 1e-4);

        let (body, collider) = world.insert_body(
            RigidBodyBuilder::fixed().build(),
            ColliderBuilder::cuboid(1.0, 1.0, 1.0).build(),
        );
        world.teleport(body, collider, Isometry3::translation(0.0, 5.0, 0.0));
        let hit = world.cast_ray(&ray, 100.0, QueryFilter::default());
        assert_eq!(hit.map(|(h, _)| h), Some(collider));
        assert!((hit.unwrap().1 - 4.0).abs() < 1e-4);
    }
}
