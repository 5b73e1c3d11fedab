use nalgebra::{Point3, Vector3};
use rapier3d::prelude::{ColliderHandle, QueryFilter, Ray};

use super::PhysicalDomain;
use crate::entity::EntityId;
use crate::mode::Mode;

/// Minimum squared speed for an entity to count as moving.
pub(crate) const MIN_SPEED_SQUARED: f32 = 0.001;

impl PhysicalDomain {
    /// Contact normals pointing from `collider` toward each body it touches.
    pub(crate) fn contact_normals(&self, collider: ColliderHandle) -> Vec<(ColliderHandle, Vector3<f32>)> {
        let mut normals = Vec::new();
        for pair in self.world.contact_pairs_with(collider) {
            if !pair.has_any_active_contact {
                continue;
            }
            let (other, flip) = if pair.collider1 == collider {
                (pair.collider2, false)
            } else {
                (pair.collider1, true)
            };
            for manifold in &pair.manifolds {
                if manifold.points.is_empty() {
                    continue;
                }
                let normal = if flip {
                    -manifold.data.normal
                } else {
                    manifold.data.normal
                };
                normals.push((other, normal));
            }
        }
        normals
    }

    /// Something is pushing up from below.
    pub(crate) fn is_grounded(&self, id: EntityId) -> bool {
        let Some(collider) = self.entries.get(&id).and_then(|e| e.collider) else {
            return false;
        };
        self.contact_normals(collider).iter().any(|(_, n)| n.y < -0.5)
    }

    /// Starts, changes or stops self-propulsion. A positive vertical component makes a
    /// grounded entity jump.
    pub(crate) fn apply_propel(&mut self, id: EntityId, propel: Vector3<f32>) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let Some(body) = entry.body else {
            return;
        };
        let jump_speed = entry.speeds.jump;
        let friction = entry
            .entity
            .f32_property("friction")
            .unwrap_or(self.config.default_friction);
        let collider = entry.collider;
        let vertical = entry.mode == Mode::Submerged || entry.speeds.flight > 0.0;

        if propel.y > 0.0 && jump_speed > 0.0 && self.is_grounded(id) {
            if let Some(rb) = self.world.body_mut(body) {
                let mut velocity = *rb.linvel();
                velocity.y = propel.y * jump_speed;
                rb.set_linvel(velocity, true);
            }
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.jumping = true;
            }
        }

        let horizontal = Vector3::new(propel.x, 0.0, propel.z);
        if horizontal.norm_squared() > 0.0 || (vertical && propel.y != 0.0) {
            self.propelling.insert(id, propel);
            self.add_to_moving(id);
            return;
        }

        if self.propelling.remove(&id).is_some() {
            if let Some(rb) = self.world.body_mut(body) {
                let velocity = *rb.linvel();
                rb.set_linvel(Vector3::new(0.0, velocity.y, 0.0), true);
            }
            if let Some(col) = collider.and_then(|c| self.world.collider_mut(c)) {
                col.set_friction(friction);
            }
        }
    }

    /// Drives propelling bodies before each engine sub-step.
    pub(crate) fn before_substep(&mut self) {
        let propel_friction = self.config.propel_friction;
        for (id, propel) in &self.propelling {
            let Some(entry) = self.entries.get(id) else {
                continue;
            };
            let (Some(body), speeds, mode) = (entry.body, entry.speeds, entry.mode) else {
                continue;
            };
            if let Some(col) = entry.collider.and_then(|c| self.world.collider_mut(c)) {
                col.set_friction(propel_friction);
            }
            let Some(rb) = self.world.body_mut(body) else {
                continue;
            };
            let velocity = if mode == Mode::Submerged {
                propel * speeds.water
            } else if speeds.flight > 0.0 && propel.y != 0.0 {
                propel * speeds.flight
            } else {
                Vector3::new(propel.x * speeds.ground, rb.linvel().y, propel.z * speeds.ground)
            };
            rb.set_linvel(velocity, true);
        }
    }

    /// Lets walking bodies follow the ground down small steps instead of flying off them.
    pub(crate) fn after_substep(&mut self) {
        let snap = self.config.step_snap_distance;
        let stepping: Vec<(EntityId, f32)> = self.stepping.iter().map(|(id, f)| (*id, *f)).collect();

        for (id, factor) in stepping {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let (Some(body), Some(collider)) = (entry.body, entry.collider) else {
                continue;
            };
            let jumping = entry.jumping;
            let height = entry
                .entity
                .location
                .valid_bbox()
                .map(|b| b.height())
                .unwrap_or(0.0);
            let moving = self
                .world
                .body(body)
                .is_some_and(|rb| rb.linvel().norm_squared() >= MIN_SPEED_SQUARED);
            if !moving {
                continue;
            }

            if self.is_grounded(id) {
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.jumping = false;
                }
                continue;
            }
            if jumping {
                continue;
            }

            let Some(col) = self.world.collider(collider) else {
                continue;
            };
            let aabb = col.compute_aabb();
            let groups = col.collision_groups();
            let origin = Point3::new(
                (aabb.mins.x + aabb.maxs.x) * 0.5,
                aabb.mins.y,
                (aabb.mins.z + aabb.maxs.z) * 0.5,
            );
            let ray = Ray::new(origin, -Vector3::y());
            let filter = QueryFilter::default()
                .groups(groups)
                .exclude_collider(collider)
                .exclude_rigid_body(body)
                .exclude_sensors();

            let Some((_, distance)) = self.world.cast_ray(&ray, factor * height, filter) else {
                continue;
            };
            if distance <= snap {
                continue;
            }
            let Some(rb) = self.world.body_mut(body) else {
                continue;
            };
            let mut pose = *rb.position();
            pose.translation.vector.y -= distance;
            let mut velocity = *rb.linvel();
            velocity.y *= 0.1;
            rb.set_linvel(velocity, true);
            self.world.teleport(body, collider, pose);
        }
    }
}
