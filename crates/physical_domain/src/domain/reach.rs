use nalgebra::{Isometry3, Point3};
use rapier3d::parry::query as parry_query;
use rapier3d::parry::shape::Ball;
use rapier3d::prelude::{QueryFilter, Ray};

use super::PhysicalDomain;
use crate::closeness::{ClosenessCallback, Observation, ObservationId};
use crate::entity::EntityId;

/// Ray casts toward a target overshoot its center by this fraction of the distance.
const RAY_EXTENSION: f32 = 0.1;

/// One entity touched by a collision query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEntry {
    pub entity: EntityId,
    /// Contact point on the query sphere.
    pub point: Point3<f32>,
    /// Distance from the sphere center to the entity's surface.
    pub distance: f32,
}

impl PhysicalDomain {
    /// Whether `reacher` can touch `target` with the given reach. `position` is an
    /// optional point on the target, in the target's local space.
    pub fn is_entity_reachable(
        &self,
        reacher: EntityId,
        reach: f32,
        target: EntityId,
        position: Option<Point3<f32>>,
    ) -> bool {
        if reacher == self.container {
            return true;
        }
        if reach == 0.0 {
            return false;
        }
        let Some(reacher_entry) = self.entries.get(&reacher) else {
            return false;
        };
        let Some(reacher_center) = reacher_entry.center() else {
            return false;
        };

        if target == self.container {
            let Some(position) = position else {
                return false;
            };
            let distance = nalgebra::distance(&reacher_center, &position) - reacher_entry.entity.location.radius();
            return distance <= reach;
        }
        self.is_within_reach(reacher, target, reach, position)
    }

    /// Edge-to-edge reach test between two entries, falling back to a ray cast against the
    /// target's actual shape.
    pub(crate) fn is_within_reach(
        &self,
        reacher: EntityId,
        target: EntityId,
        reach: f32,
        position: Option<Point3<f32>>,
    ) -> bool {
        let (Some(reacher_entry), Some(target_entry)) = (self.entries.get(&reacher), self.entries.get(&target)) else {
            return false;
        };
        let (Some(from), Some(target_pose)) = (reacher_entry.center(), target_entry.pose()) else {
            return false;
        };
        let to = match position {
            Some(local) => target_pose * local,
            None => match target_entry.center() {
                Some(center) => center,
                None => return false,
            },
        };

        let reacher_radius = reacher_entry.entity.location.radius();
        let target_radius = target_entry.entity.location.radius();
        if nalgebra::distance(&from, &to) - reacher_radius - target_radius <= reach {
            return true;
        }

        let Some(collider) = target_entry.collider.and_then(|c| self.world.collider(c)) else {
            return false;
        };
        let extended = to + (to - from) * RAY_EXTENSION;
        let ray = Ray::new(from, extended - from);
        let Some(toi) = collider.shape().cast_ray(collider.position(), &ray, 1.0, true) else {
            return false;
        };
        let distance = nalgebra::distance(&from, &ray.point_at(toi)) - reacher_radius;
        distance <= reach
    }

    /// Watches the distance between two entries. The callback fires exactly once: when the
    /// pair drifts out of reach, when either side is removed, when the watch is dropped
    /// with [`PhysicalDomain::unobserve_closeness`] or when the domain is torn down.
    pub fn observe_closeness(
        &mut self,
        reacher: EntityId,
        target: EntityId,
        reach: f32,
        callback: ClosenessCallback,
    ) -> Option<ObservationId> {
        if !self.entries.contains_key(&reacher) || !self.entries.contains_key(&target) {
            return None;
        }
        let id = self.closeness.insert(reacher, target, reach, callback);
        for party in [reacher, target] {
            if let Some(entry) = self.entries.get_mut(&party) {
                entry.closeness.insert(id);
            }
        }
        Some(id)
    }

    pub fn unobserve_closeness(&mut self, id: ObservationId) {
        if let Some(observation) = self.detach_observation(id) {
            observation.fire();
        }
    }

    pub fn closeness_observations(&self) -> usize {
        self.closeness.len()
    }

    fn detach_observation(&mut self, id: ObservationId) -> Option<Observation> {
        let observation = self.closeness.remove(id)?;
        for party in [observation.reacher, observation.target] {
            if let Some(entry) = self.entries.get_mut(&party) {
                entry.closeness.remove(&id);
            }
        }
        Some(observation)
    }

    /// Detaches every observation involving `id`, leaving the callbacks to the caller.
    pub(crate) fn take_closeness_of(&mut self, id: EntityId) -> Vec<Observation> {
        let ids: Vec<ObservationId> = self
            .entries
            .get(&id)
            .map(|e| e.closeness.iter().copied().collect())
            .unwrap_or_default();
        ids.into_iter()
            .filter_map(|obs| self.detach_observation(obs))
            .collect()
    }

    /// Fires the observations of a moved entity whose pair is no longer within reach.
    pub(crate) fn check_closeness(&mut self, id: EntityId) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let out_of_reach: Vec<ObservationId> = entry
            .closeness
            .iter()
            .copied()
            .filter(|obs| {
                self.closeness
                    .get(*obs)
                    .is_some_and(|o| !self.is_within_reach(o.reacher, o.target, o.reach, None))
            })
            .collect();

        let fired: Vec<Observation> = out_of_reach
            .into_iter()
            .filter_map(|obs| self.detach_observation(obs))
            .collect();
        for observation in fired {
            tracing::debug!(
                "[PHYSICAL-DOMAIN] {} moved out of reach of {}",
                observation.target,
                observation.reacher
            );
            observation.fire();
        }
    }

    /// Every entity whose collision shape touches the given sphere.
    pub fn query_collision(&mut self, center: Point3<f32>, radius: f32) -> Vec<CollisionEntry> {
        let ball = Ball::new(radius);
        let pose = Isometry3::translation(center.x, center.y, center.z);
        let hits = self
            .world
            .intersecting(&pose, &ball, QueryFilter::default().exclude_sensors());

        let mut result: Vec<CollisionEntry> = Vec::new();
        for handle in hits {
            let (Some(owner), Some(collider)) = (self.world.owner(handle), self.world.collider(handle)) else {
                continue;
            };
            if !self.entries.contains_key(&owner) || result.iter().any(|r| r.entity == owner) {
                continue;
            }
            let entry = match parry_query::contact(&pose, &ball, collider.position(), collider.shape(), 0.0) {
                Ok(Some(contact)) => CollisionEntry {
                    entity: owner,
                    point: contact.point1,
                    distance: nalgebra::distance(&contact.point2, &center),
                },
                _ => CollisionEntry {
                    entity: owner,
                    point: center,
                    distance: 0.0,
                },
            };
            result.push(entry);
        }
        result.sort_by_key(|r| r.entity);
        result
    }
}
