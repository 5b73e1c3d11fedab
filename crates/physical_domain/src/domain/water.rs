use rapier3d::prelude::{Collider, ColliderHandle, QueryFilter, SharedShape};

use super::PhysicalDomain;
use crate::entity::EntityId;
use crate::mode::Mode;
use crate::registry::WaterProximity;

/// Radius of the probe used for entities without a collision shape.
const POINT_PROBE_RADIUS: f32 = 0.01;

impl PhysicalDomain {
    /// Finds the water body an entry overlaps, if any, and records it.
    pub(crate) fn probe_water(&mut self, id: EntityId) {
        if id == self.container {
            return;
        }
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        if entry.is_water {
            return;
        }
        let Some(pose) = entry.pose() else {
            return;
        };
        let (shape, shape_pose) = match &entry.shape {
            Some(built) => (built.shape.clone(), built.pose(&pose)),
            None => (SharedShape::ball(POINT_PROBE_RADIUS), pose),
        };
        let own = entry.collider;

        let only_sensors = |_: ColliderHandle, collider: &Collider| collider.is_sensor();
        let mut filter = QueryFilter::default().predicate(&only_sensors);
        if let Some(own) = own {
            filter = filter.exclude_collider(own);
        }
        let hits = self.world.intersecting(&shape_pose, &*shape, filter);
        let water = hits
            .into_iter()
            .filter_map(|handle| self.world.owner(handle))
            .filter(|owner| *owner != id && self.entries.get(owner).is_some_and(|e| e.is_water))
            .min();

        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let next = match (water, entry.water) {
            (Some(water), _) => WaterProximity::Near(water),
            (None, WaterProximity::Near(_)) => WaterProximity::Exited,
            (None, current) => current,
        };
        if next != entry.water {
            tracing::debug!("[PHYSICAL-DOMAIN] Water proximity of {} is now {:?}", id, next);
            entry.water = next;
            self.add_to_moving(id);
        }
    }

    /// Probes every entry again after a water body appeared, moved, changed or vanished.
    pub(crate) fn rescan_water(&mut self) {
        let ids: Vec<EntityId> = self
            .entries
            .values()
            .filter(|e| !e.is_water && e.id() != self.container)
            .map(|e| e.id())
            .collect();
        for id in ids {
            self.probe_water(id);
            // The body itself may have changed, so anything still near water is checked again.
            if self
                .entries
                .get(&id)
                .is_some_and(|e| e.water != WaterProximity::Clear)
            {
                self.add_to_moving(id);
            }
        }
    }

    /// Submerges or surfaces every moving entry next to water. Free and projectile
    /// entries submerge; surfacing always leaves an entry free.
    pub(crate) fn process_water_bodies(&mut self) {
        let moving = self.moving.clone();
        for id in moving {
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            let mode = entry.mode;
            match entry.water {
                WaterProximity::Clear => {}
                WaterProximity::Near(water) => {
                    let inside = self.is_inside_water(id, water);
                    if inside && matches!(mode, Mode::Free | Mode::Projectile) {
                        self.set_submerged(id, true);
                    } else if !inside && mode == Mode::Submerged {
                        self.set_submerged(id, false);
                    }
                }
                WaterProximity::Exited => {
                    if mode == Mode::Submerged {
                        self.set_submerged(id, false);
                    }
                    if let Some(entry) = self.entries.get_mut(&id) {
                        entry.water = WaterProximity::Clear;
                    }
                }
            }
        }
    }

    /// Whether the center of `id` lies within the water body's volume.
    fn is_inside_water(&self, id: EntityId, water: EntityId) -> bool {
        if id == water {
            return false;
        }
        let (Some(center), Some(collider)) = (
            self.entries.get(&id).and_then(|e| e.center()),
            self.entries
                .get(&water)
                .and_then(|w| w.collider)
                .and_then(|c| self.world.collider(c)),
        ) else {
            return false;
        };
        collider.shape().contains_point(collider.position(), &center)
    }

    fn set_submerged(&mut self, id: EntityId, submerged: bool) {
        let damping = self.config.submerged_damping;
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let mode = if submerged { Mode::Submerged } else { Mode::Free };
        entry.mode = mode;
        entry.entity.mode = mode;
        entry.mode_changed = true;
        if let Some(rb) = entry.body.and_then(|b| self.world.body_mut(b)) {
            if submerged {
                rb.set_gravity_scale(0.0, true);
                rb.set_linear_damping(damping);
            } else {
                rb.set_gravity_scale(1.0, true);
                rb.set_linear_damping(0.0);
            }
        }
        tracing::debug!("[PHYSICAL-DOMAIN] Entity {} is now {}", id, mode);
        self.add_to_moving(id);
    }
}
