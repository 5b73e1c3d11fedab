use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{Isometry3, Point3, Vector3};
use rapier3d::prelude::{QueryFilter, SharedShape};

use super::motion::MIN_SPEED_SQUARED;
use super::PhysicalDomain;
use crate::entity::EntityId;
use crate::filter::{CollisionProfile, NON_PHYSICAL, PHYSICAL, STATIC, TERRAIN};
use crate::mode::{Mode, ModeData};
use crate::notify::{HitInfo, LocationUpdate, Notification};

/// Orientation changes below this angle (radians) are not broadcast.
const ORIENTATION_SEND_THRESHOLD: f32 = 0.1;
/// Velocity components closer than this are considered unchanged.
const VELOCITY_SEND_THRESHOLD: f32 = 0.01;
/// How far an entity may drift from its extrapolated position before a new one is sent.
const POSITION_DRIFT_THRESHOLD: f32 = 0.5;

/// A projectile touching something at the end of a sub-step.
#[derive(Debug, Clone, Copy)]
struct ProjectileContact {
    projectile: EntityId,
    target: EntityId,
    point: Point3<f32>,
}

fn differs(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
    (a - b).iter().any(|c| c.abs() > VELOCITY_SEND_THRESHOLD)
}

fn velocity_changed(current: Option<Vector3<f32>>, last: Option<Vector3<f32>>) -> bool {
    match (current, last) {
        (Some(_), None) => true,
        (Some(current), Some(last)) => {
            differs(&current, &last) || (current == Vector3::zeros() && last != Vector3::zeros())
        }
        (None, _) => false,
    }
}

impl PhysicalDomain {
    /// Advances the simulation by `seconds` (scaled by the container's `simulation_speed`)
    /// and processes everything that changed.
    pub fn tick(&mut self, seconds: f64) {
        let span = tracing::debug_span!("physical_domain_tick", domain = %self.container);
        let _guard = span.enter();

        let speed = self
            .entries
            .get(&self.container)
            .and_then(|c| c.entity.f32_property("simulation_speed"))
            .unwrap_or(1.0) as f64;
        let tick_size = (seconds * speed).max(0.0);
        let dt = self.config.substep_size();

        let total = self.step_remainder + tick_size;
        let steps = (total / dt + 1e-9).floor() as u64;
        self.step_remainder = (total - steps as f64 * dt).max(0.0);

        let mut contacts = Vec::new();
        for _ in 0..steps {
            self.before_substep();
            self.world.step(dt as f32);
            contacts.extend(self.projectile_contacts());
            self.after_substep();
        }
        self.sim_time += tick_size;

        if steps > 0 {
            self.sync_moved_bodies();
        }
        self.emit_projectile_hits(&contacts);
        self.update_visibility_queue();

        let moved: Vec<EntityId> = self
            .moving
            .iter()
            .copied()
            .filter(|id| self.entries.get(id).is_some_and(|e| e.moving_this_frame))
            .collect();
        for id in moved {
            self.probe_water(id);
        }
        self.process_water_bodies();
        self.process_moving();
        self.process_dirty_terrain();

        tracing::debug!(
            "[PHYSICAL-DOMAIN] Tick of {:.3}s: {} sub-step(s), {} moving, {} queued for visibility",
            tick_size,
            steps,
            self.moving.len(),
            self.visibility_queue.len()
        );
    }

    /// Copies simulated poses and velocities back onto the entities whose bodies moved.
    fn sync_moved_bodies(&mut self) {
        let mut candidates = self.world.active_dynamic_bodies();
        candidates.extend(
            self.moving
                .iter()
                .filter_map(|id| self.entries.get(id).and_then(|e| e.body)),
        );

        for handle in candidates {
            let Some(rb) = self.world.body(handle) else {
                continue;
            };
            if !rb.is_dynamic() {
                continue;
            }
            let id = EntityId(rb.user_data as u64);
            let pose: Isometry3<f32> = *rb.position();
            let linvel = *rb.linvel();
            let angvel = *rb.angvel();

            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.body != Some(handle) || entry.last_pose == Some(pose) {
                continue;
            }
            entry.last_pose = Some(pose);

            let location = &mut entry.entity.location;
            location.pos = Some(Point3::from(pose.translation.vector));
            location.orientation = Some(pose.rotation);
            location.velocity = Some(if linvel.norm_squared() < MIN_SPEED_SQUARED {
                Vector3::zeros()
            } else {
                linvel
            });
            location.angular_velocity = Some(if angvel.norm_squared() < MIN_SPEED_SQUARED {
                Vector3::zeros()
            } else {
                angvel
            });
            entry.moving_this_frame = true;

            self.add_to_moving(id);
            self.move_spheres(id);
            self.queue_visibility(id);
        }
    }

    /// Every contact a projectile has after the last sub-step, including resting ones.
    fn projectile_contacts(&self) -> Vec<ProjectileContact> {
        let mut found = Vec::new();
        for entry in self.entries.values().filter(|e| e.mode == Mode::Projectile) {
            let Some(collider) = entry.collider else {
                continue;
            };
            let projectile = entry.id();
            for contact in self.world.touching(collider) {
                let (other, point) = if contact.collider1 == collider {
                    (contact.collider2, contact.point2)
                } else {
                    (contact.collider1, contact.point1)
                };
                let Some(target) = self.world.owner(other).filter(|t| *t != projectile) else {
                    continue;
                };
                found.push(ProjectileContact {
                    projectile,
                    target,
                    point,
                });
            }
        }
        found
    }

    /// Sends one hit pair per projectile and target touched during the tick.
    fn emit_projectile_hits(&mut self, contacts: &[ProjectileContact]) {
        let mut seen = BTreeSet::new();
        let records: Vec<ProjectileContact> = contacts
            .iter()
            .copied()
            .filter(|r| seen.insert((r.projectile, r.target)))
            .collect();

        for record in records {
            let Some(projectile) = self.entries.get(&record.projectile) else {
                continue;
            };
            let (attacker, extra) = match &projectile.entity.mode_data {
                ModeData::Projectile { entity, extra } => (entity.unwrap_or(record.target), extra.clone()),
                _ => (record.target, BTreeMap::new()),
            };
            let hit = HitInfo {
                attacker,
                pos: record.point,
                loc: self.container,
                extra,
            };
            tracing::debug!(
                "[PHYSICAL-DOMAIN] Projectile {} hit {}",
                record.projectile,
                record.target
            );
            self.outbox.push(Notification::Hit {
                from: record.target,
                to: record.projectile,
                hit: hit.clone(),
            });
            self.outbox.push(Notification::Hit {
                from: record.projectile,
                to: record.target,
                hit,
            });
        }
    }

    /// Walks the moving list, compacting it in place. Entries that did not move this frame
    /// get their velocities zeroed and one final change pass.
    fn process_moving(&mut self) {
        let mut i = 0;
        while i < self.moving.len() {
            let id = self.moving[i];
            let Some(entry) = self.entries.get_mut(&id) else {
                self.moving.swap_remove(i);
                continue;
            };

            if entry.moving_this_frame {
                entry.moving_this_frame = false;
                self.process_moved_entity(id);
                i += 1;
                continue;
            }

            let location = &mut entry.entity.location;
            if location.velocity.is_some() {
                location.velocity = Some(Vector3::zeros());
            }
            if location.angular_velocity.is_some() {
                location.angular_velocity = Some(Vector3::zeros());
            }
            entry.in_moving_list = false;
            self.moving.swap_remove(i);
            self.process_moved_entity(id);
        }
    }

    /// Works out what changed since observers were last told about `id`, and tells them.
    pub(crate) fn process_moved_entity(&mut self, id: EntityId) {
        let now = self.sim_time;
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        let location = &entry.entity.location;
        let last = entry.last_sent;

        let orientation = location.orientation.filter(|current| match last.orientation {
            Some(previous) => previous.angle_to(current) > ORIENTATION_SEND_THRESHOLD,
            None => true,
        });
        let velocity_change = velocity_changed(location.velocity, last.velocity);
        let angular_change = velocity_changed(location.angular_velocity, last.angular_velocity);

        let pos = location.pos.filter(|pos| {
            if velocity_change {
                return true;
            }
            let Some(previous) = last.pos else {
                return true;
            };
            match location.velocity.filter(|v| *v != Vector3::zeros()) {
                None => previous != *pos,
                Some(_) => {
                    let elapsed = (now - last.time) as f32;
                    let predicted = previous + last.velocity.unwrap_or_else(Vector3::zeros) * elapsed;
                    (pos - predicted).norm() > POSITION_DRIFT_THRESHOLD
                }
            }
        });

        let mut update = LocationUpdate {
            entity: id,
            seq: 0,
            pos,
            velocity: velocity_change.then_some(location.velocity).flatten(),
            orientation,
            angular_velocity: angular_change.then_some(location.angular_velocity).flatten(),
            mode: entry.mode_changed.then_some(entry.mode),
        };
        entry.mode_changed = false;

        let changed = update.pos.is_some()
            || update.velocity.is_some()
            || update.orientation.is_some()
            || update.angular_velocity.is_some()
            || update.mode.is_some();
        if changed {
            entry.entity.seq += 1;
            update.seq = entry.entity.seq;
            if let Some(pos) = update.pos {
                entry.last_sent.pos = Some(pos);
                entry.last_sent.time = now;
            }
            if update.velocity.is_some() {
                entry.last_sent.velocity = update.velocity;
            }
            if update.orientation.is_some() {
                entry.last_sent.orientation = update.orientation;
            }
            if update.angular_velocity.is_some() {
                entry.last_sent.angular_velocity = update.angular_velocity;
            }
            for observer in &entry.observing_this {
                self.outbox.push(Notification::Sight {
                    to: *observer,
                    update: update.clone(),
                });
            }
        }

        if update.pos.is_some() {
            self.check_closeness(id);
        }
        self.update_terrain_mod(id, false);
    }

    /// Rebuilds terrain tiles touched by modifier changes and asks every entity standing on
    /// them to re-evaluate its position.
    fn process_dirty_terrain(&mut self) {
        let rects = self.terrain.rebuild_dirty(&mut self.world);
        if rects.is_empty() {
            return;
        }
        let column_height = self
            .entries
            .get(&self.container)
            .and_then(|c| c.entity.location.valid_bbox())
            .map(|b| b.height())
            .filter(|h| *h > 0.0)
            .unwrap_or(10_000.0);
        let filter = QueryFilter::default()
            .groups(CollisionProfile::new(TERRAIN, PHYSICAL | NON_PHYSICAL | STATIC).groups())
            .exclude_sensors();

        let mut touched = Vec::new();
        for rect in rects {
            let (cx, cz) = rect.center();
            let (sx, sz) = rect.size();
            let column = SharedShape::cuboid(sx * 0.5, column_height, sz * 0.5);
            let pose = Isometry3::translation(cx, 0.0, cz);
            for handle in self.world.intersecting(&pose, &*column, filter) {
                if let Some(owner) = self.world.owner(handle) {
                    if owner != self.container && !touched.contains(&owner) {
                        touched.push(owner);
                    }
                }
            }
        }

        tracing::debug!("[TERRAIN] Asking {} entities to re-evaluate their position", touched.len());
        for id in touched {
            if let Some(pos) = self.entries.get(&id).and_then(|e| e.pos()) {
                self.outbox.push(Notification::Move { to: id, pos });
            }
        }
    }
}
