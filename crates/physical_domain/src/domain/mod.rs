//! # Physical Domain
//!
//! Owns the authoritative physical state of every entity placed inside a container
//! entity. The domain steps a rigid-body world, keeps placement (planting, terrain
//! clamping, water submersion) consistent with the simulation, maintains the
//! area-of-interest graph and queues change notifications for the rest of the game
//! layer.
//!
//! # Design
//! - **Arena storage**: entries live in a `BTreeMap` keyed by [`EntityId`]; every
//!   relationship (attachment, observation, closeness) is an id set.
//! - **Explicit step results**: projectile contacts are read back from the world after
//!   every sub-step; the domain registers no engine callbacks.
//! - **Rebuild, never mutate**: mode, mass and shape changes remove the engine body,
//!   rebuild it and insert it again.
//! - **Single threaded**: callbacks are collected first and invoked after the registry
//!   has been updated.
//!
//! # Features
//! - Placement modes (free, fixed, planted, submerged, projectile)
//! - Height-field terrain with per-entity terrain modifiers
//! - Water volumes with automatic submersion
//! - Area-of-interest tracking in a separate scaled visibility world
//! - Reachability checks and closeness observations
//! - Self-propulsion, jumping and auto-stepping

mod aoi;
mod motion;
mod placement;
mod properties;
mod reach;
mod tick;
mod water;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use domain_terrain::Terrain;
use nalgebra::{Point3, Vector3};
use rapier3d::prelude::{ColliderBuilder, RigidBodyBuilder};

use crate::closeness::ClosenessRegistry;
use crate::config::DomainConfig;
use crate::entity::{Entity, EntityId};
use crate::error::DomainError;
use crate::filter::CollisionProfile;
use crate::mode::Mode;
use crate::notify::Notification;
use crate::registry::{DomainEntry, Speeds};
use crate::shape::{build_shape, Geometry};
use crate::terrain::TerrainAdapter;
use crate::visibility::VisibilityWorld;
use crate::world::PhysicsWorld;

pub use placement::TransformData;
pub use reach::CollisionEntry;

pub struct PhysicalDomain {
    config: DomainConfig,
    container: EntityId,
    entries: BTreeMap<EntityId, DomainEntry>,
    world: PhysicsWorld,
    visibility: VisibilityWorld,
    terrain: TerrainAdapter,
    moving: Vec<EntityId>,
    visibility_queue: VecDeque<EntityId>,
    propelling: BTreeMap<EntityId, Vector3<f32>>,
    stepping: BTreeMap<EntityId, f32>,
    closeness: ClosenessRegistry,
    outbox: Vec<Notification>,
    sim_time: f64,
    step_remainder: f64,
    warned_friction: bool,
}

impl PhysicalDomain {
    pub fn new(container: Entity, config: DomainConfig) -> Self {
        let gravity = Vector3::from(config.gravity);
        let friction = container
            .f32_property("friction")
            .unwrap_or(config.default_friction);

        let mut domain = Self {
            visibility: VisibilityWorld::new(config.visibility_scaling()),
            terrain: TerrainAdapter::new(container.id, friction),
            world: PhysicsWorld::new(gravity),
            container: container.id,
            entries: BTreeMap::new(),
            moving: Vec::new(),
            visibility_queue: VecDeque::new(),
            propelling: BTreeMap::new(),
            stepping: BTreeMap::new(),
            closeness: ClosenessRegistry::default(),
            outbox: Vec::new(),
            sim_time: 0.0,
            step_remainder: 0.0,
            warned_friction: false,
            config,
        };

        if let Some(bbox) = container.location.valid_bbox() {
            domain.terrain.build_borders(bbox, &mut domain.world);
        }
        let id = container.id;
        domain.entries.insert(id, DomainEntry::new(container));
        tracing::info!("✓ [PHYSICAL-DOMAIN] Domain {} created", id);
        domain
    }

    /// Builds a domain with a flat or generated terrain already installed.
    pub fn with_terrain(mut self, terrain: Terrain) -> Self {
        self.set_terrain(terrain);
        self
    }

    pub fn set_terrain(&mut self, terrain: Terrain) {
        self.terrain.set_terrain(terrain, &mut self.world);
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    pub fn container_id(&self) -> EntityId {
        self.container
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entries.get(&id).map(|e| &e.entity)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        id != self.container && self.entries.contains_key(&id)
    }

    /// Number of placed entities, not counting the container.
    pub fn len(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn terrain(&self) -> Option<&Terrain> {
        self.terrain.terrain()
    }

    pub fn simulated_time(&self) -> f64 {
        self.sim_time
    }

    /// Entities planted on `id`.
    pub fn attached_to(&self, id: EntityId) -> Vec<EntityId> {
        self.entries
            .get(&id)
            .map(|e| e.attached.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Places an entity in the domain. Entities without a position are rejected with a
    /// warning.
    pub fn add_entity(&mut self, entity: Entity) {
        let id = entity.id;
        if let Err(err) = self.try_add_entity(entity) {
            tracing::warn!("[PHYSICAL-DOMAIN] Could not add entity {}: {}", id, err);
        }
    }

    fn try_add_entity(&mut self, entity: Entity) -> Result<(), DomainError> {
        let id = entity.id;
        if self.entries.contains_key(&id) {
            return Err(DomainError::DuplicateEntity(id));
        }
        let pos = entity.location.pos.ok_or(DomainError::MissingPosition(id))?;

        let mut entry = DomainEntry::new(entity);
        entry.is_water = entry.entity.bool_property("water_body");
        entry.mass = entry.entity.f32_property("mass").unwrap_or(0.0);
        entry.speeds = Speeds {
            ground: entry.entity.f32_property("speed_ground").unwrap_or(0.0),
            water: entry.entity.f32_property("speed_water").unwrap_or(0.0),
            flight: entry.entity.f32_property("speed_flight").unwrap_or(0.0),
            jump: entry.entity.f32_property("speed_jump").unwrap_or(0.0),
        };
        entry.vis_radius = self.visibility_radius_for(&entry.entity);
        self.entries.insert(id, entry);

        if let Err(err) = self.rebuild_shape(id) {
            tracing::warn!("[PHYSICAL-DOMAIN] Entity {} has no collision shape: {}", id, err);
        }
        self.apply_new_position(id, pos, true);
        self.install_body(id);
        self.warn_unsupported_friction(id);

        let (velocity, propel, step_factor) = match self.entries.get(&id) {
            Some(entry) => (
                entry.entity.location.velocity,
                entry.entity.vector_property("propel"),
                entry.entity.f32_property("step_factor"),
            ),
            None => return Ok(()),
        };
        if let (Some(velocity), Some(body)) = (velocity, self.entries.get(&id).and_then(|e| e.body)) {
            if let Some(rb) = self.world.body_mut(body) {
                rb.set_linvel(velocity, true);
            }
        }
        if let Some(propel) = propel {
            self.apply_propel(id, propel);
        }
        if let Some(factor) = step_factor.filter(|f| *f > 0.0) {
            self.stepping.insert(id, factor);
        }

        self.update_terrain_mod(id, true);
        self.insert_spheres(id);

        let is_water = self.entries.get(&id).is_some_and(|e| e.is_water);
        if is_water {
            self.rescan_water();
        } else {
            self.probe_water(id);
        }

        tracing::debug!("[PHYSICAL-DOMAIN] Entity {} added", id);
        Ok(())
    }

    /// Removes an entity, excising every relationship it takes part in. Entities that were
    /// planted on it are placed again.
    pub fn remove_entity(&mut self, id: EntityId) {
        if id == self.container {
            tracing::warn!("[PHYSICAL-DOMAIN] The container cannot be removed from itself");
            return;
        }
        if !self.entries.contains_key(&id) {
            tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::UnknownEntity(id));
            return;
        }

        self.terrain.remove_mod(id);
        self.uninstall_body(id);
        self.moving.retain(|m| *m != id);
        self.visibility_queue.retain(|q| *q != id);
        self.remove_spheres(id);
        self.plant_on(id, None);

        let fired = self.take_closeness_of(id);

        let Some(entry) = self.entries.remove(&id) else {
            return;
        };
        for observer in &entry.observing_this {
            if let Some(other) = self.entries.get_mut(observer) {
                other.observed_by_this.remove(&id);
                other.observed_by_this_changes.remove(&id);
            }
        }
        for observed in &entry.observed_by_this {
            if let Some(other) = self.entries.get_mut(observed) {
                other.observing_this.remove(&id);
                other.observing_this_changes.remove(&id);
            }
        }
        self.propelling.remove(&id);
        self.stepping.remove(&id);

        let mut transformed = BTreeSet::new();
        for attached in &entry.attached {
            let pos = self.entries.get(attached).and_then(|e| e.pos());
            if let Some(pos) = pos {
                self.apply_transform_internal(*attached, None, Some(pos), None, &mut transformed, true);
            }
        }

        if entry.is_water {
            self.rescan_water();
        }

        tracing::debug!("[PHYSICAL-DOMAIN] Entity {} removed", id);
        for observation in fired {
            observation.fire();
        }
    }

    /// Tears the domain down, firing every outstanding closeness callback.
    pub fn removed(&mut self) {
        let observations = self.closeness.drain();
        for entry in self.entries.values_mut() {
            entry.closeness.clear();
        }
        tracing::debug!(
            "[PHYSICAL-DOMAIN] Domain {} removed, firing {} closeness callback(s)",
            self.container,
            observations.len()
        );
        for observation in observations {
            observation.fire();
        }
    }

    fn visibility_radius_for(&self, entity: &Entity) -> f32 {
        let bbox_radius = entity.location.valid_bbox().map(|b| b.radius());
        self.config
            .visibility_radius(entity.f32_property("vis_dist"), bbox_radius)
    }

    /// Ground height below `pos`: the terrain if there is one, else the floor of the
    /// container, else the position itself.
    pub(crate) fn ground_height(&self, pos: &Point3<f32>) -> f32 {
        self.terrain
            .height_at(pos.x, pos.z)
            .or_else(|| {
                self.entries
                    .get(&self.container)
                    .and_then(|c| c.entity.location.valid_bbox())
                    .map(|b| b.low.y)
            })
            .unwrap_or(pos.y)
    }

    /// Height of the terrain at a point, if terrain exists there.
    pub fn terrain_height(&self, x: f32, z: f32) -> Option<f32> {
        self.terrain.height_at(x, z)
    }

    pub(crate) fn add_to_moving(&mut self, id: EntityId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if !entry.in_moving_list {
                entry.in_moving_list = true;
                self.moving.push(id);
            }
        }
    }

    pub(crate) fn rebuild_shape(&mut self, id: EntityId) -> Result<(), DomainError> {
        let Some(entry) = self.entries.get_mut(&id) else {
            return Err(DomainError::UnknownEntity(id));
        };
        entry.shape = None;
        let Some(bbox) = entry.entity.location.valid_bbox().copied() else {
            return Ok(());
        };
        let geometry = match entry.entity.property("geometry") {
            Some(value) => Some(Geometry::from_property(value)?),
            None => None,
        };
        let dynamic = entry.is_dynamic();
        entry.shape = Some(build_shape(&bbox, geometry.as_ref(), dynamic)?);
        Ok(())
    }

    /// Creates the engine body for an entry from its cached shape, mode and mass.
    pub(crate) fn install_body(&mut self, id: EntityId) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        if entry.body.is_some() {
            return;
        }
        let Some(pose) = entry.pose() else {
            return;
        };
        let user_data = id.0 as u128;

        let (body, collider) = if entry.is_water {
            let collider = match &entry.shape {
                Some(shape) => ColliderBuilder::new(shape.shape.clone()).position(shape.local_pose()),
                None => ColliderBuilder::halfspace(Vector3::y_axis()),
            }
            .sensor(true)
            .collision_groups(CollisionProfile::WATER.groups())
            .user_data(user_data)
            .build();
            (
                RigidBodyBuilder::fixed().position(pose).user_data(user_data).build(),
                collider,
            )
        } else {
            let Some(shape) = &entry.shape else {
                return;
            };
            let dynamic = entry.is_dynamic();
            let mut body = if dynamic {
                RigidBodyBuilder::dynamic()
            } else {
                RigidBodyBuilder::fixed()
            }
            .position(pose)
            .user_data(user_data);

            if let Some(factor) = entry.entity.vector_property("angular_factor") {
                body = body.enabled_rotations(factor.x != 0.0, factor.y != 0.0, factor.z != 0.0);
            }
            if entry.mode == Mode::Projectile {
                body = body.ccd_enabled(true);
            }
            if entry.mode == Mode::Submerged {
                body = body
                    .gravity_scale(0.0)
                    .linear_damping(self.config.submerged_damping);
            }

            let friction = entry
                .entity
                .f32_property("friction")
                .unwrap_or(self.config.default_friction);
            let mut collider = ColliderBuilder::new(shape.shape.clone())
                .position(shape.local_pose())
                .collision_groups(
                    CollisionProfile::for_entity(entry.mode, entry.entity.location.solid).groups(),
                )
                .friction(friction)
                .user_data(user_data);
            if dynamic {
                collider = collider.mass(entry.mass);
            }
            (body.build(), collider.build())
        };

        let (body_handle, collider_handle) = self.world.insert_body(body, collider);
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.body = Some(body_handle);
            entry.collider = Some(collider_handle);
            entry.last_pose = Some(pose);
        }
    }

    /// Removes the engine body, returning its linear and angular velocity.
    pub(crate) fn uninstall_body(&mut self, id: EntityId) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let entry = self.entries.get_mut(&id)?;
        entry.collider = None;
        let handle = entry.body.take()?;
        let body = self.world.remove_body(handle)?;
        Some((*body.linvel(), *body.angvel()))
    }

    /// Removes, rebuilds and re-inserts an entry's body, carrying its velocity over.
    pub(crate) fn rebuild_body(&mut self, id: EntityId) {
        let velocity = self.uninstall_body(id);
        if let Err(err) = self.rebuild_shape(id) {
            tracing::warn!("[PHYSICAL-DOMAIN] Could not rebuild shape of {}: {}", id, err);
        }
        self.install_body(id);

        let body = self.entries.get(&id).and_then(|e| e.body);
        if let (Some((linvel, angvel)), Some(body)) = (velocity, body) {
            if let Some(rb) = self.world.body_mut(body) {
                if rb.is_dynamic() {
                    rb.set_linvel(linvel, true);
                    rb.set_angvel(angvel, true);
                }
            }
        }
    }

    fn warn_unsupported_friction(&mut self, id: EntityId) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let unsupported = ["friction_roll", "friction_spin"]
            .iter()
            .any(|name| entry.entity.property(name).is_some());
        if unsupported && !self.warned_friction {
            self.warned_friction = true;
            tracing::warn!("[PHYSICAL-DOMAIN] Rolling and spinning friction are not supported by the physics engine; ignoring");
        }
    }

    /// Number of entries waiting on an area-of-interest recomputation.
    pub fn pending_visibility_checks(&self) -> usize {
        self.visibility_queue.len()
    }
}
