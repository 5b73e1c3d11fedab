use std::collections::BTreeSet;

use super::PhysicalDomain;
use crate::entity::{BBox, EntityId, PropertyValue};
use crate::error::DomainError;
use crate::mode::{Mode, ModeData};
use crate::registry::WaterProximity;
use crate::terrain::parse_terrain_mod;

fn invalid(name: &str, reason: &str) -> DomainError {
    DomainError::InvalidProperty {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

impl PhysicalDomain {
    /// Applies a property change to an entity. Changes on the container go to
    /// [`PhysicalDomain::set_domain_property`].
    pub fn set_property(&mut self, id: EntityId, name: &str, value: PropertyValue) {
        if id == self.container {
            self.set_domain_property(name, value);
            return;
        }
        let Some(entry) = self.entries.get_mut(&id) else {
            tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::UnknownEntity(id));
            return;
        };
        entry.entity.properties.insert(name.to_string(), value.clone());

        match name {
            "propel" => match value.as_vector() {
                Some(propel) => self.apply_propel(id, propel),
                None => tracing::warn!("[PHYSICAL-DOMAIN] {}", invalid(name, "expected a vector")),
            },
            "friction" => {
                let friction = value.as_f32().unwrap_or(self.config.default_friction);
                if let Some(collider) = entry.collider.and_then(|c| self.world.collider_mut(c)) {
                    collider.set_friction(friction);
                }
            }
            "friction_roll" | "friction_spin" => self.warn_unsupported_friction(id),
            "mode" => match value.as_str().and_then(Mode::parse) {
                Some(mode) => self.set_mode(id, mode),
                None => tracing::warn!("[PHYSICAL-DOMAIN] {}", invalid(name, "unknown mode")),
            },
            "solid" => {
                entry.entity.location.solid = value.as_bool().unwrap_or(true);
                self.rebuild_body(id);
            }
            "mass" => {
                entry.mass = value.as_f32().unwrap_or(0.0);
                if !entry.mode.is_static() {
                    self.rebuild_body(id);
                }
            }
            "planted_offset" | "planted_scaled_offset" => {
                if entry.mode == Mode::Planted {
                    self.reposition(id);
                }
            }
            "terrainmod" => self.update_terrain_mod(id, true),
            "speed_ground" => entry.speeds.ground = value.as_f32().unwrap_or(0.0),
            "speed_water" => entry.speeds.water = value.as_f32().unwrap_or(0.0),
            "speed_flight" => entry.speeds.flight = value.as_f32().unwrap_or(0.0),
            "speed_jump" => entry.speeds.jump = value.as_f32().unwrap_or(0.0),
            "step_factor" => match value.as_f32().filter(|f| *f > 0.0) {
                Some(factor) => {
                    self.stepping.insert(id, factor);
                }
                None => {
                    self.stepping.remove(&id);
                }
            },
            "vis_dist" => self.refresh_visibility_radius(id),
            "angular_factor" | "geometry" => self.rebuild_body(id),
            "water_body" => {
                entry.is_water = value.as_bool().unwrap_or(false);
                if entry.is_water {
                    entry.water = WaterProximity::Clear;
                }
                self.rebuild_body(id);
                self.rescan_water();
            }
            _ => {}
        }
    }

    /// Applies a property change on the container itself.
    pub fn set_domain_property(&mut self, name: &str, value: PropertyValue) {
        let container = self.container;
        if let Some(entry) = self.entries.get_mut(&container) {
            entry.entity.properties.insert(name.to_string(), value.clone());
        }
        match name {
            "friction" => {
                let friction = value.as_f32().unwrap_or(self.config.default_friction);
                self.terrain.set_friction(friction, &mut self.world);
            }
            "friction_roll" | "friction_spin" => self.warn_unsupported_friction(container),
            _ => {}
        }
    }

    /// Switches an entity to a new mode, rebuilding its body. Leaving planted mode for a
    /// moving one releases everything stacked on top.
    pub fn set_mode(&mut self, id: EntityId, mode: Mode) {
        let Some(entry) = self.entries.get_mut(&id) else {
            tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::UnknownEntity(id));
            return;
        };
        if entry.mode == mode {
            return;
        }
        let was_planted = entry.mode == Mode::Planted;
        entry.mode = mode;
        entry.entity.mode = mode;
        entry.mode_changed = true;
        let moves = !mode.is_static() && entry.mass > 0.0;
        let attached: Vec<EntityId> = entry.attached.iter().copied().collect();

        if mode != Mode::Planted {
            self.plant_on(id, None);
        }
        self.rebuild_body(id);
        self.reposition(id);

        if was_planted && moves {
            for other in attached {
                self.set_mode(other, mode);
            }
        }
        self.probe_water(id);
        self.add_to_moving(id);
        self.update_terrain_mod(id, false);
        tracing::debug!("[PHYSICAL-DOMAIN] Entity {} switched to {}", id, mode);
    }

    pub fn set_mode_data(&mut self, id: EntityId, data: ModeData) {
        let Some(entry) = self.entries.get(&id) else {
            tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::UnknownEntity(id));
            return;
        };
        let planted = entry.mode == Mode::Planted;
        match data {
            ModeData::Planted { on } if on == id => {
                tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::SelfPlanting(id));
            }
            ModeData::Planted { on } => {
                self.plant_on(id, Some(on));
                if planted {
                    self.reposition(id);
                }
            }
            data => {
                self.plant_on(id, None);
                if let Some(entry) = self.entries.get_mut(&id) {
                    entry.entity.mode_data = data;
                }
            }
        }
    }

    /// Resizes an entity's bounding box, rebuilding its shape and placing it again.
    pub fn set_bbox(&mut self, id: EntityId, bbox: BBox) {
        let Some(entry) = self.entries.get_mut(&id) else {
            tracing::warn!("[PHYSICAL-DOMAIN] {}", DomainError::UnknownEntity(id));
            return;
        };
        entry.entity.location.bbox = Some(bbox);
        let is_water = entry.is_water;

        self.rebuild_body(id);
        self.refresh_visibility_radius(id);
        if let Some(pos) = self.entries.get(&id).and_then(|e| e.pos()) {
            self.apply_new_position(id, pos, true);
        }
        if is_water {
            self.rescan_water();
        } else {
            self.probe_water(id);
        }
        self.process_moved_entity(id);
    }

    /// Runs the current position through the placement rules again.
    fn reposition(&mut self, id: EntityId) {
        let Some(pos) = self.entries.get(&id).and_then(|e| e.pos()) else {
            return;
        };
        let mut transformed = BTreeSet::new();
        self.apply_transform_internal(id, None, Some(pos), None, &mut transformed, true);
    }

    /// Places, moves or removes the terrain modifier owned by `id`. Only planted entities
    /// modify the terrain.
    pub(crate) fn update_terrain_mod(&mut self, id: EntityId, force: bool) {
        let Some(entry) = self.entries.get(&id) else {
            return;
        };
        let value = match entry.mode {
            Mode::Planted => entry.entity.property("terrainmod"),
            _ => None,
        };
        let (Some(value), Some(pos)) = (value, entry.pos()) else {
            self.terrain.remove_mod(id);
            return;
        };
        let orientation = entry.entity.location.orientation_or_identity();
        let result = parse_terrain_mod(value)
            .and_then(|spec| self.terrain.place_mod(id, &spec, pos, orientation, force));
        if let Err(err) = result {
            tracing::warn!("[TERRAIN] Could not place terrain modifier of {}: {}", id, err);
        }
    }
}
