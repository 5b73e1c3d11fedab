//! Terrain collision bodies, domain borders and terrain modifier tracking.

use std::collections::BTreeMap;

use domain_terrain::{Area, ModKind, ModShape, SegmentKey, Terrain, TerrainModSpec};
use nalgebra::{DMatrix, Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::{ColliderBuilder, ColliderHandle, SharedShape};

use crate::entity::{BBox, EntityId, PropertyValue};
use crate::error::DomainError;
use crate::filter::CollisionProfile;
use crate::world::PhysicsWorld;

/// Where a modifier was last placed from.
#[derive(Debug, Clone, PartialEq)]
struct PlacedMod {
    pos: Point3<f32>,
    orientation: UnitQuaternion<f32>,
}

pub(crate) struct TerrainAdapter {
    owner: EntityId,
    terrain: Option<Terrain>,
    segments: BTreeMap<SegmentKey, ColliderHandle>,
    borders: Vec<ColliderHandle>,
    mods: BTreeMap<EntityId, PlacedMod>,
    dirty: Vec<Area>,
    friction: f32,
}

impl TerrainAdapter {
    pub fn new(owner: EntityId, friction: f32) -> Self {
        Self {
            owner,
            terrain: None,
            segments: BTreeMap::new(),
            borders: Vec::new(),
            mods: BTreeMap::new(),
            dirty: Vec::new(),
            friction,
        }
    }

    pub fn terrain(&self) -> Option<&Terrain> {
        self.terrain.as_ref()
    }

    /// Replaces the terrain and rebuilds every segment body.
    pub fn set_terrain(&mut self, terrain: Terrain, world: &mut PhysicsWorld) {
        for (_, handle) in std::mem::take(&mut self.segments) {
            world.remove_collider(handle);
        }
        self.mods.clear();
        self.dirty.clear();

        let keys: Vec<SegmentKey> = terrain.segments().map(|s| s.key()).collect();
        self.terrain = Some(terrain);
        for key in &keys {
            self.build_segment(*key, world);
        }
        tracing::info!("✓ [TERRAIN] Built {} terrain segment(s)", keys.len());
    }

    fn build_segment(&mut self, key: SegmentKey, world: &mut PhysicsWorld) {
        if let Some(old) = self.segments.remove(&key) {
            world.remove_collider(old);
        }
        let Some(segment) = self.terrain.as_ref().and_then(|t| t.segment(key)) else {
            return;
        };

        let size = segment.size();
        let res = segment.resolution() as f32;
        let heights = DMatrix::from_fn(size, size, |row, col| segment.point(col, row));
        let collider = ColliderBuilder::new(SharedShape::heightfield(
            heights,
            Vector3::new(res, 1.0, res),
        ))
        .translation(Vector3::new(
            segment.x_ref() + res * 0.5,
            0.0,
            segment.z_ref() + res * 0.5,
        ))
        .collision_groups(CollisionProfile::TERRAIN.groups())
        .friction(self.friction)
        .user_data(self.owner.0 as u128)
        .build();

        let handle = world.insert_collider(collider);
        self.segments.insert(key, handle);
        tracing::debug!(
            "[TERRAIN] Segment {:?} rebuilt (heights {}..{})",
            key,
            segment.min(),
            segment.max()
        );
    }

    /// Six planes enclosing the domain box.
    pub fn build_borders(&mut self, bbox: &BBox, world: &mut PhysicsWorld) {
        for handle in self.borders.drain(..) {
            world.remove_collider(handle);
        }
        if !bbox.is_valid() {
            return;
        }

        let planes = [
            (Vector3::y_axis(), Vector3::new(0.0, bbox.low.y, 0.0)),
            (-Vector3::y_axis(), Vector3::new(0.0, bbox.high.y, 0.0)),
            (Vector3::x_axis(), Vector3::new(bbox.low.x, 0.0, 0.0)),
            (-Vector3::x_axis(), Vector3::new(bbox.high.x, 0.0, 0.0)),
            (Vector3::z_axis(), Vector3::new(0.0, 0.0, bbox.low.z)),
            (-Vector3::z_axis(), Vector3::new(0.0, 0.0, bbox.high.z)),
        ];
        for (normal, origin) in planes {
            let collider = ColliderBuilder::halfspace(normal)
                .translation(origin)
                .collision_groups(CollisionProfile::TERRAIN.groups())
                .friction(self.friction)
                .user_data(self.owner.0 as u128)
                .build();
            self.borders.push(world.insert_collider(collider));
        }
    }

    pub fn set_friction(&mut self, friction: f32, world: &mut PhysicsWorld) {
        self.friction = friction;
        for handle in self.segments.values().chain(self.borders.iter()) {
            if let Some(collider) = world.collider_mut(*handle) {
                collider.set_friction(friction);
            }
        }
    }

    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        self.terrain.as_ref()?.height_at(x, z)
    }

    pub fn has_mod(&self, owner: EntityId) -> bool {
        self.mods.contains_key(&owner)
    }

    /// Places or refreshes the modifier owned by `owner`. Unless `force` is set, a
    /// modifier already placed from the same pose is left alone.
    pub fn place_mod(
        &mut self,
        owner: EntityId,
        spec: &TerrainModSpec,
        pos: Point3<f32>,
        orientation: UnitQuaternion<f32>,
        force: bool,
    ) -> Result<(), DomainError> {
        let placed = PlacedMod { pos, orientation };
        if !force && self.mods.get(&owner) == Some(&placed) {
            return Ok(());
        }
        let Some(terrain) = self.terrain.as_mut() else {
            return Ok(());
        };

        let ground = terrain.base_height_at(pos.x, pos.z).unwrap_or(pos.y);
        let modifier = spec.place([pos.x, ground, pos.z], yaw_of(&orientation))?;
        self.dirty.extend(terrain.update_mod(owner.0, Some(modifier)));
        self.mods.insert(owner, placed);
        Ok(())
    }

    pub fn remove_mod(&mut self, owner: EntityId) {
        if self.mods.remove(&owner).is_none() {
            return;
        }
        if let Some(terrain) = self.terrain.as_mut() {
            self.dirty.extend(terrain.update_mod(owner.0, None));
        }
    }

    /// Rebuilds every segment touched by a modifier change and returns their rectangles.
    pub fn rebuild_dirty(&mut self, world: &mut PhysicsWorld) -> Vec<Area> {
        if self.dirty.is_empty() {
            return Vec::new();
        }
        let areas = std::mem::take(&mut self.dirty);
        let Some(terrain) = self.terrain.as_ref() else {
            return Vec::new();
        };

        let mut keys: Vec<SegmentKey> = areas.iter().flat_map(|a| terrain.segments_in(a)).collect();
        keys.sort_unstable();
        keys.dedup();

        let rects = keys
            .iter()
            .filter_map(|key| terrain.segment(*key).map(|s| s.rect()))
            .collect();
        for key in keys {
            self.build_segment(key, world);
        }
        rects
    }
}

/// Rotation about the vertical axis.
pub(crate) fn yaw_of(orientation: &UnitQuaternion<f32>) -> f32 {
    let forward = orientation * Vector3::x();
    (-forward.z).atan2(forward.x)
}

/// Parses a `terrainmod` property:
/// `{type: "levelmod" | "adjustmod", heightoffset: f, shape: {type: "polygon", points: [[x, z], ...]}}`.
/// Shapes may also be `{type: "box", min: [x, z], max: [x, z]}` or `{type: "circle", radius: r}`.
pub(crate) fn parse_terrain_mod(value: &PropertyValue) -> Result<TerrainModSpec, DomainError> {
    let invalid = |reason: &str| DomainError::InvalidProperty {
        name: "terrainmod".to_string(),
        reason: reason.to_string(),
    };
    let map = value.as_map().ok_or_else(|| invalid("expected a map"))?;

    let kind = match map.get("type").and_then(PropertyValue::as_str) {
        Some("levelmod") => ModKind::Level,
        Some("adjustmod") => ModKind::Adjust,
        _ => return Err(invalid("type must be levelmod or adjustmod")),
    };
    let height_offset = map
        .get("heightoffset")
        .and_then(PropertyValue::as_f32)
        .unwrap_or(0.0);

    let shape_map = map
        .get("shape")
        .and_then(PropertyValue::as_map)
        .ok_or_else(|| invalid("missing shape"))?;
    let pair = |value: Option<&PropertyValue>| -> Option<[f32; 2]> {
        let items = value?.as_list()?;
        match items {
            [x, z] => Some([x.as_f32()?, z.as_f32()?]),
            _ => None,
        }
    };

    let shape = match shape_map.get("type").and_then(PropertyValue::as_str) {
        Some("polygon") => ModShape::Polygon {
            points: shape_map
                .get("points")
                .and_then(PropertyValue::as_list)
                .ok_or_else(|| invalid("polygon needs points"))?
                .iter()
                .map(|p| pair(Some(p)))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid("polygon points must be [x, z] pairs"))?,
        },
        Some("box") => ModShape::Rect {
            min: pair(shape_map.get("min")).ok_or_else(|| invalid("box needs min"))?,
            max: pair(shape_map.get("max")).ok_or_else(|| invalid("box needs max"))?,
        },
        Some("circle") => ModShape::Circle {
            radius: shape_map
                .get("radius")
                .and_then(PropertyValue::as_f32)
                .ok_or_else(|| invalid("circle needs radius"))?,
        },
        _ => return Err(invalid("unknown shape type")),
    };

    Ok(TerrainModSpec {
        kind,
        height_offset,
        shape,
    })
}
