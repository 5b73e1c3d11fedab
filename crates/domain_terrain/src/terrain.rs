use std::collections::BTreeMap;

use crate::{Area, Segment, SegmentKey, TerrainError, TerrainMod};

/// Height-field terrain built from base points.
///
/// A base point at grid `(x, z)` sits at world `(x * resolution, z * resolution)`. A
/// segment exists for every grid square whose four corners have base points.
#[derive(Debug, Clone)]
pub struct Terrain {
    resolution: u32,
    base_points: BTreeMap<(i32, i32), f32>,
    segments: BTreeMap<SegmentKey, Segment>,
    mods: BTreeMap<u64, TerrainMod>,
}

impl Terrain {
    pub fn new(resolution: u32) -> Result<Self, TerrainError> {
        if resolution == 0 {
            return Err(TerrainError::InvalidResolution(resolution));
        }
        Ok(Self {
            resolution,
            base_points: BTreeMap::new(),
            segments: BTreeMap::new(),
            mods: BTreeMap::new(),
        })
    }

    /// Flat square terrain with base points from `min` to `max` inclusive on both axes.
    pub fn flat(resolution: u32, min: i32, max: i32, height: f32) -> Result<Self, TerrainError> {
        let mut terrain = Self::new(resolution)?;
        for x in min..=max {
            for z in min..=max {
                terrain.set_base_point(x, z, height);
            }
        }
        Ok(terrain)
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Sets a base point and returns the keys of every segment that was created or
    /// repopulated as a result.
    pub fn set_base_point(&mut self, x: i32, z: i32, height: f32) -> Vec<SegmentKey> {
        self.base_points.insert((x, z), height);

        let mut touched = Vec::new();
        for key in [(x - 1, z - 1), (x, z - 1), (x - 1, z), (x, z)] {
            if self.corners(key).is_some() {
                self.segments
                    .entry(key)
                    .or_insert_with(|| Segment::new(key, self.resolution));
                self.populate(key);
                touched.push(key);
            }
        }
        touched
    }

    fn corners(&self, key: SegmentKey) -> Option<[f32; 4]> {
        let (x, z) = key;
        Some([
            *self.base_points.get(&(x, z))?,
            *self.base_points.get(&(x + 1, z))?,
            *self.base_points.get(&(x, z + 1))?,
            *self.base_points.get(&(x + 1, z + 1))?,
        ])
    }

    fn populate(&mut self, key: SegmentKey) {
        let Some([h00, h10, h01, h11]) = self.corners(key) else {
            return;
        };
        let Some(segment) = self.segments.get_mut(&key) else {
            return;
        };

        let res = self.resolution as f32;
        let size = segment.size();
        let (x_ref, z_ref) = (segment.x_ref(), segment.z_ref());
        let mut points = Vec::with_capacity(size * size);
        for iz in 0..size {
            for ix in 0..size {
                let fx = ix as f32 / res;
                let fz = iz as f32 / res;
                let near = h00 + (h10 - h00) * fx;
                let far = h01 + (h11 - h01) * fx;
                let mut h = near + (far - near) * fz;

                let (wx, wz) = (x_ref + ix as f32, z_ref + iz as f32);
                for modifier in self.mods.values() {
                    h = modifier.apply(wx, wz, h);
                }
                points.push(h);
            }
        }
        segment.set_points(points);
    }

    /// Key of the segment covering a world position. Positions on the far edge of the
    /// last segment resolve to that segment.
    pub fn segment_key_at(&self, x: f32, z: f32) -> Option<SegmentKey> {
        let res = self.resolution as f32;
        let sx = (x / res).floor() as i32;
        let sz = (z / res).floor() as i32;
        let on_x_edge = (x / res).fract() == 0.0;
        let on_z_edge = (z / res).fract() == 0.0;

        let mut candidates = vec![(sx, sz)];
        if on_x_edge {
            candidates.push((sx - 1, sz));
        }
        if on_z_edge {
            candidates.push((sx, sz - 1));
        }
        if on_x_edge && on_z_edge {
            candidates.push((sx - 1, sz - 1));
        }
        candidates
            .into_iter()
            .find(|key| self.segments.contains_key(key))
    }

    pub fn segment(&self, key: SegmentKey) -> Option<&Segment> {
        self.segments.get(&key)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    /// Keys of existing segments whose rectangle intersects `area`.
    pub fn segments_in(&self, area: &Area) -> Vec<SegmentKey> {
        self.segments
            .values()
            .filter(|segment| segment.rect().intersects(area))
            .map(Segment::key)
            .collect()
    }

    /// Height including modifiers, or `None` outside all segments.
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let key = self.segment_key_at(x, z)?;
        let segment = self.segments.get(&key)?;
        Some(segment.height_at(x - segment.x_ref(), z - segment.z_ref()))
    }

    /// Height from the base points alone, ignoring modifiers.
    pub fn base_height_at(&self, x: f32, z: f32) -> Option<f32> {
        let key = self.segment_key_at(x, z)?;
        let [h00, h10, h01, h11] = self.corners(key)?;
        let res = self.resolution as f32;
        let fx = ((x - (key.0 as f32 * res)) / res).clamp(0.0, 1.0);
        let fz = ((z - (key.1 as f32 * res)) / res).clamp(0.0, 1.0);
        let near = h00 + (h10 - h00) * fx;
        let far = h01 + (h11 - h01) * fx;
        Some(near + (far - near) * fz)
    }

    pub fn has_mod(&self, owner: u64) -> bool {
        self.mods.contains_key(&owner)
    }

    pub fn get_mod(&self, owner: u64) -> Option<&TerrainMod> {
        self.mods.get(&owner)
    }

    /// Installs, replaces or (with `None`) removes the modifier owned by `owner` and
    /// returns the areas whose heights may have changed.
    pub fn update_mod(&mut self, owner: u64, modifier: Option<TerrainMod>) -> Vec<Area> {
        let mut dirty = Vec::new();
        if let Some(old) = self.mods.remove(&owner) {
            dirty.push(old.area());
        }
        if let Some(new) = modifier {
            dirty.push(new.area());
            self.mods.insert(owner, new);
        }

        let mut keys: Vec<SegmentKey> = dirty
            .iter()
            .flat_map(|area| self.segments_in(area))
            .collect();
        keys.sort_unstable();
        keys.dedup();
        for key in keys {
            self.populate(key);
        }

        if !dirty.is_empty() {
            tracing::debug!(
                "[TERRAIN] Modifier for {} updated, {} dirty area(s)",
                owner,
                dirty.len()
            );
        }
        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ModKind, ModShape, TerrainModSpec};

    #[test]
    fn test_segment_created_when_corners_complete() {
        let mut terrain = Terrain::new(64).unwrap();
        assert!(terrain.set_base_point(0, 0, 1.0).is_empty());
        assert!(terrain.set_base_point(1, 0, 1.0).is_empty());
        assert!(terrain.set_base_point(0, 1, 1.0).is_empty());
        assert_eq!(terrain.set_base_point(1, 1, 1.0), vec![(0, 0)]);
        assert_eq!(terrain.segments().count(), 1);
    }

    #[test]
    fn test_bilinear_heights() {
        let mut terrain = Terrain::new(64).unwrap();
        terrain.set_base_point(0, 0, 0.0);
        terrain.set_base_point(1, 0, 64.0);
        terrain.set_base_point(0, 1, 0.0);
        terrain.set_base_point(1, 1, 64.0);

        assert_eq!(terrain.height_at(0.0, 0.0), Some(0.0));
        assert_eq!(terrain.height_at(32.0, 10.0), Some(32.0));
        assert_eq!(terrain.height_at(64.0, 64.0), Some(64.0));
        assert_eq!(terrain.height_at(65.0, 0.0), None);
        assert_eq!(terrain.base_height_at(16.5, 3.0), Some(16.5));
    }

    #[test]
    fn test_negative_coordinates() {
        let terrain = Terrain::flat(64, -1, 1, 3.0).unwrap();
        assert_eq!(terrain.segments().count(), 4);
        assert_eq!(terrain.height_at(-10.0, -63.5), Some(3.0));
        assert_eq!(terrain.segment_key_at(-10.0, 5.0), Some((-1, 0)));
    }

    #[test]
    fn test_mod_lifecycle() {
        let mut terrain = Terrain::flat(64, -1, 1, 10.0).unwrap();
        let spec = TerrainModSpec {
            kind: ModKind::Level,
            height_offset: -5.0,
            shape: ModShape::Rect {
                min: [-10.0, -10.0],
                max: [10.0, 10.0],
            },
        };

        let placed = spec.place([32.0, 10.0, 32.0], 0.0).unwrap();
        let dirty = terrain.update_mod(7, Some(placed));
        assert_eq!(dirty.len(), 1);
        assert!(terrain.has_mod(7));
        assert_eq!(terrain.height_at(32.0, 32.0), Some(5.0));
        assert_eq!(terrain.base_height_at(32.0, 32.0), Some(10.0));
        assert_eq!(terrain.height_at(50.0, 50.0), Some(10.0));

        let moved = spec.place([10.0, 10.0, 10.0], 0.0).unwrap();
        assert_eq!(terrain.update_mod(7, Some(moved)).len(), 2);
        assert_eq!(terrain.height_at(32.0, 32.0), Some(10.0));
        assert_eq!(terrain.height_at(10.0, 10.0), Some(5.0));

        assert_eq!(terrain.update_mod(7, None).len(), 1);
        assert!(!terrain.has_mod(7));
        assert_eq!(terrain.height_at(10.0, 10.0), Some(10.0));
        assert!(terrain.update_mod(7, None).is_empty());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        assert_eq!(
            Terrain::new(0).unwrap_err(),
            TerrainError::InvalidResolution(0)
        );
    }
}
