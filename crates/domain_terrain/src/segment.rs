use crate::Area;

/// Grid coordinates of a segment, in units of the terrain resolution.
pub type SegmentKey = (i32, i32);

/// Dense height samples for one square tile of terrain.
///
/// Samples are stored row-major with z as the row: `points[z * size + x]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    key: SegmentKey,
    resolution: u32,
    points: Vec<f32>,
    min: f32,
    max: f32,
}

impl Segment {
    pub(crate) fn new(key: SegmentKey, resolution: u32) -> Self {
        let size = resolution as usize + 1;
        Self {
            key,
            resolution,
            points: vec![0.0; size * size],
            min: 0.0,
            max: 0.0,
        }
    }

    pub fn key(&self) -> SegmentKey {
        self.key
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Samples per side.
    pub fn size(&self) -> usize {
        self.resolution as usize + 1
    }

    /// World x of the segment's first sample column.
    pub fn x_ref(&self) -> f32 {
        (self.key.0 * self.resolution as i32) as f32
    }

    /// World z of the segment's first sample row.
    pub fn z_ref(&self) -> f32 {
        (self.key.1 * self.resolution as i32) as f32
    }

    pub fn rect(&self) -> Area {
        let res = self.resolution as f32;
        Area::new(self.x_ref(), self.z_ref(), self.x_ref() + res, self.z_ref() + res)
    }

    pub fn points(&self) -> &[f32] {
        &self.points
    }

    pub fn point(&self, x: usize, z: usize) -> f32 {
        self.points[z * self.size() + x]
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    pub(crate) fn set_points(&mut self, points: Vec<f32>) {
        self.min = points.iter().copied().fold(f32::MAX, f32::min);
        self.max = points.iter().copied().fold(f32::MIN, f32::max);
        self.points = points;
    }

    /// Bilinear height at segment-local coordinates in `[0, resolution]`.
    pub fn height_at(&self, local_x: f32, local_z: f32) -> f32 {
        let res = self.resolution as f32;
        let x = local_x.clamp(0.0, res);
        let z = local_z.clamp(0.0, res);

        let x0 = (x.floor() as usize).min(self.resolution as usize - 1);
        let z0 = (z.floor() as usize).min(self.resolution as usize - 1);
        let fx = x - x0 as f32;
        let fz = z - z0 as f32;

        let h00 = self.point(x0, z0);
        let h10 = self.point(x0 + 1, z0);
        let h01 = self.point(x0, z0 + 1);
        let h11 = self.point(x0 + 1, z0 + 1);

        let near = h00 + (h10 - h00) * fx;
        let far = h01 + (h11 - h01) * fx;
        near + (far - near) * fz
    }
}
