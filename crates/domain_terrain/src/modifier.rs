use serde::{Deserialize, Serialize};

use crate::{Area, TerrainError};

/// How a modifier changes the heights inside its footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModKind {
    /// Flattens to the owner's ground height plus the offset.
    Level,
    /// Raises or lowers the existing heights by the offset.
    Adjust,
}

/// Footprint of a modifier in the owner's local (x, z) frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModShape {
    Polygon { points: Vec<[f32; 2]> },
    Rect { min: [f32; 2], max: [f32; 2] },
    Circle { radius: f32 },
}

/// Unplaced modifier description, as carried by an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainModSpec {
    pub kind: ModKind,
    pub height_offset: f32,
    pub shape: ModShape,
}

impl TerrainModSpec {
    /// Places the modifier at `pos` (world x, ground y, world z) rotated by `yaw` radians
    /// around the vertical axis.
    pub fn place(&self, pos: [f32; 3], yaw: f32) -> Result<TerrainMod, TerrainError> {
        match &self.shape {
            ModShape::Polygon { points } if points.len() < 3 => {
                return Err(TerrainError::InvalidMod(format!(
                    "polygon needs at least 3 points, got {}",
                    points.len()
                )));
            }
            ModShape::Rect { min, max } if min[0] > max[0] || min[1] > max[1] => {
                return Err(TerrainError::InvalidMod("rect min exceeds max".to_string()));
            }
            ModShape::Circle { radius } if *radius <= 0.0 || !radius.is_finite() => {
                return Err(TerrainError::InvalidMod(format!(
                    "circle radius must be positive, got {radius}"
                )));
            }
            _ => {}
        }

        let height = match self.kind {
            ModKind::Level => pos[1] + self.height_offset,
            ModKind::Adjust => self.height_offset,
        };

        Ok(TerrainMod {
            kind: self.kind,
            shape: self.shape.clone(),
            origin: [pos[0], pos[2]],
            yaw,
            height,
        })
    }
}

/// A modifier placed in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMod {
    kind: ModKind,
    shape: ModShape,
    origin: [f32; 2],
    yaw: f32,
    height: f32,
}

impl TerrainMod {
    pub fn kind(&self) -> ModKind {
        self.kind
    }

    /// Target height for levelling, or the delta for adjusting.
    pub fn height(&self) -> f32 {
        self.height
    }

    fn to_world(&self, x: f32, z: f32) -> (f32, f32) {
        let (sin, cos) = self.yaw.sin_cos();
        (
            self.origin[0] + x * cos + z * sin,
            self.origin[1] - x * sin + z * cos,
        )
    }

    fn to_local(&self, x: f32, z: f32) -> (f32, f32) {
        let (sin, cos) = self.yaw.sin_cos();
        let dx = x - self.origin[0];
        let dz = z - self.origin[1];
        (dx * cos - dz * sin, dx * sin + dz * cos)
    }

    /// World-space bounding rectangle of the footprint.
    pub fn area(&self) -> Area {
        let corners: Vec<(f32, f32)> = match &self.shape {
            ModShape::Circle { radius } => {
                return Area::new(
                    self.origin[0] - radius,
                    self.origin[1] - radius,
                    self.origin[0] + radius,
                    self.origin[1] + radius,
                );
            }
            ModShape::Rect { min, max } => vec![
                (min[0], min[1]),
                (max[0], min[1]),
                (max[0], max[1]),
                (min[0], max[1]),
            ],
            ModShape::Polygon { points } => points.iter().map(|p| (p[0], p[1])).collect(),
        };

        let mut area = Area::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for (x, z) in corners {
            let (wx, wz) = self.to_world(x, z);
            area.min_x = area.min_x.min(wx);
            area.min_z = area.min_z.min(wz);
            area.max_x = area.max_x.max(wx);
            area.max_z = area.max_z.max(wz);
        }
        area
    }

    pub fn contains(&self, x: f32, z: f32) -> bool {
        let (lx, lz) = self.to_local(x, z);
        match &self.shape {
            ModShape::Circle { radius } => lx * lx + lz * lz <= radius * radius,
            ModShape::Rect { min, max } => {
                lx >= min[0] - 1e-4 && lx <= max[0] + 1e-4 && lz >= min[1] - 1e-4 && lz <= max[1] + 1e-4
            }
            ModShape::Polygon { points } => polygon_contains(points, lx, lz),
        }
    }

    /// Height at a sample point after this modifier, given the height before it.
    pub fn apply(&self, x: f32, z: f32, height: f32) -> f32 {
        if !self.contains(x, z) {
            return height;
        }
        match self.kind {
            ModKind::Level => self.height,
            ModKind::Adjust => height + self.height,
        }
    }
}

// Even-odd crossing test; points on the boundary count as inside.
fn polygon_contains(points: &[[f32; 2]], x: f32, z: f32) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (xi, zi) = (points[i][0], points[i][1]);
        let (xj, zj) = (points[j][0], points[j][1]);

        if on_segment(xi, zi, xj, zj, x, z) {
            return true;
        }
        if (zi > z) != (zj > z) && x < (xj - xi) * (z - zi) / (zj - zi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn on_segment(ax: f32, az: f32, bx: f32, bz: f32, x: f32, z: f32) -> bool {
    let cross = (bx - ax) * (z - az) - (bz - az) * (x - ax);
    if cross.abs() > 1e-4 {
        return false;
    }
    x >= ax.min(bx) - 1e-4 && x <= ax.max(bx) + 1e-4 && z >= az.min(bz) - 1e-4 && z <= az.max(bz) + 1e-4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn square(half: f32) -> ModShape {
        ModShape::Polygon {
            points: vec![[-half, -half], [half, -half], [half, half], [-half, half]],
        }
    }

    #[test]
    fn test_level_mod_flattens_inside_only() {
        let spec = TerrainModSpec {
            kind: ModKind::Level,
            height_offset: -5.0,
            shape: square(10.0),
        };
        let m = spec.place([32.0, 10.0, 32.0], 0.0).unwrap();
        assert_eq!(m.height(), 5.0);
        assert_eq!(m.apply(32.0, 32.0, 10.0), 5.0);
        assert_eq!(m.apply(42.0, 42.0, 10.0), 5.0);
        assert_eq!(m.apply(43.0, 32.0, 10.0), 10.0);
        assert_eq!(m.area(), Area::new(22.0, 22.0, 42.0, 42.0));
    }

    #[test]
    fn test_adjust_mod_adds_offset() {
        let spec = TerrainModSpec {
            kind: ModKind::Adjust,
            height_offset: 2.5,
            shape: ModShape::Circle { radius: 3.0 },
        };
        let m = spec.place([0.0, 100.0, 0.0], 0.0).unwrap();
        assert_eq!(m.apply(1.0, 1.0, 4.0), 6.5);
        assert_eq!(m.apply(3.0, 3.0, 4.0), 4.0);
    }

    #[test]
    fn test_rotated_rect_footprint() {
        let spec = TerrainModSpec {
            kind: ModKind::Level,
            height_offset: 0.0,
            shape: ModShape::Rect {
                min: [0.0, -1.0],
                max: [10.0, 1.0],
            },
        };
        // A quarter turn maps local +x onto world -z.
        let m = spec.place([0.0, 0.0, 0.0], FRAC_PI_2).unwrap();
        assert!(m.contains(0.0, -5.0));
        assert!(!m.contains(5.0, 0.0));
        let area = m.area();
        assert!((area.min_z + 10.0).abs() < 1e-4);
        assert!((area.max_x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        let degenerate = TerrainModSpec {
            kind: ModKind::Level,
            height_offset: 0.0,
            shape: ModShape::Polygon {
                points: vec![[0.0, 0.0], [1.0, 1.0]],
            },
        };
        assert!(degenerate.place([0.0; 3], 0.0).is_err());

        let circle = TerrainModSpec {
            kind: ModKind::Adjust,
            height_offset: 1.0,
            shape: ModShape::Circle { radius: 0.0 },
        };
        assert!(matches!(
            circle.place([0.0; 3], 0.0),
            Err(TerrainError::InvalidMod(_))
        ));
    }

    #[test]
    fn test_spec_from_ron() {
        let spec: TerrainModSpec = ron::from_str(
            "(kind: Level, height_offset: 1.0, shape: Circle(radius: 4.0))",
        )
        .unwrap();
        assert_eq!(spec.kind, ModKind::Level);
        assert_eq!(spec.shape, ModShape::Circle { radius: 4.0 });
    }
}
