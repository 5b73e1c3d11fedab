//! Collision shapes derived from an entity's bounding box and `geometry` property.

use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::SharedShape;

use crate::entity::{BBox, PropertyValue};
use crate::error::ShapeError;

const MIN_HALF_EXTENT: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Box,
    Sphere,
    Cylinder(Axis),
    Capsule(Axis),
    Mesh {
        vertices: Vec<Point3<f32>>,
        indices: Vec<[u32; 3]>,
    },
}

impl Geometry {
    /// Parses a `geometry` property map such as `{type: "cylinder-y"}` or
    /// `{type: "mesh", vertices: [x, y, z, ...], indices: [a, b, c, ...]}`.
    pub fn from_property(value: &PropertyValue) -> Result<Geometry, ShapeError> {
        let map = value
            .as_map()
            .ok_or_else(|| ShapeError::UnknownGeometry("<not a map>".to_string()))?;
        let kind = map
            .get("type")
            .and_then(PropertyValue::as_str)
            .ok_or_else(|| ShapeError::UnknownGeometry("<missing type>".to_string()))?;

        let geometry = match kind {
            "box" => Geometry::Box,
            "sphere" => Geometry::Sphere,
            "cylinder-x" => Geometry::Cylinder(Axis::X),
            "cylinder-y" => Geometry::Cylinder(Axis::Y),
            "cylinder-z" => Geometry::Cylinder(Axis::Z),
            "capsule-x" => Geometry::Capsule(Axis::X),
            "capsule-y" => Geometry::Capsule(Axis::Y),
            "capsule-z" => Geometry::Capsule(Axis::Z),
            "mesh" => {
                let coords: Vec<f32> = map
                    .get("vertices")
                    .and_then(PropertyValue::as_list)
                    .ok_or_else(|| ShapeError::DegenerateMesh("missing vertices".to_string()))?
                    .iter()
                    .map(|v| v.as_f32())
                    .collect::<Option<_>>()
                    .ok_or_else(|| ShapeError::DegenerateMesh("non-numeric vertex".to_string()))?;
                let flat_indices: Vec<u32> = map
                    .get("indices")
                    .and_then(PropertyValue::as_list)
                    .ok_or_else(|| ShapeError::DegenerateMesh("missing indices".to_string()))?
                    .iter()
                    .map(|v| v.as_i64().and_then(|i| u32::try_from(i).ok()))
                    .collect::<Option<_>>()
                    .ok_or_else(|| ShapeError::DegenerateMesh("invalid index".to_string()))?;

                if coords.len() % 3 != 0 || flat_indices.len() % 3 != 0 {
                    return Err(ShapeError::DegenerateMesh(
                        "vertex and index counts must be multiples of 3".to_string(),
                    ));
                }
                Geometry::Mesh {
                    vertices: coords
                        .chunks_exact(3)
                        .map(|c| Point3::new(c[0], c[1], c[2]))
                        .collect(),
                    indices: flat_indices
                        .chunks_exact(3)
                        .map(|c| [c[0], c[1], c[2]])
                        .collect(),
                }
            }
            other => return Err(ShapeError::UnknownGeometry(other.to_string())),
        };
        Ok(geometry)
    }
}

/// A collision shape placed relative to the entity origin.
#[derive(Clone)]
pub struct BuiltShape {
    pub shape: SharedShape,
    /// Offset from the entity origin to the shape origin, in the entity frame.
    pub center_offset: Vector3<f32>,
    /// Whether the shape can be swept for placement.
    pub convex: bool,
}

impl std::fmt::Debug for BuiltShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltShape")
            .field("shape_type", &self.shape.shape_type())
            .field("center_offset", &self.center_offset)
            .field("convex", &self.convex)
            .finish()
    }
}

impl BuiltShape {
    /// Shape pose for an entity at `entity_pose`.
    pub fn pose(&self, entity_pose: &Isometry3<f32>) -> Isometry3<f32> {
        entity_pose * Isometry3::translation(
            self.center_offset.x,
            self.center_offset.y,
            self.center_offset.z,
        )
    }

    /// Local isometry of the shape relative to the entity origin.
    pub fn local_pose(&self) -> Isometry3<f32> {
        self.pose(&Isometry3::identity())
    }
}

/// Builds the collision shape for a bounding box.
///
/// Meshes are rebuilt to fit the box rather than scaled. Dynamic bodies get the convex
/// hull of a mesh, static bodies get the triangle mesh itself.
pub fn build_shape(
    bbox: &BBox,
    geometry: Option<&Geometry>,
    dynamic: bool,
) -> Result<BuiltShape, ShapeError> {
    if !bbox.is_valid() {
        return Err(ShapeError::InvalidBoundingBox(format!(
            "{:?} - {:?}",
            bbox.low, bbox.high
        )));
    }

    let half = bbox.half_extents().map(|v| v.max(MIN_HALF_EXTENT));
    let center_offset = bbox.center().coords;
    let geometry = geometry.unwrap_or(&Geometry::Box);

    let (shape, convex) = match geometry {
        Geometry::Box => (SharedShape::cuboid(half.x, half.y, half.z), true),
        Geometry::Sphere => (SharedShape::ball(half.min()), true),
        Geometry::Cylinder(axis) => {
            let (half_height, radius) = axial_dimensions(&half, *axis);
            (
                along_axis(SharedShape::cylinder(half_height, radius), *axis),
                true,
            )
        }
        Geometry::Capsule(axis) => {
            let (half_height, radius) = axial_dimensions(&half, *axis);
            let segment = (half_height - radius).max(0.0);
            let tip = match axis {
                Axis::X => Vector3::x(),
                Axis::Y => Vector3::y(),
                Axis::Z => Vector3::z(),
            } * segment;
            (
                SharedShape::capsule(Point3::from(-tip), Point3::from(tip), radius),
                true,
            )
        }
        Geometry::Mesh { vertices, indices } => {
            let fitted = fit_mesh(bbox, vertices, indices)?;
            if dynamic {
                let hull = SharedShape::convex_hull(&fitted).ok_or(ShapeError::ConvexHullFailed)?;
                (hull, true)
            } else {
                (SharedShape::trimesh(fitted, indices.clone()), false)
            }
        }
    };

    Ok(BuiltShape {
        shape,
        center_offset,
        convex,
    })
}

fn axial_dimensions(half: &Vector3<f32>, axis: Axis) -> (f32, f32) {
    match axis {
        Axis::X => (half.x, half.y.min(half.z)),
        Axis::Y => (half.y, half.x.min(half.z)),
        Axis::Z => (half.z, half.x.min(half.y)),
    }
}

// Cylinders are built along Y.
fn along_axis(shape: SharedShape, axis: Axis) -> SharedShape {
    let rotation = match axis {
        Axis::Y => return shape,
        Axis::X => UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -std::f32::consts::FRAC_PI_2),
        Axis::Z => UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f32::consts::FRAC_PI_2),
    };
    SharedShape::compound(vec![(
        Isometry3::from_parts(Vector3::zeros().into(), rotation),
        shape,
    )])
}

/// Maps mesh vertices onto the bounding box, centred on the box center.
fn fit_mesh(
    bbox: &BBox,
    vertices: &[Point3<f32>],
    indices: &[[u32; 3]],
) -> Result<Vec<Point3<f32>>, ShapeError> {
    if vertices.is_empty() || indices.is_empty() {
        return Err(ShapeError::DegenerateMesh("mesh has no triangles".to_string()));
    }
    if let Some(bad) = indices
        .iter()
        .flatten()
        .find(|i| **i as usize >= vertices.len())
    {
        return Err(ShapeError::DegenerateMesh(format!(
            "index {bad} out of range for {} vertices",
            vertices.len()
        )));
    }

    let mut min = vertices[0];
    let mut max = vertices[0];
    for v in vertices {
        min = min.inf(v);
        max = max.sup(v);
    }

    let mesh_size = max - min;
    let box_size = bbox.high - bbox.low;
    let scale = Vector3::new(
        ratio(box_size.x, mesh_size.x),
        ratio(box_size.y, mesh_size.y),
        ratio(box_size.z, mesh_size.z),
    );

    Ok(vertices
        .iter()
        .map(|v| {
            let local = (v - min).component_mul(&scale);
            Point3::from(local - box_size * 0.5)
        })
        .collect())
}

fn ratio(target: f32, source: f32) -> f32 {
    if source.abs() < f32::EPSILON {
        1.0
    } else {
        target / source
    }
}
