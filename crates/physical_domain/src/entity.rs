//! Minimal entity model consumed by the domain.

use std::collections::BTreeMap;
use std::fmt;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::mode::{Mode, ModeData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Axis-aligned bounding box in the entity's local frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub low: Point3<f32>,
    pub high: Point3<f32>,
}

impl BBox {
    pub fn new(low: Point3<f32>, high: Point3<f32>) -> Self {
        Self { low, high }
    }

    pub fn from_coords(low: [f32; 3], high: [f32; 3]) -> Self {
        Self::new(Point3::from(low), Point3::from(high))
    }

    pub fn is_valid(&self) -> bool {
        self.low.iter().chain(self.high.iter()).all(|v| v.is_finite())
            && (0..3).all(|i| self.low[i] <= self.high[i])
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.low, &self.high)
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        (self.high - self.low) * 0.5
    }

    pub fn height(&self) -> f32 {
        self.high.y - self.low.y
    }

    /// Half of the box diagonal.
    pub fn radius(&self) -> f32 {
        (self.high - self.low).norm() * 0.5
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
    Vector(Vector3<f32>),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            PropertyValue::Float(v) => Some(*v as f32),
            PropertyValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Booleans, and numbers where non-zero is true.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v != 0),
            PropertyValue::Float(v) => Some(*v != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Vectors, and three-element numeric lists.
    pub fn as_vector(&self) -> Option<Vector3<f32>> {
        match self {
            PropertyValue::Vector(v) => Some(*v),
            PropertyValue::List(items) if items.len() == 3 => Some(Vector3::new(
                items[0].as_f32()?,
                items[1].as_f32()?,
                items[2].as_f32()?,
            )),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            PropertyValue::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<Vector3<f32>> for PropertyValue {
    fn from(v: Vector3<f32>) -> Self {
        PropertyValue::Vector(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub pos: Option<Point3<f32>>,
    pub orientation: Option<UnitQuaternion<f32>>,
    pub velocity: Option<Vector3<f32>>,
    pub angular_velocity: Option<Vector3<f32>>,
    pub bbox: Option<BBox>,
    pub solid: bool,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            pos: None,
            orientation: None,
            velocity: None,
            angular_velocity: None,
            bbox: None,
            solid: true,
        }
    }
}

impl Location {
    pub fn valid_bbox(&self) -> Option<&BBox> {
        self.bbox.as_ref().filter(|b| b.is_valid())
    }

    pub fn radius(&self) -> f32 {
        self.valid_bbox().map(BBox::radius).unwrap_or(0.0)
    }

    pub fn orientation_or_identity(&self) -> UnitQuaternion<f32> {
        self.orientation.unwrap_or_else(UnitQuaternion::identity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub location: Location,
    pub properties: BTreeMap<String, PropertyValue>,
    pub mode: Mode,
    pub mode_data: ModeData,
    pub perceptive: bool,
    pub admin: bool,
    pub visibility: Visibility,
    /// Bumped every time a location update is broadcast.
    pub seq: u64,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            location: Location::default(),
            properties: BTreeMap::new(),
            mode: Mode::Free,
            mode_data: ModeData::None,
            perceptive: false,
            admin: false,
            visibility: Visibility::Public,
            seq: 0,
        }
    }

    pub fn with_pos(mut self, x: f32, y: f32, z: f32) -> Self {
        self.location.pos = Some(Point3::new(x, y, z));
        self
    }

    pub fn with_bbox(mut self, low: [f32; 3], high: [f32; 3]) -> Self {
        self.location.bbox = Some(BBox::from_coords(low, high));
        self
    }

    pub fn with_orientation(mut self, orientation: UnitQuaternion<f32>) -> Self {
        self.location.orientation = Some(orientation);
        self
    }

    pub fn with_velocity(mut self, velocity: Vector3<f32>) -> Self {
        self.location.velocity = Some(velocity);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_mode_data(mut self, mode_data: ModeData) -> Self {
        self.mode_data = mode_data;
        self
    }

    pub fn with_property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn with_solid(mut self, solid: bool) -> Self {
        self.location.solid = solid;
        self
    }

    pub fn perceptive(mut self) -> Self {
        self.perceptive = true;
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn f32_property(&self, name: &str) -> Option<f32> {
        self.property(name).and_then(PropertyValue::as_f32)
    }

    pub fn vector_property(&self, name: &str) -> Option<Vector3<f32>> {
        self.property(name).and_then(PropertyValue::as_vector)
    }

    pub fn bool_property(&self, name: &str) -> bool {
        self.property(name)
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_radius_and_validity() {
        let bbox = BBox::from_coords([-1.0, 0.0, -1.0], [1.0, 1.0, 1.0]);
        assert!(bbox.is_valid());
        assert!((bbox.radius() - 1.5).abs() < 1e-6);
        assert_eq!(bbox.center(), Point3::new(0.0, 0.5, 0.0));
        assert!(!BBox::from_coords([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]).is_valid());
    }

    #[test]
    fn test_property_coercions() {
        assert_eq!(PropertyValue::Int(3).as_f32(), Some(3.0));
        assert_eq!(PropertyValue::Float(0.0).as_bool(), Some(false));
        assert_eq!(PropertyValue::Float(2.0).as_i64(), Some(2));
        let list = PropertyValue::List(vec![1.0.into(), 2.0.into(), PropertyValue::Int(3)]);
        assert_eq!(list.as_vector(), Some(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(PropertyValue::from("x").as_vector(), None);
    }

    #[test]
    fn test_location_radius_without_bbox() {
        let entity = Entity::new(1).with_pos(0.0, 0.0, 0.0);
        assert_eq!(entity.location.radius(), 0.0);
        assert!(entity.location.solid);
    }
}
