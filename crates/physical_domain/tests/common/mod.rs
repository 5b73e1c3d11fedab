#![allow(dead_code)]

use std::collections::BTreeMap;

use physical_domain::{DomainConfig, Entity, EntityId, Notification, PhysicalDomain, PropertyValue};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Domain with a box-shaped container spanning `half` in x and z and `low..high` in y.
pub fn domain(half: f32, low: f32, high: f32) -> PhysicalDomain {
    init_tracing();
    let container = Entity::new(0).with_bbox([-half, low, -half], [half, high, half]);
    PhysicalDomain::new(container, DomainConfig::default())
}

/// Unit cube resting on its origin.
pub fn cube(id: u64, x: f32, y: f32, z: f32) -> Entity {
    Entity::new(id)
        .with_pos(x, y, z)
        .with_bbox([-0.5, 0.0, -0.5], [0.5, 1.0, 0.5])
}

pub fn tick_for(domain: &mut PhysicalDomain, seconds: f64) {
    let tick = domain.config().tick_size;
    let mut elapsed = 0.0;
    while elapsed < seconds {
        domain.tick(tick);
        elapsed += tick;
    }
}

pub fn y_of(domain: &PhysicalDomain, id: u64) -> f32 {
    domain
        .entity(EntityId(id))
        .and_then(|e| e.location.pos)
        .map(|p| p.y)
        .unwrap_or(f32::NAN)
}

/// `{type: "levelmod", heightoffset, shape: square of side 2 * half}`.
pub fn level_mod(offset: f64, half: f64) -> PropertyValue {
    let point = |x: f64, z: f64| PropertyValue::List(vec![x.into(), z.into()]);
    let mut shape = BTreeMap::new();
    shape.insert("type".to_string(), PropertyValue::from("polygon"));
    shape.insert(
        "points".to_string(),
        PropertyValue::List(vec![
            point(-half, -half),
            point(half, -half),
            point(half, half),
            point(-half, half),
        ]),
    );
    let mut map = BTreeMap::new();
    map.insert("type".to_string(), PropertyValue::from("levelmod"));
    map.insert("heightoffset".to_string(), offset.into());
    map.insert("shape".to_string(), PropertyValue::Map(shape));
    PropertyValue::Map(map)
}

pub fn appearances_for(notifications: &[Notification], to: EntityId) -> Vec<EntityId> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Appearance { to: recipient, entities } if *recipient == to => Some(entities.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

pub fn disappearances_for(notifications: &[Notification], to: EntityId) -> Vec<EntityId> {
    notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Disappearance { to: recipient, entities } if *recipient == to => Some(entities.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}
