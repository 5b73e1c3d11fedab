mod common;

use common::{domain, y_of};
use physical_domain::domain_terrain::Terrain;
use physical_domain::nalgebra::{Point3, UnitQuaternion, Vector3};
use physical_domain::{Entity, EntityId, Mode, ModeData, TransformData};

fn slab(id: u64, y: f32) -> Entity {
    Entity::new(id)
        .with_pos(0.0, y, 0.0)
        .with_bbox([-2.0, 0.0, -2.0], [2.0, 1.0, 2.0])
        .with_mode(Mode::Planted)
}

fn planted_on(domain: &physical_domain::PhysicalDomain, id: u64) -> Option<EntityId> {
    domain.entity(EntityId(id)).and_then(|e| e.mode_data.planted_on())
}

#[test]
fn test_planted_entities_stack() {
    let mut domain = domain(64.0, 0.0, 64.0);
    domain.add_entity(slab(1, 1.0));
    domain.add_entity(slab(2, 2.0));
    domain.add_entity(slab(3, 4.0));
    domain.add_entity(slab(4, 6.0));

    assert!((y_of(&domain, 1) - 0.0).abs() < 1e-3);
    assert!((y_of(&domain, 2) - 1.0).abs() < 1e-3);
    assert!((y_of(&domain, 3) - 2.0).abs() < 1e-3);
    assert!((y_of(&domain, 4) - 3.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 1), Some(EntityId(0)));
    assert_eq!(planted_on(&domain, 2), Some(EntityId(1)));
    assert_eq!(planted_on(&domain, 4), Some(EntityId(3)));
}

#[test]
fn test_removing_a_support_drops_the_stack() {
    let mut domain = domain(64.0, 0.0, 64.0);
    for (id, y) in [(1, 1.0), (2, 2.0), (3, 4.0), (4, 6.0)] {
        domain.add_entity(slab(id, y));
    }

    domain.remove_entity(EntityId(3));
    assert!((y_of(&domain, 4) - 2.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 4), Some(EntityId(2)));
    assert_eq!(domain.attached_to(EntityId(2)), vec![EntityId(4)]);

    domain.remove_entity(EntityId(1));
    assert!((y_of(&domain, 2) - 0.0).abs() < 1e-3);
    assert!((y_of(&domain, 4) - 1.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 2), Some(EntityId(0)));
    assert_eq!(planted_on(&domain, 4), Some(EntityId(2)));
}

#[test]
fn test_planting_on_terrain_and_targets() {
    let mut domain = domain(64.0, -64.0, 64.0).with_terrain(Terrain::flat(64, -1, 1, 10.0).unwrap());
    let bbox = ([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
    domain.add_entity(
        Entity::new(1)
            .with_pos(0.0, 10.0, 0.0)
            .with_bbox(bbox.0, bbox.1)
            .with_mode(Mode::Planted),
    );
    domain.add_entity(
        Entity::new(2)
            .with_pos(0.0, 15.0, 0.0)
            .with_bbox(bbox.0, bbox.1)
            .with_mode(Mode::Planted),
    );
    assert!((y_of(&domain, 1) - 10.0).abs() < 1e-3);
    assert!((y_of(&domain, 2) - 11.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 2), Some(EntityId(1)));

    // Explicit target, swept onto from far above.
    domain.add_entity(
        Entity::new(3)
            .with_pos(0.0, 20.0, 0.0)
            .with_bbox(bbox.0, bbox.1)
            .with_mode(Mode::Planted)
            .with_mode_data(ModeData::Planted { on: EntityId(1) }),
    );
    assert!((y_of(&domain, 3) - 11.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 3), Some(EntityId(1)));

    // Explicit container target with an offset.
    domain.add_entity(
        Entity::new(4)
            .with_pos(30.0, 30.0, 30.0)
            .with_bbox(bbox.0, bbox.1)
            .with_mode(Mode::Planted)
            .with_mode_data(ModeData::Planted { on: EntityId(0) })
            .with_property("planted_offset", 2.0),
    );
    assert!((y_of(&domain, 4) - 12.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 4), Some(EntityId(0)));
}

#[test]
fn test_planting_on_water_uses_its_surface() {
    let mut domain = domain(64.0, -64.0, 64.0).with_terrain(Terrain::flat(64, -1, 1, 10.0).unwrap());
    domain.add_entity(
        Entity::new(1)
            .with_pos(20.0, 12.0, 20.0)
            .with_bbox([-5.0, -10.0, -5.0], [5.0, 0.0, 5.0])
            .with_mode(Mode::Fixed)
            .with_property("water_body", true),
    );
    domain.add_entity(
        Entity::new(2)
            .with_pos(20.0, 30.0, 20.0)
            .with_bbox([-1.0, 0.0, -1.0], [1.0, 1.0, 1.0])
            .with_mode(Mode::Planted)
            .with_mode_data(ModeData::Planted { on: EntityId(1) }),
    );
    assert!((y_of(&domain, 2) - 12.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 2), Some(EntityId(1)));

    // A surface below the ground is ignored.
    domain.apply_transform(
        EntityId(1),
        TransformData {
            pos: Some(Point3::new(20.0, 5.0, 20.0)),
            ..TransformData::default()
        },
    );
    domain.add_entity(
        Entity::new(3)
            .with_pos(-20.0, 30.0, -20.0)
            .with_bbox([-1.0, 0.0, -1.0], [1.0, 1.0, 1.0])
            .with_mode(Mode::Planted)
            .with_mode_data(ModeData::Planted { on: EntityId(1) }),
    );
    assert!((y_of(&domain, 3) - 10.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 3), Some(EntityId(0)));
}

#[test]
fn test_moving_a_support_carries_attached_entities() {
    let mut domain = domain(64.0, 0.0, 64.0);
    domain.add_entity(
        Entity::new(1)
            .with_pos(10.0, 0.0, 0.0)
            .with_bbox([-2.0, 0.0, -2.0], [2.0, 1.0, 2.0])
            .with_mode(Mode::Planted),
    );
    domain.add_entity(
        Entity::new(2)
            .with_pos(11.0, 3.0, 0.0)
            .with_bbox([-0.5, 0.0, -0.5], [0.5, 1.0, 0.5])
            .with_mode(Mode::Planted),
    );
    assert!((y_of(&domain, 2) - 1.0).abs() < 1e-3);
    assert_eq!(planted_on(&domain, 2), Some(EntityId(1)));

    domain.apply_transform(
        EntityId(1),
        TransformData {
            pos: Some(Point3::new(20.0, 0.0, 0.0)),
            ..TransformData::default()
        },
    );
    let carried = domain.entity(EntityId(2)).unwrap().location.pos.unwrap();
    assert!((carried - Point3::new(21.0, 1.0, 0.0)).norm() < 1e-3);

    let quarter = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
    domain.apply_transform(
        EntityId(1),
        TransformData {
            orientation: Some(quarter),
            ..TransformData::default()
        },
    );
    let rotated = domain.entity(EntityId(2)).unwrap();
    assert!((rotated.location.pos.unwrap() - Point3::new(20.0, 1.0, -1.0)).norm() < 1e-3);
    assert!(rotated.location.orientation.unwrap().angle_to(&quarter) < 1e-3);
}

#[test]
fn test_self_planting_is_refused() {
    let mut domain = domain(64.0, 0.0, 64.0);
    domain.add_entity(slab(1, 0.0));
    domain.apply_transform(
        EntityId(1),
        TransformData {
            planted_on: Some(EntityId(1)),
            ..TransformData::default()
        },
    );
    assert_eq!(planted_on(&domain, 1), Some(EntityId(0)));
    assert!(domain.attached_to(EntityId(1)).is_empty());
}

#[test]
fn test_leaving_planted_mode_releases_the_stack() {
    let mut domain = domain(64.0, 0.0, 64.0);
    domain.add_entity(slab(1, 0.0).with_property("mass", 10.0));
    domain.add_entity(slab(2, 2.0));
    assert_eq!(planted_on(&domain, 2), Some(EntityId(1)));

    domain.set_mode(EntityId(1), Mode::Free);
    for id in [1, 2] {
        let entity = domain.entity(EntityId(id)).unwrap();
        assert_eq!(entity.mode, Mode::Free);
        assert_eq!(entity.mode_data, ModeData::None);
    }
    assert!(domain.attached_to(EntityId(1)).is_empty());
    assert!(domain.attached_to(EntityId(0)).is_empty());
}

#[test]
fn test_free_entities_stay_above_terrain() {
    let mut domain = domain(64.0, -64.0, 64.0).with_terrain(Terrain::flat(64, -1, 1, 10.0).unwrap());
    domain.add_entity(common::cube(1, 5.0, -20.0, 5.0));
    assert!((y_of(&domain, 1) - 10.0).abs() < 1e-3);

    domain.add_entity(common::cube(2, 5.0, 20.0, 5.0).with_mode(Mode::Fixed));
    domain.apply_transform(
        EntityId(2),
        TransformData {
            pos: Some(Point3::new(5.0, -20.0, 5.0)),
            ..TransformData::default()
        },
    );
    assert!((y_of(&domain, 2) + 20.0).abs() < 1e-3);
}
