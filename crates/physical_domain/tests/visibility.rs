mod common;

use common::{appearances_for, cube, disappearances_for, domain};
use physical_domain::nalgebra::Point3;
use physical_domain::{
    DomainConfig, Entity, EntityId, Mode, Notification, PhysicalDomain, PropertyValue, TransformData,
    Visibility,
};

fn move_to(domain: &mut PhysicalDomain, id: u64, x: f32) {
    domain.apply_transform(
        EntityId(id),
        TransformData {
            pos: Some(Point3::new(x, 0.0, 0.0)),
            ..TransformData::default()
        },
    );
}

/// Observer 1 at the origin, entity 2 within sight and entity 3 just out of it.
fn scene() -> PhysicalDomain {
    let mut domain = domain(500.0, 0.0, 100.0);
    domain.add_entity(cube(1, 0.0, 0.0, 0.0).perceptive());
    domain.add_entity(cube(2, 20.0, 0.0, 0.0));
    domain.add_entity(cube(3, 40.0, 0.0, 0.0));
    domain.drain_notifications();
    domain
}

#[test]
fn test_visibility_is_symmetric() {
    let domain = scene();
    let observer = EntityId(1);

    assert!(domain.is_entity_visible_for(observer, EntityId(2)));
    assert!(!domain.is_entity_visible_for(observer, EntityId(3)));
    assert!(domain.is_entity_visible_for(observer, observer));
    assert!(domain.is_entity_visible_for(observer, EntityId(0)));

    let visible = domain.get_visible_entities_for(observer);
    assert!(visible.contains(&EntityId(2)));
    assert!(!visible.contains(&EntityId(3)));
    assert_eq!(domain.get_observing_entities_for(EntityId(2)), vec![observer]);
    assert!(domain.get_observing_entities_for(EntityId(3)).is_empty());

    // Entities that do not perceive see nothing.
    assert!(domain.get_visible_entities_for(EntityId(2)).is_empty());
}

#[test]
fn test_entering_and_leaving_sight() {
    let mut domain = scene();
    let tick = domain.config().tick_size;

    move_to(&mut domain, 3, 25.0);
    domain.tick(tick);
    let notifications = domain.drain_notifications();
    assert_eq!(appearances_for(&notifications, EntityId(1)), vec![EntityId(3)]);
    assert!(domain.is_entity_visible_for(EntityId(1), EntityId(3)));

    move_to(&mut domain, 3, 45.0);
    domain.tick(tick);
    let notifications = domain.drain_notifications();
    assert_eq!(disappearances_for(&notifications, EntityId(1)), vec![EntityId(3)]);
    assert!(!domain.is_entity_visible_for(EntityId(1), EntityId(3)));
}

#[test]
fn test_observers_get_sight_of_moves() {
    let mut domain = scene();
    move_to(&mut domain, 2, 21.0);

    let sights: Vec<_> = domain
        .drain_notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::Sight { to, update } => Some((to, update)),
            _ => None,
        })
        .collect();
    assert_eq!(sights.len(), 1);
    let (to, update) = &sights[0];
    assert_eq!(*to, EntityId(1));
    assert_eq!(update.entity, EntityId(2));
    assert_eq!(update.pos, Some(Point3::new(21.0, 0.0, 0.0)));

    // Nobody watches entity 3, so its moves go unreported.
    move_to(&mut domain, 3, 41.0);
    assert!(domain.drain_notifications().is_empty());
}

#[test]
fn test_moving_observer_sees_batched_appearances() {
    let mut domain = scene();
    let tick = domain.config().tick_size;

    move_to(&mut domain, 1, 35.0);
    domain.tick(tick);
    let notifications = domain.drain_notifications();
    assert_eq!(appearances_for(&notifications, EntityId(1)), vec![EntityId(3)]);
    assert!(domain.is_entity_visible_for(EntityId(1), EntityId(2)));
    assert!(domain.is_entity_visible_for(EntityId(1), EntityId(3)));
}

#[test]
fn test_vis_dist_widens_visibility() {
    let mut domain = scene();
    let tick = domain.config().tick_size;

    domain.set_property(EntityId(3), "vis_dist", PropertyValue::from(60.0));
    domain.tick(tick);
    let notifications = domain.drain_notifications();
    assert_eq!(appearances_for(&notifications, EntityId(1)), vec![EntityId(3)]);
}

#[test]
fn test_private_entities_need_admin_observers() {
    let mut domain = domain(500.0, 0.0, 100.0);
    let mut secret = cube(1, 5.0, 0.0, 0.0);
    secret.visibility = Visibility::Private;
    domain.add_entity(secret);

    domain.add_entity(cube(2, 0.0, 0.0, 0.0).perceptive());
    let mut admin = cube(3, -5.0, 0.0, 0.0).perceptive();
    admin.admin = true;
    domain.add_entity(admin);

    assert!(!domain.is_entity_visible_for(EntityId(2), EntityId(1)));
    assert!(domain.is_entity_visible_for(EntityId(3), EntityId(1)));
    assert!(domain.is_entity_visible_for(EntityId(3), EntityId(2)));
}

#[test]
fn test_removal_and_perception_changes_clear_edges() {
    let mut domain = scene();
    let observer = EntityId(1);

    domain.remove_entity(EntityId(2));
    assert!(!domain.get_visible_entities_for(observer).contains(&EntityId(2)));

    domain.add_entity(cube(4, 10.0, 0.0, 0.0));
    assert!(domain.is_entity_visible_for(observer, EntityId(4)));

    domain.set_perceptive(observer, false);
    assert!(domain.get_visible_entities_for(observer).is_empty());
    assert!(domain.get_observing_entities_for(EntityId(4)).is_empty());

    domain.set_perceptive(observer, true);
    assert!(domain.is_entity_visible_for(observer, EntityId(4)));
}

#[test]
fn test_visibility_checks_are_rate_limited() {
    common::init_tracing();
    let container = Entity::new(0).with_bbox([-500.0, 0.0, -500.0], [500.0, 100.0, 500.0]);
    let config = DomainConfig {
        max_visibility_checks: 1,
        ..DomainConfig::default()
    };
    let mut domain = PhysicalDomain::new(container, config);
    for id in 1..=3 {
        domain.add_entity(cube(id, id as f32 * 10.0, 0.0, 0.0));
    }
    assert_eq!(domain.pending_visibility_checks(), 0);

    for id in 1..=3 {
        move_to(&mut domain, id, id as f32 * 10.0 + 1.0);
    }
    assert_eq!(domain.pending_visibility_checks(), 3);
    domain.tick(domain.config().tick_size);
    assert_eq!(domain.pending_visibility_checks(), 2);
}

#[test]
fn test_visibility_is_measured_from_the_entity_position() {
    let mut domain = domain(500.0, 0.0, 100.0);
    domain.add_entity(cube(1, 0.0, 0.0, 0.0).perceptive());
    // A tall tower whose shape center is 30 above its position.
    domain.add_entity(
        Entity::new(2)
            .with_pos(0.0, 0.0, 25.0)
            .with_bbox([-0.5, 0.0, -0.5], [0.5, 60.0, 0.5])
            .with_mode(Mode::Fixed)
            .with_property("vis_dist", 30.0),
    );

    assert!(domain.is_entity_visible_for(EntityId(1), EntityId(2)));
    assert_eq!(domain.get_observing_entities_for(EntityId(2)), vec![EntityId(1)]);
}
