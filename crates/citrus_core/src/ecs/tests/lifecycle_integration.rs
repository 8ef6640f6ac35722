//! Lifecycle integration tests
//!
//! Create/destroy requests, flush ordering and hook behavior through the
//! public `Manager` API.

use super::{take_hook_log, Health, HookEvent, Probe, Relay, Spawner};
use crate::config::ManagerConfig;
use crate::ecs::{ElementFlags, ElementPayload, Entity, KindDescriptor, LifecyclePhase, Manager};
use crate::error::EcsError;
use crate::foundation::logging;

fn manager(max_entities: usize) -> Manager {
    logging::init_for_tests();
    Manager::new(ManagerConfig::default().with_max_entities(max_entities)).unwrap()
}

fn live(manager: &Manager) -> Vec<Entity> {
    let mut entities: Vec<Entity> = manager.all_entities().collect();
    entities.sort();
    entities
}

#[test]
fn test_health_scenario() {
    let mut manager = manager(8);
    let health = manager
        .register::<Health>(KindDescriptor::new("Health").with_capacity(4))
        .unwrap();
    assert_eq!(manager.registry().pool(health.id()).unwrap().slot_size(), 8);

    let player = manager.create("Player").unwrap();
    let value = Health { current: 75, max: 100 };
    let element = manager
        .add_element_with_bytes(player, health, bytemuck::bytes_of(&value))
        .unwrap();
    let report = manager.flush_create();
    assert!(report.is_ok());

    let live_health: Vec<_> = manager.live_elements(health).unwrap().collect();
    assert_eq!(live_health.len(), 1);
    assert_eq!(live_health[0].0, element);
    assert_eq!(live_health[0].1, player);
    assert_eq!(*live_health[0].2, value);

    manager.destroy(player).unwrap();
    let report = manager.flush_destroy();
    assert_eq!(report.entities_reclaimed, 1);

    assert_eq!(manager.entities().live_count(), 0);
    assert_eq!(manager.live_elements(health).unwrap().count(), 0);
    assert_eq!(manager.registry().pool(health.id()).unwrap().free_len(), 4);
    assert_eq!(manager.entities().free_list_len(), 8);
}

#[test]
fn test_live_set_after_mixed_requests() {
    let mut manager = manager(8);
    let a = manager.create("a").unwrap();
    let b = manager.create("b").unwrap();
    let b_child = manager.create("b_child").unwrap();
    let c = manager.create("c").unwrap();
    manager.set_relation(b, b_child).unwrap();
    manager.step();

    manager.destroy(b).unwrap();
    let d = manager.create("d").unwrap();
    // Still visible until the destroy flush
    assert!(manager.entities().is_alive(b));
    manager.step();

    let mut expected = vec![a, c, d];
    expected.sort();
    assert_eq!(live(&manager), expected);
    assert!(!manager.entities().is_alive(b_child));
    for entity in expected {
        assert_eq!(manager.entities().parent(entity).unwrap(), None);
    }
}

#[test]
fn test_capacity_plus_one_then_recover() {
    let mut manager = manager(8);
    let health = manager
        .register::<Health>(KindDescriptor::new("Health").with_capacity(4))
        .unwrap();

    let mut elements = Vec::new();
    for index in 0..4 {
        let entity = manager.create(format!("e{index}")).unwrap();
        elements.push(manager.add_element(entity, health).unwrap());
    }
    let extra = manager.create("extra").unwrap();
    assert!(matches!(
        manager.add_element(extra, health),
        Err(EcsError::PoolExhausted { capacity: 4, .. })
    ));
    assert!(manager.entities().elements(extra).unwrap().is_empty());

    let pool = manager.registry().pool(health.id()).unwrap();
    assert_eq!(pool.free_len(), 0);
    assert_eq!(pool.alloc_len(), 4);

    manager.step();
    manager.destroy_element(elements[1].raw()).unwrap();
    manager.step();

    let replacement = manager.add_element(extra, health).unwrap();
    manager.step();
    let pool = manager.registry().pool(health.id()).unwrap();
    assert_eq!(pool.alloc_len(), 4);
    assert_eq!(pool.free_len(), 0);
    assert_eq!(manager.find_element(extra, health), Some(replacement));
}

#[test]
fn test_double_destroy_matches_single() {
    let mut manager = manager(8);
    let health = manager.register::<Health>(KindDescriptor::new("Health")).unwrap();

    let entity = manager.create("target").unwrap();
    let other = manager.create("other").unwrap();
    let element = manager.add_element(other, health).unwrap();
    manager.step();

    manager.destroy(entity).unwrap();
    manager.destroy(entity).unwrap();
    manager.destroy_element(element.raw()).unwrap();
    manager.destroy_element(element.raw()).unwrap();
    let report = manager.step();

    assert!(report.is_ok());
    assert_eq!(report.entities_reclaimed, 1);
    assert_eq!(manager.entities().live_count(), 1);
    assert_eq!(manager.registry().pool(health.id()).unwrap().allocated(), 0);

    // Both handles are stale now
    assert!(matches!(manager.destroy(entity), Err(EcsError::NullReference(_))));
    assert!(matches!(manager.destroy_element(element.raw()), Err(EcsError::NullReference(_))));
}

#[test]
fn test_destroy_hook_runs_after_unlink() {
    let mut manager = manager(4);
    let probe = manager.register::<Probe>(KindDescriptor::new("Probe")).unwrap();
    take_hook_log();

    let entity = manager.create("probed").unwrap();
    manager.add_element(entity, probe).unwrap();
    manager.flush_create();
    let id = manager.entities().id(entity).unwrap();
    assert_eq!(take_hook_log(), vec![HookEvent::Created { entity_id: id }]);

    manager.destroy(entity).unwrap();
    manager.flush_destroy();
    assert_eq!(
        take_hook_log(),
        vec![HookEvent::Destroyed {
            entity_id: id,
            still_linked: false
        }]
    );
}

#[test]
fn test_destroyed_before_construction_skips_hooks() {
    let mut manager = manager(4);
    let probe = manager.register::<Probe>(KindDescriptor::new("Probe")).unwrap();
    take_hook_log();

    let entity = manager.create("probed").unwrap();
    let element = manager.add_element(entity, probe).unwrap();
    manager.destroy_element(element.raw()).unwrap();
    let flags = manager.registry().pool(probe.id()).unwrap().flags(element.raw()).unwrap();
    assert!(flags.contains(ElementFlags::DESTROYED));
    assert!(!flags.contains(ElementFlags::ACTIVE));

    manager.step();
    assert!(take_hook_log().is_empty());
    assert!(manager.entities().elements(entity).unwrap().is_empty());
    assert_eq!(manager.registry().pool(probe.id()).unwrap().allocated(), 0);
}

#[test]
fn test_hook_requests_land_in_next_flush() {
    let mut manager = manager(4);
    let probe = manager.register::<Probe>(KindDescriptor::new("Probe")).unwrap();
    let spawner = manager.register::<Spawner>(KindDescriptor::new("Spawner")).unwrap();
    take_hook_log();

    let owner = manager.create("owner").unwrap();
    let handle = manager.add_element(owner, spawner).unwrap();
    manager.element_mut(handle).unwrap().probe = Some(probe);

    manager.step();
    assert_eq!(manager.element(handle).unwrap().spawned_in, Some(0));
    let spawned = manager.entities().children(owner).unwrap().to_vec();
    assert_eq!(spawned.len(), 1);
    assert_eq!(manager.entities().name(spawned[0]).unwrap(), "spawned");
    // Added during the action pass; constructed by the next create flush
    assert!(manager.find_element(spawned[0], probe).is_some());
    assert_eq!(manager.live_elements(probe).unwrap().count(), 0);
    assert!(take_hook_log().is_empty());

    manager.step();
    let id = manager.entities().id(spawned[0]).unwrap();
    assert_eq!(take_hook_log(), vec![HookEvent::Created { entity_id: id }]);
    assert_eq!(manager.live_elements(probe).unwrap().count(), 1);
}

#[test]
fn test_create_hook_requests_land_in_next_flush() {
    let mut manager = manager(4);
    let probe = manager.register::<Probe>(KindDescriptor::new("Probe")).unwrap();
    let relay = manager.register::<Relay>(KindDescriptor::new("Relay")).unwrap();
    take_hook_log();

    let owner = manager.create("owner").unwrap();
    let handle = manager.add_element(owner, relay).unwrap();
    manager.element_mut(handle).unwrap().attach_on_create = Some(probe);

    let report = manager.flush_create();
    assert!(report.is_ok());
    assert_eq!(report.processed, 1);
    // Linked by the deferred command but not constructed yet
    assert!(manager.find_element(owner, probe).is_some());
    assert_eq!(manager.live_elements(probe).unwrap().count(), 0);
    assert_eq!(manager.registry().pool(probe.id()).unwrap().pending_create(), 1);
    assert!(take_hook_log().is_empty());

    manager.flush_create();
    let id = manager.entities().id(owner).unwrap();
    assert_eq!(take_hook_log(), vec![HookEvent::Created { entity_id: id }]);
    assert_eq!(manager.live_elements(probe).unwrap().count(), 1);
}

#[test]
fn test_destroy_hook_requests_land_in_next_flush() {
    let mut manager = manager(4);
    let health = manager.register::<Health>(KindDescriptor::new("Health")).unwrap();
    let relay = manager.register::<Relay>(KindDescriptor::new("Relay")).unwrap();

    let doomed = manager.create("doomed").unwrap();
    let victim = manager.create("victim").unwrap();
    let relay_handle = manager.add_element(doomed, relay).unwrap();
    let victim_health = manager.add_element(victim, health).unwrap();
    manager.flush_create();
    manager.element_mut(relay_handle).unwrap().destroy_on_destroy = Some(victim);

    manager.destroy(doomed).unwrap();
    let report = manager.flush_destroy();
    assert!(report.is_ok());
    assert_eq!(report.entities_reclaimed, 1);
    assert!(!manager.entities().is_alive(doomed));

    // Queued by the hook; untouched until the next destroy flush
    assert!(manager.entities().is_alive(victim));
    assert_eq!(manager.entities().pending_destroy(), &[victim]);
    assert_eq!(manager.element_owner(victim_health.raw()).unwrap(), victim);
    assert_eq!(manager.live_elements(health).unwrap().count(), 1);

    let report = manager.flush_destroy();
    assert_eq!(report.entities_reclaimed, 1);
    assert!(!manager.entities().is_alive(victim));
    assert_eq!(manager.live_elements(health).unwrap().count(), 0);
    assert_eq!(manager.registry().pool(health.id()).unwrap().allocated(), 0);
    assert_eq!(manager.entities().live_count(), 0);
}

#[test]
fn test_invalid_payload_reported_not_fatal() {
    let mut manager = manager(4);
    let health = manager.register::<Health>(KindDescriptor::new("Health")).unwrap();
    let entity = manager.create("broken").unwrap();
    let element = manager.add_element_with_bytes(entity, health, vec![1, 2, 3]).unwrap();

    let report = manager.flush_create();
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(&report.errors[0], EcsError::InvalidPayload { kind, .. } if kind == "Health"));
    assert_eq!(*manager.element(element).unwrap(), Health::default());
    assert_eq!(manager.live_elements(health).unwrap().count(), 1);
}

#[test]
fn test_frames_time_and_stop() {
    let mut manager = manager(4);
    assert_eq!(manager.phase(), LifecyclePhase::Idle);
    for _ in 0..3 {
        manager.step();
    }
    assert_eq!(manager.frame(), 3);
    approx::assert_relative_eq!(manager.time(), 0.03, epsilon = 1e-12);
    assert!(!manager.stopped());
    manager.stop();
    assert!(manager.stopped());
    assert_eq!(manager.phase(), LifecyclePhase::Idle);
}

#[test]
fn test_render_gui_and_disabled_kind() {
    let mut manager = manager(4);
    let health = manager.register::<Health>(KindDescriptor::new("Health")).unwrap();
    let spawner = manager.register::<Spawner>(KindDescriptor::new("Spawner")).unwrap();
    let probe = manager.register::<Probe>(KindDescriptor::new("Probe")).unwrap();

    let entity = manager.create("e").unwrap();
    manager
        .add_element_with_document(entity, health, serde_json::json!({ "current": 3, "max": 9 }))
        .unwrap();
    let handle = manager.add_element(entity, spawner).unwrap();
    manager.element_mut(handle).unwrap().probe = Some(probe);
    manager.set_kind_enabled(spawner.id(), false).unwrap();
    manager.step();

    let gui = manager.render_gui();
    assert_eq!(gui.len(), 1);
    assert_eq!(gui[0].1.title, "Health");
    assert_eq!(gui[0].1.fields[0], ("current".to_string(), "3".to_string()));

    // Disabled kinds skip the action pass
    assert_eq!(manager.element(handle).unwrap().spawned_in, None);
    assert!(manager.entities().children(entity).unwrap().is_empty());
}

#[test]
fn test_payload_by_kind_name() {
    let mut manager = manager(4);
    manager.register::<Health>(KindDescriptor::new("Health")).unwrap();
    let entity = manager.create("named").unwrap();
    let element = manager
        .add_element_by_name(entity, "Health", ElementPayload::document(serde_json::json!({ "current": 1, "max": 2 })))
        .unwrap();
    manager.flush_create();

    assert_eq!(manager.find_element_by_name(entity, "Health"), Some(element));
    assert_eq!(manager.element_owner(element).unwrap(), entity);
}
