use crate::reconcile::{normalize_identifier, orphaned_ids, reconcile, RegisteredDevice, RegistryState};
use std::collections::BTreeSet;

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn registered(id: &str, entities: &[&str]) -> RegisteredDevice {
    RegisteredDevice {
        id: id.to_string(),
        entities: ids(entities),
        service: false,
    }
}

#[test]
fn suffixes_are_stripped_once() {
    assert_eq!(normalize_identifier("sensor-1_low_battery"), "sensor-1");
    assert_eq!(normalize_identifier("sensor-1_malfunction"), "sensor-1");
    assert_eq!(normalize_identifier("sensor-1_debug"), "sensor-1");
    assert_eq!(normalize_identifier("sensor-1_battery"), "sensor-1");
    assert_eq!(normalize_identifier("sensor-1"), "sensor-1");
    assert_eq!(normalize_identifier("_debug"), "_debug");
}

#[test]
fn legacy_battery_id_matches_a_live_device() {
    // Arrange
    let current = ids(&["sensor-1", "sensor-1_low_battery"]);
    let registry = ids(&["sensor-1_battery", "sensor-1_low_battery"]);

    // Act
    let orphans = orphaned_ids(&current, &registry);

    // Assert
    assert!(orphans.is_empty(), "suffix variants of a live id are kept");
}

#[test]
fn every_unmatched_registered_id_is_reported() {
    // Arrange
    let current = ids(&["part-1", "sensor-1", "sensor-1_low_battery"]);
    let registry = RegistryState {
        entities: ids(&["part-1", "sensor-1", "sensor-2", "sensor-2_malfunction", "lock-9_debug"]),
        devices: Vec::new(),
    };

    // Act
    let plan = reconcile(&current, &registry);

    // Assert
    assert_eq!(
        plan.entities_to_remove,
        ids(&["sensor-2", "sensor-2_malfunction", "lock-9_debug"])
    );
    for kept in ["part-1", "sensor-1"] {
        assert!(!plan.entities_to_remove.contains(kept));
    }
}

#[test]
fn device_is_removed_only_when_all_its_entities_are() {
    // Arrange
    let current = ids(&["sensor-1"]);
    let registry = RegistryState {
        entities: BTreeSet::new(),
        devices: vec![
            registered("dev-a", &["sensor-1", "sensor-1_malfunction"]),
            registered("dev-b", &["sensor-2", "sensor-2_low_battery"]),
            registered("dev-c", &[]),
        ],
    };

    // Act
    let plan = reconcile(&current, &registry);

    // Assert
    assert_eq!(plan.devices_to_remove, ids(&["dev-b", "dev-c"]));
    assert_eq!(
        plan.entities_to_remove,
        ids(&["sensor-2", "sensor-2_low_battery"])
    );
}

#[test]
fn service_devices_are_never_pruned() {
    // Arrange
    let mut account = registered("account", &[]);
    account.service = true;
    let registry = RegistryState {
        entities: BTreeSet::new(),
        devices: vec![account],
    };

    // Act
    let plan = reconcile(&BTreeSet::new(), &registry);

    // Assert
    assert!(plan.is_empty());
}

#[test]
fn empty_registry_needs_nothing() {
    let plan = reconcile(&ids(&["part-1"]), &RegistryState::default());
    assert!(plan.is_empty());
}
