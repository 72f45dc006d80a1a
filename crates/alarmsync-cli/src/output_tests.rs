use crate::output::{
    load_config_state, parse_command, parse_value, render_entity, render_generation,
    render_reconciliation, state_label, write_json_atomic,
};
use alarmsync_core::snapshot::{EntityState, PartitionState};
use alarmsync_core::{migrate, normalize, Command, ConfigState, RawDevice, Reconciliation};
use serde_json::json;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;

fn make_temp_dir(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    let uniq = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("unix epoch")
        .as_nanos();
    path.push(format!("alarmsync-tests-{name}-{uniq}"));
    fs::create_dir_all(&path).expect("create temp dir");
    path
}

#[test]
fn migrate_write_back_replaces_the_file() {
    // Arrange
    let dir = make_temp_dir("migrate");
    let path = dir.join("options.json");
    fs::write(&path, r#"{"version": 1, "options": {"arm_code": 1234}}"#).expect("write options");

    // Act
    let migrated = migrate(load_config_state(&path).expect("load"));
    write_json_atomic(&path, &migrated).expect("write back");

    // Assert
    let reloaded = load_config_state(&path).expect("reload");
    assert_eq!(reloaded, migrated);
    assert_eq!(reloaded.options.get("arm_code"), Some(&json!("1234")));
    assert!(!dir.join("options.json.tmp").exists(), "temp file renamed away");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_options_file_is_a_fresh_account() {
    // Arrange
    let dir = make_temp_dir("fresh");

    // Act
    let state = load_config_state(&dir.join("absent.json")).expect("load");

    // Assert
    assert_eq!(state, ConfigState::default());

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn command_names_accept_dashes_and_case() {
    assert_eq!(parse_command("arm-away").expect("arm-away"), Command::ArmAway);
    assert_eq!(parse_command("DISARM").expect("disarm"), Command::Disarm);
    assert!(parse_command("self_destruct").is_err());
}

#[test]
fn values_fall_back_to_plain_strings() {
    assert_eq!(parse_value("42").expect("number"), json!(42));
    assert_eq!(parse_value("on").expect("text"), json!("on"));
    assert!(parse_value("  ").is_err());
}

#[test]
fn human_rendering_lists_every_entity() {
    // Arrange
    let raw = vec![
        RawDevice {
            id: "part-1".to_string(),
            resource_type: "partitions".to_string(),
            attributes: json!({"name": "House", "state": "armed_away", "desired_state": "disarmed", "system_id": "sys-1"}),
        },
        RawDevice {
            id: "sensor-1".to_string(),
            resource_type: "sensors".to_string(),
            attributes: json!({"name": "Front Door", "state": "weird", "subtype": "contact_sensor", "partition_id": "part-1"}),
        },
    ];
    let generation = normalize(&raw);

    // Act
    let text = render_generation(&generation, Some((7, None)));

    // Assert
    assert!(text.starts_with("=== Snapshot #7 ===\n"));
    assert!(text.contains("Fetched:    n/a"));
    assert!(text.contains("Entities:   2"));
    let partition = generation.get("part-1").expect("partition");
    assert!(render_entity(partition).contains("armed_away (Disarming)"));
    let sensor = generation.get("sensor-1").expect("sensor");
    assert!(render_entity(sensor).ends_with("[unavailable]"));
}

#[test]
fn state_labels_are_plain_words() {
    assert_eq!(state_label(&EntityState::Partition(PartitionState::Disarmed)), "disarmed");
    assert_eq!(state_label(&EntityState::Flag(true)), "true");
    assert_eq!(state_label(&EntityState::Present), "present");
}

#[test]
fn reconciliation_rendering() {
    // Arrange
    let mut plan = Reconciliation::default();

    // Act / Assert
    assert_eq!(render_reconciliation(&plan), "Registry is up to date\n");
    plan.entities_to_remove.insert("sensor-2".to_string());
    plan.devices_to_remove.insert("dev-b".to_string());
    assert_eq!(
        render_reconciliation(&plan),
        "remove entity sensor-2\nremove device dev-b\n"
    );
}
