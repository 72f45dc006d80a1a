use crate::migrate::{migrate, CURRENT_VERSION};
use crate::options::{AccountOptions, ArmingOption, CodeFormat, ConfigState};
use serde_json::{json, Map, Value};
use std::time::Duration;

fn state(version: u32, options: Value) -> ConfigState {
    let options: Map<String, Value> = match options {
        Value::Object(map) => map,
        _ => panic!("options must be an object"),
    };
    ConfigState { version, options }
}

#[test]
fn version_one_arm_code_migrates_to_current() {
    // Arrange
    let legacy = state(1, json!({"arm_code": 1234}));

    // Act
    let migrated = migrate(legacy);

    // Assert
    assert_eq!(migrated.version, CURRENT_VERSION);
    assert_eq!(migrated.options.get("arm_code"), Some(&json!("1234")));
    for key in ["arm_home_options", "arm_away_options", "arm_night_options"] {
        assert_eq!(migrated.options.get(key), Some(&json!([])), "{key}");
    }
    assert!(!migrated.options.contains_key("use_arm_code"));
}

#[test]
fn migration_is_idempotent_at_current_version() {
    // Arrange
    let once = migrate(state(1, json!({"arm_code": "9999", "force_bypass": "home"})));

    // Act
    let twice = migrate(once.clone());

    // Assert
    assert_eq!(once, twice);
}

#[test]
fn version_never_decreases() {
    for version in 0..=CURRENT_VERSION + 2 {
        let migrated = migrate(state(version, json!({})));
        assert!(migrated.version >= version, "from {version}");
        if version <= CURRENT_VERSION {
            assert_eq!(migrated.version, CURRENT_VERSION);
        }
    }
}

#[test]
fn newer_config_is_left_untouched() {
    // Arrange
    let future = state(CURRENT_VERSION + 1, json!({"something_new": true}));

    // Act
    let migrated = migrate(future.clone());

    // Assert
    assert_eq!(migrated, future);
}

#[test]
fn legacy_profile_splits_into_mode_lists() {
    // Arrange
    let legacy = state(
        1,
        json!({
            "arm_code": "",
            "force_bypass": "home",
            "no_entry_delay": "away",
            "silent_arming": true,
        }),
    );

    // Act
    let migrated = migrate(legacy);

    // Assert
    assert_eq!(
        migrated.options.get("arm_home_options"),
        Some(&json!(["force_bypass", "silent_arming"]))
    );
    assert_eq!(
        migrated.options.get("arm_away_options"),
        Some(&json!(["no_entry_delay", "silent_arming"]))
    );
    assert_eq!(
        migrated.options.get("arm_night_options"),
        Some(&json!(["silent_arming"]))
    );
    for legacy_key in ["force_bypass", "no_entry_delay", "silent_arming"] {
        assert!(!migrated.options.contains_key(legacy_key));
    }

    let options = AccountOptions::from_state(&migrated);
    assert!(options.arming.home.contains(&ArmingOption::ForceBypass));
    assert!(!options.arming.away.contains(&ArmingOption::ForceBypass));
    assert_eq!(options.arm_code, None);
}

#[test]
fn interval_keys_are_renamed_with_units() {
    // Arrange
    let v2 = state(
        2,
        json!({"arm_code": "12", "update_interval": 30, "ws_reconnect_timeout": "15"}),
    );

    // Act
    let migrated = migrate(v2);

    // Assert
    assert_eq!(migrated.options.get("update_interval_seconds"), Some(&json!(30)));
    assert_eq!(
        migrated.options.get("websocket_reconnect_timeout_seconds"),
        Some(&json!(15))
    );
    assert!(!migrated.options.contains_key("update_interval"));

    let options = AccountOptions::from_state(&migrated);
    assert_eq!(options.update_interval, Duration::from_secs(30));
    assert_eq!(options.reconnect_timeout, Duration::from_secs(15));
    assert_eq!(options.code_format(), Some(CodeFormat::Number));
}

#[test]
fn disabled_arm_code_is_cleared() {
    // Arrange
    let v2 = state(2, json!({"arm_code": "4321", "use_arm_code": false}));

    // Act
    let migrated = migrate(v2);

    // Assert
    assert_eq!(migrated.options.get("arm_code"), Some(&json!("")));
    assert_eq!(AccountOptions::from_state(&migrated).code_format(), None);
}

#[test]
fn malformed_values_fall_back_to_defaults() {
    // Arrange
    let v3 = state(
        3,
        json!({
            "arm_code": ["not", "a", "code"],
            "arm_home_options": "force_bypass",
            "arm_away_options": ["force_bypass", "made_up"],
            "update_interval_seconds": -4,
            "websocket_reconnect_timeout_seconds": "soon",
        }),
    );

    // Act
    let migrated = migrate(v3);

    // Assert
    assert_eq!(migrated.options.get("arm_code"), Some(&json!("")));
    assert_eq!(migrated.options.get("arm_home_options"), Some(&json!([])));
    assert_eq!(
        migrated.options.get("arm_away_options"),
        Some(&json!(["force_bypass"]))
    );
    assert_eq!(migrated.options.get("update_interval_seconds"), Some(&json!(60)));
    assert_eq!(
        migrated.options.get("websocket_reconnect_timeout_seconds"),
        Some(&json!(5))
    );
}
