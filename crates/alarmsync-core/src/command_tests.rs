use crate::client::RawDevice;
use crate::command::{resolve, routes, target_device, ArmingFlags, Command, CommandRequest};
use crate::error::SyncError;
use crate::normalize::normalize;
use crate::options::{ArmingOption, ArmingProfile};
use crate::snapshot::{EntityKind, SnapshotGeneration, ThermostatState};
use serde_json::json;

fn fixture() -> SnapshotGeneration {
    let raw = vec![
        RawDevice {
            id: "part-1".to_string(),
            resource_type: "partitions".to_string(),
            attributes: json!({"name": "House", "state": "disarmed", "system_id": "sys-1"}),
        },
        RawDevice {
            id: "lock-1".to_string(),
            resource_type: "locks".to_string(),
            attributes: json!({"name": "Front", "state": "locked", "partition_id": "part-1"}),
        },
        RawDevice {
            id: "light-1".to_string(),
            resource_type: "lights".to_string(),
            attributes: json!({
                "name": "Porch",
                "state": "off",
                "partition_id": "part-1",
                "config_options": [{"slug": "led-behavior", "name": "LED", "value": "off"}],
            }),
        },
        RawDevice {
            id: "sensor-1".to_string(),
            resource_type: "sensors".to_string(),
            attributes: json!({"name": "Hall", "state": "idle", "subtype": "motion_sensor", "partition_id": "part-1"}),
        },
        RawDevice {
            id: "thermo-1".to_string(),
            resource_type: "thermostats".to_string(),
            attributes: json!({
                "name": "Hallway",
                "state": "heat",
                "partition_id": "part-1",
                "min_heat_setpoint": 45.0,
                "max_heat_setpoint": 85.0,
            }),
        },
        RawDevice {
            id: "valve-1".to_string(),
            resource_type: "water_valves".to_string(),
            attributes: json!({"name": "Shutoff", "state": "closed", "partition_id": "part-1"}),
        },
    ];
    normalize(&raw)
}

fn profile() -> ArmingProfile {
    ArmingProfile {
        home: [ArmingOption::ForceBypass].into_iter().collect(),
        away: [ArmingOption::NoEntryDelay, ArmingOption::SilentArming]
            .into_iter()
            .collect(),
        night: Default::default(),
    }
}

fn with_code(code: &str) -> CommandRequest {
    CommandRequest {
        code: Some(code.to_string()),
        ..Default::default()
    }
}

#[test]
fn arm_code_must_match_when_configured() {
    // Arrange
    let snapshot = fixture();
    let partition = snapshot.get("part-1").expect("partition");

    // Act
    let wrong = resolve(partition, Command::ArmAway, &with_code("0000"), Some("1234"), &profile());
    let missing = resolve(partition, Command::Disarm, &CommandRequest::default(), Some("1234"), &profile());
    let right = resolve(partition, Command::Disarm, &with_code("1234"), Some("1234"), &profile());

    // Assert
    assert!(matches!(wrong, Err(SyncError::InvalidCode)));
    assert!(matches!(missing, Err(SyncError::InvalidCode)));
    assert!(right.is_ok());
}

#[test]
fn no_configured_code_accepts_anything() {
    let snapshot = fixture();
    let lock = snapshot.get("lock-1").expect("lock");

    assert!(resolve(lock, Command::Unlock, &CommandRequest::default(), None, &profile()).is_ok());
    assert!(resolve(lock, Command::Unlock, &with_code("x"), Some(""), &profile()).is_ok());
}

#[test]
fn arming_flags_follow_the_mode_profile() {
    // Arrange
    let snapshot = fixture();
    let partition = snapshot.get("part-1").expect("partition");

    // Act
    let stay = resolve(partition, Command::ArmStay, &CommandRequest::default(), None, &profile())
        .expect("arm stay");
    let away = resolve(partition, Command::ArmAway, &CommandRequest::default(), None, &profile())
        .expect("arm away");
    let disarm = resolve(partition, Command::Disarm, &CommandRequest::default(), None, &profile())
        .expect("disarm");

    // Assert
    assert_eq!(
        stay.arming,
        ArmingFlags {
            force_bypass: true,
            ..Default::default()
        }
    );
    assert_eq!(
        away.arming,
        ArmingFlags {
            force_bypass: false,
            no_entry_delay: true,
            silent_arming: true,
        }
    );
    assert_eq!(disarm.arming, ArmingFlags::default());
}

#[test]
fn commands_outside_capabilities_are_rejected() {
    // Arrange
    let snapshot = fixture();
    let partition = snapshot.get("part-1").expect("partition");
    let sensor = snapshot.get("sensor-1").expect("sensor");
    let light = snapshot.get("light-1").expect("light");

    // Act
    let night = resolve(partition, Command::ArmNight, &CommandRequest::default(), None, &profile());
    let sensor_on = resolve(sensor, Command::TurnOn, &CommandRequest::default(), None, &profile());
    let dim = resolve(light, Command::SetBrightness, &CommandRequest::default(), None, &profile());

    // Assert
    assert!(matches!(
        night,
        Err(SyncError::UnsupportedCommand { command: Command::ArmNight, .. })
    ));
    assert!(matches!(sensor_on, Err(SyncError::UnsupportedCommand { .. })));
    assert!(matches!(dim, Err(SyncError::UnsupportedCommand { .. })), "light is not dimmable");
    assert!(routes(EntityKind::Sensor).is_empty());
}

#[test]
fn config_option_writes_go_to_the_owning_device() {
    // Arrange
    let snapshot = fixture();
    let option = snapshot.get("light-1_led_behavior").expect("config option");
    let request = CommandRequest {
        value: Some(json!("on")),
        ..Default::default()
    };

    // Act
    let args = resolve(option, Command::SetValue, &request, Some("1234"), &profile())
        .expect("set value");
    let missing = resolve(option, Command::SetValue, &CommandRequest::default(), None, &profile());

    // Assert
    assert_eq!(target_device(option), "light-1");
    assert_eq!(args.option_slug.as_deref(), Some("led-behavior"));
    assert_eq!(args.value, Some(json!("on")));
    assert!(matches!(missing, Err(SyncError::InvalidArgument(_))));
}

#[test]
fn thermostat_mode_and_setpoint_are_validated() {
    // Arrange
    let snapshot = fixture();
    let thermostat = snapshot.get("thermo-1").expect("thermostat");
    let request = |value| CommandRequest {
        value: Some(value),
        ..Default::default()
    };

    // Act
    let mode = resolve(thermostat, Command::SetMode, &request(json!("Cool")), Some("1234"), &profile())
        .expect("set mode");
    let bad_mode = resolve(thermostat, Command::SetMode, &request(json!("turbo")), None, &profile());
    let setpoint = resolve(thermostat, Command::SetTemperature, &request(json!(68)), None, &profile())
        .expect("set temperature");
    let too_hot = resolve(thermostat, Command::SetTemperature, &request(json!(95)), None, &profile());
    let not_a_number =
        resolve(thermostat, Command::SetTemperature, &request(json!("warm")), None, &profile());

    // Assert
    assert_eq!(mode.mode, Some(ThermostatState::Cool));
    assert_eq!(setpoint.temperature, Some(68.0));
    assert!(matches!(bad_mode, Err(SyncError::InvalidArgument(_))));
    assert!(matches!(too_hot, Err(SyncError::InvalidArgument(_))));
    assert!(matches!(not_a_number, Err(SyncError::InvalidArgument(_))));
}

#[test]
fn water_valves_open_and_close_without_a_code() {
    // Arrange
    let snapshot = fixture();
    let valve = snapshot.get("valve-1").expect("valve");

    // Act
    let open = resolve(valve, Command::Open, &CommandRequest::default(), Some("1234"), &profile());
    let dim = resolve(valve, Command::SetBrightness, &CommandRequest::default(), None, &profile());

    // Assert
    assert!(open.is_ok());
    assert!(matches!(dim, Err(SyncError::UnsupportedCommand { .. })));
    assert_eq!(routes(EntityKind::WaterValve), &[Command::Open, Command::Close]);
}
