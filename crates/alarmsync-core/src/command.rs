use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::options::{ArmingOption, ArmingProfile};
use crate::snapshot::{EntityKind, EntitySnapshot, ThermostatState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Disarm,
    ArmStay,
    ArmAway,
    ArmNight,
    Lock,
    Unlock,
    TurnOn,
    TurnOff,
    SetBrightness,
    Open,
    Close,
    SetMode,
    SetTemperature,
    SetValue,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disarm => "disarm",
            Self::ArmStay => "arm_stay",
            Self::ArmAway => "arm_away",
            Self::ArmNight => "arm_night",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
            Self::SetBrightness => "set_brightness",
            Self::Open => "open",
            Self::Close => "close",
            Self::SetMode => "set_mode",
            Self::SetTemperature => "set_temperature",
            Self::SetValue => "set_value",
        };
        f.write_str(name)
    }
}

pub fn routes(kind: EntityKind) -> &'static [Command] {
    match kind {
        EntityKind::Partition => &[
            Command::Disarm,
            Command::ArmStay,
            Command::ArmAway,
            Command::ArmNight,
        ],
        EntityKind::Lock => &[Command::Lock, Command::Unlock],
        EntityKind::Light => &[Command::TurnOn, Command::TurnOff, Command::SetBrightness],
        EntityKind::GarageDoor | EntityKind::Gate | EntityKind::WaterValve => {
            &[Command::Open, Command::Close]
        }
        EntityKind::Thermostat => &[Command::SetMode, Command::SetTemperature],
        EntityKind::ConfigOption => &[Command::SetValue],
        EntityKind::Sensor
        | EntityKind::Camera
        | EntityKind::System
        | EntityKind::VirtualBattery
        | EntityKind::VirtualMalfunction
        | EntityKind::VirtualDebug => &[],
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub brightness: Option<u8>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmingFlags {
    pub force_bypass: bool,
    pub no_entry_delay: bool,
    pub silent_arming: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandArgs {
    pub arming: ArmingFlags,
    pub brightness: Option<u8>,
    pub mode: Option<ThermostatState>,
    pub temperature: Option<f64>,
    pub option_slug: Option<String>,
    pub value: Option<serde_json::Value>,
}

pub fn resolve(
    entity: &EntitySnapshot,
    command: Command,
    request: &CommandRequest,
    arm_code: Option<&str>,
    profile: &ArmingProfile,
) -> Result<CommandArgs, SyncError> {
    if !routes(entity.kind).contains(&command) || !entity.supports(command) {
        return Err(SyncError::UnsupportedCommand {
            device_id: entity.id.clone(),
            command,
        });
    }

    if matches!(entity.kind, EntityKind::Partition | EntityKind::Lock) {
        check_code(arm_code, request.code.as_deref())?;
    }

    let mut args = CommandArgs::default();
    match command {
        Command::ArmStay => args.arming = flags(&profile.home),
        Command::ArmAway => args.arming = flags(&profile.away),
        Command::ArmNight => args.arming = flags(&profile.night),
        Command::TurnOn | Command::SetBrightness => {
            args.brightness = request.brightness;
            if command == Command::SetBrightness && args.brightness.is_none() {
                return Err(SyncError::InvalidArgument(
                    "set_brightness needs a brightness".to_string(),
                ));
            }
        }
        Command::SetValue => {
            let Some(value) = request.value.clone() else {
                return Err(SyncError::InvalidArgument("set_value needs a value".to_string()));
            };
            args.option_slug = entity
                .attributes
                .get("slug")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            args.value = Some(value);
        }
        Command::SetMode => args.mode = Some(thermostat_mode(request.value.as_ref())?),
        Command::SetTemperature => {
            args.temperature = Some(setpoint(entity, request.value.as_ref())?);
        }
        _ => {}
    }

    Ok(args)
}

pub fn target_device(entity: &EntitySnapshot) -> &str {
    match entity.kind {
        EntityKind::ConfigOption => entity.parent_id.as_deref().unwrap_or(&entity.id),
        _ => &entity.id,
    }
}

fn thermostat_mode(value: Option<&serde_json::Value>) -> Result<ThermostatState, SyncError> {
    let Some(name) = value.and_then(|v| v.as_str()) else {
        return Err(SyncError::InvalidArgument("set_mode needs a mode name".to_string()));
    };
    let lowered = serde_json::Value::String(name.to_ascii_lowercase());
    let mode: ThermostatState = serde_json::from_value(lowered).unwrap_or_default();
    if mode == ThermostatState::Unknown {
        return Err(SyncError::InvalidArgument(format!("unknown thermostat mode {name:?}")));
    }
    Ok(mode)
}

fn setpoint(entity: &EntitySnapshot, value: Option<&serde_json::Value>) -> Result<f64, SyncError> {
    let Some(temperature) = value.and_then(|v| v.as_f64()) else {
        return Err(SyncError::InvalidArgument(
            "set_temperature needs a number".to_string(),
        ));
    };
    let bound = |key: &str| entity.attributes.get(key).and_then(|v| v.as_f64());
    let below = bound("min_setpoint").is_some_and(|min| temperature < min);
    let above = bound("max_setpoint").is_some_and(|max| temperature > max);
    if below || above {
        return Err(SyncError::InvalidArgument(format!(
            "setpoint {temperature} outside the thermostat's range"
        )));
    }
    Ok(temperature)
}

fn check_code(configured: Option<&str>, supplied: Option<&str>) -> Result<(), SyncError> {
    match configured {
        None | Some("") => Ok(()),
        Some(expected) if supplied == Some(expected) => Ok(()),
        Some(_) => Err(SyncError::InvalidCode),
    }
}

fn flags(options: &std::collections::BTreeSet<ArmingOption>) -> ArmingFlags {
    ArmingFlags {
        force_bypass: options.contains(&ArmingOption::ForceBypass),
        no_entry_delay: options.contains(&ArmingOption::NoEntryDelay),
        silent_arming: options.contains(&ArmingOption::SilentArming),
    }
}
