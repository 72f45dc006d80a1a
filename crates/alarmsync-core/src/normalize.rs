use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::classify::{sensor_class, SensorSubtype};
use crate::client::{ClientError, RawDevice};
use crate::command::Command;
use crate::snapshot::{
    CoverState, DeviceClass, EntityKind, EntitySnapshot, EntityState, LightState, LockState,
    PartitionState, SensorState, SnapshotGeneration, ThermostatState,
};

pub const SUFFIX_LOW_BATTERY: &str = "_low_battery";
pub const SUFFIX_MALFUNCTION: &str = "_malfunction";
pub const SUFFIX_DEBUG: &str = "_debug";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub debug_entities: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

pub fn normalize(devices: &[RawDevice]) -> SnapshotGeneration {
    Normalizer::default().normalize(devices)
}

impl Normalizer {
    pub fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    pub fn normalize(&self, devices: &[RawDevice]) -> SnapshotGeneration {
        let mut parsed = Vec::with_capacity(devices.len());
        let mut seen = HashSet::new();

        for raw in devices {
            let Some(kind) = RawKind::parse(&raw.resource_type) else {
                debug!(device_id = %raw.id, resource_type = %raw.resource_type, "skipping unsupported device type");
                continue;
            };

            let device = match ParsedDevice::from_raw(raw, kind) {
                Ok(device) => device,
                Err(err) => {
                    warn!(device_id = %raw.id, error = %err, "skipping malformed device");
                    continue;
                }
            };

            if device.is_blacklisted() {
                debug!(device_id = %raw.id, subtype = ?device.subtype, "skipping blacklisted device");
                continue;
            }

            if !seen.insert(raw.id.as_str()) {
                warn!(device_id = %raw.id, "duplicate device id, keeping the first");
                continue;
            }

            parsed.push(device);
        }

        parsed.retain(|device| {
            let keep = !device.kind.requires_parent() || device.declared_parent().is_some();
            if !keep {
                warn!(device_id = %device.id, kind = ?device.kind, "dropping device without a parent reference");
            }
            keep
        });

        let known: HashSet<&str> = parsed.iter().map(|d| d.id).collect();
        let mut entities = BTreeMap::new();

        for device in &parsed {
            let parent = match device.declared_parent() {
                Some(parent) if known.contains(parent) => Some(parent),
                Some(parent) => {
                    debug!(device_id = %device.id, parent_id = %parent, "parent not in payload, unlinking");
                    None
                }
                None => None,
            };

            let entity = device.entity(parent);
            let children = self.derive_children(device, &entity);

            insert_unique(&mut entities, entity);
            for child in children {
                insert_unique(&mut entities, child);
            }
        }

        SnapshotGeneration::from_entities(entities)
    }

    fn derive_children(&self, device: &ParsedDevice<'_>, entity: &EntitySnapshot) -> Vec<EntitySnapshot> {
        let mut children = Vec::new();
        let attrs = &device.attrs;
        let reports_state = attrs.has_state != Some(false);

        if reports_state && device.kind.has_battery() {
            if let (Some(low), Some(_)) = (attrs.battery_low, attrs.battery_critical) {
                let mut battery = virtual_child(
                    entity,
                    SUFFIX_LOW_BATTERY,
                    "Battery",
                    EntityKind::VirtualBattery,
                    EntityState::Flag(low),
                    DeviceClass::Battery,
                );
                battery.battery_low = attrs.battery_low;
                battery.battery_critical = attrs.battery_critical;
                if let Some(level) = attrs.battery_level {
                    battery.attributes.insert("battery_level".to_string(), Value::from(level));
                }
                children.push(battery);
            }
        }

        if reports_state && device.kind.has_malfunction() {
            if let Some(malfunction) = attrs.malfunction {
                children.push(virtual_child(
                    entity,
                    SUFFIX_MALFUNCTION,
                    "Malfunction",
                    EntityKind::VirtualMalfunction,
                    EntityState::Flag(malfunction),
                    DeviceClass::Problem,
                ));
            }
        }

        for option in &attrs.config_options {
            children.push(config_option_entity(entity, option));
        }

        if self.options.debug_entities {
            let mut debug = virtual_child(
                entity,
                SUFFIX_DEBUG,
                "Debug",
                EntityKind::VirtualDebug,
                EntityState::Present,
                DeviceClass::Problem,
            );
            debug.device_class = None;
            debug.attributes.insert("raw".to_string(), device.raw_attributes.clone());
            children.push(debug);
        }

        children
    }
}

fn insert_unique(entities: &mut BTreeMap<String, EntitySnapshot>, entity: EntitySnapshot) {
    if entities.contains_key(&entity.id) {
        warn!(entity_id = %entity.id, "entity id collision, keeping the first");
        return;
    }
    entities.insert(entity.id.clone(), entity);
}

fn virtual_child(
    parent: &EntitySnapshot,
    suffix: &str,
    label: &str,
    kind: EntityKind,
    state: EntityState,
    class: DeviceClass,
) -> EntitySnapshot {
    EntitySnapshot {
        id: format!("{}{suffix}", parent.id),
        kind,
        name: format!("{} {label}", parent.name),
        parent_id: Some(parent.id.clone()),
        state,
        desired_state: None,
        malfunction: None,
        battery_low: None,
        battery_critical: None,
        capabilities: BTreeSet::new(),
        device_class: Some(class),
        attributes: BTreeMap::new(),
    }
}

fn config_option_entity(parent: &EntitySnapshot, option: &RawConfigOption) -> EntitySnapshot {
    let mut capabilities = BTreeSet::new();
    if !option.read_only {
        capabilities.insert(Command::SetValue);
    }

    let mut attributes = BTreeMap::new();
    attributes.insert("slug".to_string(), Value::String(option.slug.clone()));

    EntitySnapshot {
        id: format!("{}_{}", parent.id, option.slug.replace('-', "_")),
        kind: EntityKind::ConfigOption,
        name: format!("{} {}", parent.name, option.name),
        parent_id: Some(parent.id.clone()),
        state: EntityState::Value(option.value.clone()),
        desired_state: None,
        malfunction: None,
        battery_low: None,
        battery_critical: None,
        capabilities,
        device_class: None,
        attributes,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawKind {
    Partition,
    Sensor,
    WaterSensor,
    Lock,
    Light,
    GarageDoor,
    Gate,
    Thermostat,
    WaterValve,
    Camera,
    System,
}

impl RawKind {
    fn parse(resource_type: &str) -> Option<Self> {
        match resource_type.to_ascii_lowercase().replace('-', "_").as_str() {
            "partition" | "partitions" => Some(Self::Partition),
            "sensor" | "sensors" => Some(Self::Sensor),
            "water_sensor" | "water_sensors" => Some(Self::WaterSensor),
            "lock" | "locks" => Some(Self::Lock),
            "light" | "lights" => Some(Self::Light),
            "garage_door" | "garage_doors" => Some(Self::GarageDoor),
            "gate" | "gates" => Some(Self::Gate),
            "thermostat" | "thermostats" => Some(Self::Thermostat),
            "water_valve" | "water_valves" => Some(Self::WaterValve),
            "camera" | "cameras" => Some(Self::Camera),
            "system" | "systems" => Some(Self::System),
            _ => None,
        }
    }

    fn entity_kind(self) -> EntityKind {
        match self {
            Self::Partition => EntityKind::Partition,
            Self::Sensor | Self::WaterSensor => EntityKind::Sensor,
            Self::Lock => EntityKind::Lock,
            Self::Light => EntityKind::Light,
            Self::GarageDoor => EntityKind::GarageDoor,
            Self::Gate => EntityKind::Gate,
            Self::Thermostat => EntityKind::Thermostat,
            Self::WaterValve => EntityKind::WaterValve,
            Self::Camera => EntityKind::Camera,
            Self::System => EntityKind::System,
        }
    }

    fn requires_parent(self) -> bool {
        !matches!(self, Self::System | Self::Camera)
    }

    fn has_battery(self) -> bool {
        matches!(
            self,
            Self::Sensor | Self::WaterSensor | Self::Lock | Self::Thermostat | Self::WaterValve
        )
    }

    fn has_malfunction(self) -> bool {
        matches!(
            self,
            Self::Sensor
                | Self::WaterSensor
                | Self::Lock
                | Self::Partition
                | Self::Light
                | Self::GarageDoor
                | Self::Gate
                | Self::Thermostat
                | Self::WaterValve
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawAttributes {
    name: String,
    #[serde(default)]
    state: Option<Value>,
    #[serde(default)]
    desired_state: Option<Value>,
    #[serde(default)]
    malfunction: Option<bool>,
    #[serde(default)]
    battery_low: Option<bool>,
    #[serde(default)]
    battery_critical: Option<bool>,
    #[serde(default)]
    battery_level: Option<u8>,
    #[serde(default)]
    partition_id: Option<String>,
    #[serde(default)]
    system_id: Option<String>,
    #[serde(default)]
    subtype: Option<SensorSubtype>,
    #[serde(default)]
    has_state: Option<bool>,
    #[serde(default)]
    supports_night_arming: bool,
    #[serde(default)]
    is_dimmable: bool,
    #[serde(default)]
    brightness: Option<u8>,
    #[serde(default)]
    supports_setpoints: Option<bool>,
    #[serde(default)]
    temp_average: Option<f64>,
    #[serde(default)]
    heat_setpoint: Option<f64>,
    #[serde(default)]
    cool_setpoint: Option<f64>,
    #[serde(default)]
    min_heat_setpoint: Option<f64>,
    #[serde(default)]
    max_heat_setpoint: Option<f64>,
    #[serde(default)]
    min_cool_setpoint: Option<f64>,
    #[serde(default)]
    max_cool_setpoint: Option<f64>,
    #[serde(default)]
    fan_mode: Option<String>,
    #[serde(default)]
    read_only: bool,
    #[serde(default)]
    mac_address: Option<String>,
    #[serde(default)]
    raw_state_text: Option<String>,
    #[serde(default)]
    manufacturer: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    config_options: Vec<RawConfigOption>,
}

#[derive(Debug, Deserialize)]
struct RawConfigOption {
    slug: String,
    name: String,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    read_only: bool,
}

struct ParsedDevice<'a> {
    id: &'a str,
    kind: RawKind,
    attrs: RawAttributes,
    subtype: Option<SensorSubtype>,
    state: EntityState,
    desired_state: Option<EntityState>,
    raw_attributes: &'a Value,
}

impl<'a> ParsedDevice<'a> {
    fn from_raw(raw: &'a RawDevice, kind: RawKind) -> Result<Self, ClientError> {
        if raw.id.is_empty() {
            return Err(ClientError::Protocol("device without id".to_string()));
        }

        let attrs: RawAttributes = serde_json::from_value(raw.attributes.clone())
            .map_err(|e| ClientError::Protocol(format!("attributes: {e}")))?;

        let subtype = match kind {
            RawKind::WaterSensor => Some(SensorSubtype::WaterSensor),
            RawKind::Sensor => Some(attrs.subtype.unwrap_or(SensorSubtype::Other)),
            _ => None,
        };

        let state = read_state(kind, attrs.state.as_ref())?;
        let desired_state = match attrs.desired_state.as_ref() {
            Some(value) if !value.is_null() => Some(read_state(kind, Some(value))?),
            _ => None,
        };

        Ok(Self {
            id: &raw.id,
            kind,
            attrs,
            subtype,
            state,
            desired_state,
            raw_attributes: &raw.attributes,
        })
    }

    fn is_blacklisted(&self) -> bool {
        if self.subtype.is_some_and(SensorSubtype::is_blacklisted) {
            return true;
        }
        matches!(self.kind, RawKind::Sensor | RawKind::WaterSensor)
            && self.attrs.has_state == Some(false)
    }

    fn declared_parent(&self) -> Option<&str> {
        match self.kind {
            RawKind::System => None,
            RawKind::Partition | RawKind::Camera => self.attrs.system_id.as_deref(),
            _ => self
                .attrs
                .partition_id
                .as_deref()
                .or(self.attrs.system_id.as_deref()),
        }
    }

    fn capabilities(&self) -> BTreeSet<Command> {
        if self.attrs.read_only {
            return BTreeSet::new();
        }

        let mut caps = BTreeSet::new();
        match self.kind {
            RawKind::Partition => {
                caps.extend([Command::Disarm, Command::ArmStay, Command::ArmAway]);
                if self.attrs.supports_night_arming {
                    caps.insert(Command::ArmNight);
                }
            }
            RawKind::Lock => caps.extend([Command::Lock, Command::Unlock]),
            RawKind::Light => {
                caps.extend([Command::TurnOn, Command::TurnOff]);
                if self.attrs.is_dimmable {
                    caps.insert(Command::SetBrightness);
                }
            }
            RawKind::GarageDoor | RawKind::Gate | RawKind::WaterValve => {
                caps.extend([Command::Open, Command::Close]);
            }
            RawKind::Thermostat => {
                caps.insert(Command::SetMode);
                if self.attrs.supports_setpoints != Some(false) {
                    caps.insert(Command::SetTemperature);
                }
            }
            RawKind::Sensor | RawKind::WaterSensor | RawKind::Camera | RawKind::System => {}
        }
        caps
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        let attrs = &self.attrs;
        let mut out = BTreeMap::new();
        let strings = [
            ("mac_address", &attrs.mac_address),
            ("raw_state_text", &attrs.raw_state_text),
            ("manufacturer", &attrs.manufacturer),
            ("model", &attrs.model),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                out.insert(key.to_string(), Value::String(value.clone()));
            }
        }
        if let Some(level) = attrs.battery_level {
            out.insert("battery_level".to_string(), Value::from(level));
        }
        if let Some(brightness) = attrs.brightness {
            out.insert("brightness".to_string(), Value::from(brightness));
        }
        if self.kind == RawKind::Thermostat {
            self.thermostat_attributes(&mut out);
        }
        if let Some(subtype) = self.subtype {
            if let Ok(value) = serde_json::to_value(subtype) {
                out.insert("subtype".to_string(), value);
            }
        }
        out
    }

    // Setpoint bounds follow the active mode; auto spans heat low to cool high.
    fn thermostat_attributes(&self, out: &mut BTreeMap<String, Value>) {
        let attrs = &self.attrs;
        let (min, max) = match self.state {
            EntityState::Thermostat(ThermostatState::Cool) => {
                (attrs.min_cool_setpoint, attrs.max_cool_setpoint)
            }
            EntityState::Thermostat(ThermostatState::Auto) => {
                (attrs.min_heat_setpoint, attrs.max_cool_setpoint)
            }
            _ => (attrs.min_heat_setpoint, attrs.max_heat_setpoint),
        };
        let numbers = [
            ("current_temperature", attrs.temp_average),
            ("heat_setpoint", attrs.heat_setpoint),
            ("cool_setpoint", attrs.cool_setpoint),
            ("min_setpoint", min),
            ("max_setpoint", max),
        ];
        for (key, value) in numbers {
            if let Some(value) = value {
                out.insert(key.to_string(), Value::from(value));
            }
        }
        if let Some(fan_mode) = &attrs.fan_mode {
            out.insert("fan_mode".to_string(), Value::String(fan_mode.to_ascii_lowercase()));
        }
    }

    fn entity(&self, parent: Option<&str>) -> EntitySnapshot {
        let device_class = self
            .subtype
            .and_then(|subtype| sensor_class(subtype, &self.attrs.name));

        EntitySnapshot {
            id: self.id.to_string(),
            kind: self.kind.entity_kind(),
            name: self.attrs.name.clone(),
            parent_id: parent.map(str::to_string),
            state: self.state.clone(),
            desired_state: self.desired_state.clone(),
            malfunction: self.attrs.malfunction,
            battery_low: self.attrs.battery_low,
            battery_critical: self.attrs.battery_critical,
            capabilities: self.capabilities(),
            device_class,
            attributes: self.attributes(),
        }
    }
}

fn read_state(kind: RawKind, value: Option<&Value>) -> Result<EntityState, ClientError> {
    Ok(match kind {
        RawKind::Partition => EntityState::Partition(parse_state::<PartitionState>(value)?),
        RawKind::Sensor | RawKind::WaterSensor => EntityState::Sensor(parse_state::<SensorState>(value)?),
        RawKind::Lock => EntityState::Lock(parse_state::<LockState>(value)?),
        RawKind::Light => EntityState::Light(parse_state::<LightState>(value)?),
        RawKind::GarageDoor | RawKind::Gate | RawKind::WaterValve => {
            EntityState::Cover(parse_state::<CoverState>(value)?)
        }
        RawKind::Thermostat => EntityState::Thermostat(parse_state::<ThermostatState>(value)?),
        RawKind::Camera | RawKind::System => EntityState::Present,
    })
}

// Providers report state names in either case.
fn parse_state<T: DeserializeOwned + Default>(value: Option<&Value>) -> Result<T, ClientError> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(Value::String(name)) => {
            serde_json::from_value(Value::String(name.to_ascii_lowercase()))
                .map_err(|e| ClientError::Protocol(format!("state {name}: {e}")))
        }
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| ClientError::Protocol(format!("state {value}: {e}"))),
    }
}
