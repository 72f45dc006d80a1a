use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Partition,
    Sensor,
    Lock,
    Light,
    GarageDoor,
    Gate,
    Thermostat,
    WaterValve,
    Camera,
    System,
    VirtualBattery,
    VirtualMalfunction,
    VirtualDebug,
    ConfigOption,
}

impl EntityKind {
    pub fn is_virtual(self) -> bool {
        matches!(
            self,
            Self::VirtualBattery | Self::VirtualMalfunction | Self::VirtualDebug
        )
    }

    pub fn is_hardware(self) -> bool {
        !self.is_virtual() && self != Self::ConfigOption
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionState {
    Disarmed,
    ArmedStay,
    ArmedAway,
    ArmedNight,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    Closed,
    Open,
    Idle,
    Active,
    Dry,
    Wet,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SensorState {
    pub fn is_on(self) -> Option<bool> {
        match self {
            Self::Open | Self::Active | Self::Wet => Some(true),
            Self::Closed | Self::Idle | Self::Dry => Some(false),
            Self::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightState {
    On,
    Off,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverState {
    Open,
    Closed,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermostatState {
    Off,
    Heat,
    Cool,
    Auto,
    AuxHeat,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EntityState {
    Partition(PartitionState),
    Sensor(SensorState),
    Lock(LockState),
    Light(LightState),
    Cover(CoverState),
    Thermostat(ThermostatState),
    Flag(bool),
    Value(serde_json::Value),
    Present,
    Unknown,
}

impl EntityState {
    pub fn is_unknown(&self) -> bool {
        match self {
            Self::Partition(s) => *s == PartitionState::Unknown,
            Self::Sensor(s) => *s == SensorState::Unknown,
            Self::Lock(s) => *s == LockState::Unknown,
            Self::Light(s) => *s == LightState::Unknown,
            Self::Cover(s) => *s == CoverState::Unknown,
            Self::Thermostat(s) => *s == ThermostatState::Unknown,
            Self::Value(v) => v.is_null(),
            Self::Flag(_) | Self::Present => false,
            Self::Unknown => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Door,
    Window,
    Smoke,
    CarbonMonoxide,
    Moisture,
    Motion,
    Vibration,
    Safety,
    Cold,
    Battery,
    Problem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Arming,
    Disarming,
    Locking,
    Unlocking,
    Opening,
    Closing,
    TurningOn,
    TurningOff,
    ChangingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: String,
    pub kind: EntityKind,
    pub name: String,
    pub parent_id: Option<String>,
    pub state: EntityState,
    pub desired_state: Option<EntityState>,
    pub malfunction: Option<bool>,
    pub battery_low: Option<bool>,
    pub battery_critical: Option<bool>,
    pub capabilities: BTreeSet<Command>,
    pub device_class: Option<DeviceClass>,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EntitySnapshot {
    /// Fetch failures never make a device unavailable; only its own reading does.
    pub fn is_available(&self) -> bool {
        if self.state.is_unknown() {
            return false;
        }
        !(self.kind.is_hardware() && self.malfunction == Some(true))
    }

    pub fn transition(&self) -> Option<Transition> {
        let desired = self.desired_state.as_ref()?;
        if *desired == self.state {
            return None;
        }

        match desired {
            EntityState::Partition(PartitionState::Disarmed) => Some(Transition::Disarming),
            EntityState::Partition(
                PartitionState::ArmedStay | PartitionState::ArmedAway | PartitionState::ArmedNight,
            ) => Some(Transition::Arming),
            EntityState::Lock(LockState::Locked) => Some(Transition::Locking),
            EntityState::Lock(LockState::Unlocked) => Some(Transition::Unlocking),
            EntityState::Cover(CoverState::Open) => Some(Transition::Opening),
            EntityState::Cover(CoverState::Closed) => Some(Transition::Closing),
            EntityState::Light(LightState::On) => Some(Transition::TurningOn),
            EntityState::Light(LightState::Off) => Some(Transition::TurningOff),
            EntityState::Thermostat(mode) if *mode != ThermostatState::Unknown => {
                Some(Transition::ChangingMode)
            }
            _ => None,
        }
    }

    pub fn supports(&self, command: Command) -> bool {
        self.capabilities.contains(&command)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotGeneration {
    entities: BTreeMap<String, EntitySnapshot>,
    by_kind: BTreeMap<EntityKind, BTreeSet<String>>,
}

impl SnapshotGeneration {
    pub(crate) fn from_entities(entities: BTreeMap<String, EntitySnapshot>) -> Self {
        let mut by_kind: BTreeMap<EntityKind, BTreeSet<String>> = BTreeMap::new();
        for (id, entity) in &entities {
            by_kind.entry(entity.kind).or_default().insert(id.clone());
        }
        Self { entities, by_kind }
    }

    pub fn get(&self, id: &str) -> Option<&EntitySnapshot> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySnapshot> {
        self.entities.values()
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.entities.keys().cloned().collect()
    }

    pub fn ids_of(&self, kind: EntityKind) -> impl Iterator<Item = &str> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flat_map(|ids| ids.iter().map(String::as_str))
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &EntitySnapshot> {
        self.ids_of(kind).filter_map(|id| self.entities.get(id))
    }

    pub fn count_of(&self, kind: EntityKind) -> usize {
        self.by_kind.get(&kind).map_or(0, BTreeSet::len)
    }

    pub fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a EntitySnapshot> {
        self.entities
            .values()
            .filter(move |e| e.parent_id.as_deref() == Some(parent_id))
    }

    pub fn dangling_parents(&self) -> Vec<(&str, &str)> {
        self.entities
            .values()
            .filter_map(|e| {
                let parent = e.parent_id.as_deref()?;
                (!self.entities.contains_key(parent)).then_some((e.id.as_str(), parent))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Published {
    pub seq: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub generation: Arc<SnapshotGeneration>,
}

impl Published {
    pub(crate) fn empty() -> Self {
        Self {
            seq: 0,
            fetched_at: None,
            generation: Arc::new(SnapshotGeneration::default()),
        }
    }
}
