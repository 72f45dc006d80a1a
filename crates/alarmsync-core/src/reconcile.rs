use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::normalize::{SUFFIX_DEBUG, SUFFIX_LOW_BATTERY, SUFFIX_MALFUNCTION};

// `_battery` is the id older releases gave the low-battery child.
pub const SYNTHETIC_SUFFIXES: &[&str] = &[
    SUFFIX_LOW_BATTERY,
    SUFFIX_MALFUNCTION,
    SUFFIX_DEBUG,
    "_battery",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub entities: BTreeSet<String>,
    #[serde(default)]
    pub devices: Vec<RegisteredDevice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub id: String,
    #[serde(default)]
    pub entities: BTreeSet<String>,
    // Never pruned.
    #[serde(default)]
    pub service: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub entities_to_remove: BTreeSet<String>,
    pub devices_to_remove: BTreeSet<String>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.entities_to_remove.is_empty() && self.devices_to_remove.is_empty()
    }
}

/// Strips one known suffix. An id that is nothing but a suffix stays as it is.
pub fn normalize_identifier(id: &str) -> &str {
    SYNTHETIC_SUFFIXES
        .iter()
        .find_map(|suffix| id.strip_suffix(suffix).filter(|base| !base.is_empty()))
        .unwrap_or(id)
}

pub fn orphaned_ids(current: &BTreeSet<String>, registered: &BTreeSet<String>) -> BTreeSet<String> {
    let live: BTreeSet<&str> = current.iter().map(|id| normalize_identifier(id)).collect();
    registered
        .iter()
        .filter(|id| !live.contains(normalize_identifier(id)))
        .cloned()
        .collect()
}

pub fn reconcile(current: &BTreeSet<String>, registry: &RegistryState) -> Reconciliation {
    let mut registered = registry.entities.clone();
    for device in &registry.devices {
        registered.extend(device.entities.iter().cloned());
    }

    let entities_to_remove = orphaned_ids(current, &registered);

    let devices_to_remove = registry
        .devices
        .iter()
        .filter(|device| !device.service)
        .filter(|device| {
            device
                .entities
                .iter()
                .all(|entity| entities_to_remove.contains(entity))
        })
        .map(|device| device.id.clone())
        .collect();

    Reconciliation {
        entities_to_remove,
        devices_to_remove,
    }
}
