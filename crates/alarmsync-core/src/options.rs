use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KEY_ARM_CODE: &str = "arm_code";
pub const KEY_ARM_HOME: &str = "arm_home_options";
pub const KEY_ARM_AWAY: &str = "arm_away_options";
pub const KEY_ARM_NIGHT: &str = "arm_night_options";
pub const KEY_UPDATE_INTERVAL: &str = "update_interval_seconds";
pub const KEY_RECONNECT_TIMEOUT: &str = "websocket_reconnect_timeout_seconds";

pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RECONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigState {
    pub version: u32,
    #[serde(default)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmingOption {
    ForceBypass,
    NoEntryDelay,
    SilentArming,
}

impl ArmingOption {
    pub fn key(self) -> &'static str {
        match self {
            Self::ForceBypass => "force_bypass",
            Self::NoEntryDelay => "no_entry_delay",
            Self::SilentArming => "silent_arming",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "force_bypass" => Some(Self::ForceBypass),
            "no_entry_delay" => Some(Self::NoEntryDelay),
            "silent_arming" => Some(Self::SilentArming),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmingProfile {
    pub home: BTreeSet<ArmingOption>,
    pub away: BTreeSet<ArmingOption>,
    pub night: BTreeSet<ArmingOption>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeFormat {
    Number,
    Text,
}

// Reading never fails: missing or malformed values fall back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountOptions {
    pub arm_code: Option<String>,
    pub arming: ArmingProfile,
    pub update_interval: Duration,
    pub reconnect_timeout: Duration,
}

impl Default for AccountOptions {
    fn default() -> Self {
        Self {
            arm_code: None,
            arming: ArmingProfile::default(),
            update_interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
            reconnect_timeout: Duration::from_secs(DEFAULT_RECONNECT_TIMEOUT_SECS),
        }
    }
}

impl AccountOptions {
    pub fn from_state(state: &ConfigState) -> Self {
        let options = &state.options;
        Self {
            arm_code: options
                .get(KEY_ARM_CODE)
                .and_then(code_string)
                .filter(|code| !code.is_empty()),
            arming: ArmingProfile {
                home: option_set(options.get(KEY_ARM_HOME)),
                away: option_set(options.get(KEY_ARM_AWAY)),
                night: option_set(options.get(KEY_ARM_NIGHT)),
            },
            update_interval: Duration::from_secs(
                positive_secs(options.get(KEY_UPDATE_INTERVAL))
                    .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS),
            ),
            reconnect_timeout: Duration::from_secs(
                positive_secs(options.get(KEY_RECONNECT_TIMEOUT))
                    .unwrap_or(DEFAULT_RECONNECT_TIMEOUT_SECS),
            ),
        }
    }

    pub fn code_format(&self) -> Option<CodeFormat> {
        let code = self.arm_code.as_deref()?;
        if code.chars().all(|c| c.is_ascii_digit()) {
            Some(CodeFormat::Number)
        } else {
            Some(CodeFormat::Text)
        }
    }
}

// Legacy configs stored the arm code as a number.
pub(crate) fn code_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn positive_secs(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 1.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|secs| *secs > 0)
}

fn option_set(value: Option<&Value>) -> BTreeSet<ArmingOption> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(ArmingOption::from_key)
                .collect()
        })
        .unwrap_or_default()
}
