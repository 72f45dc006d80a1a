use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::options::{
    code_string, positive_secs, ArmingOption, ConfigState, DEFAULT_RECONNECT_TIMEOUT_SECS,
    DEFAULT_UPDATE_INTERVAL_SECS, KEY_ARM_AWAY, KEY_ARM_CODE, KEY_ARM_HOME, KEY_ARM_NIGHT,
    KEY_RECONNECT_TIMEOUT, KEY_UPDATE_INTERVAL,
};

pub const CURRENT_VERSION: u32 = 4;

const LEGACY_USE_ARM_CODE: &str = "use_arm_code";
const LEGACY_UPDATE_INTERVAL: &str = "update_interval";
const LEGACY_RECONNECT_TIMEOUT: &str = "ws_reconnect_timeout";

type Step = fn(&mut Map<String, Value>);

// `(from_version, step)`: each step leaves the options at `from_version + 1`.
const STEPS: &[(u32, Step)] = &[
    (1, split_arming_profile),
    (2, rename_explicit_keys),
    (3, purge_superseded_keys),
];

pub fn migrate(mut state: ConfigState) -> ConfigState {
    // Entries imported before versioning existed carry no version at all.
    if state.version == 0 {
        state.version = 1;
    }

    if state.version > CURRENT_VERSION {
        warn!(
            version = state.version,
            current = CURRENT_VERSION,
            "config is newer than this build, leaving it untouched"
        );
        return state;
    }

    while let Some((from, step)) = STEPS.iter().find(|(from, _)| *from == state.version) {
        step(&mut state.options);
        state.version = from + 1;
        debug!(from = *from, to = state.version, "migrated config options");
    }

    state
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Home,
    Away,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyScope {
    Never,
    Home,
    Away,
    Always,
}

impl LegacyScope {
    fn read(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(true)) => Self::Always,
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "home" | "stay" => Self::Home,
                "away" => Self::Away,
                "true" | "always" => Self::Always,
                _ => Self::Never,
            },
            _ => Self::Never,
        }
    }

    // Night arming only ever honoured "always".
    fn applies_to(self, mode: Mode) -> bool {
        match self {
            Self::Never => false,
            Self::Home => mode == Mode::Home,
            Self::Away => mode == Mode::Away,
            Self::Always => true,
        }
    }
}

fn legacy_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

// v1 -> v2
fn split_arming_profile(options: &mut Map<String, Value>) {
    let use_code = legacy_truthy(options.get(KEY_ARM_CODE));
    let code = if use_code {
        options.get(KEY_ARM_CODE).and_then(code_string).unwrap_or_default()
    } else {
        String::new()
    };
    options.insert(LEGACY_USE_ARM_CODE.to_string(), Value::Bool(use_code));
    options.insert(KEY_ARM_CODE.to_string(), Value::String(code));

    let scopes: Vec<(ArmingOption, LegacyScope)> = [
        ArmingOption::ForceBypass,
        ArmingOption::NoEntryDelay,
        ArmingOption::SilentArming,
    ]
    .into_iter()
    .map(|opt| (opt, LegacyScope::read(options.get(opt.key()))))
    .collect();

    for (key, mode) in [
        (KEY_ARM_HOME, Mode::Home),
        (KEY_ARM_AWAY, Mode::Away),
        (KEY_ARM_NIGHT, Mode::Night),
    ] {
        if options.get(key).is_some_and(Value::is_array) {
            continue;
        }
        let enabled = scopes
            .iter()
            .filter(|(_, scope)| scope.applies_to(mode))
            .map(|(opt, _)| Value::String(opt.key().to_string()))
            .collect();
        options.insert(key.to_string(), Value::Array(enabled));
    }
}

// v2 -> v3
fn rename_explicit_keys(options: &mut Map<String, Value>) {
    rename_seconds(
        options,
        LEGACY_UPDATE_INTERVAL,
        KEY_UPDATE_INTERVAL,
        DEFAULT_UPDATE_INTERVAL_SECS,
    );
    rename_seconds(
        options,
        LEGACY_RECONNECT_TIMEOUT,
        KEY_RECONNECT_TIMEOUT,
        DEFAULT_RECONNECT_TIMEOUT_SECS,
    );

    if options.get(LEGACY_USE_ARM_CODE) == Some(&Value::Bool(false)) {
        options.insert(KEY_ARM_CODE.to_string(), Value::String(String::new()));
    }
}

fn rename_seconds(options: &mut Map<String, Value>, old: &str, new: &str, default: u64) {
    let Some(legacy) = options.remove(old) else {
        return;
    };
    if options.contains_key(new) {
        return;
    }
    let secs = positive_secs(Some(&legacy)).unwrap_or(default);
    options.insert(new.to_string(), Value::from(secs));
}

// v3 -> v4
fn purge_superseded_keys(options: &mut Map<String, Value>) {
    for key in [
        ArmingOption::ForceBypass.key(),
        ArmingOption::NoEntryDelay.key(),
        ArmingOption::SilentArming.key(),
        LEGACY_USE_ARM_CODE,
        LEGACY_UPDATE_INTERVAL,
        LEGACY_RECONNECT_TIMEOUT,
    ] {
        options.remove(key);
    }

    let code = options.get(KEY_ARM_CODE).and_then(code_string).unwrap_or_default();
    options.insert(KEY_ARM_CODE.to_string(), Value::String(code));

    for key in [KEY_ARM_HOME, KEY_ARM_AWAY, KEY_ARM_NIGHT] {
        let cleaned: Vec<Value> = options
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|v| v.as_str().and_then(ArmingOption::from_key).is_some())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        options.insert(key.to_string(), Value::Array(cleaned));
    }

    for (key, default) in [
        (KEY_UPDATE_INTERVAL, DEFAULT_UPDATE_INTERVAL_SECS),
        (KEY_RECONNECT_TIMEOUT, DEFAULT_RECONNECT_TIMEOUT_SECS),
    ] {
        let secs = positive_secs(options.get(key)).unwrap_or(default);
        options.insert(key.to_string(), Value::from(secs));
    }
}
