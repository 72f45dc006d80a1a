use std::time::Duration;

use crate::normalize::NormalizeOptions;
use crate::options::{AccountOptions, ArmingProfile};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub update_interval: Duration,
    pub fetch_timeout: Duration,
    pub command_timeout: Duration,
    pub keep_alive_interval: Option<Duration>,
    pub push_events: bool,
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
    pub normalize: NormalizeOptions,
    pub arm_code: Option<String>,
    pub arming: ArmingProfile,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(30),
            keep_alive_interval: Some(Duration::from_secs(300)),
            push_events: true,
            reconnect_delay: Duration::from_secs(5),
            reconnect_delay_max: Duration::from_secs(300),
            normalize: NormalizeOptions::default(),
            arm_code: None,
            arming: ArmingProfile::default(),
        }
    }
}

impl CoordinatorConfig {
    pub fn from_options(options: &AccountOptions) -> Self {
        let defaults = Self::default();
        Self {
            update_interval: options.update_interval,
            reconnect_delay: options.reconnect_timeout,
            reconnect_delay_max: defaults.reconnect_delay_max.max(options.reconnect_timeout),
            arm_code: options.arm_code.clone(),
            arming: options.arming.clone(),
            ..defaults
        }
    }
}
