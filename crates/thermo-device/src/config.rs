use std::time::Duration;

use thermo_settings::DeviceSettings;

use crate::backoff::BackoffPolicy;

const CONFIG_COMMAND: &str = "SETTEMP";
const POLL_COMMAND: &str = "STATUS?";

/// Everything the device link needs to know about its controller.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    /// `host:port` of the controller.
    pub addr: String,
    pub setpoint: f64,
    pub poll_interval: Duration,
    pub terminator: String,
    /// `None` keeps the link inert after the first failure.
    pub reconnect: Option<BackoffPolicy>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::from(&DeviceSettings::default())
    }
}

impl From<&DeviceSettings> for DeviceConfig {
    fn from(settings: &DeviceSettings) -> Self {
        Self {
            addr: settings.addr(),
            setpoint: settings.setpoint,
            poll_interval: settings.poll_interval(),
            terminator: settings.command_terminator.clone(),
            reconnect: BackoffPolicy::from_settings(&settings.reconnect),
        }
    }
}

impl DeviceConfig {
    /// Sent once per established session, e.g. `SETTEMP=300.0`.
    pub fn config_command(&self) -> String {
        format!("{CONFIG_COMMAND}={:.1}{}", self.setpoint, self.terminator)
    }

    pub fn poll_command(&self) -> String {
        format!("{POLL_COMMAND}{}", self.terminator)
    }
}
