//! Settings schema. JSON keys are camelCase; every section falls back to its
//! defaults for missing keys.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    pub device: DeviceSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

impl BridgeSettings {
    /// Reject values that would stall a timer or a queue.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.device.poll_interval_ms == 0, "device.pollIntervalMs must be > 0"),
            (!self.device.setpoint.is_finite(), "device.setpoint must be finite"),
            (self.device.reconnect.factor < 1.0, "device.reconnect.factor must be >= 1.0"),
            (self.server.heartbeat_interval_ms == 0, "server.heartbeatIntervalMs must be > 0"),
            (self.server.status_interval_ms == 0, "server.statusIntervalMs must be > 0"),
            (self.server.ping_interval_ms == 0, "server.pingIntervalMs must be > 0"),
            (self.server.max_send_queue == 0, "server.maxSendQueue must be > 0"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, msg)) => Err(SettingsError::InvalidValue((*msg).to_string())),
            None => Ok(()),
        }
    }
}

/// Controller connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSettings {
    /// Controller host.
    pub host: String,
    /// Controller TCP port.
    pub port: u16,
    /// Temperature sent once with `SETTEMP=` after connecting.
    pub setpoint: f64,
    /// Period between `STATUS?` polls in milliseconds.
    pub poll_interval_ms: u64,
    /// Appended to every outbound command. Empty by default.
    pub command_terminator: String,
    pub reconnect: ReconnectSettings,
}

impl DeviceSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 46879,
            setpoint: 300.0,
            poll_interval_ms: 1000,
            command_terminator: String::new(),
            reconnect: ReconnectSettings::default(),
        }
    }
}

/// Reconnect policy for the controller link. Disabled by default: a lost or
/// refused connection leaves the link inert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectSettings {
    pub enabled: bool,
    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for the retry delay in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplicative growth factor between retries.
    pub factor: f64,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            factor: 2.0,
            max_attempts: 10,
        }
    }
}

/// HTTP and subscriber-facing settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP / WebSocket port.
    pub port: u16,
    /// Directory holding `index.htm` and other static assets.
    pub static_dir: String,
    /// Period of the `date` heartbeat sent to each subscriber.
    pub heartbeat_interval_ms: u64,
    /// Period of the hub's status fan-out.
    pub status_interval_ms: u64,
    /// WebSocket ping period.
    pub ping_interval_ms: u64,
    /// Per-subscriber outbound queue size.
    pub max_send_queue: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            static_dir: "public".to_string(),
            heartbeat_interval_ms: 1000,
            status_interval_ms: 1000,
            ping_interval_ms: 30_000,
            max_send_queue: 256,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
    /// Per-module levels, e.g. `{"thermo_device": "debug"}`.
    pub module_levels: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            module_levels: BTreeMap::new(),
        }
    }
}
