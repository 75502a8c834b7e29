//! Configuration management for Teslabus
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. Every section falls back to its defaults so
//! a partial file only needs the values that differ (usually the vehicle id
//! and the OAuth client id).

use crate::error::{Result, TeslabusError};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

mod defaults;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device instance for D-Bus service naming
    pub device_instance: u32,

    /// Require D-Bus to be available; fail fast on startup if unavailable
    #[serde(default = "default_true")]
    pub require_dbus: bool,

    /// Timezone for the quiet window and local timestamps
    pub timezone: String,

    /// Path of the scheduler state file (session start, vehicle identity)
    pub state_file: String,

    /// Vehicle data API
    pub vehicle: VehicleConfig,

    /// OAuth token refresh
    pub auth: AuthConfig,

    /// Poll cadence and backoff waits
    pub polling: PollingConfig,

    /// Inverter-driven cadence and the quiet window
    pub cadence: CadenceConfig,

    /// External vehicle command binary
    pub commands: CommandsConfig,

    /// D-Bus presentation
    pub dbus: DbusConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Vehicle data API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Numeric vehicle id used in the data endpoint
    pub vehicle_id: String,

    /// Base URL of the owner API
    pub api_base_url: String,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// How long a cached VIN/firmware stays valid
    pub identity_ttl_secs: u64,
}

/// OAuth token refresh parameters and token file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token endpoint
    pub token_url: String,

    /// OAuth client id
    pub client_id: String,

    /// Requested scopes, space separated
    pub scope: String,

    /// Seed refresh token, used only when the refresh record file is missing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// JSON record holding the current refresh token
    pub refresh_token_file: String,

    /// Plain-text access token (also read by the command binary)
    pub access_token_file: String,

    /// Local-time expiry timestamp of the access token
    pub expiry_file: String,

    /// Seconds subtracted from `expires_in` when computing expiry
    pub expiry_safety_margin_secs: u64,

    /// Proactive refresh interval
    pub refresh_interval_secs: u64,

    /// HTTP request timeout for the token endpoint in milliseconds
    pub request_timeout_ms: u64,
}

/// Poll loop cadence; all waits are in seconds unless noted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Scheduler tick in milliseconds
    pub cycle_interval_ms: u64,

    /// Wait before the first fetch decision
    pub initial_wait_seconds: u64,

    /// Wait while charging
    pub charging_wait_seconds: u64,

    /// Wait while stopped or complete
    pub parked_wait_seconds: u64,

    /// Wait after an unknown state or fault
    pub fault_wait_seconds: u64,

    /// Wait after the vehicle did not answer (asleep)
    pub sleeping_wait_seconds: u64,

    /// Wait after the charger reported no power
    pub no_power_wait_seconds: u64,

    /// Wait after an authentication failure
    pub auth_retry_wait_seconds: u64,

    /// Added to the current wait on every rate-limit response
    pub rate_limit_increment_seconds: u64,

    /// Wait while the vehicle is driving
    pub driving_wait_seconds: u64,

    /// Wait inside the quiet window while no power is delivered
    pub night_wait_seconds: u64,

    /// Heartbeat log interval in minutes
    pub sign_of_life_minutes: u64,
}

/// Inverter-driven cadence and the quiet window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// JSON file with the house inverter output, `{"Power": <watts>}`
    pub inverter_power_file: String,

    /// Change in inverter power that counts as a jump
    pub inverter_delta_watts: f64,

    /// Wait applied after an inverter jump
    pub fast_wait_seconds: u64,

    /// Jumps at least this large trigger an immediate fetch
    pub inverter_refetch_watts: f64,

    /// Quiet window start, `HH:MM` in the configured timezone
    pub night_start: String,

    /// Quiet window end, `HH:MM` in the configured timezone
    pub night_end: String,
}

/// External vehicle command binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Program to execute
    pub binary: String,

    /// Arguments placed before the subcommand
    pub args: Vec<String>,

    /// Extra environment (VIN, key file, token file)
    pub env: HashMap<String, String>,

    /// Pause between wake and the charge command
    pub settle_delay_secs: u64,

    /// Upper bound for a single invocation
    pub timeout_secs: u64,
}

/// D-Bus presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbusConfig {
    /// Value of /CustomName
    pub custom_name: String,

    /// Value of /ProductName
    pub product_name: String,

    /// Charger position (0 = AC output, 1 = AC input)
    pub position: u8,

    /// Phase receiving the per-phase power (L1, L2 or L3)
    pub phase: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (DEBUG, INFO, WARNING, ERROR, CRITICAL)
    pub level: String,

    /// Optional override for the console sink
    pub console_level: Option<String>,

    /// Optional override for the file sink
    pub file_level: Option<String>,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        let default_paths = [
            "teslabus_config.yaml",
            "/data/teslabus_config.yaml",
            "/etc/teslabus/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed timezone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            TeslabusError::validation("timezone".to_string(), format!("unknown timezone '{}'", self.timezone))
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.vehicle.vehicle_id.trim().is_empty() {
            return Err(TeslabusError::validation(
                "vehicle.vehicle_id",
                "Vehicle id cannot be empty",
            ));
        }

        if self.vehicle.api_base_url.trim().is_empty() {
            return Err(TeslabusError::validation(
                "vehicle.api_base_url",
                "API base URL cannot be empty",
            ));
        }

        if self.auth.token_url.trim().is_empty() {
            return Err(TeslabusError::validation(
                "auth.token_url",
                "Token URL cannot be empty",
            ));
        }

        let positive = [
            ("polling.cycle_interval_ms", self.polling.cycle_interval_ms),
            ("polling.initial_wait_seconds", self.polling.initial_wait_seconds),
            ("polling.charging_wait_seconds", self.polling.charging_wait_seconds),
            ("polling.parked_wait_seconds", self.polling.parked_wait_seconds),
            ("polling.fault_wait_seconds", self.polling.fault_wait_seconds),
            ("polling.sleeping_wait_seconds", self.polling.sleeping_wait_seconds),
            ("polling.no_power_wait_seconds", self.polling.no_power_wait_seconds),
            ("polling.auth_retry_wait_seconds", self.polling.auth_retry_wait_seconds),
            ("polling.driving_wait_seconds", self.polling.driving_wait_seconds),
            ("polling.night_wait_seconds", self.polling.night_wait_seconds),
            ("polling.sign_of_life_minutes", self.polling.sign_of_life_minutes),
            ("cadence.fast_wait_seconds", self.cadence.fast_wait_seconds),
            ("auth.refresh_interval_secs", self.auth.refresh_interval_secs),
            ("auth.request_timeout_ms", self.auth.request_timeout_ms),
            ("vehicle.request_timeout_ms", self.vehicle.request_timeout_ms),
            ("commands.timeout_secs", self.commands.timeout_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(TeslabusError::validation(field, "Must be greater than 0"));
            }
        }

        if !(self.cadence.inverter_delta_watts > 0.0) {
            return Err(TeslabusError::validation(
                "cadence.inverter_delta_watts",
                "Must be positive",
            ));
        }

        self.tz()?;
        parse_clock("cadence.night_start", &self.cadence.night_start)?;
        parse_clock("cadence.night_end", &self.cadence.night_end)?;

        if !matches!(self.dbus.phase.as_str(), "L1" | "L2" | "L3") {
            return Err(TeslabusError::validation(
                "dbus.phase",
                "Must be one of L1, L2, L3",
            ));
        }

        if self.commands.binary.trim().is_empty() {
            return Err(TeslabusError::validation(
                "commands.binary",
                "Command binary cannot be empty",
            ));
        }

        Ok(())
    }
}

/// Parse an `HH:MM` wall-clock value
pub fn parse_clock(field: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
        TeslabusError::validation(field.to_string(), format!("invalid time '{value}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.vehicle.vehicle_id = "1234567890".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.device_instance, 0);
        assert_eq!(config.polling.cycle_interval_ms, 500);
        assert_eq!(config.polling.rate_limit_increment_seconds, 30);
        assert_eq!(config.auth.expiry_safety_margin_secs, 1000);
        assert!(config.require_dbus);
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid();
        assert!(config.validate().is_ok());

        config.vehicle.vehicle_id = String::new();
        assert!(config.validate().is_err());

        config = valid();
        config.polling.parked_wait_seconds = 0;
        assert!(config.validate().is_err());

        config = valid();
        config.cadence.night_end = "8am".to_string();
        assert!(config.validate().is_err());

        config = valid();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        config = valid();
        config.dbus.phase = "L4".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = valid();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.vehicle.vehicle_id, deserialized.vehicle.vehicle_id);
        assert_eq!(config.cadence.night_start, deserialized.cadence.night_start);
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = "vehicle:\n  vehicle_id: \"42\"\npolling:\n  charging_wait_seconds: 20\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.vehicle.vehicle_id, "42");
        assert_eq!(config.polling.charging_wait_seconds, 20);
        assert_eq!(config.polling.parked_wait_seconds, 60);
        assert!(config.require_dbus);
    }
}
