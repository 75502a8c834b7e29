use serde::{Deserialize, Serialize};

/// Charging state reported by the vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargingState {
    Charging,
    Stopped,
    Complete,
    NoPower,
    Disconnected,
    Starting,
    Other(String),
}

impl ChargingState {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Charging" => Self::Charging,
            "Stopped" => Self::Stopped,
            "Complete" => Self::Complete,
            "NoPower" => Self::NoPower,
            "Disconnected" => Self::Disconnected,
            "Starting" => Self::Starting,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Charging => "Charging",
            Self::Stopped => "Stopped",
            Self::Complete => "Complete",
            Self::NoPower => "NoPower",
            Self::Disconnected => "Disconnected",
            Self::Starting => "Starting",
            Self::Other(s) => s,
        }
    }
}

/// `charge_state` block of the vehicle data response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChargeState {
    pub charging_state: Option<String>,
    pub charger_actual_current: Option<f64>,
    pub charger_voltage: Option<f64>,
    pub charger_power: Option<f64>,
    pub charge_energy_added: Option<f64>,
    pub charge_current_request_max: Option<f64>,
    pub charge_port_latch: Option<String>,
    pub battery_level: Option<f64>,
}

/// `drive_state` block of the vehicle data response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveState {
    pub speed: Option<f64>,
    pub shift_state: Option<String>,
}

/// `vehicle_state` block of the vehicle data response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleState {
    pub car_version: Option<String>,
}

/// Last fetched vehicle data
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleSnapshot {
    pub vin: Option<String>,
    pub charge_state: ChargeState,
    pub drive_state: DriveState,
    pub vehicle_state: VehicleState,
}

/// Envelope returned by the owner API
#[derive(Debug, Deserialize)]
pub(crate) struct VehicleDataEnvelope {
    pub response: Option<VehicleSnapshot>,
    #[serde(default)]
    pub error: Option<String>,
}

impl VehicleSnapshot {
    pub fn charging_state(&self) -> ChargingState {
        ChargingState::parse(self.charge_state.charging_state.as_deref().unwrap_or(""))
    }

    pub fn is_charging(&self) -> bool {
        self.charging_state() == ChargingState::Charging
    }

    /// Charge port latch reports `Engaged`
    pub fn latch_engaged(&self) -> bool {
        self.charge_state.charge_port_latch.as_deref() == Some("Engaged")
    }

    pub fn voltage(&self) -> f64 {
        self.charge_state.charger_voltage.unwrap_or(0.0)
    }

    pub fn current(&self) -> f64 {
        self.charge_state.charger_actual_current.unwrap_or(0.0)
    }

    pub fn energy_added(&self) -> f64 {
        self.charge_state.charge_energy_added.unwrap_or(0.0)
    }

    pub fn max_current(&self) -> f64 {
        self.charge_state.charge_current_request_max.unwrap_or(0.0)
    }

    /// Moving, or in a gear other than park
    pub fn is_driving(&self) -> bool {
        let moving = self.drive_state.speed.is_some_and(|s| s > 0.0);
        let in_gear = self
            .drive_state
            .shift_state
            .as_deref()
            .is_some_and(|s| !s.is_empty() && s != "P");
        moving || in_gear
    }

    pub fn firmware(&self) -> Option<&str> {
        self.vehicle_state.car_version.as_deref()
    }
}
