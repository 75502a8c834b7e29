use serde_json::json;

/// Status codes published on /Status
pub mod status {
    pub const IDLE: u8 = 0;
    pub const PLUGGED: u8 = 1;
    pub const CHARGING: u8 = 2;
    pub const FAULT: u8 = 10;
}

/// Values published to the bus every cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedMetrics {
    pub status: u8,
    pub power: f64,
    pub phase_power: f64,
    pub current: f64,
    pub max_current: f64,
    pub energy_forward: f64,
    pub charging_time: u64,
    pub mode: String,
    /// Mirrors the observed charging state so the GX toggle follows the car
    pub start_stop: u8,
    pub update_index: u8,
}

impl PublishedMetrics {
    /// Drop the live electrical readings
    pub fn zero_delivery(&mut self) {
        self.power = 0.0;
        self.phase_power = 0.0;
        self.current = 0.0;
    }

    pub fn is_delivering(&self) -> bool {
        self.power > 0.0
    }

    /// Path/value pairs; `phase` selects the per-phase power path
    pub fn to_updates(&self, phase: &str) -> Vec<(String, serde_json::Value)> {
        vec![
            ("/Status".to_string(), json!(self.status)),
            ("/Ac/Power".to_string(), json!(self.power)),
            (format!("/Ac/{phase}/Power"), json!(self.phase_power)),
            ("/Current".to_string(), json!(self.current)),
            ("/MaxCurrent".to_string(), json!(self.max_current)),
            ("/Ac/Energy/Forward".to_string(), json!(self.energy_forward)),
            ("/ChargingTime".to_string(), json!(self.charging_time)),
            ("/Mode".to_string(), json!(self.mode)),
            ("/StartStop".to_string(), json!(self.start_stop)),
            ("/UpdateIndex".to_string(), json!(self.update_index)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_use_configured_phase() {
        let m = PublishedMetrics {
            phase_power: 5.0,
            ..PublishedMetrics::default()
        };
        let updates = m.to_updates("L2");
        assert!(updates.iter().any(|(p, v)| p == "/Ac/L2/Power" && v == &json!(5.0)));
        assert_eq!(updates.len(), 10);
    }
}
