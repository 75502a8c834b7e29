use super::*;

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            vehicle_id: String::new(),
            api_base_url: "https://owner-api.teslamotors.com".to_string(),
            request_timeout_ms: 30_000,
            identity_ttl_secs: 86_400,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: "https://auth.tesla.com/oauth2/v3/token".to_string(),
            client_id: "ownerapi".to_string(),
            scope: "openid offline_access user_data vehicle_device_data vehicle_cmds vehicle_charging_cmds"
                .to_string(),
            refresh_token: None,
            refresh_token_file: "/data/teslabus/authtoken.json".to_string(),
            access_token_file: "/data/teslabus/token.txt".to_string(),
            expiry_file: "/data/teslabus/tokenexpire.txt".to_string(),
            expiry_safety_margin_secs: 1000,
            refresh_interval_secs: 4 * 60 * 60,
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 500,
            initial_wait_seconds: 10,
            charging_wait_seconds: 15,
            parked_wait_seconds: 60,
            fault_wait_seconds: 60,
            sleeping_wait_seconds: 120,
            no_power_wait_seconds: 120,
            auth_retry_wait_seconds: 10,
            rate_limit_increment_seconds: 30,
            driving_wait_seconds: 3600,
            night_wait_seconds: 600,
            sign_of_life_minutes: 5,
        }
    }
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            inverter_power_file: "/tmp/Inverter.json".to_string(),
            inverter_delta_watts: 1.0,
            fast_wait_seconds: 10,
            inverter_refetch_watts: 500.0,
            night_start: "00:00".to_string(),
            night_end: "08:00".to_string(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            binary: "tesla-control".to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            settle_delay_secs: 10,
            timeout_secs: 60,
        }
    }
}

impl Default for DbusConfig {
    fn default() -> Self {
        Self {
            custom_name: "Tesla".to_string(),
            product_name: "Tesla API EV Charger".to_string(),
            position: 0,
            phase: "L1".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/teslabus.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_instance: 0,
            require_dbus: true,
            timezone: "America/Chicago".to_string(),
            state_file: "/data/teslabus/state.json".to_string(),
            vehicle: VehicleConfig::default(),
            auth: AuthConfig::default(),
            polling: PollingConfig::default(),
            cadence: CadenceConfig::default(),
            commands: CommandsConfig::default(),
            dbus: DbusConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
