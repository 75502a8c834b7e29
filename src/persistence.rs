//! Persistence layer for scheduler state
//!
//! Keeps the charge session start and the last known vehicle identity across
//! restarts, so the published charging time and serial survive a reboot.

use crate::error::Result;
use crate::logging::get_logger;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Persistent state structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentState {
    /// Start of the current charge session, unix seconds
    pub charge_session_start: Option<i64>,

    /// Id of the current charge session
    pub session_id: Option<String>,

    /// Last known VIN
    pub vin: Option<String>,

    /// Last known firmware version
    pub firmware: Option<String>,
}

/// Persistence manager
pub struct PersistenceManager {
    file_path: String,
    state: PersistentState,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            state: PersistentState::default(),
            logger: get_logger("persistence"),
        }
    }

    /// Load state from disk; a missing file leaves the defaults in place
    pub fn load(&mut self) -> Result<()> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger
                .info("No persistent state file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            self.logger.warn("Persistent state file is empty, using defaults");
            return Ok(());
        }
        self.state = serde_json::from_str(&contents)?;
        self.logger.info("Loaded persistent state from disk");

        Ok(())
    }

    /// Save state to disk (write to a sibling temp file, then rename)
    pub fn save(&self) -> Result<()> {
        let path = Path::new(&self.file_path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.state)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        self.logger.debug("Saved persistent state to disk");

        Ok(())
    }

    pub const fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    /// Record a new charge session and save
    pub fn set_charge_session(&mut self, start: i64, session_id: &str) -> Result<()> {
        self.state.charge_session_start = Some(start);
        self.state.session_id = Some(session_id.to_string());
        self.save()
    }

    /// Record the vehicle identity and save when it changed
    pub fn set_identity(&mut self, vin: &str, firmware: &str) -> Result<()> {
        if self.state.vin.as_deref() == Some(vin) && self.state.firmware.as_deref() == Some(firmware)
        {
            return Ok(());
        }
        self.state.vin = Some(vin.to_string());
        self.state.firmware = Some(firmware.to_string());
        self.save()
    }
}
