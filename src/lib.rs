//! # Teslabus - Tesla vehicle as an EV charger on Victron Venus OS
//!
//! Polls the Tesla owner API for a vehicle's charge state and publishes it
//! on D-Bus as a `com.victronenergy.evcharger` service, so the GX device
//! shows the car like a wallbox. Writes to `/StartStop` are turned into
//! charge start/stop commands.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: structured logging and tracing
//! - `tokens`: file-backed OAuth token store
//! - `vehicle`: owner API client and snapshot types
//! - `commands`: wake/start/stop through the external control binary
//! - `inverter`: house inverter power signal
//! - `scheduler`: per-cycle fetch decisions and metric derivation
//! - `session`: charge session start tracking
//! - `persistence`: state surviving restarts
//! - `dbus`: VeDbus-compatible service
//! - `driver`: run loop tying timers, bus writes and shutdown together

pub mod commands;
pub mod config;
pub mod dbus;
pub mod driver;
pub mod error;
pub mod inverter;
pub mod logging;
pub mod persistence;
pub mod scheduler;
pub mod session;
pub mod tokens;
pub mod vehicle;

// Re-export commonly used types
pub use config::Config;
pub use driver::ChargerDriver;
pub use error::{Result, TeslabusError};
