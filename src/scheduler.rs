//! Poll scheduler
//!
//! Decides once per tick whether the vehicle is due for a fetch, turns the
//! snapshot into charger metrics and publishes them. Nothing inside a cycle
//! escapes as an error; failures are classified and change the cadence.

use crate::commands::CommandRunner;
use crate::config::{CadenceConfig, Config, PollingConfig};
use crate::dbus::BusPublisher;
use crate::error::Result;
use crate::inverter::InverterPowerSource;
use crate::logging::{StructuredLogger, get_logger};
use crate::persistence::PersistenceManager;
use crate::session::ChargeSessionTracker;
use crate::tokens::TokenStore;
use crate::vehicle::{ChargingState, VehicleApi, VehicleIdentity, VehicleSnapshot};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;

mod cadence;
mod faults;
mod metrics;


pub use cadence::{InverterChange, QuietWindow, classify_inverter_change};
pub use faults::{CycleFault, FaultKind};
pub use metrics::{PublishedMetrics, status};

/// Mutable scheduling state, touched only by the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerState {
    /// Time of the last fetch attempt; `None` means a fetch is due
    pub last_fetch_at: Option<DateTime<Utc>>,
    wait_seconds: u64,
    /// The vehicle was charging at the last successful fetch
    pub running: bool,
    pub cached_inverter_power: f64,
    pub last_message: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub update_index: u8,
}

impl SchedulerState {
    pub fn new(initial_wait_seconds: u64) -> Self {
        Self {
            last_fetch_at: None,
            wait_seconds: initial_wait_seconds.max(1),
            running: false,
            cached_inverter_power: 0.0,
            last_message: None,
            last_update: None,
            update_index: 0,
        }
    }

    pub const fn wait_seconds(&self) -> u64 {
        self.wait_seconds
    }

    /// Set the wait; never below one second
    pub fn set_wait(&mut self, seconds: u64) {
        self.wait_seconds = seconds.max(1);
    }

    /// True when no attempt was recorded or the wait has elapsed. A clock
    /// that went backwards counts as due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.last_fetch_at.is_none_or(|last| {
            let elapsed = (now - last).num_seconds();
            elapsed < 0 || elapsed.unsigned_abs() >= self.wait_seconds
        })
    }
}

/// What a cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Not due; metrics re-derived from cached state
    Skipped,
    /// Fresh snapshot applied
    Fetched,
    /// A due cycle ended in a classified fault
    Fault(FaultKind),
}

pub struct PollScheduler {
    polling: PollingConfig,
    cadence: CadenceConfig,
    phase: String,
    quiet: QuietWindow,
    api: Arc<dyn VehicleApi>,
    tokens: TokenStore,
    inverter: Arc<dyn InverterPowerSource>,
    publisher: Box<dyn BusPublisher>,
    persistence: PersistenceManager,
    session: ChargeSessionTracker,
    state: SchedulerState,
    snapshot: Option<VehicleSnapshot>,
    metrics: PublishedMetrics,
    published_identity: Option<VehicleIdentity>,
    logger: StructuredLogger,
}

impl PollScheduler {
    /// Build a scheduler. `persistence` must already be loaded; the session
    /// start is restored from it.
    pub fn new(
        config: &Config,
        api: Arc<dyn VehicleApi>,
        tokens: TokenStore,
        inverter: Arc<dyn InverterPowerSource>,
        publisher: Box<dyn BusPublisher>,
        persistence: PersistenceManager,
    ) -> Result<Self> {
        let quiet = QuietWindow::from_config(&config.cadence, config.tz()?)?;
        let session = ChargeSessionTracker::from_state(persistence.state());
        Ok(Self {
            polling: config.polling.clone(),
            cadence: config.cadence.clone(),
            phase: config.dbus.phase.clone(),
            quiet,
            api,
            tokens,
            inverter,
            publisher,
            persistence,
            session,
            state: SchedulerState::new(config.polling.initial_wait_seconds),
            snapshot: None,
            metrics: PublishedMetrics::default(),
            published_identity: None,
            logger: get_logger("scheduler"),
        })
    }

    pub const fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub const fn metrics(&self) -> &PublishedMetrics {
        &self.metrics
    }

    pub const fn snapshot(&self) -> Option<&VehicleSnapshot> {
        self.snapshot.as_ref()
    }

    pub const fn session(&self) -> &ChargeSessionTracker {
        &self.session
    }

    pub const fn last_update(&self) -> Option<DateTime<Utc>> {
        self.state.last_update
    }

    pub async fn poll_cycle(&mut self) -> CycleOutcome {
        self.poll_cycle_at(Utc::now()).await
    }

    /// Run one cycle as of `now`
    pub async fn poll_cycle_at(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let jumped = self.observe_inverter().await;

        if !jumped && self.quiet.contains(now) && !self.metrics.is_delivering() {
            self.state.set_wait(self.polling.night_wait_seconds);
        }

        let outcome = if self.state.is_due(now) {
            self.state.last_fetch_at = Some(now);
            match self.fetch_and_apply(now, jumped).await {
                Ok(()) => CycleOutcome::Fetched,
                Err(fault) => CycleOutcome::Fault(self.recover(fault, now).await),
            }
        } else {
            if self.state.running {
                self.metrics.charging_time = self.session.charging_time(now);
            }
            CycleOutcome::Skipped
        };

        self.finish_cycle(now).await;
        outcome
    }

    /// Returns true when the inverter reading jumped this cycle
    async fn observe_inverter(&mut self) -> bool {
        let power = match self.inverter.read_power().await {
            Ok(p) => p,
            Err(e) => {
                self.logger.warn(&format!("Inverter power unavailable: {e}"));
                return false;
            }
        };
        match classify_inverter_change(self.state.cached_inverter_power, power, &self.cadence) {
            InverterChange::Steady => false,
            change => {
                self.logger.debug(&format!(
                    "Inverter power {:.1} W -> {power:.1} W",
                    self.state.cached_inverter_power
                ));
                self.state.cached_inverter_power = power;
                self.state.set_wait(self.cadence.fast_wait_seconds);
                if change == InverterChange::LargeJump {
                    self.state.last_fetch_at = None;
                }
                true
            }
        }
    }

    async fn fetch_and_apply(
        &mut self,
        now: DateTime<Utc>,
        jumped: bool,
    ) -> std::result::Result<(), CycleFault> {
        let token = self
            .tokens
            .ensure_valid(self.api.as_ref(), now)
            .await
            .map_err(CycleFault::TokenUnavailable)?;
        let snapshot = self
            .api
            .fetch_vehicle_data(&token.value)
            .await
            .map_err(CycleFault::Fetch)?;
        let charging_state = snapshot.charging_state();
        let driving = snapshot.is_driving();
        let latched = snapshot.latch_engaged();
        let (voltage, current) = (snapshot.voltage(), snapshot.current());
        let energy_added = snapshot.energy_added();
        let max_current = snapshot.max_current();
        self.snapshot = Some(snapshot);

        if charging_state == ChargingState::NoPower {
            return Err(CycleFault::NoPower);
        }

        self.metrics.mode = charging_state.as_str().to_string();
        self.metrics.start_stop = u8::from(charging_state == ChargingState::Charging);
        self.metrics.energy_forward = energy_added;
        self.metrics.max_current = max_current;

        let base_wait = match charging_state {
            ChargingState::Charging => {
                self.metrics.status = status::CHARGING;
                self.metrics.power = voltage * current;
                self.metrics.phase_power = self.metrics.power;
                self.metrics.current = current;
                self.track_session(energy_added, now);
                self.metrics.charging_time = self.session.charging_time(now);
                self.state.running = true;
                self.polling.charging_wait_seconds
            }
            ChargingState::Stopped | ChargingState::Complete => {
                if latched {
                    self.metrics.status = status::PLUGGED;
                } else {
                    self.metrics.status = status::IDLE;
                    self.metrics.charging_time = 0;
                }
                self.polling.parked_wait_seconds
            }
            _ => {
                self.metrics.status = status::FAULT;
                self.polling.fault_wait_seconds
            }
        };
        if charging_state != ChargingState::Charging {
            self.metrics.zero_delivery();
            self.state.running = false;
        }

        let wait = if jumped {
            self.cadence.fast_wait_seconds
        } else if self.quiet.contains(now) && !self.metrics.is_delivering() {
            self.polling.night_wait_seconds
        } else if driving {
            self.polling.driving_wait_seconds
        } else {
            base_wait
        };
        self.state.set_wait(wait);
        self.show_info_message(&format!(
            "Vehicle {}, next fetch in {} s",
            charging_state.as_str(),
            self.state.wait_seconds()
        ));
        Ok(())
    }

    fn track_session(&mut self, energy_added: f64, now: DateTime<Utc>) {
        if self.session.observe_charging(energy_added, now).is_none() {
            return;
        }
        let (Some(start), Some(id)) = (self.session.start(), self.session.session_id()) else {
            return;
        };
        if let Err(e) = self
            .persistence
            .set_charge_session(start.timestamp(), id)
        {
            self.logger
                .warn(&format!("Failed to persist charge session start: {e}"));
        }
    }

    async fn finish_cycle(&mut self, now: DateTime<Utc>) {
        self.state.update_index = self.state.update_index.wrapping_add(1);
        self.metrics.update_index = self.state.update_index;

        let updates = self.metrics.to_updates(&self.phase);
        if let Err(e) = self.publisher.publish_many(updates).await {
            self.logger.warn(&format!("Failed to publish metrics: {e}"));
        }
        self.publish_identity(now).await;
        self.state.last_update = Some(now);
    }

    /// Publish `/Serial` and `/FirmwareVersion` when the identity changed
    async fn publish_identity(&mut self, now: DateTime<Utc>) {
        let Some(identity) = self
            .api
            .cached_identity(now)
            .or_else(|| self.snapshot.as_ref().and_then(snapshot_identity))
            .or_else(|| persisted_identity(&self.persistence))
        else {
            return;
        };
        if self.published_identity.as_ref() == Some(&identity) {
            return;
        }
        let updates = vec![
            ("/Serial".to_string(), json!(identity.vin)),
            ("/FirmwareVersion".to_string(), json!(identity.firmware)),
        ];
        if let Err(e) = self.publisher.publish_many(updates).await {
            self.logger.warn(&format!("Failed to publish identity: {e}"));
            return;
        }
        if let Err(e) = self
            .persistence
            .set_identity(&identity.vin, &identity.firmware)
        {
            self.logger
                .warn(&format!("Failed to persist vehicle identity: {e}"));
        }
        self.published_identity = Some(identity);
    }

    /// Log at info level only when the message differs from the last one
    pub(crate) fn show_info_message(&mut self, message: &str) {
        if self.state.last_message.as_deref() == Some(message) {
            self.logger.debug(message);
            return;
        }
        self.logger.info(message);
        self.state.last_message = Some(message.to_string());
    }

    /// Drive charging on or off. Returns true when a command was issued, in
    /// which case the next cycle fetches immediately.
    pub async fn apply_start_stop(&mut self, runner: &CommandRunner, desired: bool) -> Result<bool> {
        let issued = runner
            .start_stop_charging(
                desired,
                self.snapshot.as_ref(),
                &mut self.tokens,
                self.api.as_ref(),
            )
            .await?;
        if issued {
            self.state.last_fetch_at = None;
        }
        Ok(issued)
    }

    /// Release the bus at shutdown
    pub fn close_publisher(&mut self) {
        self.publisher.close();
    }

    /// Refresh the access token ahead of expiry
    pub async fn refresh_token_now(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.tokens.refresh(self.api.as_ref(), now).await.map(|_| ())
    }
}

fn snapshot_identity(snapshot: &VehicleSnapshot) -> Option<VehicleIdentity> {
    Some(VehicleIdentity {
        vin: snapshot.vin.clone()?,
        firmware: snapshot.firmware()?.to_string(),
    })
}

fn persisted_identity(persistence: &PersistenceManager) -> Option<VehicleIdentity> {
    let state = persistence.state();
    Some(VehicleIdentity {
        vin: state.vin.clone()?,
        firmware: state.firmware.clone()?,
    })
}
