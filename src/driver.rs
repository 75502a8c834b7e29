//! Core driver loop for Teslabus
//!
//! Owns the scheduler and multiplexes its timers with write-back commands
//! from the bus and the shutdown signal. Every branch runs to completion
//! before the next one is polled, so the scheduler is never re-entered.

use crate::commands::CommandRunner;
use crate::config::Config;
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::scheduler::PollScheduler;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};

mod commands;

/// Commands accepted by the driver from the bus side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCommand {
    /// Charging on (`true`) or off
    SetStartStop(bool),
}

/// Timer periods of the run loop
#[derive(Debug, Clone, Copy)]
struct Timers {
    cycle: Duration,
    sign_of_life: Duration,
    token_refresh: Duration,
}

impl Timers {
    fn from_config(config: &Config) -> Self {
        Self {
            cycle: Duration::from_millis(config.polling.cycle_interval_ms.max(1)),
            sign_of_life: Duration::from_secs(
                config.polling.sign_of_life_minutes.max(1).saturating_mul(60),
            ),
            token_refresh: Duration::from_secs(config.auth.refresh_interval_secs.max(1)),
        }
    }
}

/// Main driver for Teslabus
pub struct ChargerDriver {
    scheduler: PollScheduler,
    runner: CommandRunner,
    timers: Timers,
    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
    shutdown_rx: mpsc::UnboundedReceiver<()>,
    logger: StructuredLogger,
}

impl ChargerDriver {
    pub fn new(
        config: &Config,
        scheduler: PollScheduler,
        runner: CommandRunner,
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
        shutdown_rx: mpsc::UnboundedReceiver<()>,
    ) -> Self {
        let context = LogContext::new("driver").with_device_instance(config.device_instance);
        Self {
            scheduler,
            runner,
            timers: Timers::from_config(config),
            commands_rx,
            shutdown_rx,
            logger: get_logger_with_context(context),
        }
    }

    pub const fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    /// Run until a shutdown signal arrives. A dropped shutdown sender does
    /// not stop the loop.
    pub async fn run(&mut self) {
        self.logger.info("Starting charger driver main loop");

        let mut cycle = interval(self.timers.cycle);
        cycle.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // First tick of these fires immediately; skip it
        let mut sign_of_life = interval(self.timers.sign_of_life);
        sign_of_life.set_missed_tick_behavior(MissedTickBehavior::Skip);
        sign_of_life.tick().await;
        let mut token_refresh = interval(self.timers.token_refresh);
        token_refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        token_refresh.tick().await;

        loop {
            tokio::select! {
                _ = cycle.tick() => {
                    let outcome = self.scheduler.poll_cycle().await;
                    self.logger.trace(&format!("Cycle finished: {outcome:?}"));
                }
                _ = sign_of_life.tick() => {
                    self.sign_of_life();
                }
                _ = token_refresh.tick() => {
                    if let Err(e) = self.scheduler.refresh_token_now(Utc::now()).await {
                        self.logger.warn(&format!("Scheduled token refresh failed: {e}"));
                    }
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd).await;
                }
                Some(()) = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.scheduler.close_publisher();
        self.logger.info("Driver stopped");
    }

    fn sign_of_life(&self) {
        match self.scheduler.last_update() {
            Some(at) => self.logger.info(&format!(
                "Sign of life: last update {}, index {}",
                at.to_rfc3339(),
                self.scheduler.state().update_index
            )),
            None => self.logger.info("Sign of life: no update yet"),
        }
    }
}
