use anyhow::{Context, Result};
use std::sync::Arc;
use teslabus::commands::CommandRunner;
use teslabus::config::Config;
use teslabus::dbus::{BusPublisher, DbusService, LogPublisher};
use teslabus::driver::{ChargerDriver, DriverCommand};
use teslabus::inverter::FileInverterSource;
use teslabus::persistence::PersistenceManager;
use teslabus::scheduler::PollScheduler;
use teslabus::tokens::TokenStore;
use teslabus::vehicle::{TeslaApiClient, VehicleIdentity};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Optional config path as the only argument
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path),
        None => Config::load(),
    }
    .map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;
    config.validate().context("invalid configuration")?;

    teslabus::logging::init_logging(&config.logging)?;
    info!(
        "Teslabus {} starting for vehicle {}",
        env!("CARGO_PKG_VERSION"),
        config.vehicle.vehicle_id
    );

    let mut persistence = PersistenceManager::new(&config.state_file);
    if let Err(e) = persistence.load() {
        warn!("Ignoring unreadable state file: {}", e);
    }

    let tokens = TokenStore::open(&config.auth).context("no usable refresh token")?;

    let api = TeslaApiClient::new(&config.vehicle, &config.auth)?;
    let state = persistence.state();
    if let (Some(vin), Some(firmware)) = (state.vin.clone(), state.firmware.clone()) {
        api.seed_identity(VehicleIdentity { vin, firmware });
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<DriverCommand>();
    let mut dbus = DbusService::new(config.device_instance, &config.dbus, cmd_tx)?;
    let publisher: Box<dyn BusPublisher> = match dbus.start().await {
        Ok(()) => Box::new(dbus),
        Err(e) if config.require_dbus => {
            error!("Failed to initialize D-Bus and require_dbus=true: {}", e);
            return Err(e.into());
        }
        Err(e) => {
            warn!(
                "D-Bus initialization failed but require_dbus=false, continuing without D-Bus: {}",
                e
            );
            Box::new(LogPublisher::new())
        }
    };

    let scheduler = PollScheduler::new(
        &config,
        Arc::new(api),
        tokens,
        Arc::new(FileInverterSource::new(&config.cadence.inverter_power_file)),
        publisher,
        persistence,
    )?;
    let runner = CommandRunner::from_config(&config.commands);

    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    let mut driver = ChargerDriver::new(&config, scheduler, runner, cmd_rx, shutdown_rx);
    driver.run().await;
    info!("Driver shutdown complete");
    Ok(())
}
