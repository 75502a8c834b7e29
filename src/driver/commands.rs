use super::{ChargerDriver, DriverCommand};

impl ChargerDriver {
    pub(crate) async fn handle_command(&mut self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::SetStartStop(on) => self.set_start_stop(on).await,
        }
    }

    async fn set_start_stop(&mut self, on: bool) {
        let label = if on { "start" } else { "stop" };
        self.logger.info(&format!("StartStop write: {label} charging"));
        match self.scheduler.apply_start_stop(&self.runner, on).await {
            Ok(true) => self
                .logger
                .info(&format!("Charging {label} sent, refetching next cycle")),
            Ok(false) => self
                .logger
                .debug(&format!("Charging {label} skipped, vehicle already there")),
            Err(e) => self
                .logger
                .error(&format!("Charging {label} failed: {e}")),
        }
    }
}
