use super::PollScheduler;
use super::metrics::status;
use crate::error::{FetchErrorKind, TeslabusError};
use chrono::{DateTime, Utc};

/// Why a due cycle did not produce fresh metrics
#[derive(Debug)]
pub enum CycleFault {
    /// No usable access token (refresh failed or no refresh token)
    TokenUnavailable(TeslabusError),
    /// The data request failed
    Fetch(TeslabusError),
    /// The vehicle reported `NoPower`
    NoPower,
}

/// Recovery class of a fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    VehicleAsleep,
    RateLimited,
    NoPower,
    AuthInvalid,
    Unknown,
}

impl FaultKind {
    pub fn of(fault: &CycleFault) -> Self {
        match fault {
            CycleFault::NoPower => Self::NoPower,
            CycleFault::TokenUnavailable(_) => Self::AuthInvalid,
            CycleFault::Fetch(err) => match err {
                TeslabusError::Auth { .. } => Self::AuthInvalid,
                other => match other.fetch_kind() {
                    Some(FetchErrorKind::Timeout) => Self::VehicleAsleep,
                    Some(FetchErrorKind::RateLimited) => Self::RateLimited,
                    Some(FetchErrorKind::Unauthorized) => Self::AuthInvalid,
                    Some(FetchErrorKind::Decode | FetchErrorKind::Other) | None => Self::Unknown,
                },
            },
        }
    }

    /// Text published on /Mode
    pub const fn mode_text(self) -> &'static str {
        match self {
            Self::VehicleAsleep => "Car Sleeping",
            Self::RateLimited => "Too Many Requests",
            Self::NoPower => "No Power to Charger",
            Self::AuthInvalid => "Token Invalid",
            Self::Unknown => "Fault",
        }
    }
}

impl PollScheduler {
    /// Resolve a fault into published state and a new wait
    pub(super) async fn recover(&mut self, fault: CycleFault, now: DateTime<Utc>) -> FaultKind {
        let kind = FaultKind::of(&fault);
        self.metrics.mode = kind.mode_text().to_string();

        match kind {
            FaultKind::VehicleAsleep => {
                self.metrics.status = status::IDLE;
                self.metrics.zero_delivery();
                self.state.running = false;
                self.state.set_wait(self.polling.sleeping_wait_seconds);
                self.show_info_message("Car Sleeping");
            }
            FaultKind::RateLimited => {
                let grown = self
                    .state
                    .wait_seconds()
                    .saturating_add(self.polling.rate_limit_increment_seconds);
                self.state.set_wait(grown);
                self.show_info_message("Too Many Requests");
            }
            FaultKind::NoPower => {
                self.metrics.status = status::FAULT;
                self.state.set_wait(self.polling.no_power_wait_seconds);
                self.show_info_message("No Power to Charger");
            }
            FaultKind::AuthInvalid => {
                self.tokens.invalidate();
                match &fault {
                    CycleFault::TokenUnavailable(err) => {
                        self.logger
                            .warn(&format!("No valid access token: {err}"));
                    }
                    CycleFault::Fetch(err) => {
                        self.logger
                            .warn(&format!("Access token rejected, refreshing: {err}"));
                        self.best_effort_refresh(now).await;
                    }
                    CycleFault::NoPower => {}
                }
                self.state.set_wait(self.polling.auth_retry_wait_seconds);
            }
            FaultKind::Unknown => {
                self.metrics.status = status::FAULT;
                self.state.set_wait(self.polling.fault_wait_seconds);
                if let CycleFault::Fetch(err) = &fault {
                    self.logger.error(&format!("Error in poll cycle: {err}"));
                }
                self.best_effort_refresh(now).await;
            }
        }
        kind
    }

    async fn best_effort_refresh(&mut self, now: DateTime<Utc>) {
        if let Err(e) = self.tokens.refresh(self.api.as_ref(), now).await {
            self.logger.warn(&format!("Token refresh failed: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_structural() {
        let fault = CycleFault::Fetch(TeslabusError::fetch(FetchErrorKind::Timeout, "x"));
        assert_eq!(FaultKind::of(&fault), FaultKind::VehicleAsleep);
        let fault = CycleFault::Fetch(TeslabusError::fetch(FetchErrorKind::RateLimited, "x"));
        assert_eq!(FaultKind::of(&fault), FaultKind::RateLimited);
        let fault = CycleFault::Fetch(TeslabusError::fetch(FetchErrorKind::Unauthorized, "x"));
        assert_eq!(FaultKind::of(&fault), FaultKind::AuthInvalid);
        let fault = CycleFault::Fetch(TeslabusError::fetch(
            FetchErrorKind::Other,
            "Too Many Requests",
        ));
        assert_eq!(FaultKind::of(&fault), FaultKind::Unknown);
        let fault = CycleFault::TokenUnavailable(TeslabusError::auth("nope"));
        assert_eq!(FaultKind::of(&fault), FaultKind::AuthInvalid);
        assert_eq!(FaultKind::of(&CycleFault::NoPower), FaultKind::NoPower);
    }
}
