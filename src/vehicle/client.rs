use super::identity::{IdentityCache, VehicleIdentity};
use super::types::{VehicleDataEnvelope, VehicleSnapshot};
use super::{TokenGrant, VehicleApi};
use crate::config::{AuthConfig, VehicleConfig};
use crate::error::{FetchErrorKind, Result, TeslabusError};
use crate::logging::{StructuredLogger, get_logger};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, RETRY_AFTER, USER_AGENT};
use std::time::Duration;

const CLIENT_USER_AGENT: &str = concat!("teslabus/", env!("CARGO_PKG_VERSION"));

/// Owner API client over reqwest
pub struct TeslaApiClient {
    http: reqwest::Client,
    base_url: String,
    vehicle_id: String,
    vehicle_timeout: Duration,
    token_url: String,
    client_id: String,
    scope: String,
    token_timeout: Duration,
    identity: IdentityCache,
    logger: StructuredLogger,
}

impl TeslaApiClient {
    pub fn new(vehicle: &VehicleConfig, auth: &AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TeslabusError::network(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            http,
            base_url: vehicle.api_base_url.trim_end_matches('/').to_string(),
            vehicle_id: vehicle.vehicle_id.clone(),
            vehicle_timeout: Duration::from_millis(vehicle.request_timeout_ms),
            token_url: auth.token_url.clone(),
            client_id: auth.client_id.clone(),
            scope: auth.scope.clone(),
            token_timeout: Duration::from_millis(auth.request_timeout_ms),
            identity: IdentityCache::new(vehicle.identity_ttl_secs),
            logger: get_logger("vehicle_api"),
        })
    }

    /// Seed the identity cache from persisted values
    pub fn seed_identity(&self, identity: VehicleIdentity) {
        self.identity.seed(identity, Utc::now());
    }

    fn vehicle_data_url(&self) -> String {
        format!(
            "{}/api/1/vehicles/{}/vehicle_data",
            self.base_url, self.vehicle_id
        )
    }

    fn remember_identity(&self, snapshot: &VehicleSnapshot) {
        let (Some(vin), Some(firmware)) = (snapshot.vin.as_deref(), snapshot.firmware()) else {
            return;
        };
        let identity = VehicleIdentity {
            vin: vin.to_string(),
            firmware: firmware.to_string(),
        };
        if self.identity.update(identity, Utc::now()) {
            self.logger
                .info(&format!("Vehicle identity: VIN {vin}, firmware {firmware}"));
        }
    }
}

fn transport_error(err: &reqwest::Error) -> TeslabusError {
    if err.is_timeout() {
        TeslabusError::fetch(FetchErrorKind::Timeout, format!("request timed out: {err}"))
    } else if err.is_decode() {
        TeslabusError::fetch(FetchErrorKind::Decode, err.to_string())
    } else {
        TeslabusError::fetch(FetchErrorKind::Other, err.to_string())
    }
}

/// Map a non-success status to a classified fetch error
pub(crate) fn status_error(status: StatusCode, retry_after: Option<&str>) -> TeslabusError {
    match status {
        StatusCode::REQUEST_TIMEOUT => TeslabusError::fetch(
            FetchErrorKind::Timeout,
            "vehicle unavailable (HTTP 408)",
        ),
        StatusCode::TOO_MANY_REQUESTS => TeslabusError::fetch(
            FetchErrorKind::RateLimited,
            format!(
                "Too Many Requests (retry after {})",
                retry_after.unwrap_or("unspecified")
            ),
        ),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TeslabusError::fetch(
            FetchErrorKind::Unauthorized,
            format!("access token rejected (HTTP {})", status.as_u16()),
        ),
        other => TeslabusError::fetch(
            FetchErrorKind::Other,
            format!("unexpected HTTP status {}", other.as_u16()),
        ),
    }
}

#[async_trait::async_trait]
impl VehicleApi for TeslaApiClient {
    async fn fetch_vehicle_data(&self, access_token: &str) -> Result<VehicleSnapshot> {
        let resp = self
            .http
            .get(self.vehicle_data_url())
            .bearer_auth(access_token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .timeout(self.vehicle_timeout)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let err = status_error(status, retry_after.as_deref());
            self.logger.debug(&format!("Vehicle data request failed: {err}"));
            return Err(err);
        }

        let body = resp.text().await.map_err(|e| transport_error(&e))?;
        let envelope: VehicleDataEnvelope = serde_json::from_str(&body).map_err(|e| {
            TeslabusError::fetch(FetchErrorKind::Decode, format!("invalid vehicle data: {e}"))
        })?;

        let Some(snapshot) = envelope.response else {
            let reason = envelope.error.unwrap_or_default();
            // A 200 with an error body is how the API reports a sleeping car
            // on some firmware
            let kind = if reason.contains("unavailable") || reason.contains("asleep") {
                FetchErrorKind::Timeout
            } else {
                FetchErrorKind::Decode
            };
            return Err(TeslabusError::fetch(
                kind,
                format!("empty vehicle data response: {reason}"),
            ));
        };

        self.remember_identity(&snapshot);
        Ok(snapshot)
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("scope", self.scope.as_str()),
        ];
        let resp = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .form(&params)
            .timeout(self.token_timeout)
            .send()
            .await
            .map_err(|e| TeslabusError::auth(format!("token refresh request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TeslabusError::auth(format!(
                "token refresh rejected (HTTP {}): {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let grant: TokenGrant = resp
            .json()
            .await
            .map_err(|e| TeslabusError::auth(format!("invalid token response: {e}")))?;
        if grant.access_token.trim().is_empty() {
            return Err(TeslabusError::auth("token response has no access_token"));
        }
        Ok(grant)
    }

    fn cached_identity(&self, now: DateTime<Utc>) -> Option<VehicleIdentity> {
        self.identity.get(now)
    }
}
