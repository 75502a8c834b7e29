//! Vehicle API integration for Teslabus
//!
//! The scheduler talks to the vehicle only through [`VehicleApi`], so tests
//! can substitute a scripted implementation. [`TeslaApiClient`] is the
//! production implementation over the owner API.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod client;
mod identity;
mod types;

pub use client::TeslaApiClient;
pub use identity::{IdentityCache, VehicleIdentity};
pub use types::{ChargeState, ChargingState, DriveState, VehicleSnapshot, VehicleState};

/// Parsed response of the OAuth refresh endpoint
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Everything else the endpoint returned, kept so the refresh record can
    /// be written back verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[..]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[..]"))
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// Vehicle API client trait
#[async_trait::async_trait]
pub trait VehicleApi: Send + Sync {
    /// Fetch the full vehicle data snapshot with a bearer access token
    async fn fetch_vehicle_data(&self, access_token: &str) -> Result<VehicleSnapshot>;

    /// Exchange a refresh token for a new access token
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// VIN and firmware from a recent snapshot, if still fresh
    fn cached_identity(&self, _now: DateTime<Utc>) -> Option<VehicleIdentity> {
        None
    }
}
