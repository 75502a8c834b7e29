//! OAuth token storage and refresh
//!
//! Three files back the store: a JSON refresh record (`{"refresh_token": ..}`
//! plus whatever else the token endpoint returned), the plain access token
//! (shared with the command binary) and a local-time expiry stamp.

use crate::config::AuthConfig;
use crate::error::{Result, TeslabusError};
use crate::logging::{StructuredLogger, get_logger};
use crate::vehicle::VehicleApi;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};

/// Format of the expiry file, in local time
pub const EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bearer token for the vehicle API
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[..]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Long-lived credential exchanged for access tokens
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub value: String,
}

impl std::fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RefreshToken([..])")
    }
}

/// File-backed token store
#[derive(Debug)]
pub struct TokenStore {
    refresh_token_file: PathBuf,
    access_token_file: PathBuf,
    expiry_file: PathBuf,
    safety_margin: Duration,
    current: Option<AccessToken>,
    logger: StructuredLogger,
}

impl TokenStore {
    /// Open the store. Fails when no refresh token can be found, which is
    /// fatal at startup.
    pub fn open(config: &AuthConfig) -> Result<Self> {
        let store = Self {
            refresh_token_file: PathBuf::from(&config.refresh_token_file),
            access_token_file: PathBuf::from(&config.access_token_file),
            expiry_file: PathBuf::from(&config.expiry_file),
            safety_margin: seconds(config.expiry_safety_margin_secs),
            current: None,
            logger: get_logger("tokens"),
        };

        if !store.refresh_token_file.exists() {
            let seed = config
                .refresh_token
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    TeslabusError::auth(format!(
                        "no refresh token: {} is missing and auth.refresh_token is not set",
                        store.refresh_token_file.display()
                    ))
                })?;
            let record = serde_json::json!({ "refresh_token": seed });
            write_atomic(&store.refresh_token_file, &serde_json::to_string_pretty(&record)?)?;
            store
                .logger
                .info("Seeded refresh token record from configuration");
        }

        // Validate the record up front
        store.read_refresh_token()?;
        Ok(store)
    }

    /// Read the refresh token from its record
    pub fn read_refresh_token(&self) -> Result<RefreshToken> {
        let contents = std::fs::read_to_string(&self.refresh_token_file).map_err(|e| {
            TeslabusError::auth(format!(
                "cannot read {}: {e}",
                self.refresh_token_file.display()
            ))
        })?;
        let record: serde_json::Value = serde_json::from_str(&contents).map_err(|e| {
            TeslabusError::auth(format!("refresh token record is not JSON: {e}"))
        })?;
        record
            .get("refresh_token")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| RefreshToken {
                value: s.to_string(),
            })
            .ok_or_else(|| TeslabusError::auth("refresh token record has no refresh_token"))
    }

    /// True when no expiry is stored, it cannot be parsed, or it has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.read_expiry().is_none_or(|expires_at| expires_at <= now)
    }

    /// Access token from memory, falling back to the token files
    pub fn current_access_token(&mut self) -> Option<AccessToken> {
        if self.current.is_none() {
            let value = std::fs::read_to_string(&self.access_token_file).ok()?;
            let value = value.trim();
            if value.is_empty() {
                return None;
            }
            let expires_at = self.read_expiry()?;
            self.current = Some(AccessToken {
                value: value.to_string(),
                expires_at,
            });
        }
        self.current.clone()
    }

    /// A non-expired access token, refreshing when needed
    pub async fn ensure_valid(
        &mut self,
        api: &dyn VehicleApi,
        now: DateTime<Utc>,
    ) -> Result<AccessToken> {
        if let Some(token) = self.current_access_token()
            && token.expires_at > now
        {
            return Ok(token);
        }
        self.refresh(api, now).await
    }

    /// Exchange the refresh token and persist the result
    pub async fn refresh(&mut self, api: &dyn VehicleApi, now: DateTime<Utc>) -> Result<AccessToken> {
        let refresh_token = self.read_refresh_token()?;
        let grant = api.refresh_access_token(&refresh_token.value).await?;

        let value = grant.access_token.trim().to_string();
        if value.is_empty() {
            return Err(TeslabusError::auth("token response has no access_token"));
        }

        let lifetime = (seconds(grant.expires_in) - self.safety_margin).max(Duration::zero());
        let expires_at = truncate_to_seconds(now.checked_add_signed(lifetime).unwrap_or(now));

        write_atomic(&self.access_token_file, &value)?;
        write_atomic(&self.expiry_file, &format_expiry(expires_at))?;

        if grant
            .refresh_token
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
        {
            let record = serde_json::to_string_pretty(&grant)?;
            write_atomic(&self.refresh_token_file, &record)?;
            self.logger.debug("Stored rotated refresh token");
        }

        self.logger.info(&format!(
            "Access token refreshed, expires {}",
            format_expiry(expires_at)
        ));

        let token = AccessToken { value, expires_at };
        self.current = Some(token.clone());
        Ok(token)
    }

    /// Forget the in-memory token so the next use re-reads or refreshes
    pub fn invalidate(&mut self) {
        self.current = None;
    }

    fn read_expiry(&self) -> Option<DateTime<Utc>> {
        let raw = std::fs::read_to_string(&self.expiry_file).ok()?;
        parse_expiry(raw.trim())
    }
}

/// Render an expiry instant as local wall-clock time
pub fn format_expiry(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(EXPIRY_FORMAT).to_string()
}

/// Parse a local wall-clock expiry stamp
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, EXPIRY_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn seconds(secs: u64) -> Duration {
    Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(at.timestamp(), 0).single().unwrap_or(at)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
