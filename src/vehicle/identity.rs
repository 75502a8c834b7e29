use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// VIN and firmware of the polled vehicle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleIdentity {
    pub vin: String,
    pub firmware: String,
}

/// Identity remembered from the last snapshot, valid for a fixed TTL
#[derive(Debug)]
pub struct IdentityCache {
    ttl: Duration,
    entry: Mutex<Option<(VehicleIdentity, DateTime<Utc>)>>,
}

impl IdentityCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::try_seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
                .unwrap_or(Duration::MAX),
            entry: Mutex::new(None),
        }
    }

    /// Store an identity observed at `now`; returns true when it differs from
    /// the cached one
    pub fn update(&self, identity: VehicleIdentity, now: DateTime<Utc>) -> bool {
        let Ok(mut guard) = self.entry.lock() else {
            return false;
        };
        let changed = guard.as_ref().is_none_or(|(cur, _)| cur != &identity);
        *guard = Some((identity, now));
        changed
    }

    /// Seed from persisted values without an observation time
    pub fn seed(&self, identity: VehicleIdentity, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.entry.lock()
            && guard.is_none()
        {
            *guard = Some((identity, now));
        }
    }

    /// Cached identity, or `None` once stale
    pub fn get(&self, now: DateTime<Utc>) -> Option<VehicleIdentity> {
        let guard = self.entry.lock().ok()?;
        guard
            .as_ref()
            .filter(|(_, at)| now - *at <= self.ttl)
            .map(|(id, _)| id.clone())
    }
}
