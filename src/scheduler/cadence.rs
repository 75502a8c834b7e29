use crate::config::{CadenceConfig, parse_clock};
use crate::error::Result;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

/// Local-time range in which idle polling slows down. `start > end` wraps
/// past midnight; `start == end` is an empty window.
#[derive(Debug, Clone, Copy)]
pub struct QuietWindow {
    start: NaiveTime,
    end: NaiveTime,
    tz: Tz,
}

impl QuietWindow {
    pub const fn new(start: NaiveTime, end: NaiveTime, tz: Tz) -> Self {
        Self { start, end, tz }
    }

    pub fn from_config(config: &CadenceConfig, tz: Tz) -> Result<Self> {
        Ok(Self::new(
            parse_clock("cadence.night_start", &config.night_start)?,
            parse_clock("cadence.night_end", &config.night_end)?,
            tz,
        ))
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.tz).time();
        if self.start <= self.end {
            local >= self.start && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }
}

/// Result of comparing the inverter reading with the cached one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverterChange {
    Steady,
    /// Changed by at least the jump delta
    Jump,
    /// Changed by at least the re-fetch threshold
    LargeJump,
}

pub fn classify_inverter_change(cached: f64, current: f64, config: &CadenceConfig) -> InverterChange {
    let delta = (current - cached).abs();
    if delta >= config.inverter_refetch_watts {
        InverterChange::LargeJump
    } else if delta >= config.inverter_delta_watts {
        InverterChange::Jump
    } else {
        InverterChange::Steady
    }
}
