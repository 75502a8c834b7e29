//! House inverter power signal
//!
//! Another service drops `{"Power": <watts>}` into a small JSON file; a
//! change in that value makes the scheduler poll the vehicle sooner.

use crate::error::{Result, TeslabusError};
use serde::Deserialize;
use std::path::PathBuf;

/// Source of the current inverter output in watts
#[async_trait::async_trait]
pub trait InverterPowerSource: Send + Sync {
    async fn read_power(&self) -> Result<f64>;
}

#[derive(Debug, Deserialize)]
struct InverterReading {
    #[serde(rename = "Power", default)]
    power: Option<f64>,
}

/// Reads the inverter JSON file; a missing file reads as 0 W
#[derive(Debug, Clone)]
pub struct FileInverterSource {
    path: PathBuf,
}

impl FileInverterSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl InverterPowerSource for FileInverterSource {
    async fn read_power(&self) -> Result<f64> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0.0),
            Err(e) => return Err(e.into()),
        };
        let reading: InverterReading = serde_json::from_str(&contents)?;
        let power = reading.power.unwrap_or(0.0);
        if !power.is_finite() {
            return Err(TeslabusError::validation(
                "Power".to_string(),
                format!("non-finite inverter power in {}", self.path.display()),
            ));
        }
        Ok(power)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let src = FileInverterSource::new(dir.path().join("Inverter.json"));
        assert!((src.read_power().await.unwrap()).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reads_power_field() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), r#"{"Power": 2350.5, "Other": 1}"#).unwrap();
        let src = FileInverterSource::new(tmp.path());
        assert!((src.read_power().await.unwrap() - 2350.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn garbage_is_an_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not json").unwrap();
        let src = FileInverterSource::new(tmp.path());
        assert!(src.read_power().await.is_err());
    }
}
