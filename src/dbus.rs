//! D-Bus integration for Venus OS compatibility
//!
//! Exposes the vehicle as a `com.victronenergy.evcharger` service using the
//! VeDbus BusItem object layout. The scheduler only sees [`BusPublisher`];
//! writes coming from the bus arrive as driver commands.

use crate::error::Result;

mod items;
mod root;
mod service;
mod shared;
mod util;

pub use items::BusItem;
pub use root::{RootBus, TreeNode};
pub use service::DbusService;

/// Sink for published charger values
#[async_trait::async_trait]
pub trait BusPublisher: Send {
    /// Publish one value under a bus path
    async fn publish(&mut self, path: &str, value: serde_json::Value) -> Result<()>;

    /// Publish several values; stops at the first failure
    async fn publish_many(&mut self, updates: Vec<(String, serde_json::Value)>) -> Result<()> {
        for (path, value) in updates {
            self.publish(&path, value).await?;
        }
        Ok(())
    }

    /// Called once when the driver stops
    fn close(&mut self) {}
}

/// Publisher used when the bus is unavailable and not required; values only
/// reach the log
pub struct LogPublisher {
    logger: crate::logging::StructuredLogger,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self {
            logger: crate::logging::get_logger("dbus"),
        }
    }
}

impl Default for LogPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BusPublisher for LogPublisher {
    async fn publish(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        self.logger.trace(&format!("{path} = {value}"));
        Ok(())
    }
}
