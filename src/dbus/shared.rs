use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use zbus::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::driver::DriverCommand;

pub struct DbusSharedState {
    pub(crate) paths: HashMap<String, serde_json::Value>,
    pub(crate) writable: HashSet<String>,
    pub(crate) commands_tx: mpsc::UnboundedSender<DriverCommand>,
    pub(crate) connection: Option<Connection>,
    pub(crate) root_path: OwnedObjectPath,
}

impl DbusSharedState {
    pub fn new(
        commands_tx: mpsc::UnboundedSender<DriverCommand>,
        root_path: OwnedObjectPath,
    ) -> Self {
        Self {
            paths: HashMap::new(),
            writable: HashSet::new(),
            commands_tx,
            connection: None,
            root_path,
        }
    }
}

/// Lock the shared state; a poisoned lock still holds consistent path values
pub(crate) fn lock(shared: &Arc<Mutex<DbusSharedState>>) -> MutexGuard<'_, DbusSharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
