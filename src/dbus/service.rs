use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, Result as ZbusResult, names::WellKnownName};

use crate::config::DbusConfig;
use crate::driver::DriverCommand;
use crate::error::{Result, TeslabusError};
use crate::logging::get_logger;

use super::BusPublisher;
use super::items::BusItem;
use super::root::{RootBus, TreeNode};
use super::shared::{DbusSharedState, lock};
use super::util::text_owned_value;

/// Victron product id for third-party devices
const PRODUCT_ID: u32 = 0xFFFF;

/// Paths the bus side may write
const WRITABLE_PATHS: &[&str] = &["/StartStop", "/SetCurrent"];

pub struct DbusService {
    logger: crate::logging::StructuredLogger,
    service_name: String,
    connection: Option<Connection>,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
    registered_paths: HashSet<String>,
    root_path: OwnedObjectPath,
}

impl DbusService {
    pub fn new(
        device_instance: u32,
        config: &DbusConfig,
        commands_tx: mpsc::UnboundedSender<DriverCommand>,
    ) -> Result<Self> {
        let logger = get_logger("dbus");
        let service_name = format!("com.victronenergy.evcharger.http_{device_instance:02}");
        let root_path = OwnedObjectPath::try_from("/")
            .map_err(|e| TeslabusError::dbus(format!("Invalid object path: {e}")))?;
        let service = Self {
            logger,
            service_name,
            connection: None,
            shared: Arc::new(Mutex::new(DbusSharedState::new(
                commands_tx,
                root_path.clone(),
            ))),
            registered_paths: HashSet::new(),
            root_path,
        };
        service.seed_standard_paths(device_instance, config);
        Ok(service)
    }

    fn seed_standard_paths(&self, device_instance: u32, config: &DbusConfig) {
        use serde_json::json;
        let phase_power = format!("/Ac/{}/Power", config.phase);
        let initial = [
            ("/Mgmt/ProcessName", json!(env!("CARGO_PKG_NAME"))),
            ("/Mgmt/ProcessVersion", json!(env!("CARGO_PKG_VERSION"))),
            ("/Mgmt/Connection", json!("Tesla API HTTP JSON service")),
            ("/DeviceInstance", json!(device_instance)),
            ("/ProductId", json!(PRODUCT_ID)),
            ("/ProductName", json!(config.product_name)),
            ("/CustomName", json!(config.custom_name)),
            ("/Connected", json!(1)),
            ("/FirmwareVersion", json!("Unknown")),
            ("/HardwareVersion", json!(0)),
            ("/Position", json!(config.position)),
            ("/Serial", json!("Unknown")),
            ("/UpdateIndex", json!(0)),
            ("/Mode", json!("")),
            ("/Status", json!(0)),
            ("/Ac/Power", json!(0.0)),
            (phase_power.as_str(), json!(0.0)),
            ("/Current", json!(0.0)),
            ("/SetCurrent", json!(0.0)),
            ("/MaxCurrent", json!(0.0)),
            ("/ChargingTime", json!(0)),
            ("/Ac/Energy/Forward", json!(0.0)),
            ("/StartStop", json!(0)),
        ];
        let mut shared = lock(&self.shared);
        for (path, value) in initial {
            shared.paths.insert(path.to_string(), value);
        }
        for path in WRITABLE_PATHS {
            shared.writable.insert((*path).to_string());
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Current value of a path
    pub fn path_value(&self, path: &str) -> Option<serde_json::Value> {
        lock(&self.shared).paths.get(path).cloned()
    }

    /// Connect, export every known path, then claim the service name
    pub async fn start(&mut self) -> Result<()> {
        let connection = match Connection::system().await {
            Ok(c) => {
                self.logger.info("Connected to D-Bus: system bus");
                c
            }
            Err(e_sys) => match Connection::session().await {
                Ok(c) => {
                    self.logger.warn(&format!(
                        "System bus unavailable ({e_sys}); using session bus"
                    ));
                    c
                }
                Err(e_sess) => {
                    return Err(TeslabusError::dbus(format!(
                        "DBus connect failed: system={e_sys} session={e_sess}"
                    )));
                }
            },
        };

        let root = RootBus {
            shared: Arc::clone(&self.shared),
        };
        connection
            .object_server()
            .at(&self.root_path, root)
            .await
            .map_err(|e| TeslabusError::dbus(format!("Register root BusItem failed: {e}")))?;

        lock(&self.shared).connection = Some(connection.clone());
        self.connection = Some(connection.clone());

        let known: Vec<String> = lock(&self.shared).paths.keys().cloned().collect();
        for path in known {
            self.register_objects(&path).await?;
        }

        self.request_name(&connection)
            .await
            .map_err(|e| TeslabusError::dbus(format!("RequestName failed: {e}")))?;
        self.logger
            .info(&format!("D-Bus service started: {}", self.service_name));
        Ok(())
    }

    pub fn stop(&mut self) {
        self.logger.info("Stopping D-Bus service");
        lock(&self.shared).connection = None;
        self.connection = None;
    }

    /// Export BusItem/TreeNode objects for `path` and its parents
    async fn register_objects(&mut self, path: &str) -> Result<()> {
        let Some(conn) = self.connection.clone() else {
            return Ok(());
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for i in 1..=segments.len() {
            let subpath = format!("/{}", segments[..i].join("/"));
            if self.registered_paths.contains(&subpath) {
                continue;
            }
            let obj_path = OwnedObjectPath::try_from(subpath.as_str()).map_err(|e| {
                TeslabusError::dbus(format!("Invalid object path '{subpath}': {e}"))
            })?;
            let registered = if i == segments.len() {
                let item = BusItem::new(subpath.clone(), Arc::clone(&self.shared));
                conn.object_server().at(&obj_path, item).await
            } else {
                let node = TreeNode::new(subpath.clone(), Arc::clone(&self.shared));
                conn.object_server().at(&obj_path, node).await
            };
            registered.map_err(|e| {
                TeslabusError::dbus(format!("Register object failed for {subpath}: {e}"))
            })?;
            self.registered_paths.insert(subpath);
        }
        Ok(())
    }

    /// Make sure a path exists, without overwriting a value already present
    pub async fn ensure_item(
        &mut self,
        path: &str,
        initial_value: serde_json::Value,
        writable: bool,
    ) -> Result<()> {
        self.register_objects(path).await?;
        let mut shared = lock(&self.shared);
        shared
            .paths
            .entry(path.to_string())
            .or_insert(initial_value);
        if writable {
            shared.writable.insert(path.to_string());
        }
        Ok(())
    }

    /// Store a value and emit change signals; unchanged values are skipped
    pub async fn update_path(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        if lock(&self.shared).paths.get(path) == Some(&value) {
            return Ok(());
        }
        self.ensure_item(path, value.clone(), false).await?;
        lock(&self.shared)
            .paths
            .insert(path.to_string(), value.clone());

        let Some(conn) = &self.connection else {
            return Ok(());
        };
        let obj_path = OwnedObjectPath::try_from(path)
            .map_err(|e| TeslabusError::dbus(format!("Invalid object path '{path}': {e}")))?;
        let item_ctx = SignalEmitter::new(conn, obj_path)
            .map_err(|e| TeslabusError::dbus(format!("SignalEmitter new failed: {e}")))?;
        let mut changes: HashMap<&str, OwnedValue> = HashMap::new();
        changes.insert("Value", BusItem::serde_to_owned_value(&value));
        changes.insert("Text", text_owned_value(path, &value));
        let _ = BusItem::properties_changed(&item_ctx, changes).await;

        let root_ctx = SignalEmitter::new(conn, self.root_path.clone())
            .map_err(|e| TeslabusError::dbus(format!("Root SignalEmitter failed: {e}")))?;
        let mut inner: HashMap<&str, OwnedValue> = HashMap::new();
        inner.insert("Value", BusItem::serde_to_owned_value(&value));
        inner.insert("Text", text_owned_value(path, &value));
        let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
        outer.insert(path, inner);
        let _ = RootBus::items_changed(&root_ctx, outer).await;
        Ok(())
    }

    async fn request_name(&self, connection: &Connection) -> ZbusResult<()> {
        use zbus::fdo::{DBusProxy, RequestNameFlags};
        let proxy = DBusProxy::new(connection).await?;
        let name = WellKnownName::try_from(self.service_name.as_str())?;
        let _ = proxy
            .request_name(name, RequestNameFlags::ReplaceExisting.into())
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BusPublisher for DbusService {
    async fn publish(&mut self, path: &str, value: serde_json::Value) -> Result<()> {
        self.update_path(path, value).await
    }

    fn close(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> DbusService {
        let (tx, _rx) = mpsc::unbounded_channel();
        DbusService::new(3, &DbusConfig::default(), tx).unwrap()
    }

    #[test]
    fn seeds_mandatory_paths() {
        let svc = service();
        assert_eq!(svc.service_name(), "com.victronenergy.evcharger.http_03");
        for key in [
            "/Mgmt/ProcessName",
            "/Mgmt/ProcessVersion",
            "/Mgmt/Connection",
            "/DeviceInstance",
            "/ProductId",
            "/ProductName",
            "/CustomName",
            "/Connected",
            "/FirmwareVersion",
            "/HardwareVersion",
            "/Position",
            "/Serial",
            "/UpdateIndex",
            "/Ac/L1/Power",
            "/Ac/Energy/Forward",
            "/StartStop",
        ] {
            assert!(svc.path_value(key).is_some(), "missing path: {key}");
        }
        assert_eq!(svc.path_value("/ProductId"), Some(serde_json::json!(0xFFFF)));
        assert!(lock(&svc.shared).writable.contains("/StartStop"));
        assert!(!lock(&svc.shared).writable.contains("/Status"));
    }

    #[tokio::test]
    async fn publish_without_connection_updates_values() {
        let mut svc = service();
        svc.publish("/Ac/Power", serde_json::json!(7680.0)).await.unwrap();
        svc.publish("/Mode", serde_json::json!("Charging")).await.unwrap();
        assert_eq!(svc.path_value("/Ac/Power"), Some(serde_json::json!(7680.0)));
        assert_eq!(svc.path_value("/Mode"), Some(serde_json::json!("Charging")));
    }

    #[test]
    fn close_drops_connection() {
        let mut svc = service();
        svc.close();
        assert!(svc.connection.is_none());
        assert!(lock(&svc.shared).connection.is_none());
    }

    #[tokio::test]
    async fn ensure_item_keeps_existing_value() {
        let mut svc = service();
        svc.ensure_item("/Status", serde_json::json!(10), false)
            .await
            .unwrap();
        assert_eq!(svc.path_value("/Status"), Some(serde_json::json!(0)));
        svc.ensure_item("/Custom/Thing", serde_json::json!(5), true)
            .await
            .unwrap();
        assert_eq!(svc.path_value("/Custom/Thing"), Some(serde_json::json!(5)));
        assert!(lock(&svc.shared).writable.contains("/Custom/Thing"));
    }
}
