use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::shared::{DbusSharedState, lock};
use super::util::{format_text_value, text_owned_value};
use crate::driver::DriverCommand;

/// VeDbus-style BusItem implementing com.victronenergy.BusItem
pub struct BusItem {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl BusItem {
    pub const fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }

    fn normalize_set_current(value: &serde_json::Value) -> serde_json::Value {
        let amps = match value {
            serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
            serde_json::Value::String(s) => s
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .unwrap_or(0.0),
            serde_json::Value::Bool(b) => f64::from(u8::from(*b)),
            _ => 0.0,
        };
        serde_json::json!(amps.max(0.0))
    }

    fn normalize_start_stop(value: &serde_json::Value) -> serde_json::Value {
        let on = match value {
            serde_json::Value::Bool(b) => *b,
            serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f > 0.0),
            serde_json::Value::String(s) => {
                let t = s.trim().to_ascii_lowercase();
                matches!(t.as_str(), "1" | "true" | "on" | "enabled" | "start")
            }
            _ => false,
        };
        serde_json::json!(u8::from(on))
    }

    fn normalize_value_for_path(&self, value: &serde_json::Value) -> serde_json::Value {
        match self.path.as_str() {
            "/StartStop" => Self::normalize_start_stop(value),
            "/SetCurrent" => Self::normalize_set_current(value),
            _ => value.clone(),
        }
    }

    /// Only /StartStop drives the vehicle; other writable paths just store
    fn dispatch_driver_command(&self, shared: &DbusSharedState, normalized: &serde_json::Value) {
        if self.path == "/StartStop" {
            let on = normalized.as_u64().is_some_and(|v| v > 0);
            let _ = shared.commands_tx.send(DriverCommand::SetStartStop(on));
        }
    }

    pub(crate) fn serde_to_owned_value(v: &serde_json::Value) -> OwnedValue {
        match v {
            serde_json::Value::Bool(b) => OwnedValue::from(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    OwnedValue::from(i)
                } else if let Some(u) = n.as_u64() {
                    OwnedValue::from(u)
                } else {
                    OwnedValue::from(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => OwnedValue::try_from(Value::from(s.as_str()))
                .unwrap_or_else(|_| OwnedValue::from(0i64)),
            _ => OwnedValue::from(0i64),
        }
    }

    pub(crate) fn owned_value_to_serde(v: &OwnedValue) -> serde_json::Value {
        if let Ok(b) = <bool as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(b);
        }
        if let Ok(i) = <i64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(i);
        }
        if let Ok(i) = <i32 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(i);
        }
        if let Ok(u) = <u64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(u);
        }
        if let Ok(u) = <u32 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(u);
        }
        if let Ok(u) = <u8 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(u);
        }
        if let Ok(f) = <f64 as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(f);
        }
        if let Ok(s) = <&str as TryFrom<&OwnedValue>>::try_from(v) {
            return serde_json::json!(s.to_string());
        }
        serde_json::json!(v.to_string())
    }

    fn current_value(&self) -> serde_json::Value {
        lock(&self.shared)
            .paths
            .get(&self.path)
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl BusItem {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        Self::serde_to_owned_value(&self.current_value())
    }

    #[zbus(name = "SetValue")]
    async fn set_value(&self, value: OwnedValue) -> i32 {
        let (conn_opt, root_path, normalized) = {
            let mut shared = lock(&self.shared);
            if !shared.writable.contains(&self.path) {
                return 1;
            }
            let incoming = Self::owned_value_to_serde(&value);
            let normalized = self.normalize_value_for_path(&incoming);
            shared.paths.insert(self.path.clone(), normalized.clone());
            (
                shared.connection.clone(),
                shared.root_path.clone(),
                normalized,
            )
        };

        if let Some(conn) = conn_opt {
            if let Ok(obj_path) = OwnedObjectPath::try_from(self.path.as_str())
                && let Ok(item_ctx) = SignalEmitter::new(&conn, obj_path)
            {
                let mut changes: HashMap<&str, OwnedValue> = HashMap::new();
                changes.insert("Value", Self::serde_to_owned_value(&normalized));
                changes.insert("Text", text_owned_value(&self.path, &normalized));
                let _ = Self::properties_changed(&item_ctx, changes).await;
            }
            if let Ok(root_ctx) = SignalEmitter::new(&conn, root_path) {
                let mut inner: HashMap<&str, OwnedValue> = HashMap::new();
                inner.insert("Value", Self::serde_to_owned_value(&normalized));
                inner.insert("Text", text_owned_value(&self.path, &normalized));
                let mut outer: HashMap<&str, HashMap<&str, OwnedValue>> = HashMap::new();
                outer.insert(self.path.as_str(), inner);
                let _ = super::RootBus::items_changed(&root_ctx, outer).await;
            }
        }

        let shared = lock(&self.shared);
        self.dispatch_driver_command(&shared, &normalized);

        0
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> String {
        format_text_value(&self.path, &self.current_value())
    }

    #[zbus(signal)]
    pub async fn properties_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, OwnedValue>,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_shared() -> (
        Arc<Mutex<DbusSharedState>>,
        mpsc::UnboundedReceiver<DriverCommand>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let root = OwnedObjectPath::try_from("/").unwrap();
        (Arc::new(Mutex::new(DbusSharedState::new(tx, root))), rx)
    }

    #[test]
    fn normalize_start_stop_various_inputs() {
        let (shared, _rx) = make_shared();
        let item = BusItem::new("/StartStop".to_string(), shared);
        assert_eq!(
            BusItem::normalize_start_stop(&serde_json::json!(true)),
            serde_json::json!(1)
        );
        assert_eq!(
            BusItem::normalize_start_stop(&serde_json::json!(0)),
            serde_json::json!(0)
        );
        assert_eq!(
            BusItem::normalize_start_stop(&serde_json::json!("On")),
            serde_json::json!(1)
        );
        assert_eq!(
            BusItem::normalize_start_stop(&serde_json::json!("disabled")),
            serde_json::json!(0)
        );
        assert_eq!(
            item.normalize_value_for_path(&serde_json::json!("true")),
            serde_json::json!(1)
        );
    }

    #[test]
    fn normalize_set_current_accepts_strings() {
        assert_eq!(
            BusItem::normalize_set_current(&serde_json::json!("7,5")),
            serde_json::json!(7.5)
        );
        assert_eq!(
            BusItem::normalize_set_current(&serde_json::json!(-3)),
            serde_json::json!(0.0)
        );
        assert_eq!(
            BusItem::normalize_set_current(&serde_json::json!("abc")),
            serde_json::json!(0.0)
        );
    }

    #[test]
    fn owned_value_conversions() {
        let ov = BusItem::serde_to_owned_value(&serde_json::json!({"a": 1}));
        assert_eq!(BusItem::owned_value_to_serde(&ov), serde_json::json!(0));

        let ov_b = BusItem::serde_to_owned_value(&serde_json::json!(true));
        assert_eq!(BusItem::owned_value_to_serde(&ov_b), serde_json::json!(true));

        let ov_i = BusItem::serde_to_owned_value(&serde_json::json!(-5));
        assert_eq!(BusItem::owned_value_to_serde(&ov_i), serde_json::json!(-5));

        let ov_s = BusItem::serde_to_owned_value(&serde_json::json!("Car Sleeping"));
        assert_eq!(
            BusItem::owned_value_to_serde(&ov_s),
            serde_json::json!("Car Sleeping")
        );
    }

    #[tokio::test]
    async fn start_stop_write_dispatches_command() {
        let (shared, mut rx) = make_shared();
        {
            let mut s = lock(&shared);
            s.paths.insert("/StartStop".to_string(), serde_json::json!(0));
            s.writable.insert("/StartStop".to_string());
        }
        let item = BusItem::new("/StartStop".to_string(), Arc::clone(&shared));

        let rc = item
            .set_value(OwnedValue::try_from(Value::from("on")).unwrap())
            .await;
        assert_eq!(rc, 0);
        assert_eq!(
            lock(&shared).paths.get("/StartStop"),
            Some(&serde_json::json!(1))
        );
        match rx.try_recv().unwrap() {
            DriverCommand::SetStartStop(on) => assert!(on),
        }

        let rc = item.set_value(OwnedValue::from(false)).await;
        assert_eq!(rc, 0);
        match rx.try_recv().unwrap() {
            DriverCommand::SetStartStop(on) => assert!(!on),
        }
    }

    #[tokio::test]
    async fn non_writable_path_is_rejected() {
        let (shared, mut rx) = make_shared();
        lock(&shared)
            .paths
            .insert("/Status".to_string(), serde_json::json!(2));
        let item = BusItem::new("/Status".to_string(), Arc::clone(&shared));
        assert_eq!(item.set_value(OwnedValue::from(0i64)).await, 1);
        assert_eq!(lock(&shared).paths.get("/Status"), Some(&serde_json::json!(2)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn set_current_is_stored_without_command() {
        let (shared, mut rx) = make_shared();
        lock(&shared).writable.insert("/SetCurrent".to_string());
        let item = BusItem::new("/SetCurrent".to_string(), Arc::clone(&shared));
        assert_eq!(
            item.set_value(OwnedValue::try_from(Value::from("16")).unwrap())
                .await,
            0
        );
        assert_eq!(
            lock(&shared).paths.get("/SetCurrent"),
            Some(&serde_json::json!(16.0))
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(item.get_text().await, "16.0A");
    }
}
