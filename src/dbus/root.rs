use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use zbus::object_server::SignalEmitter;
use zbus::zvariant::OwnedValue;

use super::items::BusItem;
use super::shared::{DbusSharedState, lock};
use super::util::text_owned_value;

/// Values (or texts) of every path below `prefix`, keyed by relative path
fn collect_subtree_map(
    shared: &Arc<Mutex<DbusSharedState>>,
    prefix: &str,
    as_text: bool,
) -> HashMap<String, OwnedValue> {
    let shared = lock(shared);
    let mut px = prefix.to_string();
    if !px.ends_with('/') {
        px.push('/');
    }
    shared
        .paths
        .iter()
        .filter_map(|(path, val)| {
            let suffix = path.strip_prefix(&px)?;
            let ov = if as_text {
                text_owned_value(path, val)
            } else {
                BusItem::serde_to_owned_value(val)
            };
            Some((suffix.to_string(), ov))
        })
        .collect()
}

pub struct RootBus {
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl RootBus {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree_map(&self.shared, "/", false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree_map(&self.shared, "/", true))
    }

    #[zbus(name = "GetItems")]
    async fn get_items(&self) -> HashMap<String, HashMap<String, OwnedValue>> {
        let shared = lock(&self.shared);
        shared
            .paths
            .iter()
            .map(|(path, val)| {
                let mut entry: HashMap<String, OwnedValue> = HashMap::new();
                entry.insert("Value".to_string(), BusItem::serde_to_owned_value(val));
                entry.insert("Text".to_string(), text_owned_value(path, val));
                (path.clone(), entry)
            })
            .collect()
    }

    #[zbus(signal)]
    pub async fn items_changed(
        ctxt: &SignalEmitter<'_>,
        changes: HashMap<&str, HashMap<&str, OwnedValue>>,
    ) -> zbus::Result<()>;
}

/// Intermediate object (e.g. `/Ac`) answering for its subtree
pub struct TreeNode {
    pub(crate) path: String,
    pub(crate) shared: Arc<Mutex<DbusSharedState>>,
}

impl TreeNode {
    pub const fn new(path: String, shared: Arc<Mutex<DbusSharedState>>) -> Self {
        Self { path, shared }
    }
}

#[zbus::interface(name = "com.victronenergy.BusItem")]
impl TreeNode {
    #[zbus(name = "GetValue")]
    async fn get_value(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree_map(&self.shared, &self.path, false))
    }

    #[zbus(name = "GetText")]
    async fn get_text(&self) -> OwnedValue {
        OwnedValue::from(collect_subtree_map(&self.shared, &self.path, true))
    }
}
