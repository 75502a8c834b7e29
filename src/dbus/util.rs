use zbus::zvariant::{OwnedValue, Value};

/// Unit suffix shown by GetText for a path
fn unit_for_path(path: &str) -> Option<(&'static str, usize)> {
    if path.ends_with("/Energy/Forward") {
        Some(("kWh", 2))
    } else if path.ends_with("Power") {
        Some(("W", 1))
    } else if path.ends_with("Current") {
        Some(("A", 1))
    } else if path == "/ChargingTime" {
        Some(("s", 0))
    } else {
        None
    }
}

/// GetText rendering of a value, with units for the measurement paths
pub(crate) fn format_text_value(path: &str, val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Number(n) => match (unit_for_path(path), n.as_f64()) {
            (Some((unit, decimals)), Some(f)) => format!("{f:.decimals$}{unit}"),
            _ => n.to_string(),
        },
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        _ => val.to_string(),
    }
}

pub(crate) fn text_owned_value(path: &str, val: &serde_json::Value) -> OwnedValue {
    let text = format_text_value(path, val);
    OwnedValue::try_from(Value::from(text.as_str())).unwrap_or_else(|_| OwnedValue::from(0i64))
}
