use tracing::{debug, error, info, trace, warn};

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "scheduler", "tokens", "dbus")
    pub component: String,
    /// Charge session id, when one is active
    pub session_id: Option<String>,
    /// Device instance of the published charger service
    pub device_instance: Option<u32>,
    /// Additional context fields
    pub extra_fields: std::collections::BTreeMap<String, String>,
}

impl LogContext {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            session_id: None,
            device_instance: None,
            extra_fields: std::collections::BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: String) -> Self {
        self.session_id = Some(session_id);
        self
    }

    #[must_use]
    pub const fn with_device_instance(mut self, device_instance: u32) -> Self {
        self.device_instance = Some(device_instance);
        self
    }

    #[must_use]
    pub fn with_field(mut self, key: &str, value: String) -> Self {
        self.extra_fields.insert(key.to_string(), value);
        self
    }
}

/// Structured logger with context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    pub const fn new(context: LogContext) -> Self {
        Self { context }
    }

    /// Same logger with one more context field
    #[must_use]
    pub fn with_field(&self, key: &str, value: String) -> Self {
        Self::new(self.context.clone().with_field(key, value))
    }

    pub fn info(&self, message: &str) {
        let fields = self.format_fields();
        info!(%fields, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        let fields = self.format_fields();
        warn!(%fields, "{}", message);
    }

    pub fn error(&self, message: &str) {
        let fields = self.format_fields();
        error!(%fields, "{}", message);
    }

    pub fn debug(&self, message: &str) {
        let fields = self.format_fields();
        debug!(%fields, "{}", message);
    }

    pub fn trace(&self, message: &str) {
        let fields = self.format_fields();
        trace!(%fields, "{}", message);
    }

    fn format_fields(&self) -> String {
        let mut fields = vec![format!("component={}", self.context.component)];
        if let Some(ref session_id) = self.context.session_id {
            fields.push(format!("session_id={session_id}"));
        }
        if let Some(device_instance) = self.context.device_instance {
            fields.push(format!("device_instance={device_instance}"));
        }
        for (key, value) in &self.context.extra_fields {
            fields.push(format!("{key}={value}"));
        }
        fields.join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub const fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_ordered_and_complete() {
        let logger = get_logger_with_context(
            LogContext::new("scheduler")
                .with_device_instance(3)
                .with_session_id("abc".to_string())
                .with_field("vin", "X".to_string())
                .with_field("attempt", "2".to_string()),
        );
        assert_eq!(
            logger.format_fields(),
            "component=scheduler,session_id=abc,device_instance=3,attempt=2,vin=X"
        );
    }
}
