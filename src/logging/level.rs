use crate::error::{Result, TeslabusError};
use tracing::Level;

/// Parse a configured level name. Python-style names (WARNING, CRITICAL) are
/// accepted as aliases.
pub fn parse_log_level(level_str: &str) -> Result<Level> {
    match level_str.trim().to_uppercase().as_str() {
        "TRACE" => Ok(Level::TRACE),
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" | "WARNING" => Ok(Level::WARN),
        "ERROR" | "CRITICAL" => Ok(Level::ERROR),
        _ => Err(TeslabusError::config(format!(
            "Invalid log level: {level_str}"
        ))),
    }
}

const fn level_rank(level: Level) -> u8 {
    match level {
        Level::TRACE => 0,
        Level::DEBUG => 1,
        Level::INFO => 2,
        Level::WARN => 3,
        Level::ERROR => 4,
    }
}

/// The more verbose of two levels
pub fn min_level(a: Level, b: Level) -> Level {
    if level_rank(a) <= level_rank(b) { a } else { b }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("CRITICAL").unwrap(), Level::ERROR);
        assert_eq!(parse_log_level(" debug ").unwrap(), Level::DEBUG);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn min_level_prefers_verbose() {
        assert_eq!(min_level(Level::INFO, Level::DEBUG), Level::DEBUG);
        assert_eq!(min_level(Level::TRACE, Level::ERROR), Level::TRACE);
    }
}
