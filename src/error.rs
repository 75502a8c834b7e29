//! Error types and handling for Teslabus
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting. Failures coming from
//! the vehicle API and the command binary carry a structural kind so the
//! scheduler can classify them without inspecting message text.

use thiserror::Error;

/// Result type alias for Teslabus operations
pub type Result<T> = std::result::Result<T, TeslabusError>;

/// Classification of a failed vehicle data request, decided at the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Request timed out or the API reported the vehicle unavailable (asleep)
    Timeout,
    /// HTTP 429
    RateLimited,
    /// HTTP 401/403, the access token was rejected
    Unauthorized,
    /// The body could not be decoded into a snapshot
    Decode,
    /// Any other transport or status failure
    Other,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::RateLimited => "rate limited",
            Self::Unauthorized => "unauthorized",
            Self::Decode => "decode",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Classification of a failed vehicle command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFailure {
    /// The command binary rejected the access token
    TokenRejected,
    /// Anything else (non-zero exit, spawn failure)
    Failed,
}

/// Main error type for Teslabus
#[derive(Debug, Error)]
pub enum TeslabusError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// D-Bus communication errors
    #[error("D-Bus error: {message}")]
    DBus { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Vehicle data fetch failures
    #[error("Vehicle fetch error ({kind}): {message}")]
    Fetch {
        kind: FetchErrorKind,
        message: String,
    },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Vehicle command failures
    #[error("Command error: {message}")]
    Command {
        kind: CommandFailure,
        message: String,
    },

    /// Vehicle command did not finish in time
    #[error("Command timed out: {message}")]
    CommandTimeout { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },
}

impl TeslabusError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new D-Bus error
    pub fn dbus<S: Into<String>>(message: S) -> Self {
        Self::DBus {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new fetch error with an explicit classification
    pub fn fetch<S: Into<String>>(kind: FetchErrorKind, message: S) -> Self {
        Self::Fetch {
            kind,
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new command error
    pub fn command<S: Into<String>>(kind: CommandFailure, message: S) -> Self {
        Self::Command {
            kind,
            message: message.into(),
        }
    }

    /// Create a new command timeout error
    pub fn command_timeout<S: Into<String>>(message: S) -> Self {
        Self::CommandTimeout {
            message: message.into(),
        }
    }

    /// Fetch classification, if this error came from a vehicle data request
    pub const fn fetch_kind(&self) -> Option<FetchErrorKind> {
        match self {
            Self::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// True when the command binary refused the access token
    pub const fn is_token_rejected(&self) -> bool {
        matches!(
            self,
            Self::Command {
                kind: CommandFailure::TokenRejected,
                ..
            }
        )
    }
}

impl From<std::io::Error> for TeslabusError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for TeslabusError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for TeslabusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<zbus::Error> for TeslabusError {
    fn from(err: zbus::Error) -> Self {
        Self::dbus(err.to_string())
    }
}

impl From<chrono::ParseError> for TeslabusError {
    fn from(err: chrono::ParseError) -> Self {
        Self::validation("datetime".to_string(), err.to_string())
    }
}
