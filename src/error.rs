//! Error types for the compass heading engine

use core::fmt;
use core::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure codes reported to the caller's error callback
///
/// Both codes end the current "on" session. The engine never retries on its
/// own; the caller has to turn it on again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No usable heading arrived within the configured window
    Timeout,
    /// Sensor access was refused, or the permission request itself failed
    PermissionDenied,
}

impl ErrorCode {
    /// Wire name of the code (`TIMEOUT`, `PERMISSION_DENIED`)
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal compass failure, constructed once per occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{code}: {message}")]
pub struct CompassError {
    code: ErrorCode,
    message: String,
}

impl CompassError {
    /// Permission to read orientation sensors was not granted
    pub fn permission_denied() -> Self {
        Self {
            code: ErrorCode::PermissionDenied,
            message: "Permission denied".to_owned(),
        }
    }

    /// No heading was produced within `timeout`
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            code: ErrorCode::Timeout,
            message: format!(
                "No compass heading received within {} ms",
                timeout.as_millis()
            ),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised by an [`OrientationPlatform`](crate::OrientationPlatform) implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// The permission request rejected instead of resolving to a state
    #[error("permission request failed: {0}")]
    PermissionRequest(String),
}

/// Errors returned synchronously by the public API
#[derive(Debug, Error)]
pub enum Error {
    /// A callback was registered for an event name nobody emits
    #[error("Event type {0} is not supported.")]
    UnsupportedEvent(String),

    /// A known event name was paired with a callback of another kind
    #[error("event `{event}` cannot take a `{callback}` callback")]
    CallbackMismatch {
        event: &'static str,
        callback: &'static str,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Scheduling async work requires a Tokio runtime on the calling thread
    #[error("no Tokio runtime available to drive the {0}")]
    NoRuntime(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_names() {
        assert_eq!(ErrorCode::Timeout.as_str(), "TIMEOUT");
        assert_eq!(ErrorCode::PermissionDenied.to_string(), "PERMISSION_DENIED");
    }

    #[test]
    fn test_compass_error_constructors() {
        let denied = CompassError::permission_denied();
        assert_eq!(denied.code(), ErrorCode::PermissionDenied);
        assert_eq!(denied.message(), "Permission denied");
        assert_eq!(denied.to_string(), "PERMISSION_DENIED: Permission denied");

        let timeout = CompassError::timeout(Duration::from_millis(3000));
        assert_eq!(timeout.code(), ErrorCode::Timeout);
        assert!(timeout.message().contains("3000 ms"), "got {}", timeout.message());
    }

    #[test]
    fn test_unsupported_event_message() {
        let err = Error::UnsupportedEvent("unsupportedEvent".to_owned());
        assert_eq!(err.to_string(), "Event type unsupportedEvent is not supported.");
    }
}
