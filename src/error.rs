//! Application-wide error types.

use thiserror::Error;

/// Errors surfaced by the `p4settings` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while turning resolved settings into a live server connection.
///
/// Returned unchanged from [`crate::server::connect`]; nothing here is retried.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The server URI could not be parsed. No network activity took place.
    #[error("invalid server uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("access denied: {0}")]
    Access(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ConnectionError {
    pub(crate) fn invalid_uri(uri: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUri {
            uri: uri.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("bad flag".into());
        assert!(e.to_string().contains("config error"));
        assert!(e.to_string().contains("bad flag"));
    }

    #[test]
    fn logger_error_display() {
        let e = AppError::Logger("already initialized".into());
        assert!(e.to_string().contains("already initialized"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }

    #[test]
    fn connection_error_passes_through_unchanged() {
        let e: AppError = ConnectionError::Access("password invalid".into()).into();
        assert_eq!(e.to_string(), "access denied: password invalid");
        assert!(matches!(e, AppError::Connection(ConnectionError::Access(_))));
    }

    #[test]
    fn invalid_uri_names_the_uri() {
        let e = ConnectionError::invalid_uri("p4java:/x", "missing host");
        let msg = e.to_string();
        assert!(msg.contains("p4java:/x"));
        assert!(msg.contains("missing host"));
    }
}
