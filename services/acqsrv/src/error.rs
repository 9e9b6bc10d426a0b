//! Error handling for the acquisition service
//!
//! Only setup and I/O paths return `AcqError`. Per-cycle faults (bad frames,
//! formula failures, range violations) are reported through the notifier and
//! never surface as errors.

use errors::StationError;
use thiserror::Error;

use crate::core::transport::TransportError;

/// Acquisition Service Error Type
#[derive(Error, Debug, Clone)]
pub enum AcqError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Field layout or output schema file errors (fatal at startup)
    #[error("Layout error: {file}:{line}: {reason}")]
    LayoutError {
        file: String,
        line: usize,
        reason: String,
    },

    /// Converter catalogue errors (fatal at startup)
    #[error("Catalog error: {0}")]
    CatalogError(String),

    /// Serial link errors
    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Record persistence errors
    #[error("Persistence error: {0}")]
    PersistError(String),

    /// Digest delivery errors
    #[error("Notification error: {0}")]
    NotifyError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the acquisition service
pub type Result<T> = std::result::Result<T, AcqError>;

impl AcqError {
    pub fn config(msg: impl Into<String>) -> Self {
        AcqError::ConfigError(msg.into())
    }

    pub fn layout(file: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        AcqError::LayoutError {
            file: file.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        AcqError::CatalogError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        AcqError::IoError(msg.into())
    }

    pub fn persist(msg: impl Into<String>) -> Self {
        AcqError::PersistError(msg.into())
    }

    pub fn notify(msg: impl Into<String>) -> Self {
        AcqError::NotifyError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AcqError::InternalError(msg.into())
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for AcqError {
    fn from(err: std::io::Error) -> Self {
        AcqError::IoError(err.to_string())
    }
}

impl From<serde_yaml::Error> for AcqError {
    fn from(err: serde_yaml::Error) -> Self {
        AcqError::CatalogError(format!("YAML: {err}"))
    }
}

impl From<figment::Error> for AcqError {
    fn from(err: figment::Error) -> Self {
        AcqError::ConfigError(err.to_string())
    }
}

// ============================================================================
// Extension trait for adding context to errors
// ============================================================================

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn io_error(self, msg: &str) -> Result<T>;
    fn persist_error(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| AcqError::ConfigError(format!("{msg}: {e}")))
    }

    fn io_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| AcqError::IoError(format!("{msg}: {e}")))
    }

    fn persist_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| AcqError::PersistError(format!("{msg}: {e}")))
    }
}

// ============================================================================
// Conversion from AcqError to StationError at the process boundary
// ============================================================================

impl From<AcqError> for StationError {
    fn from(err: AcqError) -> Self {
        match err {
            AcqError::ConfigError(msg) => StationError::Configuration(msg),
            AcqError::LayoutError { file, line, reason } => {
                StationError::Layout { file, line, reason }
            },
            AcqError::CatalogError(msg) => StationError::InvalidConfig {
                field: "converters".to_string(),
                reason: msg,
            },
            AcqError::TransportError(e) => StationError::Communication(e.to_string()),
            AcqError::IoError(msg) => StationError::Io(std::io::Error::other(msg)),
            AcqError::PersistError(msg) => StationError::Persistence(msg),
            AcqError::NotifyError(msg) => StationError::Notification(msg),
            AcqError::InternalError(msg) => StationError::Internal(msg),
        }
    }
}

// ============================================================================
// AcqError implements StationErrorTrait
// ============================================================================

use errors::{ErrorCategory, StationErrorTrait};

impl StationErrorTrait for AcqError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "ACQSRV_CONFIG_ERROR",
            Self::LayoutError { .. } => "ACQSRV_LAYOUT_ERROR",
            Self::CatalogError(_) => "ACQSRV_CATALOG_ERROR",
            Self::TransportError(_) => "ACQSRV_TRANSPORT_ERROR",
            Self::IoError(_) => "ACQSRV_IO_ERROR",
            Self::PersistError(_) => "ACQSRV_PERSIST_ERROR",
            Self::NotifyError(_) => "ACQSRV_NOTIFY_ERROR",
            Self::InternalError(_) => "ACQSRV_INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError(_) | Self::LayoutError { .. } | Self::CatalogError(_) => {
                ErrorCategory::Configuration
            },
            Self::TransportError(TransportError::Timeout(_)) => ErrorCategory::Timeout,
            Self::TransportError(_) => ErrorCategory::Connection,
            Self::IoError(_) | Self::PersistError(_) => ErrorCategory::Storage,
            Self::NotifyError(_) => ErrorCategory::Network,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_layout_error_maps_to_config_exit_code() {
        let err = AcqError::layout("picdata.conf", 4, "duplicate field geiger_ticks");
        assert_eq!(err.category(), ErrorCategory::Configuration);
        let station: StationError = err.into();
        assert_eq!(station.exit_code(), 78);
    }

    #[test]
    fn test_transport_error_is_retryable() {
        let err: AcqError = TransportError::ConnectionFailed("/dev/ttyS0 busy".into()).into();
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), "ACQSRV_TRANSPORT_ERROR");
    }

    #[test]
    fn test_error_ext_adds_context() {
        let res: std::result::Result<(), &str> = Err("permission denied");
        let err = res.persist_error("append 2unix").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Persistence error: append 2unix: permission denied"
        );
    }
}
