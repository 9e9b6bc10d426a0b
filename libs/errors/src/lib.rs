//! Unified error handling for the station acquisition services
//!
//! Service crates keep their own domain error types and convert into
//! [`StationError`] at the process boundary. Every error type exposes the
//! same classification surface through [`StationErrorTrait`].

use thiserror::Error;

// ============================================================================
// StationError - Main error type
// ============================================================================

/// Main error type shared by the station services
#[derive(Debug, Error)]
pub enum StationError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Layout error: {file}:{line}: {reason}")]
    Layout {
        file: String,
        line: usize,
        reason: String,
    },

    // ======================================
    // Device & Communication Errors
    // ======================================
    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Timeout waiting for response from {0}")]
    Timeout(String),

    #[error("Frame error: {frame}: {reason}")]
    Frame { frame: String, reason: String },

    // ======================================
    // Conversion Errors
    // ======================================
    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Division by zero in calculation: {context}")]
    DivisionByZero { context: String },

    #[error("Data missing: {0}")]
    DataMissing(String),

    #[error("Dependency order violated: {label} requires {dependency}")]
    DependencyOrder { label: String, dependency: String },

    // ======================================
    // Persistence Errors
    // ======================================
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Removable media unavailable: {0}")]
    MediaUnavailable(String),

    // ======================================
    // Notification Errors
    // ======================================
    #[error("Notification error: {0}")]
    Notification(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {file}: {error}")]
    ParseError { file: String, error: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Service startup failed: {0}")]
    StartupFailed(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // ======================================
    // Catch-all for other errors
    // ======================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using StationError
pub type StationResult<T> = Result<T, StationError>;

impl StationError {
    /// Process exit code for errors that terminate the daemon
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Configuration => 78, // EX_CONFIG
            ErrorCategory::Connection | ErrorCategory::Network | ErrorCategory::Timeout => 69, // EX_UNAVAILABLE
            ErrorCategory::Storage => 74, // EX_IOERR
            _ => 1,
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for StationError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for StationError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

impl From<std::num::ParseIntError> for StationError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self::Conversion(format!("Invalid integer: {}", err))
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::StationError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::StationError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! conversion_error {
    ($msg:expr) => {
        $crate::StationError::Conversion($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::StationError::Conversion(format!($fmt, $($arg)*))
    };
}

// ============================================================================
// StationError implements StationErrorTrait
// ============================================================================

impl StationErrorTrait for StationError {
    fn error_code(&self) -> &'static str {
        match self {
            // Configuration Errors
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::InvalidConfig { .. } => "INVALID_CONFIG",
            Self::MissingConfig(_) => "MISSING_CONFIG",
            Self::Layout { .. } => "LAYOUT_ERROR",

            // Device & Communication Errors
            Self::Communication(_) => "COMMUNICATION_ERROR",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Frame { .. } => "FRAME_ERROR",

            // Conversion
            Self::Conversion(_) => "CONVERSION_ERROR",
            Self::DivisionByZero { .. } => "DIVISION_BY_ZERO",
            Self::DataMissing(_) => "DATA_MISSING",
            Self::DependencyOrder { .. } => "DEPENDENCY_ORDER",

            // Persistence
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::MediaUnavailable(_) => "MEDIA_UNAVAILABLE",

            // Notification
            Self::Notification(_) => "NOTIFICATION_ERROR",
            Self::HttpClient(_) => "HTTP_CLIENT_ERROR",

            // File & I/O
            Self::Io(_) => "IO_ERROR",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::ParseError { .. } => "PARSE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",

            // Service & Runtime
            Self::StartupFailed(_) => "STARTUP_FAILED",
            Self::ShutdownError(_) => "SHUTDOWN_ERROR",
            Self::Runtime(_) => "RUNTIME_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",

            // Other
            Self::Other(_) => "OTHER_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_)
            | Self::InvalidConfig { .. }
            | Self::MissingConfig(_)
            | Self::Layout { .. }
            | Self::DependencyOrder { .. } => ErrorCategory::Configuration,

            Self::ConnectionFailed { .. } => ErrorCategory::Connection,

            Self::Communication(_) | Self::Notification(_) | Self::HttpClient(_) => {
                ErrorCategory::Network
            },

            Self::Timeout(_) => ErrorCategory::Timeout,

            Self::Frame { .. } => ErrorCategory::Protocol,

            Self::Conversion(_) | Self::DivisionByZero { .. } => ErrorCategory::Conversion,

            Self::DataMissing(_) => ErrorCategory::DataMissing,

            Self::Persistence(_) | Self::MediaUnavailable(_) | Self::Io(_) => {
                ErrorCategory::Storage
            },

            Self::FileNotFound(_)
            | Self::ParseError { .. }
            | Self::Serialization(_)
            | Self::Deserialization(_) => ErrorCategory::Configuration,

            Self::StartupFailed(_)
            | Self::ShutdownError(_)
            | Self::Runtime(_)
            | Self::Internal(_) => ErrorCategory::Internal,

            Self::Other(_) => ErrorCategory::Unknown,
        }
    }
}

// ============================================================================
// Station Error Trait - Architectural layer
// ============================================================================

/// Error category enum - used for classification and log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Storage,
    Network,
    Timeout,

    // Device layer
    Protocol,
    Connection,

    // Conversion layer
    Conversion,
    DataMissing,

    // System level
    Internal,

    // Others
    Unknown,
}

/// Station error capability trait
///
/// Each service keeps its own domain error type (e.g. `AcqError`) and gains the
/// common classification interface by implementing this trait.
pub trait StationErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and notifications)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Connection
                | ErrorCategory::Storage
        )
    }

    /// Recommended retry delay in milliseconds
    fn retry_delay_ms(&self) -> u64 {
        match self.category() {
            ErrorCategory::Network => 1000,
            ErrorCategory::Timeout => 500,
            ErrorCategory::Connection => 5000,
            _ => 0,
        }
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Configuration | ErrorCategory::Storage => {
                Level::ERROR
            },
            ErrorCategory::Network
            | ErrorCategory::Timeout
            | ErrorCategory::Connection
            | ErrorCategory::Protocol
            | ErrorCategory::Conversion => Level::WARN,
            ErrorCategory::DataMissing => Level::DEBUG,
            ErrorCategory::Unknown => Level::WARN,
        }
    }

    /// Whether the condition should go out in the notification digest
    fn should_alert(&self) -> bool {
        !matches!(self.category(), ErrorCategory::DataMissing)
    }
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StationError::Configuration("x".into()).error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(
            StationError::DataMissing("geiger_ticks".into()).error_code(),
            "DATA_MISSING"
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(StationError::Timeout("pic".into()).is_retryable());
        assert!(StationError::ConnectionFailed {
            endpoint: "/dev/ttyS0".into(),
            reason: "busy".into()
        }
        .is_retryable());
        assert!(!StationError::Configuration("bad".into()).is_retryable());
        assert!(!StationError::Conversion("bad".into()).is_retryable());
    }

    #[test]
    fn test_exit_codes() {
        let layout = StationError::Layout {
            file: "picdata.conf".into(),
            line: 3,
            reason: "field before frame header".into(),
        };
        assert_eq!(layout.exit_code(), 78);
        assert_eq!(layout.to_string(), "Layout error: picdata.conf:3: field before frame header");
        assert_eq!(StationError::Internal("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_data_missing_is_quiet() {
        let err = StationError::DataMissing("RTD_1K_upper".into());
        assert_eq!(err.log_level(), tracing::Level::DEBUG);
        assert!(!err.should_alert());
    }

    #[test]
    fn test_macros() {
        let err = config_error!("period {} too short", 0);
        assert!(matches!(err, StationError::Configuration(_)));
        let err = conversion_error!("ln of non-positive value");
        assert_eq!(err.category(), ErrorCategory::Conversion);
    }
}
