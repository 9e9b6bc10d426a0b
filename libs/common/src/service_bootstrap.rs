//! Unified service bootstrap utilities
//!
//! Startup banner, logging initialization and environment setup shared by the
//! station services.

use std::path::PathBuf;

use crate::logging::{self, LogConfig};
use tracing::{info, Level};

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "acqsrv")
    pub name: String,
    /// Service version from Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
        }
    }
}

/// Print unified startup banner for any service
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = match service.name.as_str() {
        "acqsrv" => {
            r#"
  █████╗  ██████╗ ██████╗ ███████╗██████╗ ██╗   ██╗
 ██╔══██╗██╔════╝██╔═══██╗██╔════╝██╔══██╗██║   ██║
 ███████║██║     ██║   ██║███████╗██████╔╝██║   ██║
 ██╔══██║██║     ██║▄▄ ██║╚════██║██╔══██╗╚██╗ ██╔╝
 ██║  ██║╚██████╗╚██████╔╝███████║██║  ██║ ╚████╔╝
 ╚═╝  ╚═╝ ╚═════╝ ╚══▀▀═╝ ╚══════╝╚═╝  ╚═╝  ╚═══╝
            "#
        },
        _ => {
            r#"
 ███████╗████████╗ █████╗ ████████╗██╗ ██████╗ ███╗   ██╗
 ██╔════╝╚══██╔══╝██╔══██╗╚══██╔══╝██║██╔═══██╗████╗  ██║
 ███████╗   ██║   ███████║   ██║   ██║██║   ██║██╔██╗ ██║
 ╚════██║   ██║   ██╔══██║   ██║   ██║██║   ██║██║╚██╗██║
 ███████║   ██║   ██║  ██║   ██║   ██║╚██████╔╝██║ ╚████║
 ╚══════╝   ╚═╝   ╚═╝  ╚═╝   ╚═╝   ╚═╝ ╚═════╝ ╚═╝  ╚═══╝
            "#
        },
    };

    info!("{}", banner);
    info!("");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!("");
}

/// Initialize logging for a service with standard configuration
///
/// Log root directory priority:
/// 1. STATION_LOG_DIR environment variable
/// 2. `config_dir` from the service configuration
/// 3. Default "logs"
pub fn init_logging(
    service: &ServiceInfo,
    config_dir: Option<&str>,
    console_level: Level,
    no_color: bool,
) -> anyhow::Result<PathBuf> {
    logging::init_log_root(config_dir);

    let log_dir = logging::get_log_root().join(&service.name);

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: log_dir.clone(),
        console_level,
        file_level: std::cmp::max(console_level, Level::DEBUG),
        no_color,
        ..LogConfig::default()
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(log_dir)
}

/// Load environment variables in development mode
///
/// In debug builds, reads .env file and sets environment variables that are
/// not already set. In release builds this is a no-op.
pub fn load_development_env() {
    #[cfg(debug_assertions)]
    {
        if let Ok(content) = std::fs::read_to_string(".env") {
            for line in content.lines() {
                let trimmed = line.trim();
                if trimmed.starts_with('#') || trimmed.is_empty() {
                    continue;
                }

                if let Some((key, value)) = trimmed.split_once('=') {
                    let key = key.trim();
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value.trim());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_service_info_creation() {
        let service = ServiceInfo::new("acqsrv", "Station acquisition daemon");
        assert_eq!(service.name, "acqsrv");
        assert_eq!(service.description, "Station acquisition daemon");
        assert!(!service.version.is_empty());
    }
}
