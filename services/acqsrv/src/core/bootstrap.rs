//! Service bootstrap and initialization
//!
//! Command-line parsing, logging setup and the `--validate` dry run.
//! Uses common bootstrap utilities for shared functionality.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{debug, info};

use common::service_bootstrap::ServiceInfo;

use crate::convert::ConverterRegistry;
use crate::core::config::{AppConfig, DEFAULT_CONFIG_PATH};
use crate::error::{AcqError, Result};
use crate::runtime::load_tables;

pub use common::bootstrap_args::ServiceArgs;

/// Command-line arguments for acqsrv
#[derive(Parser, Clone, Debug)]
#[command(
    name = "acqsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Weather station acquisition service",
    long_about = None
)]
pub struct Args {
    /// Path to the service configuration file
    #[arg(short = 'c', long, env = "ACQSRV_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl From<Args> for ServiceArgs {
    fn from(args: Args) -> Self {
        ServiceArgs {
            log_level: args.log_level,
            debug: args.debug,
            no_color: args.no_color,
            validate: args.validate,
        }
    }
}

/// Initialize logging with command-line arguments
///
/// Log root directory priority:
/// 1. STATION_LOG_DIR environment variable
/// 2. `logging.dir` from the service configuration
/// 3. Default "logs"
pub fn initialize_logging(
    args: &ServiceArgs,
    service_info: &ServiceInfo,
    log_dir: Option<&str>,
) -> Result<PathBuf> {
    common::service_bootstrap::load_development_env();

    let console_level = args.parse_log_level();
    common::service_bootstrap::init_logging(service_info, log_dir, console_level, args.no_color)
        .map_err(|e| AcqError::config(format!("Failed to init logging: {e}")))
}

/// Load the configuration and every table it points at without touching
/// the serial port
pub fn validate_configuration(path: &Path) -> Result<AppConfig> {
    debug!("Validating configuration from {}", path.display());

    let config = AppConfig::load(path)?;
    info!("Station: {}", config.station.name);
    info!(
        "Serial port {} at {} baud, {} poll steps",
        config.serial.port,
        config.serial.baud_rate,
        config.serial.polls.len()
    );

    let (layout, schema, specs) = load_tables(&config)?;
    info!(
        "Field layout {}: {} frames, {} fields",
        config.files.layout.display(),
        layout.frames().len(),
        layout.field_count()
    );
    info!(
        "Output schema {}: {} labels",
        config.files.schema.display(),
        schema.len()
    );

    let registry = ConverterRegistry::new(specs)?;
    info!(
        "Converter catalog {}: {} converters",
        config.files.catalog.display(),
        registry.len()
    );
    for (label, fields) in registry.undetermined() {
        info!("  {label}: {} undetermined", fields.join(", "));
    }

    info!("Configuration validation completed successfully");
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["acqsrv"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(args.log_level, "info");
        assert!(!args.validate);
    }

    #[test]
    fn test_args_into_service_args() {
        let args = Args::parse_from(["acqsrv", "-d", "--no-color", "--validate", "-l", "warn"]);
        let service: ServiceArgs = args.into();
        assert!(service.debug);
        assert!(service.no_color);
        assert!(service.validate);
        assert_eq!(service.log_level, "warn");
    }

    #[test]
    fn test_validate_missing_file_fails() {
        assert!(validate_configuration(Path::new("/nonexistent/acqsrv.yaml")).is_err());
    }
}
