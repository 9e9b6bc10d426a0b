//! Service configuration
//!
//! Loaded with figment: built-in defaults, then the config file (format by
//! extension), then `ACQSRV_` environment variables with `__` as the section
//! separator, e.g. `ACQSRV_SERIAL__PORT=/dev/ttyUSB0`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::transport::SerialTransportConfig;
use crate::error::{AcqError, Result};

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/acqsrv.yaml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ACQSRV_";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub station: StationConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub files: FilesConfig,

    #[serde(default)]
    pub persist: PersistConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub housekeeping: HousekeepingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Station identity and cycle timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station name used in digests
    #[serde(default = "default_station_name")]
    pub name: String,

    /// Acquisition period in seconds
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Wait before the first cycle so the PIC can boot
    #[serde(default)]
    pub startup_delay_secs: u64,

    /// Fixed UTC offset for record timestamps; local time when unset
    #[serde(default)]
    pub utc_offset_hours: Option<i32>,

    /// Rendering of an erroneous value in records
    #[serde(default = "default_error_sentinel")]
    pub error_sentinel: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: default_station_name(),
            period_secs: default_period_secs(),
            startup_delay_secs: 0,
            utc_offset_hours: None,
            error_sentinel: default_error_sentinel(),
        }
    }
}

impl StationConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    /// Cycles per day, at least one
    pub fn cycles_per_day(&self) -> u64 {
        (86_400 / self.period_secs.max(1)).max(1)
    }
}

/// One step of the polling plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollStep {
    /// Frame identity expected in the reply
    pub frame: String,

    /// Commands written before reading, in order
    pub commands: Vec<String>,

    /// Wait between the last command and the read
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl PollStep {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Serial link and framing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_data_bits")]
    pub data_bits: u8,

    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,

    #[serde(default = "default_parity")]
    pub parity: String,

    #[serde(default = "default_parity")]
    pub flow_control: String,

    /// Time allowed for a whole reply line
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Frame terminator
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Token separator inside a frame
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Backoff between startup connection attempts
    #[serde(default = "default_connect_retry_secs")]
    pub connect_retry_secs: u64,

    /// Report every Nth failed startup attempt after the second
    #[serde(default = "default_reconnect_report_every")]
    pub reconnect_report_every: u64,

    /// Consecutive empty replies before "PIC unresponsive"
    #[serde(default = "default_unresponsive_after")]
    pub unresponsive_after: u64,

    #[serde(default = "default_polls")]
    pub polls: Vec<PollStep>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            flow_control: default_parity(),
            read_timeout_ms: default_read_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
            delimiter: default_delimiter(),
            separator: default_separator(),
            connect_retry_secs: default_connect_retry_secs(),
            reconnect_report_every: default_reconnect_report_every(),
            unresponsive_after: default_unresponsive_after(),
            polls: default_polls(),
        }
    }
}

impl SerialConfig {
    pub fn transport_config(&self) -> SerialTransportConfig {
        SerialTransportConfig {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity.clone(),
            flow_control: self.flow_control.clone(),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn connect_retry(&self) -> Duration {
        Duration::from_secs(self.connect_retry_secs)
    }
}

/// Table files, resolved against the config file's directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_layout_file")]
    pub layout: PathBuf,

    #[serde(default = "default_schema_file")]
    pub schema: PathBuf,

    #[serde(default = "default_catalog_file")]
    pub catalog: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            layout: default_layout_file(),
            schema: default_schema_file(),
            catalog: default_catalog_file(),
        }
    }
}

/// Record persistence
///
/// File names are relative to `data_dir`, mirror names to `mirror_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_primary_file")]
    pub primary_file: String,

    #[serde(default = "default_pending_file")]
    pub pending_file: String,

    /// Removable media mount point
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,

    #[serde(default = "default_mirror_file")]
    pub mirror_file: String,

    #[serde(default = "default_fallback_file")]
    pub fallback_file: String,

    /// Only treat `mirror_dir` as present when it is a separate mount
    #[serde(
        default = "common::serde_helpers::bool_true",
        deserialize_with = "common::serde_helpers::deserialize_bool_flexible"
    )]
    pub require_mount: bool,

    /// Latest record, overwritten each cycle
    #[serde(default = "default_latest_file")]
    pub latest_file: Option<String>,

    /// Raw record log
    #[serde(default = "default_raw_file")]
    pub raw_file: Option<String>,

    /// Dashboard snapshot of raw and converted values
    #[serde(default = "default_dashboard_file")]
    pub dashboard_file: Option<String>,

    /// Unix time of the last completed cycle
    #[serde(default = "default_heartbeat_file")]
    pub heartbeat_file: Option<String>,

    /// "1" while the PIC answers, "0" after an empty reply
    #[serde(default = "default_link_status_file")]
    pub link_status_file: Option<String>,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            primary_file: default_primary_file(),
            pending_file: default_pending_file(),
            mirror_dir: None,
            mirror_file: default_mirror_file(),
            fallback_file: default_fallback_file(),
            require_mount: true,
            latest_file: default_latest_file(),
            raw_file: default_raw_file(),
            dashboard_file: default_dashboard_file(),
            heartbeat_file: default_heartbeat_file(),
            link_status_file: default_link_status_file(),
        }
    }
}

impl PersistConfig {
    /// Path of an optional file under `data_dir`
    pub fn data_path(&self, name: &Option<String>) -> Option<PathBuf> {
        name.as_ref().map(|n| self.data_dir.join(n))
    }
}

/// Digest notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Severities appended to the digest spool
    #[serde(default = "default_notify_levels")]
    pub levels: Vec<String>,

    #[serde(default = "default_spool_file")]
    pub spool_file: PathBuf,

    /// Digest webhook; digests are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_subject")]
    pub subject: String,

    /// Hard limit for one delivery
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            levels: default_notify_levels(),
            spool_file: default_spool_file(),
            webhook_url: None,
            subject: default_subject(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl NotifyConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Command injection queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default)]
    pub queue_file: Option<PathBuf>,

    /// Sources whose commands are reported at info level
    #[serde(default = "default_announce_sources")]
    pub announce_sources: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            queue_file: None,
            announce_sources: default_announce_sources(),
        }
    }
}

/// Daily housekeeping thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// Report the daily bad frame count from this value on
    #[serde(default = "default_bad_frame_threshold")]
    pub bad_frame_threshold: u64,

    #[serde(default = "default_min_free_disk_mb")]
    pub min_free_disk_mb: u64,

    #[serde(default = "default_min_free_memory_mb")]
    pub min_free_memory_mb: u64,
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            bad_frame_threshold: default_bad_frame_threshold(),
            min_free_disk_mb: default_min_free_disk_mb(),
            min_free_memory_mb: default_min_free_memory_mb(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log root, overridden by `STATION_LOG_DIR`
    #[serde(default)]
    pub dir: Option<String>,
}

// ============================================================================
// Defaults
// ============================================================================

fn default_station_name() -> String {
    "station".to_string()
}

fn default_period_secs() -> u64 {
    30
}

fn default_error_sentinel() -> String {
    "-9999".to_string()
}

fn default_settle_ms() -> u64 {
    1100
}

fn default_serial_port() -> String {
    "/dev/ttyS1".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_parity() -> String {
    "None".to_string()
}

fn default_read_timeout_ms() -> u64 {
    2000
}

fn default_write_timeout_ms() -> u64 {
    1000
}

fn default_delimiter() -> String {
    "\r".to_string()
}

fn default_separator() -> String {
    "\t".to_string()
}

fn default_connect_retry_secs() -> u64 {
    5
}

fn default_reconnect_report_every() -> u64 {
    4320
}

fn default_unresponsive_after() -> u64 {
    30
}

fn default_polls() -> Vec<PollStep> {
    let step = |frame: &str, commands: &[&str], settle_ms: u64| PollStep {
        frame: frame.to_string(),
        commands: commands.iter().map(|c| c.to_string()).collect(),
        settle_ms,
    };
    vec![
        step("B", &["SS"], 1100),
        // The PIC samples the soil array after QQ
        step("1", &["QQ", "11"], 7000),
        step("2", &["22"], 1100),
        step("3", &["33"], 1100),
        step("4", &["44"], 1100),
    ]
}

fn default_layout_file() -> PathBuf {
    PathBuf::from("picdata.conf")
}

fn default_schema_file() -> PathBuf {
    PathBuf::from("outdata.conf")
}

fn default_catalog_file() -> PathBuf {
    PathBuf::from("converters.yaml")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_primary_file() -> String {
    "2unix".to_string()
}

fn default_pending_file() -> String {
    "2unix.pending".to_string()
}

fn default_mirror_file() -> String {
    "2usb".to_string()
}

fn default_fallback_file() -> String {
    "2usb.pending".to_string()
}

fn default_latest_file() -> Option<String> {
    Some("oneline".to_string())
}

fn default_raw_file() -> Option<String> {
    Some("rawdata".to_string())
}

fn default_dashboard_file() -> Option<String> {
    Some("fordash".to_string())
}

fn default_heartbeat_file() -> Option<String> {
    Some("heartbeat".to_string())
}

fn default_link_status_file() -> Option<String> {
    Some("pic_status".to_string())
}

fn default_notify_levels() -> Vec<String> {
    vec!["info".to_string(), "error".to_string()]
}

fn default_spool_file() -> PathBuf {
    PathBuf::from("data/digest.spool")
}

fn default_subject() -> String {
    "Station report".to_string()
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_announce_sources() -> Vec<String> {
    vec!["DASH".to_string()]
}

fn default_bad_frame_threshold() -> u64 {
    10
}

fn default_min_free_disk_mb() -> u64 {
    100
}

fn default_min_free_memory_mb() -> u64 {
    8
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    /// Load configuration from `path`
    ///
    /// Relative table paths are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| AcqError::config(format!("Invalid file extension: {}", path.display())))?;

        if !path.exists() {
            return Err(AcqError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let figment = Figment::from(Serialized::defaults(AppConfig::default()));
        let figment = match extension {
            "json" => figment.merge(Json::file(path)),
            "toml" => figment.merge(Toml::file(path)),
            "yaml" | "yml" => figment.merge(Yaml::file(path)),
            _ => {
                return Err(AcqError::config(format!(
                    "Unsupported config format: {extension}"
                )))
            },
        };
        let figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: AppConfig = figment.extract()?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.files.resolve_against(base);
        debug!("Loaded configuration from {}", path.display());

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.station.period_secs == 0 {
            return Err(AcqError::config("station.period_secs must be greater than zero"));
        }
        if self.station.error_sentinel.is_empty() {
            return Err(AcqError::config("station.error_sentinel cannot be empty"));
        }
        if let Some(offset) = self.station.utc_offset_hours {
            if !(-23..=23).contains(&offset) {
                return Err(AcqError::config(format!(
                    "station.utc_offset_hours out of range: {offset}"
                )));
            }
        }

        self.serial
            .transport_config()
            .validate()
            .map_err(|e| AcqError::config(format!("serial: {e}")))?;

        if self.serial.delimiter.len() != 1 {
            return Err(AcqError::config("serial.delimiter must be a single byte"));
        }
        if self.serial.separator.is_empty() {
            return Err(AcqError::config("serial.separator cannot be empty"));
        }
        if self.serial.polls.is_empty() {
            return Err(AcqError::config("serial.polls cannot be empty"));
        }
        if self.serial.reconnect_report_every == 0 || self.serial.unresponsive_after == 0 {
            return Err(AcqError::config(
                "serial.reconnect_report_every and serial.unresponsive_after must be positive",
            ));
        }

        let mut frames = HashSet::new();
        for step in &self.serial.polls {
            if !frames.insert(step.frame.as_str()) {
                return Err(AcqError::config(format!(
                    "Duplicate poll step for frame {}",
                    step.frame
                )));
            }
            if step.commands.is_empty() {
                return Err(AcqError::config(format!(
                    "Poll step for frame {} has no commands",
                    step.frame
                )));
            }
        }

        for level in &self.notify.levels {
            if !matches!(level.to_lowercase().as_str(), "debug" | "info" | "error") {
                return Err(AcqError::config(format!("Unknown notify level: {level}")));
            }
        }
        if self.notify.send_timeout_secs == 0 {
            return Err(AcqError::config("notify.send_timeout_secs must be positive"));
        }

        if self.persist.primary_file.is_empty() {
            return Err(AcqError::config("persist.primary_file cannot be empty"));
        }

        Ok(())
    }
}

impl FilesConfig {
    fn resolve_against(&mut self, base: &Path) {
        for path in [&mut self.layout, &mut self.schema, &mut self.catalog] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.station.cycles_per_day(), 2880);
        assert_eq!(config.serial.polls.len(), 5);
        assert_eq!(config.serial.polls[1].commands, vec!["QQ", "11"]);
    }

    #[test]
    fn test_load_yaml_and_resolve_files() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "acqsrv.yaml",
            r#"
station:
  name: ridge
  period_secs: 60
serial:
  port: /dev/ttyUSB0
  polls:
    - frame: B
      commands: [SS]
      settle_ms: 0
files:
  layout: tables/picdata.conf
"#,
        );

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.station.name, "ridge");
        assert_eq!(config.station.period(), Duration::from_secs(60));
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.polls.len(), 1);
        assert_eq!(config.files.layout, dir.path().join("tables/picdata.conf"));
        assert_eq!(config.files.schema, dir.path().join("outdata.conf"));
        assert_eq!(config.station.error_sentinel, "-9999");
    }

    #[test]
    fn test_duplicate_poll_frame_rejected() {
        let mut config = AppConfig::default();
        config.serial.polls.push(config.serial.polls[0].clone());
        assert!(matches!(config.validate(), Err(AcqError::ConfigError(_))));
    }

    #[test]
    fn test_unknown_notify_level_rejected() {
        let mut config = AppConfig::default();
        config.notify.levels.push("chatty".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_and_bad_extension() {
        assert!(AppConfig::load("/nonexistent/acqsrv.yaml").is_err());

        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "acqsrv.ini", "[station]\n");
        assert!(AppConfig::load(&path).is_err());
    }
}
