//! Unified logging module for station services
//!
//! Console output plus a daily rolling file per service, both using the
//! bracketed `timestamp [LEVEL] message` layout. Old files are gzipped by a
//! background task.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::time::{interval, Duration};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2026-03-02T00:50:44.809112Z [INFO] Cycle 12 persisted`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// Keeps the non-blocking writer alive for the life of the process
static GUARDS: OnceLock<Mutex<Vec<WorkerGuard>>> = OnceLock::new();

// ============================================================================
// Log Root Directory Configuration
// ============================================================================

/// Global log root directory
/// Priority: STATION_LOG_DIR env > config_dir > default "logs"
static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize log root directory from config or environment
///
/// Call before [`init_with_config`] so file output lands in the right place.
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| {
        std::env::var("STATION_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                config_dir
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("logs"))
            })
    });
}

/// Get log root directory
///
/// Falls back to the environment or `logs` when [`init_log_root`] was never
/// called. Test binaries log under the system temp directory instead.
pub fn get_log_root() -> PathBuf {
    LOG_ROOT.get().cloned().unwrap_or_else(|| {
        std::env::var("STATION_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                if is_test_environment() {
                    std::env::temp_dir().join("station-test-logs")
                } else {
                    PathBuf::from("logs")
                }
            })
    })
}

fn is_test_environment() -> bool {
    if std::env::var("CARGO_TARGET_TMPDIR").is_ok() {
        return true;
    }

    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.to_str().map(|s| s.contains("/deps/")))
        .unwrap_or(false)
}

/// Default max file size: 50MB
const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

fn lock_err<T>(e: std::sync::PoisonError<T>) -> std::io::Error {
    std::io::Error::other(format!("Mutex poisoned: {}", e))
}

/// Daily rolling file writer: `{YYYYMMDD}_{service}.log`
///
/// Rolls over at local midnight and, within a day, whenever the file grows
/// past `max_file_size` (`{YYYYMMDD}_{service}.{n}.log`).
#[derive(Clone)]
struct DailyRollingWriter {
    service_name: String,
    log_dir: PathBuf,
    current_date: Arc<Mutex<String>>,
    current_file: Arc<Mutex<Option<File>>>,
    current_size: Arc<AtomicU64>,
    max_file_size: u64,
    rotation_count: Arc<AtomicU32>,
}

impl DailyRollingWriter {
    fn new(service_name: String, log_dir: PathBuf) -> std::io::Result<Self> {
        Self::with_max_size(service_name, log_dir, DEFAULT_MAX_FILE_SIZE)
    }

    fn with_max_size(
        service_name: String,
        log_dir: PathBuf,
        max_file_size: u64,
    ) -> std::io::Result<Self> {
        let current_date = chrono::Local::now().format("%Y%m%d").to_string();
        fs::create_dir_all(&log_dir)?;

        let file = Self::open(&Self::daily_path(&log_dir, &current_date, &service_name))?;
        let initial_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            service_name,
            log_dir,
            current_date: Arc::new(Mutex::new(current_date)),
            current_file: Arc::new(Mutex::new(Some(file))),
            current_size: Arc::new(AtomicU64::new(initial_size)),
            max_file_size,
            rotation_count: Arc::new(AtomicU32::new(0)),
        })
    }

    fn daily_path(log_dir: &Path, date: &str, service: &str) -> PathBuf {
        log_dir.join(format!("{}_{}.log", date, service))
    }

    fn open(path: &Path) -> std::io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn rotate_by_size(&self) -> std::io::Result<()> {
        let current_date = self.current_date.lock().map_err(lock_err)?;
        let count = self.rotation_count.fetch_add(1, Ordering::SeqCst) + 1;

        let path = self
            .log_dir
            .join(format!("{}_{}.{}.log", *current_date, self.service_name, count));
        let file = Self::open(&path)?;

        self.current_size.store(0, Ordering::SeqCst);
        *self.current_file.lock().map_err(lock_err)? = Some(file);
        Ok(())
    }

    fn get_writer(&self) -> std::io::Result<std::sync::MutexGuard<'_, Option<File>>> {
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let mut current_date = self.current_date.lock().map_err(lock_err)?;

        let current_path = Self::daily_path(&self.log_dir, &current_date, &self.service_name);
        let date_changed = *current_date != today;

        // Roll on date change, or recreate if the file was removed underneath us
        if date_changed || !current_path.exists() {
            fs::create_dir_all(&self.log_dir)?;
            let path = Self::daily_path(&self.log_dir, &today, &self.service_name);
            let file = Self::open(&path)?;
            let initial_size = file.metadata().map(|m| m.len()).unwrap_or(0);

            if date_changed {
                *current_date = today;
                self.rotation_count.store(0, Ordering::SeqCst);
            }
            self.current_size.store(initial_size, Ordering::SeqCst);
            *self.current_file.lock().map_err(lock_err)? = Some(file);
        }

        self.current_file.lock().map_err(lock_err)
    }
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let current_size = self.current_size.load(Ordering::Relaxed);
        if current_size + buf.len() as u64 > self.max_file_size {
            self.rotate_by_size()?;
        }

        if let Some(ref mut file) = *self.get_writer()? {
            let written = file.write(buf)?;
            self.current_size
                .fetch_add(written as u64, Ordering::Relaxed);
            Ok(written)
        } else {
            Ok(0)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut file) = *self.get_writer()? {
            file.flush()
        } else {
            Ok(())
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name (e.g., "acqsrv")
    pub service_name: String,
    /// Base directory for logs
    pub log_dir: PathBuf,
    /// Console log level
    pub console_level: Level,
    /// File log level
    pub file_level: Level,
    /// Enable JSON format for the file layer
    pub enable_json: bool,
    /// Disable ANSI colors on the console
    pub no_color: bool,
    /// Compress files older than this many days
    pub compress_after_days: u64,
    /// Delete compressed files older than this many days
    pub retain_days: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: get_log_root(),
            console_level: Level::INFO,
            file_level: Level::DEBUG,
            enable_json: false,
            no_color: false,
            compress_after_days: 7,
            retain_days: 365,
        }
    }
}

/// Initialize logging system with configuration
///
/// `RUST_LOG` overrides the computed filter when set.
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(&config.log_dir)?;

    let writer = DailyRollingWriter::new(config.service_name.clone(), config.log_dir.clone())?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let guards = GUARDS.get_or_init(|| Mutex::new(Vec::new()));
    match guards.lock() {
        Ok(mut guards) => guards.push(guard),
        Err(poisoned) => poisoned.into_inner().push(guard),
    }

    let most_verbose = std::cmp::max(config.console_level, config.file_level);
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(spec) if !spec.trim().is_empty() => EnvFilter::try_new(spec)?,
        _ => EnvFilter::try_new(format!(
            "warn,{}={},common={},station_calc={}",
            config.service_name.replace('-', "_"),
            most_verbose,
            most_verbose,
            most_verbose
        ))?,
    };

    let console_layer = fmt::layer()
        .with_ansi(!config.no_color)
        .event_format(BracketedLevelFormat)
        .with_filter(LevelFilter::from_level(config.console_level))
        .boxed();

    let file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_level(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(LevelFilter::from_level(config.file_level))
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .with_filter(LevelFilter::from_level(config.file_level))
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);

    start_log_compression_task(config);

    Ok(())
}

/// Start background log compression task
fn start_log_compression_task(config: LogConfig) {
    tokio::spawn(async move {
        // Let the service settle before touching the disk
        tokio::time::sleep(Duration::from_secs(60)).await;

        let mut ticker = interval(Duration::from_secs(86400));
        loop {
            ticker.tick().await;
            if let Err(e) = compress_old_logs(
                &config.log_dir,
                &config.service_name,
                Duration::from_secs(config.compress_after_days * 86400),
                Duration::from_secs(config.retain_days * 86400),
            )
            .await
            {
                tracing::error!("Log compression error for {}: {}", config.service_name, e);
            }
        }
    });
}

/// Compress plain logs older than `compress_after`, delete archives older than `retain`
async fn compress_old_logs(
    log_dir: &Path,
    service_name: &str,
    compress_after: Duration,
    retain: Duration,
) -> Result<usize, Box<dyn std::error::Error>> {
    use std::time::SystemTime;

    let mut touched = 0;
    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let marker = format!("_{}", service_name);

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_name = match path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => continue,
        };
        if !file_name.contains(&marker) {
            continue;
        }

        let modified = tokio::fs::metadata(&path).await?.modified()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();

        if file_name.ends_with(".log") && age > compress_after {
            compress_file(&path).await?;
            tokio::fs::remove_file(&path).await?;
            tracing::debug!("Compressed: {}", file_name);
            touched += 1;
        } else if file_name.ends_with(".log.gz") && age > retain {
            tokio::fs::remove_file(&path).await?;
            tracing::debug!("Deleted: {}", file_name);
            touched += 1;
        }
    }

    Ok(touched)
}

/// Compress a single file next to the original
async fn compress_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let buffer = tokio::fs::read(path).await?;

    let output_path = format!("{}.gz", path.display());
    let output = File::create(&output_path)?;
    let mut encoder = GzEncoder::new(output, Compression::best());
    encoder.write_all(&buffer)?;
    encoder.finish()?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_daily_writer_creates_dated_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            DailyRollingWriter::new("acqsrv".to_string(), dir.path().to_path_buf()).unwrap();
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let path = dir.path().join(format!("{}_acqsrv.log", today));
        assert_eq!(fs::read_to_string(path).unwrap(), "hello\n");
    }

    #[test]
    fn test_daily_writer_rotates_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            DailyRollingWriter::with_max_size("acqsrv".to_string(), dir.path().to_path_buf(), 8)
                .unwrap();
        writer.write_all(b"12345").unwrap();
        writer.write_all(b"67890").unwrap();
        writer.flush().unwrap();

        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let rotated = dir.path().join(format!("{}_acqsrv.1.log", today));
        assert_eq!(fs::read_to_string(rotated).unwrap(), "67890");
    }

    #[tokio::test]
    async fn test_compress_old_logs() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("20240101_acqsrv.log");
        fs::write(&old, "old line\n").unwrap();
        let unrelated = dir.path().join("notes.txt");
        fs::write(&unrelated, "keep").unwrap();

        let touched = compress_old_logs(dir.path(), "acqsrv", Duration::ZERO, Duration::MAX)
            .await
            .unwrap();

        assert_eq!(touched, 1);
        assert!(!old.exists());
        assert!(dir.path().join("20240101_acqsrv.log.gz").exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_format_level() {
        assert_eq!(format_level(&Level::INFO), "[INFO]");
        assert_eq!(format_level(&Level::ERROR), "[ERROR]");
    }
}
