//! Record persistence
//!
//! Each cycle appends one TAB-joined record to the primary file and, when the
//! removable media is mounted, to its mirror. Failed primary writes go to a
//! pending buffer and missing media to a local fallback; both are flushed
//! back ahead of the next record once the target is writable again.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use tracing::{debug, warn};

use crate::core::config::PersistConfig;
use crate::error::{ErrorExt, Result};
use crate::frame::{FieldLayout, RawValue, RawValueStore};
use crate::notify::{Latch, Reporter};

/// Holding file for records that could not reach their target yet
#[derive(Debug)]
struct Backlog {
    path: PathBuf,
    /// Bytes already copied out while truncating kept failing
    copied: usize,
    clear_failed: Latch,
}

#[derive(Debug)]
struct MirrorTarget {
    dir: PathBuf,
    file: PathBuf,
    fallback: Backlog,
    require_mount: bool,
}

#[derive(Debug)]
pub struct RecordWriter {
    primary: PathBuf,
    pending: Backlog,
    mirror: Option<MirrorTarget>,
    latest: Option<PathBuf>,
    raw: Option<PathBuf>,
    dashboard: Option<PathBuf>,
    heartbeat: Option<PathBuf>,
    link_status: Option<PathBuf>,
    primary_failed: Latch,
    pending_failed: Latch,
    mirror_missing: Latch,
    mirror_failed: Latch,
}

/// Leading record columns: unix time, then local year, month, day, hour,
/// minute and second
pub fn record_header<Tz: TimeZone>(now: &DateTime<Tz>) -> Vec<String> {
    vec![
        now.timestamp().to_string(),
        now.year().to_string(),
        now.month().to_string(),
        now.day().to_string(),
        now.hour().to_string(),
        now.minute().to_string(),
        now.second().to_string(),
    ]
}

fn append(path: &Path, data: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(data.as_bytes())
}

fn read_buffer(path: &Path) -> io::Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(e),
    }
}

impl Backlog {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            copied: 0,
            clear_failed: Latch::new(),
        }
    }

    fn append(&self, line: &str) -> io::Result<()> {
        append(&self.path, line)
    }

    /// Copy buffered records into `target` and truncate; returns the number of lines copied
    ///
    /// A failed truncate is not an error for the caller. The copied prefix is
    /// remembered and skipped on the next drain.
    fn drain_into(&mut self, target: &Path, reporter: &mut dyn Reporter) -> io::Result<usize> {
        let content = read_buffer(&self.path)?;
        if self.copied > content.len() {
            // Cleared by someone else in the meantime
            self.copied = 0;
        }
        if content.is_empty() {
            return Ok(0);
        }

        let fresh = content.get(self.copied..).unwrap_or_default();
        if !fresh.is_empty() {
            append(target, fresh)?;
        }
        self.copied = content.len();

        match fs::write(&self.path, "") {
            Ok(()) => {
                self.copied = 0;
                if self.clear_failed.clear() {
                    reporter.info(&format!("Buffer {} can be cleared again.", self.path.display()));
                }
            },
            Err(e) => {
                if self.clear_failed.raise() {
                    reporter.error(&format!(
                        "Unable to clear buffer {} ({e}). Records already copied from it are \
                         skipped until it can be cleared.",
                        self.path.display()
                    ));
                }
            },
        }
        Ok(fresh.lines().count())
    }
}

#[cfg(unix)]
fn is_mount_point(dir: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(meta) = fs::metadata(dir) else {
        return false;
    };
    match dir.parent().map(fs::metadata) {
        Some(Ok(parent)) => meta.dev() != parent.dev() || meta.ino() == parent.ino(),
        _ => true,
    }
}

#[cfg(not(unix))]
fn is_mount_point(dir: &Path) -> bool {
    dir.is_dir()
}

impl MirrorTarget {
    fn is_present(&self) -> bool {
        self.dir.is_dir() && (!self.require_mount || is_mount_point(&self.dir))
    }
}

impl RecordWriter {
    pub fn new(config: &PersistConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).persist_error(&format!(
            "cannot create data directory {}",
            config.data_dir.display()
        ))?;

        let mirror = config.mirror_dir.as_ref().map(|dir| MirrorTarget {
            dir: dir.clone(),
            file: dir.join(&config.mirror_file),
            fallback: Backlog::new(config.data_dir.join(&config.fallback_file)),
            require_mount: config.require_mount,
        });

        Ok(Self {
            primary: config.data_dir.join(&config.primary_file),
            pending: Backlog::new(config.data_dir.join(&config.pending_file)),
            mirror,
            latest: config.data_path(&config.latest_file),
            raw: config.data_path(&config.raw_file),
            dashboard: config.data_path(&config.dashboard_file),
            heartbeat: config.data_path(&config.heartbeat_file),
            link_status: config.data_path(&config.link_status_file),
            primary_failed: Latch::new(),
            pending_failed: Latch::new(),
            mirror_missing: Latch::new(),
            mirror_failed: Latch::new(),
        })
    }

    /// Store one finalized record line (without trailing newline)
    pub fn persist(&mut self, record: &str, reporter: &mut dyn Reporter) {
        let line = format!("{record}\n");
        self.write_primary(&line, reporter);
        self.write_mirror(&line, reporter);

        if let Some(latest) = &self.latest {
            if let Err(e) = fs::write(latest, &line) {
                warn!("Cannot write latest record {}: {e}", latest.display());
            }
        }
    }

    fn write_primary(&mut self, line: &str, reporter: &mut dyn Reporter) {
        let written = self
            .pending
            .drain_into(&self.primary, reporter)
            .and_then(|flushed| {
                if flushed > 0 {
                    debug!("Flushed {flushed} pending records to {}", self.primary.display());
                }
                append(&self.primary, line)
            })
            .or_else(|e| {
                debug!("Write to {} failed ({e}), trying again", self.primary.display());
                append(&self.primary, line)
            });

        match written {
            Ok(()) => {
                if self.primary_failed.clear() {
                    reporter.info(&format!(
                        "Writing to {} works again; pending records were flushed.",
                        self.primary.display()
                    ));
                }
            },
            Err(e) => {
                if self.primary_failed.raise() {
                    reporter.error(&format!(
                        "Unable to write to {} ({e}). Storing records in {} until it recovers.",
                        self.primary.display(),
                        self.pending.path.display()
                    ));
                }
                match self.pending.append(line) {
                    Ok(()) => {
                        self.pending_failed.clear();
                    },
                    Err(e) => {
                        if self.pending_failed.raise() {
                            reporter.error(&format!(
                                "Write to pending buffer {} failed ({e}). Records are being lost.",
                                self.pending.path.display()
                            ));
                        }
                    },
                }
            },
        }
    }

    fn write_mirror(&mut self, line: &str, reporter: &mut dyn Reporter) {
        let Some(mirror) = self.mirror.as_mut() else {
            return;
        };

        if !mirror.is_present() {
            if self.mirror_missing.raise() {
                reporter.error(&format!(
                    "Removable media is not mounted at {}. Records are buffered in {} until it \
                     returns.",
                    mirror.dir.display(),
                    mirror.fallback.path.display()
                ));
            }
            if let Err(e) = mirror.fallback.append(line) {
                warn!("Cannot append to fallback {}: {e}", mirror.fallback.path.display());
            }
            return;
        }

        let result = mirror
            .fallback
            .drain_into(&mirror.file, reporter)
            .and_then(|flushed| append(&mirror.file, line).map(|()| flushed));
        match result {
            Ok(flushed) => {
                self.mirror_failed.clear();
                if self.mirror_missing.clear() {
                    reporter.info(&format!(
                        "Removable media at {} is back; {flushed} buffered records copied.",
                        mirror.dir.display()
                    ));
                }
            },
            Err(e) => {
                if self.mirror_failed.raise() {
                    reporter.error(&format!(
                        "Unable to write to removable media {} ({e}). Records are buffered \
                         locally.",
                        mirror.file.display()
                    ));
                }
                if let Err(e) = mirror.fallback.append(line) {
                    warn!("Cannot append to fallback {}: {e}", mirror.fallback.path.display());
                }
            },
        }
    }

    /// Append the raw replies of this cycle behind the record header
    pub fn write_raw(&self, header: &[String], responses: &[String]) {
        let Some(path) = &self.raw else {
            return;
        };
        let mut columns: Vec<&str> = header.iter().map(String::as_str).collect();
        columns.extend(responses.iter().map(|r| r.trim()));
        if let Err(e) = append(path, &format!("{}\n", columns.join("\t"))) {
            warn!("Cannot append raw record {}: {e}", path.display());
        }
    }

    /// Overwrite the dashboard snapshot with raw and converted values
    pub fn write_dashboard(
        &self,
        unix_time: i64,
        layout: &FieldLayout,
        store: &RawValueStore,
        labels: &[String],
        record: &[String],
    ) {
        let Some(path) = &self.dashboard else {
            return;
        };
        let mut out = format!("{unix_time}\n");
        for frame in layout.frames() {
            out.push_str(&format!("RAW\t{}\n", frame.id));
            for field in &frame.fields {
                let raw = match store.peek(field) {
                    Some(RawValue::Token(token)) => token.as_str(),
                    Some(RawValue::Error) | None => "not received",
                };
                out.push_str(&format!("{field}\t{raw}\n"));
            }
        }
        out.push_str("CVT\n");
        for (label, value) in labels.iter().zip(record) {
            out.push_str(&format!("{label}\t{value}\n"));
        }
        if let Err(e) = fs::write(path, out) {
            warn!("Cannot write dashboard snapshot {}: {e}", path.display());
        }
    }

    pub fn write_heartbeat(&self, unix_time: i64) {
        if let Some(path) = &self.heartbeat {
            if let Err(e) = fs::write(path, unix_time.to_string()) {
                warn!("Cannot write heartbeat {}: {e}", path.display());
            }
        }
    }

    pub fn write_link_status(&self, up: bool) {
        if let Some(path) = &self.link_status {
            if let Err(e) = fs::write(path, if up { "1" } else { "0" }) {
                warn!("Cannot write link status {}: {e}", path.display());
            }
        }
    }

    /// Unix time of the last persisted record, from the latest snapshot
    pub fn last_record_time(&self) -> Option<i64> {
        let content = fs::read_to_string(self.latest.as_ref()?).ok()?;
        content.split('\t').next()?.trim().parse().ok()
    }

    /// Directories whose free space housekeeping watches
    pub fn watched_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self.primary.parent().map(Path::to_path_buf).into_iter().collect();
        if let Some(mirror) = &self.mirror {
            if mirror.is_present() {
                dirs.push(mirror.dir.clone());
            }
        }
        dirs
    }

    pub fn reset_latches(&mut self) {
        self.primary_failed.reset();
        self.pending_failed.reset();
        self.mirror_missing.reset();
        self.mirror_failed.reset();
        self.pending.clear_failed.reset();
        if let Some(mirror) = self.mirror.as_mut() {
            mirror.fallback.clear_failed.reset();
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::notify::MemoryReporter;
    use chrono::Local;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> PersistConfig {
        PersistConfig {
            data_dir: dir.path().join("data"),
            mirror_dir: Some(dir.path().join("usb")),
            require_mount: false,
            ..PersistConfig::default()
        }
    }

    #[test]
    fn test_header_columns() {
        let now = Local.with_ymd_and_hms(2026, 3, 7, 14, 5, 9).unwrap();
        let header = record_header(&now);
        assert_eq!(header.len(), 7);
        assert_eq!(&header[1..], &["2026", "3", "7", "14", "5", "9"]);
    }

    #[test]
    fn test_primary_and_latest() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut writer = RecordWriter::new(&cfg).unwrap();
        let mut reporter = MemoryReporter::new();

        writer.persist("1700000000\t5", &mut reporter);
        writer.persist("1700000030\t6", &mut reporter);

        let primary = fs::read_to_string(cfg.data_dir.join("2unix")).unwrap();
        assert_eq!(primary, "1700000000\t5\n1700000030\t6\n");
        assert_eq!(writer.last_record_time(), Some(1_700_000_030));
    }

    #[test]
    fn test_primary_failure_buffers_then_flushes() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut writer = RecordWriter::new(&cfg).unwrap();
        let mut reporter = MemoryReporter::new();

        // A directory in place of the primary file makes every append fail
        let primary = cfg.data_dir.join("2unix");
        fs::create_dir(&primary).unwrap();
        writer.persist("a", &mut reporter);
        writer.persist("b", &mut reporter);
        assert_eq!(reporter.count_containing("Unable to write to"), 1);
        assert_eq!(
            fs::read_to_string(cfg.data_dir.join("2unix.pending")).unwrap(),
            "a\nb\n"
        );

        fs::remove_dir(&primary).unwrap();
        writer.persist("c", &mut reporter);
        assert_eq!(fs::read_to_string(&primary).unwrap(), "a\nb\nc\n");
        assert_eq!(reporter.count_containing("works again"), 1);
        assert_eq!(
            fs::read_to_string(cfg.data_dir.join("2unix.pending")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_mirror_fallback_flushed_when_media_returns() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let mut writer = RecordWriter::new(&cfg).unwrap();
        let mut reporter = MemoryReporter::new();

        writer.persist("a", &mut reporter);
        writer.persist("b", &mut reporter);
        assert_eq!(reporter.count_containing("Removable media is not mounted"), 1);

        fs::create_dir(dir.path().join("usb")).unwrap();
        writer.persist("c", &mut reporter);
        assert_eq!(
            fs::read_to_string(dir.path().join("usb").join("2usb")).unwrap(),
            "a\nb\nc\n"
        );
        assert_eq!(reporter.count_containing("2 buffered records copied"), 1);
    }

    #[test]
    fn test_backlog_skips_records_copied_before_failed_truncate() {
        let dir = TempDir::new().unwrap();
        let buffer = dir.path().join("2unix.pending");
        let target = dir.path().join("2unix");
        fs::write(&buffer, "a\nb\n").unwrap();
        let mut reporter = MemoryReporter::new();

        // State left by a drain that copied "a" but could not truncate
        let mut backlog = Backlog::new(buffer.clone());
        backlog.copied = 2;
        backlog.clear_failed.raise();

        assert_eq!(backlog.drain_into(&target, &mut reporter).unwrap(), 1);
        assert_eq!(fs::read_to_string(&target).unwrap(), "b\n");
        assert_eq!(fs::read_to_string(&buffer).unwrap(), "");
        assert_eq!(backlog.copied, 0);
        assert_eq!(reporter.count_containing("can be cleared again"), 1);

        // Nothing left to copy a second time
        assert_eq!(backlog.drain_into(&target, &mut reporter).unwrap(), 0);
        assert_eq!(fs::read_to_string(&target).unwrap(), "b\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_backlog_is_not_flushed_twice() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let buffer = dir.path().join("2unix.pending");
        let target = dir.path().join("2unix");
        fs::write(&buffer, "a\nb\n").unwrap();
        fs::set_permissions(&buffer, fs::Permissions::from_mode(0o444)).unwrap();
        if OpenOptions::new().write(true).open(&buffer).is_ok() {
            // Privileged user, permissions are not enforced
            return;
        }
        let mut reporter = MemoryReporter::new();
        let mut backlog = Backlog::new(buffer.clone());

        assert_eq!(backlog.drain_into(&target, &mut reporter).unwrap(), 2);
        assert_eq!(backlog.drain_into(&target, &mut reporter).unwrap(), 0);
        assert_eq!(fs::read_to_string(&target).unwrap(), "a\nb\n");
        assert_eq!(reporter.count_containing("Unable to clear buffer"), 1);
    }

    #[test]
    fn test_dashboard_snapshot() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir);
        let writer = RecordWriter::new(&cfg).unwrap();
        let layout = FieldLayout::parse("STR:B\nticks\nhv\n", "picdata.conf").unwrap();
        let mut store = RawValueStore::new();
        store.insert_frame(
            layout.frame("B").unwrap(),
            vec!["12".to_string(), "700".to_string()],
        );

        writer.write_dashboard(
            1_700_000_000,
            &layout,
            &store,
            &["ticks".to_string()],
            &["12".to_string()],
        );
        let snapshot = fs::read_to_string(cfg.data_dir.join("fordash")).unwrap();
        assert_eq!(
            snapshot,
            "1700000000\nRAW\tB\nticks\t12\nhv\t700\nCVT\nticks\t12\n"
        );
    }
}
