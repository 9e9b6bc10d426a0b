//! Shared fixtures for acqsrv integration tests

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use acqsrv::core::config::{AppConfig, PollStep};
use acqsrv::core::transport::MockTransport;
use acqsrv::notify::{AlertSender, Digest, NotifyError};
use acqsrv::Station;
use async_trait::async_trait;
use tempfile::TempDir;

pub const LAYOUT: &str = "\
# test layout
STR:B
geiger_ticks
geiger_high_volts
geiger_current
geiger_temperature
geiger_status
geiger_burst_count
geiger_burst_time
vortex_avg_speed
vortex_wind_gust
STR:2
Temperature_Precon
";

pub const SCHEMA: &str = "\
geiger_ticks
geiger_high_volts
geiger_status
vortex_avg_speed
Temperature_Precon
wind_chill
";

pub const CATALOG: &str = r#"
converters:
  - label: geiger_ticks
    formula: { kind: integer }
    lower: 5
    upper: 2000
    precision: 0
  - label: geiger_high_volts
    formula: { kind: affine, multiply: 1250, divide: 1024 }
    lower: 800
    upper: 900
    precision: 1
  - label: geiger_status
    formula:
      kind: bitmask
      bits:
        - { bit: 0, text: "under voltage" }
        - { bit: 1, text: "over voltage" }
    precision: n/a
  - label: vortex_avg_speed
    formula: { kind: affine, multiply: 25, divide: 600 }
    lower: 0
    upper: 120
    precision: 0
  - label: Temperature_Precon
    formula: { kind: decimal }
    lower: -30
    upper: 120
    precision: 2
  - label: wind_chill
    formula:
      kind: wind_chill
      wind: vortex_avg_speed
      temperature: Temperature_Precon
      model: nws2001
    lower: -120
    upper: 120
    precision: 2
"#;

/// Nine payload tokens, all in range
pub const GOOD_B: &str = "B\t100\t700\t300\t750\t0\t3\t5\t240\t300\r";
pub const GOOD_2: &str = "2\t20.5\r";

/// Keeps every digest it is handed
#[derive(Default)]
pub struct RecordingSender {
    digests: Mutex<Vec<Digest>>,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn body(&self) -> String {
        self.digests
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.body.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of notices containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.body().lines().filter(|l| l.contains(needle)).count()
    }
}

#[async_trait]
impl AlertSender for RecordingSender {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, digest: &Digest) -> Result<(), NotifyError> {
        self.digests.lock().unwrap().push(digest.clone());
        Ok(())
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub config: AppConfig,
    pub transport: MockTransport,
    pub sender: Arc<RecordingSender>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_tables(LAYOUT, SCHEMA, CATALOG)
    }

    pub fn with_tables(layout: &str, schema: &str, catalog: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join("picdata.conf"), layout).unwrap();
        fs::write(root.join("outdata.conf"), schema).unwrap();
        fs::write(root.join("converters.yaml"), catalog).unwrap();

        let mut config = AppConfig::default();
        config.station.name = "test".to_string();
        config.serial.read_timeout_ms = 50;
        config.serial.polls = vec![step("B", "SS"), step("2", "22")];
        config.files.layout = root.join("picdata.conf");
        config.files.schema = root.join("outdata.conf");
        config.files.catalog = root.join("converters.yaml");
        config.persist.data_dir = root.join("data");
        config.notify.spool_file = root.join("data").join("digest.spool");
        config.commands.queue_file = Some(root.join("commands"));
        config.housekeeping.min_free_disk_mb = 0;
        config.housekeeping.min_free_memory_mb = 0;
        config.validate().unwrap();

        Self {
            dir,
            config,
            transport: MockTransport::new("mock-pic"),
            sender: RecordingSender::new(),
        }
    }

    pub fn build(&self) -> Station {
        Station::build(
            self.config.clone(),
            Box::new(self.transport.clone()),
            self.sender.clone(),
        )
        .unwrap()
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.dir.path().join("data").join(name)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Columns of the last primary record
    pub fn last_record(&self) -> Vec<String> {
        let content = fs::read_to_string(self.data_file("2unix")).unwrap();
        content
            .lines()
            .last()
            .unwrap()
            .split('\t')
            .map(str::to_string)
            .collect()
    }

    pub fn record_count(&self) -> usize {
        fs::read_to_string(self.data_file("2unix"))
            .map(|c| c.lines().count())
            .unwrap_or(0)
    }
}

fn step(frame: &str, command: &str) -> PollStep {
    PollStep {
        frame: frame.to_string(),
        commands: vec![command.to_string()],
        settle_ms: 0,
    }
}

/// Record columns start after the seven time header columns
pub const HEADER_COLUMNS: usize = 7;
