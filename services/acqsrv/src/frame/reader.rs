//! Frame reader
//!
//! Polls the PIC step by step, validates each reply line against the field
//! layout and fills the raw value store. Faults are reported through sticky
//! latches and never abort a cycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::layout::FieldLayout;
use super::store::RawValueStore;
use crate::core::config::{AppConfig, PollStep};
use crate::core::transport::{LinkCounters, Transport, TransportError};
use crate::error::{AcqError, Result};
use crate::notify::{Latch, LatchSet, Reporter};

const READ_CHUNK: usize = 256;

/// Link and framing parameters
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub delimiter: u8,
    pub separator: String,
    pub read_timeout: Duration,
    pub unresponsive_after: u64,
    pub connect_retry: Duration,
    pub reconnect_report_every: u64,
    pub period: Duration,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            delimiter: b'\r',
            separator: "\t".to_string(),
            read_timeout: Duration::from_secs(2),
            unresponsive_after: 30,
            connect_retry: Duration::from_secs(5),
            reconnect_report_every: 4320,
            period: Duration::from_secs(30),
        }
    }
}

impl ReaderSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            delimiter: config.serial.delimiter.bytes().next().unwrap_or(b'\r'),
            separator: config.serial.separator.clone(),
            read_timeout: config.serial.read_timeout(),
            unresponsive_after: config.serial.unresponsive_after,
            connect_retry: config.serial.connect_retry(),
            reconnect_report_every: config.serial.reconnect_report_every,
            period: config.station.period(),
        }
    }
}

/// Outcome of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Identities of accepted frames, in poll order
    pub accepted: Vec<String>,
    /// Replies with an unknown identity or a wrong length
    pub rejected: usize,
    /// Empty replies
    pub empty: usize,
    /// Whether the last reply was non-empty; `None` when nothing was polled
    pub link_up: Option<bool>,
    /// Reply lines as received
    pub responses: Vec<String>,
}

impl ValidationReport {
    pub fn is_accepted(&self, frame: &str) -> bool {
        self.accepted.iter().any(|id| id == frame)
    }
}

pub struct FrameReader {
    transport: Box<dyn Transport>,
    layout: Arc<FieldLayout>,
    polls: Vec<PollStep>,
    settings: ReaderSettings,
    identity_errors: LatchSet<String>,
    format_errors: LatchSet<String>,
    missing_frames: LatchSet<String>,
    unresponsive: Latch,
    link_down: Latch,
    consecutive_empty: u64,
    bad_frames: u64,
}

impl std::fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameReader")
            .field("transport", &self.transport.name())
            .field("polls", &self.polls.len())
            .field("bad_frames", &self.bad_frames)
            .finish()
    }
}

impl FrameReader {
    /// Every poll step must name a frame of the layout
    pub fn new(
        transport: Box<dyn Transport>,
        layout: Arc<FieldLayout>,
        polls: Vec<PollStep>,
        settings: ReaderSettings,
    ) -> Result<Self> {
        if let Some(step) = polls.iter().find(|step| layout.frame(&step.frame).is_none()) {
            return Err(AcqError::config(format!(
                "Poll step for frame {} has no layout entry",
                step.frame
            )));
        }

        Ok(Self {
            transport,
            layout,
            polls,
            settings,
            identity_errors: LatchSet::new(),
            format_errors: LatchSet::new(),
            missing_frames: LatchSet::new(),
            unresponsive: Latch::new(),
            link_down: Latch::new(),
            consecutive_empty: 0,
            bad_frames: 0,
        })
    }

    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Open the link at startup, retrying until it succeeds or `cancel` fires
    ///
    /// The second failure is reported, then every `reconnect_report_every`th.
    pub async fn connect_with_retry(
        &mut self,
        reporter: &mut dyn Reporter,
        cancel: &CancellationToken,
    ) -> bool {
        let mut failures: u64 = 0;
        loop {
            debug!("Attempting serial port connection to {}", self.transport.name());
            match self.transport.connect().await {
                Ok(()) => {
                    if failures > 1 {
                        reporter.info(&format!(
                            "Serial connection to {} successful after {failures} failed attempts.",
                            self.transport.name()
                        ));
                    }
                    info!("Serial connection successful");
                    return true;
                },
                Err(e) => {
                    failures += 1;
                    if failures == 2 || failures % self.settings.reconnect_report_every == 0 {
                        reporter.error(&format!(
                            "Failed to connect to serial port {} ({failures} attempts): {e}. \
                             Attempts continue indefinitely.",
                            self.transport.name()
                        ));
                    } else {
                        debug!("Serial connection failed: {e}");
                    }
                },
            }

            tokio::select! {
                _ = sleep(self.settings.connect_retry) => {},
                _ = cancel.cancelled() => return false,
            }
        }
    }

    /// Poll every step, validate the replies and rebuild `store`
    pub async fn poll_cycle(
        &mut self,
        store: &mut RawValueStore,
        reporter: &mut dyn Reporter,
    ) -> ValidationReport {
        store.clear();
        let mut report = ValidationReport::default();

        if self.ensure_link(reporter).await {
            let polls = self.polls.clone();
            for step in &polls {
                match self.poll_step(step).await {
                    Ok(line) => self.validate(step, &line, store, reporter, &mut report),
                    Err(e) => {
                        if self.link_down.raise() {
                            reporter.error(&format!(
                                "Serial link lost while polling frame {}: {e}. \
                                 Reconnecting at each cycle.",
                                step.frame
                            ));
                        }
                        let _ = self.transport.disconnect().await;
                        break;
                    },
                }
            }
        }

        self.backfill_missing(store, &report, reporter);
        report
    }

    /// Write an injected command to the PIC
    pub async fn relay(&mut self, command: &str) -> std::result::Result<(), TransportError> {
        self.transport.send(command.as_bytes()).await?;
        debug!("Sent {command} to PIC");
        Ok(())
    }

    pub async fn link_counters(&self) -> LinkCounters {
        self.transport.counters().await
    }

    /// Rejected and empty replies since the last reset
    ///
    /// The run of consecutive empty replies is kept across resets.
    pub fn bad_frame_count(&mut self, reset: bool) -> u64 {
        let count = self.bad_frames;
        if reset {
            self.bad_frames = 0;
        }
        count
    }

    /// Daily reset of every sticky flag
    pub fn reset_latches(&mut self) {
        self.identity_errors.reset();
        self.format_errors.reset();
        self.missing_frames.reset();
        self.unresponsive.reset();
        self.link_down.reset();
    }

    /// Reconnect at the cycle boundary when the link was dropped
    async fn ensure_link(&mut self, reporter: &mut dyn Reporter) -> bool {
        if self.transport.is_connected().await {
            return true;
        }
        match self.transport.connect().await {
            Ok(()) => {
                if self.link_down.clear() {
                    reporter.info(&format!(
                        "Serial link to {} re-established.",
                        self.transport.name()
                    ));
                }
                true
            },
            Err(e) => {
                if self.link_down.raise() {
                    reporter.error(&format!(
                        "Serial link to {} is down: {e}. Reconnecting at each cycle.",
                        self.transport.name()
                    ));
                } else {
                    debug!("Reconnect failed: {e}");
                }
                false
            },
        }
    }

    async fn poll_step(&mut self, step: &PollStep) -> std::result::Result<String, TransportError> {
        for command in &step.commands {
            self.transport.send(command.as_bytes()).await?;
        }
        if !step.settle().is_zero() {
            sleep(step.settle()).await;
        }
        self.read_line().await
    }

    /// Read up to the delimiter or the read timeout
    async fn read_line(&mut self) -> std::result::Result<String, TransportError> {
        let deadline = Instant::now() + self.settings.read_timeout;
        let mut line: Vec<u8> = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.transport.receive(&mut chunk, Some(remaining)).await {
                Ok(0) => break,
                Ok(n) => {
                    line.extend_from_slice(&chunk[..n]);
                    if let Some(end) = line.iter().position(|&b| b == self.settings.delimiter) {
                        if end + 1 < line.len() {
                            debug!("Discarding {} bytes after delimiter", line.len() - end - 1);
                        }
                        line.truncate(end);
                        break;
                    }
                },
                Err(TransportError::Timeout(_)) => break,
                Err(e) => return Err(e),
            }
        }

        let text = String::from_utf8_lossy(&line);
        Ok(text.trim_matches(|c| c == '\r' || c == '\n').to_string())
    }

    fn validate(
        &mut self,
        step: &PollStep,
        line: &str,
        store: &mut RawValueStore,
        reporter: &mut dyn Reporter,
        report: &mut ValidationReport,
    ) {
        report.responses.push(line.to_string());

        if line.is_empty() {
            self.record_empty(reporter, report);
            return;
        }

        report.link_up = Some(true);
        if self.unresponsive.clear() {
            reporter.error(&format!(
                "Received string from PIC after {} consecutive missed strings.",
                self.consecutive_empty
            ));
        }
        self.consecutive_empty = 0;

        let mut tokens = line.split(self.settings.separator.as_str());
        let identity = tokens.next().unwrap_or_default().to_string();
        let payload: Vec<String> = tokens.map(str::to_string).collect();

        let Some(spec) = self.layout.frame(&identity) else {
            self.bad_frames += 1;
            report.rejected += 1;
            if self.identity_errors.raise(step.frame.clone()) {
                reporter.error(&format!(
                    "Received unexpected string from PIC starting with {identity} \
                     (polling frame {}). Assume the error continues until intervention.",
                    step.frame
                ));
            } else {
                debug!("Received bad string from PIC starting with {identity}");
            }
            return;
        };

        if payload.len() != spec.expected_count() {
            self.bad_frames += 1;
            report.rejected += 1;
            if self.format_errors.raise(identity.clone()) {
                reporter.info(&format!(
                    "Received bad string from PIC: {} fields instead of {} fields in string \
                     {identity}. Assume the error continues until intervention.",
                    payload.len(),
                    spec.expected_count()
                ));
            } else {
                debug!(
                    "Received bad string from PIC: {} fields instead of {}",
                    payload.len(),
                    spec.expected_count()
                );
            }
            return;
        }

        store.insert_frame(spec, payload);
        debug!("String {identity} accepted");
        if self.identity_errors.clear(step.frame.as_str()) {
            reporter.info(&format!(
                "Polling frame {} returns a recognized string again.",
                step.frame
            ));
        }
        if self.format_errors.clear(identity.as_str()) {
            reporter.info(&format!("String {identity} has the expected format again."));
        }
        report.accepted.push(identity);
    }

    fn record_empty(&mut self, reporter: &mut dyn Reporter, report: &mut ValidationReport) {
        self.bad_frames += 1;
        self.consecutive_empty += 1;
        report.empty += 1;
        report.link_up = Some(false);
        debug!("Received empty string from PIC");

        // After a daily latch reset an outage still in progress is reported again
        if self.consecutive_empty >= self.settings.unresponsive_after && self.unresponsive.raise() {
            reporter.error(&format!(
                "PIC has been unresponsive for {} minutes.",
                self.unresponsive_minutes()
            ));
        }
    }

    /// Downtime implied by the current run of empty replies
    fn unresponsive_minutes(&self) -> u64 {
        let frames = self.polls.len().max(1) as u64;
        self.consecutive_empty * self.settings.period.as_secs() / frames / 60
    }

    fn backfill_missing(
        &mut self,
        store: &mut RawValueStore,
        report: &ValidationReport,
        reporter: &mut dyn Reporter,
    ) {
        for spec in self.layout.frames() {
            if report.is_accepted(&spec.id) {
                if self.missing_frames.clear(spec.id.as_str()) {
                    reporter.info(&format!("Received previously missing frame {}.", spec.id));
                }
                continue;
            }
            store.backfill(spec);
            if self.missing_frames.raise(spec.id.clone()) {
                reporter.error(&format!(
                    "Frame {} not received; its fields are recorded as ERROR until it returns.",
                    spec.id
                ));
            } else {
                warn!("Frame {} still missing", spec.id);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::transport::MockTransport;
    use crate::frame::store::RawValue;
    use crate::notify::MemoryReporter;

    const LAYOUT: &str = "STR:B\na\nb\nc\nSTR:1\nx\n";

    fn step(frame: &str, command: &str) -> PollStep {
        PollStep {
            frame: frame.to_string(),
            commands: vec![command.to_string()],
            settle_ms: 0,
        }
    }

    async fn reader(mock: &MockTransport) -> FrameReader {
        let layout = Arc::new(FieldLayout::parse(LAYOUT, "test").unwrap());
        let settings = ReaderSettings {
            read_timeout: Duration::from_millis(200),
            unresponsive_after: 2,
            connect_retry: Duration::from_millis(1),
            ..Default::default()
        };
        let mut transport = mock.clone();
        transport.connect().await.unwrap();
        FrameReader::new(
            Box::new(transport),
            layout,
            vec![step("B", "SS"), step("1", "11")],
            settings,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_accepts_well_formed_frames() {
        let mock = MockTransport::default();
        mock.respond_to("SS", "B\t1\t2\t3\r").await;
        mock.respond_to("11", "1\t42\r").await;
        let mut reader = reader(&mock).await;
        let mut store = RawValueStore::new();
        let mut reporter = MemoryReporter::new();

        let report = reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(report.accepted, vec!["B", "1"]);
        assert_eq!(report.link_up, Some(true));
        assert_eq!(store.peek("c"), Some(&RawValue::Token("3".to_string())));
        assert_eq!(store.peek("x"), Some(&RawValue::Token("42".to_string())));
        assert!(reporter.notices().is_empty());
        assert_eq!(mock.sent_commands().await, vec!["SS", "11"]);
        assert_eq!(reader.link_counters().await.bytes_sent, 4);
    }

    #[tokio::test]
    async fn test_wrong_length_rejected_and_backfilled() {
        let mock = MockTransport::default();
        mock.respond_to("SS", "B\t1\t2\r").await;
        mock.respond_to("11", "1\t42\r").await;
        let mut reader = reader(&mock).await;
        let mut store = RawValueStore::new();
        let mut reporter = MemoryReporter::new();

        let report = reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(report.rejected, 1);
        assert_eq!(store.peek("a"), Some(&RawValue::Error));
        assert_eq!(reporter.count_containing("2 fields instead of 3"), 1);
        assert_eq!(reporter.count_containing("Frame B not received"), 1);

        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(reporter.count_containing("fields instead of"), 1);
        assert_eq!(reader.bad_frame_count(true), 2);
        assert_eq!(reader.bad_frame_count(false), 0);
    }

    #[tokio::test]
    async fn test_unknown_identity_latched_per_step() {
        let mock = MockTransport::default();
        mock.respond_to("SS", "Z\t1\t2\t3\r").await;
        mock.respond_to("11", "1\t42\r").await;
        let mut reader = reader(&mock).await;
        let mut store = RawValueStore::new();
        let mut reporter = MemoryReporter::new();

        reader.poll_cycle(&mut store, &mut reporter).await;
        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(reporter.count_containing("unexpected string from PIC starting with Z"), 1);

        mock.respond_to("SS", "B\t1\t2\t3\r").await;
        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(reporter.count_containing("recognized string again"), 1);
        assert_eq!(reporter.count_containing("previously missing frame B"), 1);
    }

    #[tokio::test]
    async fn test_unresponsive_pic_alert_and_recovery() {
        let mock = MockTransport::default();
        mock.respond_to("11", "1\t42\r").await;
        let mut reader = reader(&mock).await;
        let mut store = RawValueStore::new();
        let mut reporter = MemoryReporter::new();

        let report = reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(report.empty, 1);
        assert_eq!(report.link_up, Some(true));

        // "11" answering resets the run, so silence both
        mock.forget("11").await;
        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(reporter.count_containing("PIC has been unresponsive"), 1);
        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(reporter.count_containing("PIC has been unresponsive"), 1);

        mock.respond_to("SS", "B\t1\t2\t3\r").await;
        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(reporter.count_containing("consecutive missed strings"), 1);
    }

    #[tokio::test]
    async fn test_daily_reset_keeps_missed_string_run() {
        let mock = MockTransport::default();
        let mut reader = reader(&mock).await;
        let mut store = RawValueStore::new();
        let mut reporter = MemoryReporter::new();

        reader.poll_cycle(&mut store, &mut reporter).await;
        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(reporter.count_containing("PIC has been unresponsive"), 1);

        // Daily housekeeping in the middle of the outage
        assert_eq!(reader.bad_frame_count(true), 4);
        reader.reset_latches();
        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(reporter.count_containing("PIC has been unresponsive"), 2);
        assert_eq!(reader.bad_frame_count(false), 2);

        mock.respond_to("SS", "B\t1\t2\t3\r").await;
        reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(
            reporter.count_containing("after 6 consecutive missed strings"),
            1
        );
    }

    #[tokio::test]
    async fn test_link_loss_reconnects_next_cycle() {
        let mock = MockTransport::default();
        mock.respond_to("SS", "B\t1\t2\t3\r").await;
        mock.respond_to("11", "1\t42\r").await;
        let mut reader = reader(&mock).await;
        let mut store = RawValueStore::new();
        let mut reporter = MemoryReporter::new();

        mock.set_send_failure(true).await;
        let report = reader.poll_cycle(&mut store, &mut reporter).await;
        assert!(report.accepted.is_empty());
        assert_eq!(report.link_up, None);
        assert_eq!(reporter.count_containing("Serial link lost"), 1);
        assert_eq!(store.peek("x"), Some(&RawValue::Error));

        mock.set_send_failure(false).await;
        let report = reader.poll_cycle(&mut store, &mut reporter).await;
        assert_eq!(report.accepted.len(), 2);
        assert_eq!(reporter.count_containing("re-established"), 1);
    }

    #[tokio::test]
    async fn test_connect_with_retry_reports_second_failure() {
        let mock = MockTransport::default();
        mock.fail_next_connects(3).await;
        let layout = Arc::new(FieldLayout::parse(LAYOUT, "test").unwrap());
        let settings = ReaderSettings {
            connect_retry: Duration::from_millis(1),
            ..Default::default()
        };
        let mut reader =
            FrameReader::new(Box::new(mock.clone()), layout, vec![step("B", "SS")], settings)
                .unwrap();
        let mut reporter = MemoryReporter::new();

        assert!(reader.connect_with_retry(&mut reporter, &CancellationToken::new()).await);
        assert_eq!(reporter.count_containing("Failed to connect"), 1);
        assert_eq!(reporter.count_containing("successful after 3 failed attempts"), 1);
    }

    #[test]
    fn test_poll_step_must_exist_in_layout() {
        let layout = Arc::new(FieldLayout::parse(LAYOUT, "test").unwrap());
        let result = FrameReader::new(
            Box::new(MockTransport::default()),
            layout,
            vec![step("9", "99")],
            ReaderSettings::default(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_relay_writes_command() {
        let mock = MockTransport::default();
        let mut reader = reader(&mock).await;
        reader.relay("RESETRAIN").await.unwrap();
        assert_eq!(mock.sent_commands().await, vec!["RESETRAIN"]);
    }
}
