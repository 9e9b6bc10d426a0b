//! Acquisition main loop
//!
//! One `Station` owns every stateful component. Each cycle polls the PIC,
//! converts the replies, persists one record, relays queued commands and
//! hands pending notices to the digest dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, Local, Utc};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::commands::CommandQueue;
use super::housekeeping::Housekeeping;
use super::scheduler::Pacer;
use crate::convert::{ConverterCatalog, ConverterRegistry, ConverterSpec, CycleContext};
use crate::core::config::AppConfig;
use crate::core::transport::Transport;
use crate::error::{AcqError, Result};
use crate::frame::{FieldLayout, FrameReader, RawValueStore, ReaderSettings};
use crate::notify::{
    AlertSender, DigestDispatcher, DigestSpool, Latch, Notifier, Reporter, Severity,
};
use crate::output::{record_header, OutputCollector, OutputSchema, RecordWriter};

/// Best effort: spool the fatal message and send the spool under the usual timeout
async fn report_fatal(config: &AppConfig, sender: Arc<dyn AlertSender>, err: &AcqError) {
    let spool = match DigestSpool::open(&config.notify.spool_file) {
        Ok(spool) => spool,
        Err(e) => {
            error!("Cannot open digest spool for fatal notice: {e}");
            return;
        },
    };
    // The level list may be what failed, so spool errors unconditionally
    let mut notifier = Notifier::new([Severity::Error], spool);
    notifier.error(&format!("FATAL: acquisition cannot start: {err}"));

    let mut dispatcher = DigestDispatcher::new(
        sender,
        config.station.name.clone(),
        config.notify.subject.clone(),
        config.notify.send_timeout(),
    );
    dispatcher.flush(&mut notifier).await;
}

/// Load the field layout, output schema and converter catalog, and check
/// that every raw field the catalog names exists in the layout
pub fn load_tables(config: &AppConfig) -> Result<(Arc<FieldLayout>, OutputSchema, Vec<ConverterSpec>)> {
    let layout = FieldLayout::load(&config.files.layout)?;
    let schema = OutputSchema::load(&config.files.schema)?;
    let catalog = ConverterCatalog::load(&config.files.catalog)?;
    catalog.check_layout(&layout)?;
    Ok((Arc::new(layout), schema, catalog.into_specs()))
}

pub struct Station {
    config: AppConfig,
    reader: FrameReader,
    store: RawValueStore,
    registry: ConverterRegistry,
    collector: OutputCollector,
    writer: RecordWriter,
    notifier: Notifier,
    dispatcher: DigestDispatcher,
    pacer: Pacer,
    housekeeping: Housekeeping,
    commands: Option<CommandQueue>,
    command_error: Latch,
}

impl std::fmt::Debug for Station {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Station")
            .field("name", &self.config.station.name)
            .field("converters", &self.registry.len())
            .field("reader", &self.reader)
            .finish()
    }
}

impl Station {
    pub fn build(
        config: AppConfig,
        transport: Box<dyn Transport>,
        sender: Arc<dyn AlertSender>,
    ) -> Result<Self> {
        let (layout, schema, specs) = load_tables(&config)?;
        let registry = ConverterRegistry::new(specs)?;
        info!(
            "Loaded {} frames, {} output labels, {} converters",
            layout.frames().len(),
            schema.len(),
            registry.len()
        );

        let reader = FrameReader::new(
            transport,
            layout,
            config.serial.polls.clone(),
            ReaderSettings::from_config(&config),
        )?;
        let collector = OutputCollector::new(schema, config.station.error_sentinel.clone());
        let writer = RecordWriter::new(&config.persist)?;

        let spool = DigestSpool::open(&config.notify.spool_file)?;
        let notifier = Notifier::from_level_names(&config.notify.levels, spool)?;
        let dispatcher = DigestDispatcher::new(
            sender,
            config.station.name.clone(),
            config.notify.subject.clone(),
            config.notify.send_timeout(),
        );

        let commands = config
            .commands
            .queue_file
            .as_ref()
            .map(|path| CommandQueue::new(path, &config.commands.announce_sources));

        Ok(Self {
            pacer: Pacer::new(config.station.period()),
            housekeeping: Housekeeping::new(
                config.housekeeping.clone(),
                config.station.cycles_per_day(),
            ),
            reader,
            store: RawValueStore::new(),
            registry,
            collector,
            writer,
            notifier,
            dispatcher,
            commands,
            command_error: Latch::new(),
            config,
        })
    }

    /// Build, or on failure mail the fatal error before handing it back
    ///
    /// Whatever a previous run left in the spool goes out in the same digest.
    pub async fn start(
        config: AppConfig,
        transport: Box<dyn Transport>,
        sender: Arc<dyn AlertSender>,
    ) -> Result<Self> {
        match Self::build(config.clone(), transport, Arc::clone(&sender)) {
            Ok(station) => Ok(station),
            Err(e) => {
                report_fatal(&config, sender, &e).await;
                Err(e)
            },
        }
    }

    pub fn store(&self) -> &RawValueStore {
        &self.store
    }

    pub fn collector(&self) -> &OutputCollector {
        &self.collector
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// Run cycles until `cancel` fires, then flush pending notices
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        self.dispatcher.send_leftover(&mut self.notifier);
        self.report_downtime();

        let startup = Duration::from_secs(self.config.station.startup_delay_secs);
        if !startup.is_zero() {
            debug!("Waiting {startup:?} before opening the serial link");
            tokio::select! {
                _ = sleep(startup) => {},
                _ = cancel.cancelled() => return self.stop().await,
            }
        }

        if !self
            .reader
            .connect_with_retry(&mut self.notifier, &cancel)
            .await
        {
            return self.stop().await;
        }

        info!(
            "Acquisition started for {} (period {:?})",
            self.config.station.name,
            self.pacer.period()
        );
        loop {
            self.pacer.begin_cycle(Instant::now());
            self.cycle().await;

            let delay = self.pacer.delay_until_next(Instant::now(), &mut self.notifier);
            tokio::select! {
                _ = sleep(delay) => {},
                _ = cancel.cancelled() => break,
            }
        }

        self.stop().await
    }

    /// One acquisition cycle
    ///
    /// Daily housekeeping runs first, so latches raised during a cycle
    /// always survive until the next one.
    pub async fn cycle(&mut self) {
        if self.housekeeping.tick() {
            self.daily().await;
        }

        let header = self.record_header();
        let unix_time = header
            .first()
            .and_then(|t| t.parse::<i64>().ok())
            .unwrap_or_default();
        self.writer.write_heartbeat(unix_time);

        let report = self.reader.poll_cycle(&mut self.store, &mut self.notifier).await;
        if let Some(up) = report.link_up {
            self.writer.write_link_status(up);
        }
        self.writer.write_raw(&header, &report.responses);
        debug!(
            "Frames accepted: {:?}, rejected: {}, empty: {}",
            report.accepted, report.rejected, report.empty
        );

        self.collector.clear();
        let errors = {
            let mut ctx = CycleContext {
                store: &mut self.store,
                collector: &mut self.collector,
                reporter: &mut self.notifier,
            };
            self.registry.process_all(&mut ctx)
        };
        if errors > 0 {
            debug!("{errors} converters produced ERROR this cycle");
        }

        let values = self.collector.finalize(&mut self.notifier);
        let mut columns = header;
        columns.extend(values.iter().cloned());
        self.writer.persist(&columns.join("\t"), &mut self.notifier);
        self.writer.write_dashboard(
            unix_time,
            self.reader.layout(),
            &self.store,
            self.collector.schema().labels(),
            &values,
        );

        self.relay_commands().await;

        self.dispatcher.dispatch(&mut self.notifier);
    }

    fn record_header(&self) -> Vec<String> {
        let now = Utc::now();
        match self
            .config
            .station
            .utc_offset_hours
            .and_then(|hours| FixedOffset::east_opt(hours * 3600))
        {
            Some(offset) => record_header(&now.with_timezone(&offset)),
            None => record_header(&now.with_timezone(&Local)),
        }
    }

    async fn relay_commands(&mut self) {
        let Some(queue) = &self.commands else {
            return;
        };
        let queued = match queue.drain() {
            Ok(queued) => {
                if self.command_error.clear() {
                    self.notifier
                        .info(&format!("Command queue {} readable again.", queue.path().display()));
                }
                queued
            },
            Err(e) => {
                if self.command_error.raise() {
                    self.notifier.error(&format!(
                        "Unable to read command queue {}: {e}",
                        queue.path().display()
                    ));
                }
                return;
            },
        };

        for cmd in queued {
            let announce = queue.announces(&cmd.source);
            match self.reader.relay(&cmd.command).await {
                Ok(()) => {
                    let message = format!(
                        "Sent command {} from source {} to PIC.",
                        cmd.command, cmd.source
                    );
                    if announce {
                        self.notifier.info(&message);
                    } else {
                        self.notifier.debug(&message);
                    }
                },
                Err(e) => self.notifier.error(&format!(
                    "Failed to send command {} from source {} to PIC: {e}",
                    cmd.command, cmd.source
                )),
            }
        }
    }

    async fn daily(&mut self) {
        debug!("Running daily housekeeping");
        info!("Serial link: {}", self.reader.link_counters().await);
        let bad = self.reader.bad_frame_count(true);
        self.housekeeping.check_bad_frames(bad, &mut self.notifier);

        self.reader.reset_latches();
        self.store.reset_latches();
        self.registry.reset_all(&mut self.notifier);
        self.collector.reset_latches();
        self.writer.reset_latches();
        self.pacer.reset_latches();
        self.command_error.reset();

        self.housekeeping
            .check_resources(&self.writer.watched_dirs(), &mut self.notifier);
        self.registry.report_undetermined(&mut self.notifier);
    }

    fn report_downtime(&mut self) {
        let Some(last) = self.writer.last_record_time() else {
            return;
        };
        let down = Utc::now().timestamp() - last;
        if down < 0 {
            warn!("Last record is {} seconds in the future", -down);
            return;
        }
        self.notifier
            .info(&format!("Restarting after {} minutes of downtime.", down / 60));
    }

    /// Wait for the running delivery, then send whatever is still spooled
    pub async fn flush_notices(&mut self) {
        self.dispatcher.flush(&mut self.notifier).await;
    }

    async fn stop(mut self) -> Result<()> {
        self.notifier
            .info(&format!("{} acquisition stopping.", self.config.station.name));
        self.flush_notices().await;
        info!("Shutdown complete");
        Ok(())
    }
}
