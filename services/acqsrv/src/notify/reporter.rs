//! Severity-routed notifications
//!
//! Every component reports through [`Reporter`]. The production
//! [`Notifier`] logs each message and spools the ones operators should
//! receive in the next digest.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::Local;
use tracing::{debug, error, info};

use super::spool::DigestSpool;
use crate::error::AcqError;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Debug => write!(f, "debug"),
            Severity::Info => write!(f, "info"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl FromStr for Severity {
    type Err = AcqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "error" => Ok(Severity::Error),
            other => Err(AcqError::config(format!("Unknown severity: {other}"))),
        }
    }
}

/// Notification sink
pub trait Reporter: Send {
    fn report(&mut self, severity: Severity, message: &str);

    fn debug(&mut self, message: &str) {
        self.report(Severity::Debug, message);
    }

    fn info(&mut self, message: &str) {
        self.report(Severity::Info, message);
    }

    fn error(&mut self, message: &str) {
        self.report(Severity::Error, message);
    }
}

/// Logs every message and spools the enabled severities
#[derive(Debug)]
pub struct Notifier {
    levels: HashSet<Severity>,
    spool: DigestSpool,
}

impl Notifier {
    pub fn new(levels: impl IntoIterator<Item = Severity>, spool: DigestSpool) -> Self {
        Self {
            levels: levels.into_iter().collect(),
            spool,
        }
    }

    /// Build from `notify.levels` strings
    pub fn from_level_names(names: &[String], spool: DigestSpool) -> crate::error::Result<Self> {
        let levels = names
            .iter()
            .map(|name| name.parse::<Severity>())
            .collect::<crate::error::Result<Vec<_>>>()?;
        Ok(Self::new(levels, spool))
    }

    pub fn spool(&self) -> &DigestSpool {
        &self.spool
    }
}

impl Reporter for Notifier {
    fn report(&mut self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => debug!("{message}"),
            Severity::Info => info!("{message}"),
            Severity::Error => error!("{message}"),
        }

        if self.levels.contains(&severity) {
            let entry = format!("{}: {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
            if let Err(e) = self.spool.append(&entry) {
                // The spool is the reporting channel, so this can only be logged
                error!("Failed to spool notification: {e}");
            }
        }
    }
}

/// Keeps every report in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    pub entries: Vec<(Severity, String)>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports at `Info` or above
    pub fn notices(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(severity, _)| *severity >= Severity::Info)
            .map(|(_, message)| message.as_str())
            .collect()
    }

    /// Notices containing `needle`
    pub fn count_containing(&self, needle: &str) -> usize {
        self.notices()
            .iter()
            .filter(|message| message.contains(needle))
            .count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Reporter for MemoryReporter {
    fn report(&mut self, severity: Severity, message: &str) {
        self.entries.push((severity, message.to_string()));
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[test]
    fn test_severity_parse() {
        assert_eq!("INFO".parse::<Severity>().unwrap(), Severity::Info);
        assert!("warn".parse::<Severity>().is_err());
        assert!(Severity::Error > Severity::Debug);
    }

    #[traced_test]
    #[test]
    fn test_notifier_spools_enabled_levels() {
        let dir = TempDir::new().unwrap();
        let spool = DigestSpool::open(dir.path().join("digest")).unwrap();
        let mut notifier =
            Notifier::from_level_names(&["info".to_string(), "error".to_string()], spool).unwrap();

        notifier.debug("polling frame B");
        notifier.error("PIC unresponsive for 5 minutes");

        let spooled = notifier.spool().peek().unwrap();
        assert!(spooled.contains("PIC unresponsive for 5 minutes"));
        assert!(!spooled.contains("polling frame B"));
        assert!(logs_contain("polling frame B"));
    }

    #[test]
    fn test_memory_reporter_filters_debug() {
        let mut reporter = MemoryReporter::new();
        reporter.debug("quiet");
        reporter.info("loud");
        assert_eq!(reporter.notices(), vec!["loud"]);
        assert_eq!(reporter.count_containing("loud"), 1);
    }
}
