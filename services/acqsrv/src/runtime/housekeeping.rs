//! Daily housekeeping checks
//!
//! Due on the first cycle and then once every `cycles_per_day` cycles.

use std::path::{Path, PathBuf};

use common::system_metrics::{available_space_mb, SystemMetrics};
use tracing::debug;

use crate::core::config::HousekeepingConfig;
use crate::notify::Reporter;

#[derive(Debug)]
pub struct Housekeeping {
    config: HousekeepingConfig,
    cycles_per_day: u64,
    cycle: u64,
}

impl Housekeeping {
    pub fn new(config: HousekeepingConfig, cycles_per_day: u64) -> Self {
        Self {
            config,
            cycles_per_day: cycles_per_day.max(1),
            cycle: 0,
        }
    }

    /// Count one cycle; true when the daily checks are due
    pub fn tick(&mut self) -> bool {
        let due = self.cycle % self.cycles_per_day == 0;
        self.cycle = self.cycle.wrapping_add(1);
        due
    }

    pub fn check_bad_frames(&self, count: u64, reporter: &mut dyn Reporter) {
        if count >= self.config.bad_frame_threshold {
            reporter.info(&format!(
                "Logged {count} bad frames (unrecognized id, wrong length, or unreceived) in \
                 the last 24 hours. Probable mismatch between the PIC format and the field \
                 layout; earlier notices describe what went wrong."
            ));
        } else {
            debug!("Only {count} bad frames for the day, no warning sent");
        }
    }

    /// Free space on each directory and available memory against thresholds
    pub fn check_resources(&self, dirs: &[PathBuf], reporter: &mut dyn Reporter) {
        for dir in dirs {
            self.check_disk(dir, reporter);
        }

        let metrics = SystemMetrics::collect();
        debug!(
            "Memory: {} MB available of {} MB",
            metrics.memory_available_mb, metrics.memory_total_mb
        );
        if metrics.memory_available_mb < self.config.min_free_memory_mb {
            reporter.error(&format!(
                "Only {} MB of memory available (threshold {} MB). Performance may be \
                 impacted, corrective action recommended.",
                metrics.memory_available_mb, self.config.min_free_memory_mb
            ));
        }
    }

    fn check_disk(&self, dir: &Path, reporter: &mut dyn Reporter) {
        match available_space_mb(dir) {
            Some(free) if free < self.config.min_free_disk_mb => {
                reporter.error(&format!(
                    "{} has {free} MB remaining (threshold {} MB). Immediate corrective \
                     action recommended.",
                    dir.display(),
                    self.config.min_free_disk_mb
                ));
            },
            Some(free) => debug!("{} has {free} MB free", dir.display()),
            None => debug!("No disk found for {}", dir.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::MemoryReporter;

    #[test]
    fn test_due_on_first_cycle_then_daily() {
        let mut hk = Housekeeping::new(HousekeepingConfig::default(), 3);
        let due: Vec<bool> = (0..7).map(|_| hk.tick()).collect();
        assert_eq!(due, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn test_bad_frame_threshold() {
        let hk = Housekeeping::new(HousekeepingConfig::default(), 2880);
        let mut reporter = MemoryReporter::new();
        hk.check_bad_frames(3, &mut reporter);
        assert!(reporter.notices().is_empty());
        hk.check_bad_frames(10, &mut reporter);
        assert_eq!(reporter.count_containing("Logged 10 bad frames"), 1);
    }

    #[test]
    fn test_missing_directory_is_not_reported() {
        let config = HousekeepingConfig {
            min_free_disk_mb: u64::MAX,
            min_free_memory_mb: 0,
            ..HousekeepingConfig::default()
        };
        let hk = Housekeeping::new(config, 1);
        let mut reporter = MemoryReporter::new();
        hk.check_resources(&[PathBuf::from("/definitely/not/here")], &mut reporter);
        assert!(reporter.notices().is_empty());
    }
}
