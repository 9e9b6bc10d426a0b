//! Fixed-period cycle pacing
//!
//! Cycle N+1 is due at `start(N) + period`. An overrun starts the next cycle
//! immediately and raises the behind-schedule latch.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::notify::{Latch, Reporter};

#[derive(Debug)]
pub struct Pacer {
    period: Duration,
    started: Option<Instant>,
    behind: Latch,
}

impl Pacer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            started: None,
            behind: Latch::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn begin_cycle(&mut self, now: Instant) {
        self.started = Some(now);
    }

    /// Time to wait before the next cycle, measured at `now`
    pub fn delay_until_next(&mut self, now: Instant, reporter: &mut dyn Reporter) -> Duration {
        let Some(started) = self.started else {
            return Duration::ZERO;
        };
        let due = started + self.period;

        if now > due {
            let late = now - due;
            if self.behind.raise() {
                reporter.info(&format!(
                    "Falling behind schedule. Last cycle ended {:.1} seconds late. \
                     Corrective action recommended.",
                    late.as_secs_f64()
                ));
            } else {
                debug!("Not sleeping before next cycle, already {:?} behind", late);
            }
            return Duration::ZERO;
        }

        if self.behind.clear() {
            reporter.info("Cycles are back on schedule.");
        }
        let delay = due - now;
        debug!("Seconds to next cycle: {:.3}", delay.as_secs_f64());
        delay
    }

    pub fn reset_latches(&mut self) {
        self.behind.reset();
    }
}
