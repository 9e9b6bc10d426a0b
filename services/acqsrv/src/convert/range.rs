//! Shared range policy with a sticky out-of-range latch

use rust_decimal::Decimal;

use super::descriptor::Limit;
use super::value::Value;
use crate::notify::{Latch, Reporter};

#[derive(Debug, Clone)]
pub struct RangePolicy {
    lower: Option<Limit>,
    upper: Option<Limit>,
    report_out_of_range: bool,
    suppressed: bool,
    latch: Latch,
}

impl RangePolicy {
    pub fn new(
        lower: Option<Limit>,
        upper: Option<Limit>,
        report_out_of_range: bool,
        suppressed: bool,
    ) -> Self {
        Self {
            lower,
            upper,
            report_out_of_range,
            suppressed,
            latch: Latch::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None, None, true, false)
    }

    /// Undetermined bounds disable the check entirely
    fn bounds(&self) -> Option<(Option<Decimal>, Option<Decimal>)> {
        let side = |limit: &Option<Limit>| match limit {
            None => Some(None),
            Some(Limit::Value(v)) => Some(Some(*v)),
            Some(Limit::Undetermined) => None,
        };
        Some((side(&self.lower)?, side(&self.upper)?))
    }

    /// Check one value
    ///
    /// Text, `Error`, suppressed fields and undetermined bounds pass through.
    pub fn check(&mut self, value: Value, label: &str, reporter: &mut dyn Reporter) -> Value {
        if self.suppressed {
            return value;
        }
        let Some(number) = value.as_number() else {
            return value;
        };
        let Some((lower, upper)) = self.bounds() else {
            return value;
        };

        let in_range = lower.is_none_or(|l| number >= l) && upper.is_none_or(|u| number <= u);
        if in_range {
            if self.latch.clear() {
                reporter.info(&format!(
                    "{label} range error resolved, reported value is back within bounds."
                ));
            }
            return value;
        }

        if self.latch.raise() {
            reporter.error(&format!(
                "OUT OF RANGE ERROR: {label} reported value of {number}"
            ));
        }
        if self.report_out_of_range {
            value
        } else {
            Value::Error
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn is_active(&self) -> bool {
        self.latch.is_active()
    }

    pub fn reset(&mut self) {
        self.latch.reset();
    }
}
