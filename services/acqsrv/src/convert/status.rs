//! Status byte tracking
//!
//! Notifies once per distinct non-OK pattern and once when the device
//! returns to `OK`.

use crate::notify::Reporter;

pub const STATUS_OK: &str = "OK";

#[derive(Debug, Clone, Default)]
pub struct StatusWatch {
    /// Last reported non-OK description
    reported: Option<String>,
}

impl StatusWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, label: &str, description: &str, reporter: &mut dyn Reporter) {
        if description == STATUS_OK {
            if self.reported.take().is_some() {
                reporter.info(&format!("{label} status resolved, device reports OK."));
            }
            return;
        }
        if self.reported.as_deref() != Some(description) {
            reporter.error(&format!("{label} status reported: {description}"));
            self.reported = Some(description.to_string());
        }
    }

    pub fn is_active(&self) -> bool {
        self.reported.is_some()
    }

    /// Forget the last pattern so an ongoing fault is reported again
    pub fn reset(&mut self) {
        self.reported = None;
    }
}
