//! Output schema (`outdata.conf`)
//!
//! One label per line in record column order. `STR:` lines group labels for
//! readability and do not affect the order.

use std::collections::HashSet;
use std::path::Path;

use tracing::debug;

use crate::error::{AcqError, Result};

const GROUP_HEADER: &str = "STR:";

#[derive(Debug, Clone, Default)]
pub struct OutputSchema {
    labels: Vec<String>,
    known: HashSet<String>,
}

impl OutputSchema {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AcqError::layout(path.display().to_string(), 0, format!("unreadable: {e}"))
        })?;
        let schema = Self::parse(&content, &path.display().to_string())?;
        debug!("Loaded {} output labels from {}", schema.len(), path.display());
        Ok(schema)
    }

    pub fn parse(content: &str, source: &str) -> Result<Self> {
        let mut schema = Self::default();
        for (number, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(GROUP_HEADER) {
                continue;
            }
            if !schema.push(line) {
                return Err(AcqError::layout(
                    source,
                    number + 1,
                    format!("duplicate label {line}"),
                ));
            }
        }
        if schema.is_empty() {
            return Err(AcqError::layout(source, 0, "no output labels defined"));
        }
        Ok(schema)
    }

    pub fn from_labels(labels: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut schema = Self::default();
        for label in labels {
            if !schema.push(&label) {
                return Err(AcqError::config(format!("duplicate output label {label}")));
            }
        }
        Ok(schema)
    }

    fn push(&mut self, label: &str) -> bool {
        if !self.known.insert(label.to_string()) {
            return false;
        }
        self.labels.push(label.to_string());
        true
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn contains(&self, label: &str) -> bool {
        self.known.contains(label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_groups_ignored_for_order() {
        let schema = OutputSchema::parse(
            "# record columns\nSTR:B\ngeiger_ticks\n\nSTR:1\nTemperature_Precon\nwind_chill\n",
            "outdata.conf",
        )
        .unwrap();
        assert_eq!(
            schema.labels(),
            &["geiger_ticks", "Temperature_Precon", "wind_chill"]
        );
        assert!(schema.contains("wind_chill"));
    }

    #[test]
    fn test_duplicate_and_empty_are_fatal() {
        let err = OutputSchema::parse("a\nb\na\n", "outdata.conf").unwrap_err();
        assert!(err.to_string().contains("outdata.conf:3"));
        assert!(OutputSchema::parse("# nothing\n", "outdata.conf").is_err());
    }
}
