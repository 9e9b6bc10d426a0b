//! Per-cycle output collector

use std::collections::HashMap;

use tracing::debug;

use super::schema::OutputSchema;
use crate::convert::Value;
use crate::notify::{LatchSet, Reporter};

#[derive(Debug)]
pub struct OutputCollector {
    schema: OutputSchema,
    sentinel: String,
    values: HashMap<String, Value>,
    unrecognized: LatchSet<String>,
    unreceived: LatchSet<String>,
    unresolved: LatchSet<String>,
}

impl OutputCollector {
    pub fn new(schema: OutputSchema, sentinel: impl Into<String>) -> Self {
        Self {
            schema,
            sentinel: sentinel.into(),
            values: HashMap::new(),
            unrecognized: LatchSet::new(),
            unreceived: LatchSet::new(),
            unresolved: LatchSet::new(),
        }
    }

    /// Record a converted value
    ///
    /// Labels outside the schema are kept for derived converters but never
    /// reach the record.
    pub fn receive(&mut self, label: &str, value: Value, reporter: &mut dyn Reporter) {
        if !self.schema.contains(label) && self.unrecognized.raise(label.to_string()) {
            reporter.error(&format!(
                "Unrecognized label '{label}' is not part of the output schema; \
                 its values are not recorded."
            ));
        }
        self.values.insert(label.to_string(), value);
    }

    pub fn converted(&self, label: &str) -> Option<&Value> {
        self.values.get(label)
    }

    /// Dependency lookup for derived converters, latched per label
    pub fn lookup(&mut self, label: &str, reporter: &mut dyn Reporter) -> Option<Value> {
        match self.values.get(label) {
            Some(value) => {
                if self.unresolved.clear(label) {
                    reporter.info(&format!("Converted value for '{label}' is available again."));
                }
                Some(value.clone())
            },
            None => {
                if self.unresolved.raise(label.to_string()) {
                    reporter.error(&format!(
                        "No converted value for '{label}' this cycle; dependent values are \
                         ERROR until it returns."
                    ));
                }
                None
            },
        }
    }

    /// Values in schema order, the sentinel standing in for anything unreceived
    pub fn finalize(&mut self, reporter: &mut dyn Reporter) -> Vec<String> {
        let mut record = Vec::with_capacity(self.schema.len());
        for label in self.schema.labels() {
            match self.values.get(label) {
                Some(value) => {
                    if self.unreceived.clear(label.as_str()) {
                        reporter.info(&format!("Output label '{label}' is received again."));
                    }
                    record.push(value.render(&self.sentinel));
                },
                None => {
                    if self.unreceived.raise(label.clone()) {
                        reporter.error(&format!(
                            "No value for output label '{label}'; recorded as ERROR until it \
                             returns."
                        ));
                    } else {
                        debug!("Output label {label} still unreceived");
                    }
                    record.push(self.sentinel.clone());
                },
            }
        }
        record
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn reset_latches(&mut self) {
        self.unrecognized.reset();
        self.unreceived.reset();
        self.unresolved.reset();
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::notify::MemoryReporter;
    use rust_decimal_macros::dec;

    fn collector() -> OutputCollector {
        let schema = OutputSchema::from_labels(
            ["a", "b", "c", "d"].iter().map(|s| s.to_string()),
        )
        .unwrap();
        OutputCollector::new(schema, "-9999")
    }

    #[test]
    fn test_finalize_fills_unreceived_in_schema_order() {
        let mut c = collector();
        let mut reporter = MemoryReporter::new();
        c.receive("c", Value::Number(dec!(1.50)), &mut reporter);
        c.receive("a", Value::Text("OK".into()), &mut reporter);

        let record = c.finalize(&mut reporter);
        assert_eq!(record, vec!["OK", "-9999", "1.50", "-9999"]);
        assert_eq!(reporter.count_containing("No value for output label"), 2);

        c.clear();
        c.finalize(&mut reporter);
        assert_eq!(reporter.count_containing("No value for output label"), 4);

        c.clear();
        for label in ["a", "b", "c", "d"] {
            c.receive(label, Value::Error, &mut reporter);
        }
        assert_eq!(c.finalize(&mut reporter), vec!["-9999"; 4]);
        assert_eq!(reporter.count_containing("received again"), 4);
    }

    #[test]
    fn test_unrecognized_label_notified_once() {
        let mut c = collector();
        let mut reporter = MemoryReporter::new();
        c.receive("zz", Value::Error, &mut reporter);
        c.receive("zz", Value::Error, &mut reporter);
        assert_eq!(reporter.count_containing("Unrecognized label 'zz'"), 1);
        assert_eq!(c.converted("zz"), Some(&Value::Error));
    }

    #[test]
    fn test_lookup_latch() {
        let mut c = collector();
        let mut reporter = MemoryReporter::new();
        assert!(c.lookup("a", &mut reporter).is_none());
        assert!(c.lookup("a", &mut reporter).is_none());
        assert_eq!(reporter.count_containing("No converted value for 'a'"), 1);
        c.receive("a", Value::Error, &mut reporter);
        assert_eq!(c.lookup("a", &mut reporter), Some(Value::Error));
        assert_eq!(reporter.count_containing("available again"), 1);
    }
}
