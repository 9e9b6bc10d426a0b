//! Generic converter
//!
//! Every output label is one `Converter` driven by its [`ConverterSpec`].
//! `safe_convert` never fails: formula faults become `Value::Error` behind a
//! sticky process latch, and missing inputs propagate as `Value::Error`
//! without a process notice (the store or collector already reported them).

use std::collections::HashMap;

use station_calc::round_half_even;
use tracing::debug;

use super::descriptor::{ConverterSpec, Precision};
use super::formula::FormulaError;
use super::range::RangePolicy;
use super::status::StatusWatch;
use super::value::Value;
use crate::frame::{RawValue, RawValueStore};
use crate::notify::{Latch, Reporter};
use crate::output::OutputCollector;

/// Collaborators for one cycle, injected by the caller
pub struct CycleContext<'a> {
    pub store: &'a mut RawValueStore,
    pub collector: &'a mut OutputCollector,
    pub reporter: &'a mut dyn Reporter,
}

#[derive(Debug)]
pub struct Converter {
    spec: ConverterSpec,
    range: RangePolicy,
    process: Latch,
    status: StatusWatch,
    hook: Latch,
    last: Option<Value>,
}

impl Converter {
    pub fn new(spec: ConverterSpec) -> Self {
        let range = RangePolicy::new(
            spec.lower,
            spec.upper,
            spec.report_out_of_range,
            spec.suppress_range_check,
        );
        Self {
            spec,
            range,
            process: Latch::new(),
            status: StatusWatch::new(),
            hook: Latch::new(),
            last: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.spec.label
    }

    pub fn spec(&self) -> &ConverterSpec {
        &self.spec
    }

    pub fn last_value(&self) -> Option<&Value> {
        self.last.as_ref()
    }

    pub fn has_process_error(&self) -> bool {
        self.process.is_active()
    }

    pub fn has_range_error(&self) -> bool {
        self.range.is_active()
    }

    /// Convert this cycle's value and hand it to the collector
    pub fn safe_convert(&mut self, ctx: &mut CycleContext<'_>) -> Value {
        let label = self.spec.label.clone();

        let value = match self.compute(ctx) {
            Ok(Value::Error) => {
                debug!("{label}: input unavailable, emitting ERROR");
                Value::Error
            },
            Ok(value) => {
                if self.process.clear() {
                    ctx.reporter
                        .info(&format!("{label} process error resolved."));
                }
                value
            },
            Err(e) => {
                if self.process.raise() {
                    ctx.reporter.error(&format!(
                        "PROCESS ERROR: {label} unable to process received data ({e}). \
                         Assume the error continues until otherwise notified."
                    ));
                } else {
                    debug!("{label}: process error persists: {e}");
                }
                Value::Error
            },
        };

        let value = self.round(value);
        let value = self.range.check(value, &label, ctx.reporter);

        if self.spec.formula.is_status() {
            if let Value::Text(description) = &value {
                self.status.observe(&label, description, ctx.reporter);
            }
        }

        ctx.collector.receive(&label, value.clone(), ctx.reporter);
        self.run_hook(&value, ctx.reporter);
        self.last = Some(value.clone());
        value
    }

    fn compute(&self, ctx: &mut CycleContext<'_>) -> Result<Value, FormulaError> {
        let mut tokens: Vec<String> = Vec::new();
        let mut unavailable = false;
        for field in self.spec.raw_fields() {
            match ctx.store.get(field, ctx.reporter) {
                Ok(RawValue::Token(token)) => tokens.push(token),
                Ok(RawValue::Error) | Err(_) => unavailable = true,
            }
        }

        let mut resolved: HashMap<&str, Value> = HashMap::new();
        for dependency in self.spec.dependencies() {
            if let Some(value) = ctx.collector.lookup(dependency, ctx.reporter) {
                resolved.insert(dependency, value);
            }
        }

        if unavailable {
            return Ok(Value::Error);
        }

        let raw: Vec<&str> = tokens.iter().map(String::as_str).collect();
        let converted = |label: &str| resolved.get(label).cloned();
        self.spec.formula.evaluate(&raw, &converted)
    }

    fn round(&self, value: Value) -> Value {
        match (value, self.spec.precision) {
            (Value::Number(n), Precision::Digits(digits)) => {
                let mut rounded = round_half_even(n, digits);
                rounded.rescale(digits);
                Value::Number(rounded)
            },
            (value, _) => value,
        }
    }

    fn run_hook(&mut self, value: &Value, reporter: &mut dyn Reporter) {
        let (Some(hook), Some(number)) = (&self.spec.hook, value.as_number()) else {
            return;
        };
        if hook.triggered(number) {
            if self.hook.raise() {
                reporter.error(&hook.render(&self.spec.label, &number));
            }
        } else if self.hook.clear() {
            reporter.info(&format!(
                "{} back within alert thresholds at {number}.",
                self.spec.label
            ));
        }
    }

    /// Daily reset; every latch returns to quiet without recovery notices
    pub fn reset(&mut self) {
        self.process.reset();
        self.range.reset();
        self.status.reset();
        self.hook.reset();
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::convert::formula::Formula;
    use crate::frame::FrameSpec;
    use crate::notify::MemoryReporter;
    use crate::output::OutputSchema;
    use rust_decimal_macros::dec;

    struct Harness {
        store: RawValueStore,
        collector: OutputCollector,
        reporter: MemoryReporter,
    }

    impl Harness {
        fn new(labels: &[&str]) -> Self {
            let schema = OutputSchema::from_labels(labels.iter().map(|l| l.to_string())).unwrap();
            Self {
                store: RawValueStore::new(),
                collector: OutputCollector::new(schema, "-9999"),
                reporter: MemoryReporter::new(),
            }
        }

        fn feed(&mut self, fields: &[&str], tokens: &[&str]) {
            self.store.clear();
            self.collector.clear();
            let frame = FrameSpec {
                id: "B".to_string(),
                fields: fields.iter().map(|f| f.to_string()).collect(),
            };
            assert!(self
                .store
                .insert_frame(&frame, tokens.iter().map(|t| t.to_string()).collect()));
        }

        fn convert(&mut self, converter: &mut Converter) -> Value {
            let mut ctx = CycleContext {
                store: &mut self.store,
                collector: &mut self.collector,
                reporter: &mut self.reporter,
            };
            converter.safe_convert(&mut ctx)
        }
    }

    #[test]
    fn test_bounded_field_scenario() {
        let mut h = Harness::new(&["geiger_ticks"]);
        let mut converter = Converter::new(
            ConverterSpec::new("geiger_ticks", Formula::Integer)
                .with_bounds(dec!(5), dec!(2000))
                .with_precision(Precision::Digits(0)),
        );

        h.feed(&["geiger_ticks"], &["3"]);
        assert_eq!(h.convert(&mut converter), Value::Number(dec!(3)));
        assert_eq!(h.reporter.count_containing("OUT OF RANGE ERROR"), 1);

        h.feed(&["geiger_ticks"], &["100"]);
        assert_eq!(h.convert(&mut converter), Value::Number(dec!(100)));
        assert_eq!(h.reporter.count_containing("back within bounds"), 1);
        assert_eq!(h.reporter.notices().len(), 2);
    }

    #[test]
    fn test_process_error_latched_and_resolved() {
        let mut h = Harness::new(&["wind_dir"]);
        let mut converter = Converter::new(ConverterSpec::new("wind_dir", Formula::Decimal));

        for _ in 0..3 {
            h.feed(&["wind_dir"], &["garbage"]);
            assert_eq!(h.convert(&mut converter), Value::Error);
        }
        assert_eq!(h.reporter.count_containing("PROCESS ERROR: wind_dir"), 1);
        assert!(converter.has_process_error());

        h.feed(&["wind_dir"], &["270"]);
        assert_eq!(h.convert(&mut converter), Value::Number(dec!(270)));
        assert_eq!(h.reporter.count_containing("process error resolved"), 1);
    }

    #[test]
    fn test_rounding_pads_to_precision() {
        let mut h = Harness::new(&["geiger_high_volts"]);
        let spec: ConverterSpec = serde_yaml::from_str(
            "label: geiger_high_volts\nformula: { kind: affine, multiply: 1250, divide: 1024 }\nprecision: 1\n",
        )
        .unwrap();
        let mut converter = Converter::new(spec);
        h.feed(&["geiger_high_volts"], &["700"]);
        let value = h.convert(&mut converter);
        // 700 * 1250 / 1024 = 854.4921875
        assert_eq!(value.render("-9999"), "854.5");
    }

    #[test]
    fn test_raw_error_propagates_without_process_notice() {
        let mut h = Harness::new(&["Temperature_Precon"]);
        let mut converter = Converter::new(ConverterSpec::new("Temperature_Precon", Formula::Decimal));
        h.store.backfill(&FrameSpec {
            id: "1".to_string(),
            fields: vec!["Temperature_Precon".to_string()],
        });
        assert_eq!(h.convert(&mut converter), Value::Error);
        assert!(h.reporter.notices().is_empty());
        assert_eq!(h.collector.converted("Temperature_Precon"), Some(&Value::Error));
    }

    #[test]
    fn test_wind_chill_overflow_becomes_process_error() {
        let labels = ["vortex_avg_speed", "Temperature_Precon", "new_wind_chill"];
        let mut h = Harness::new(&labels);
        let mut wind = Converter::new(
            ConverterSpec::new("vortex_avg_speed", Formula::Decimal).with_precision(Precision::Digits(0)),
        );
        let mut temperature = Converter::new(
            ConverterSpec::new("Temperature_Precon", Formula::Decimal)
                .with_precision(Precision::Digits(0)),
        );
        let chill_spec: ConverterSpec = serde_yaml::from_str(
            "label: new_wind_chill
formula: { kind: wind_chill, wind: vortex_avg_speed, temperature: Temperature_Precon, model: nws2001 }
",
        )
        .unwrap();
        let mut chill = Converter::new(chill_spec);

        // Garbled readings large enough to overflow the chill polynomial
        for _ in 0..2 {
            h.feed(
                &labels[..2],
                &["125000000000000000000000000", "23880000000000000000000000"],
            );
            h.convert(&mut wind);
            h.convert(&mut temperature);
            assert_eq!(h.convert(&mut chill), Value::Error);
        }
        assert_eq!(h.reporter.count_containing("PROCESS ERROR: new_wind_chill"), 1);
        assert!(chill.has_process_error());
    }

    #[test]
    fn test_hook_alerts_once() {
        let mut h = Harness::new(&["wind_chill"]);
        let mut spec = ConverterSpec::new("wind_chill", Formula::Decimal);
        spec.hook = serde_yaml::from_str("alert_below: -18\nmessage: 'Frostbite risk, {label} {value}'")
            .unwrap();
        let mut converter = Converter::new(spec);

        for token in ["-20", "-25"] {
            h.feed(&["wind_chill"], &[token]);
            h.convert(&mut converter);
        }
        assert_eq!(h.reporter.count_containing("Frostbite risk"), 1);

        h.feed(&["wind_chill"], &["10"]);
        h.convert(&mut converter);
        assert_eq!(h.reporter.count_containing("back within alert thresholds"), 1);
    }
}
