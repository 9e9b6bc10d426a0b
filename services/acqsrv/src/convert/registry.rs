//! Ordered converter registry
//!
//! Dependencies must be listed before their dependents; construction fails
//! otherwise, so `process_all` can run strictly in catalogue order.

use std::collections::HashSet;

use tracing::{debug, info};

use super::converter::{Converter, CycleContext};
use super::descriptor::ConverterSpec;
use super::formula::Formula;
use crate::error::{AcqError, Result};
use crate::notify::Reporter;

#[derive(Debug)]
pub struct ConverterRegistry {
    converters: Vec<Converter>,
}

impl ConverterRegistry {
    pub fn new(specs: Vec<ConverterSpec>) -> Result<Self> {
        let mut seen: HashSet<String> = HashSet::new();
        for spec in &specs {
            for dependency in spec.dependencies() {
                if dependency == spec.label {
                    return Err(AcqError::catalog(format!(
                        "converter '{}' depends on itself",
                        spec.label
                    )));
                }
                if !seen.contains(dependency) {
                    return Err(AcqError::catalog(format!(
                        "converter '{}' depends on '{}', which must be listed before it",
                        spec.label, dependency
                    )));
                }
            }
            if let Formula::Composite { parts, then, .. } = &spec.formula {
                if parts.is_empty() {
                    return Err(AcqError::catalog(format!(
                        "composite converter '{}' has no parts",
                        spec.label
                    )));
                }
                if !then.is_single_input() {
                    return Err(AcqError::catalog(format!(
                        "composite converter '{}' nests a '{}' formula",
                        spec.label,
                        then.kind()
                    )));
                }
            }
            if !seen.insert(spec.label.clone()) {
                return Err(AcqError::catalog(format!(
                    "duplicate converter label '{}'",
                    spec.label
                )));
            }
        }

        info!("Converter registry built with {} converters", specs.len());
        Ok(Self {
            converters: specs.into_iter().map(Converter::new).collect(),
        })
    }

    /// Run every converter in order; returns the number of ERROR outputs
    pub fn process_all(&mut self, ctx: &mut CycleContext<'_>) -> usize {
        let mut errors = 0;
        for converter in &mut self.converters {
            if converter.safe_convert(ctx).is_error() {
                errors += 1;
            }
        }
        debug!(
            "Converted {} labels, {} ERROR",
            self.converters.len(),
            errors
        );
        errors
    }

    /// Clear every converter latch and remind about suppressed range checks
    pub fn reset_all(&mut self, reporter: &mut dyn Reporter) {
        for converter in &mut self.converters {
            converter.reset();
            if converter.spec().suppress_range_check {
                reporter.info(&format!(
                    "Reminder: range check suppressed for {}",
                    converter.label()
                ));
            }
        }
    }

    /// Converters still carrying undetermined precision or bounds
    pub fn undetermined(&self) -> Vec<(&str, Vec<&'static str>)> {
        self.converters
            .iter()
            .filter_map(|c| {
                let items = c.spec().undetermined();
                (!items.is_empty()).then_some((c.label(), items))
            })
            .collect()
    }

    pub fn report_undetermined(&self, reporter: &mut dyn Reporter) {
        let pending = self.undetermined();
        if pending.is_empty() {
            return;
        }
        let listing = pending
            .iter()
            .map(|(label, items)| format!("{label} ({})", items.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        reporter.info(&format!(
            "Converters awaiting calibration, not rounded or range checked: {listing}"
        ));
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.converters.iter().map(Converter::label)
    }

    pub fn get(&self, label: &str) -> Option<&Converter> {
        self.converters.iter().find(|c| c.label() == label)
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}
