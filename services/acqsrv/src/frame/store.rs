//! Per-cycle raw value store
//!
//! Rebuilt every cycle from the accepted frames. A lookup for a field that
//! was never stored is a [`DataMissing`] outcome, not a default value.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use super::layout::FrameSpec;
use crate::notify::{LatchSet, Reporter};

/// Raw token as received, or the backfill for a frame that was not accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Token(String),
    Error,
}

impl RawValue {
    pub fn as_token(&self) -> Option<&str> {
        match self {
            RawValue::Token(token) => Some(token),
            RawValue::Error => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RawValue::Error)
    }
}

/// Field absent from this cycle's data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no raw data for {field}")]
pub struct DataMissing {
    pub field: String,
}

#[derive(Debug, Default)]
pub struct RawValueStore {
    values: HashMap<String, RawValue>,
    missing: LatchSet<String>,
}

impl RawValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store every payload token of an accepted frame
    ///
    /// Nothing is stored unless the token count matches the frame.
    pub fn insert_frame(&mut self, spec: &FrameSpec, tokens: Vec<String>) -> bool {
        if tokens.len() != spec.expected_count() {
            return false;
        }
        for (field, token) in spec.fields.iter().zip(tokens) {
            self.values.insert(field.clone(), RawValue::Token(token));
        }
        true
    }

    /// Mark every field of a frame that was not accepted
    pub fn backfill(&mut self, spec: &FrameSpec) {
        for field in &spec.fields {
            self.values
                .entry(field.clone())
                .or_insert(RawValue::Error);
        }
    }

    /// Look up a field, tracking misses per field
    pub fn get(
        &mut self,
        field: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<RawValue, DataMissing> {
        match self.values.get(field) {
            Some(value) => {
                if self.missing.clear(field) {
                    reporter.info(&format!("Raw data for '{field}' is available again."));
                }
                Ok(value.clone())
            },
            None => {
                if self.missing.raise(field.to_string()) {
                    reporter.error(&format!(
                        "No raw data for '{field}': the field is not in the layout or was \
                         not received. Assume the error continues until otherwise notified."
                    ));
                } else {
                    debug!("Raw data for '{field}' still missing");
                }
                Err(DataMissing {
                    field: field.to_string(),
                })
            },
        }
    }

    /// Read without latch bookkeeping
    pub fn peek(&self, field: &str) -> Option<&RawValue> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop this cycle's values
    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn reset_latches(&mut self) {
        self.missing.reset();
    }
}
