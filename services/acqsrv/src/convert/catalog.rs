//! Converter catalogue (`converters.yaml`)
//!
//! ```yaml
//! converters:
//!   - label: geiger_ticks
//!     formula: { kind: integer }
//!     lower: 5
//!     upper: 2000
//!     precision: 0
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::descriptor::ConverterSpec;
use crate::error::{AcqError, Result};
use crate::frame::FieldLayout;

#[derive(Debug, Clone, Deserialize)]
pub struct ConverterCatalog {
    pub converters: Vec<ConverterSpec>,
}

impl ConverterCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AcqError::catalog(format!("cannot read {}: {e}", path.display()))
        })?;
        let catalog = Self::parse(&content)
            .map_err(|e| AcqError::catalog(format!("{}: {e}", path.display())))?;
        debug!(
            "Loaded {} converters from {}",
            catalog.converters.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(content)?;
        if catalog.converters.is_empty() {
            return Err(AcqError::catalog("no converters defined"));
        }
        Ok(catalog)
    }

    /// Every raw field a converter reads must exist in the layout
    pub fn check_layout(&self, layout: &FieldLayout) -> Result<()> {
        for spec in &self.converters {
            for field in spec.raw_fields() {
                if !layout.contains_field(field) {
                    return Err(AcqError::catalog(format!(
                        "converter '{}' reads raw field '{}', which no frame provides",
                        spec.label, field
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn into_specs(self) -> Vec<ConverterSpec> {
        self.converters
    }
}
