//! Field conversion pipeline: declarative descriptors, formulas, range
//! policy and the ordered converter registry

pub mod catalog;
pub mod converter;
pub mod descriptor;
pub mod formula;
pub mod range;
pub mod registry;
pub mod status;
pub mod value;

pub use catalog::ConverterCatalog;
pub use converter::{Converter, CycleContext};
pub use descriptor::{ConverterSpec, Hook, Limit, Precision};
pub use formula::{Formula, FormulaError};
pub use range::RangePolicy;
pub use registry::ConverterRegistry;
pub use status::{StatusWatch, STATUS_OK};
pub use value::Value;
