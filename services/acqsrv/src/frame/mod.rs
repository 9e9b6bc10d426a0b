//! Framing: field layout, PIC polling with validation, per-cycle raw store

pub mod layout;
pub mod reader;
pub mod store;

pub use layout::{FieldLayout, FrameSpec};
pub use reader::{FrameReader, ReaderSettings, ValidationReport};
pub use store::{DataMissing, RawValue, RawValueStore};
