//! Output side: schema, per-cycle collector and record persistence

pub mod collector;
pub mod persist;
pub mod schema;

pub use collector::OutputCollector;
pub use persist::{record_header, RecordWriter};
pub use schema::OutputSchema;
