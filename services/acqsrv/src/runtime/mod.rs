//! Acquisition runtime: cycle pacing, housekeeping, command relay and the
//! main loop

pub mod commands;
pub mod housekeeping;
pub mod scheduler;
pub mod station;

pub use commands::{CommandQueue, QueuedCommand};
pub use housekeeping::Housekeeping;
pub use scheduler::Pacer;
pub use station::{load_tables, Station};
