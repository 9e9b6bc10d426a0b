//! Station basic library
//!
//! Provides functions shared by the station services:
//! - logging (console plus daily rolling files)
//! - signal-driven shutdown
//! - startup arguments and banner
//! - flexible serde helpers for hand-edited configuration
//! - system resource checks

pub mod bootstrap_args;
pub mod logging;
pub mod serde_helpers;
pub mod service_bootstrap;
pub mod shutdown;
pub mod system_metrics;

pub use bootstrap_args::ServiceArgs;
pub use service_bootstrap::ServiceInfo;
pub use system_metrics::SystemMetrics;
