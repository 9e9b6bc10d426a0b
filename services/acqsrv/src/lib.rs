//! Weather Station Acquisition Service (acqsrv)
//!
//! Polls a PIC microcontroller over a serial link at a fixed period, turns
//! the raw frames into calibrated engineering values and appends one
//! tab-separated record per cycle to local and removable storage.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ FrameReader  │──►│ RawValueStore│──►│  Converter   │──►│   Output     │
//! │ (serial poll)│   │ (per cycle)  │   │  Registry    │   │  Collector   │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                 ▼
//! ┌──────────────┐   ┌──────────────┐                      ┌──────────────┐
//! │  Dispatcher  │◄──│   Notifier   │◄─────── notices ─────│ RecordWriter │
//! │  (digest)    │   │   (spool)    │                      │ (2unix/2usb) │
//! └──────────────┘   └──────────────┘                      └──────────────┘
//! ```
//!
//! - **`frame`**: field layout, raw value store and frame validation
//! - **`convert`**: formula engine, converter catalog and registry
//! - **`output`**: output schema, per-cycle collector and persistence
//! - **`notify`**: sticky latches, severity routing and digest delivery
//! - **`runtime`**: pacing, housekeeping, command relay and the main loop
//! - **`core`**: configuration, transport and bootstrap

pub mod convert;
pub mod core;
pub mod error;
pub mod frame;
pub mod notify;
pub mod output;
pub mod runtime;

pub use crate::core::config::AppConfig;
pub use crate::error::{AcqError, Result};
pub use crate::runtime::Station;
