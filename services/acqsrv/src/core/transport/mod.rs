//! Transport layer
//!
//! Byte-level access to the PIC. The frame reader only sees the
//! [`Transport`] trait.

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::MockTransport;
pub use serial::{SerialTransport, SerialTransportConfig};
pub use traits::{LinkCounters, Transport, TransportError};
