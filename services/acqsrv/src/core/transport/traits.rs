//! Transport Layer Traits
//!
//! The frame reader talks to the PIC through [`Transport`], so the serial
//! port can be swapped for a scripted mock in tests.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport layer error types
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Nothing arrived in time; routine while waiting for a slow frame
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Running counters for one link, logged by daily housekeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkCounters {
    pub opens: u64,
    pub open_failures: u64,
    /// Links dropped after an I/O failure
    pub drops: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl LinkCounters {
    pub fn opened(&mut self, ok: bool) {
        if ok {
            self.opens += 1;
        } else {
            self.open_failures += 1;
        }
    }

    pub fn dropped(&mut self) {
        self.drops += 1;
    }

    pub fn sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    pub fn received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }
}

impl fmt::Display for LinkCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} opens ({} failed), {} drops, {} bytes out, {} bytes in",
            self.opens, self.open_failures, self.drops, self.bytes_sent, self.bytes_received
        )
    }
}

/// Byte link to the PIC
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Port path or test label, used in notices
    fn name(&self) -> &str;

    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Send data, returning the number of bytes written
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Receive into `buffer`
    ///
    /// Returns `Ok(0)` on end of stream and `Err(Timeout)` when nothing
    /// arrived within `timeout` (or the transport default).
    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<usize, TransportError>;

    async fn is_connected(&self) -> bool;

    async fn counters(&self) -> LinkCounters;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_counters() {
        let mut counters = LinkCounters::default();
        counters.opened(false);
        counters.opened(true);
        counters.sent(2);
        counters.received(48);
        counters.dropped();

        assert_eq!(counters.opens, 1);
        assert_eq!(counters.open_failures, 1);
        assert_eq!(
            counters.to_string(),
            "1 opens (1 failed), 1 drops, 2 bytes out, 48 bytes in"
        );
    }

    #[test]
    fn test_transport_error() {
        let error = TransportError::ConnectionFailed("/dev/ttyS1".to_string());
        assert!(error.to_string().contains("Connection failed"));
        assert!(error.to_string().contains("/dev/ttyS1"));
    }
}
