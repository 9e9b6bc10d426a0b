//! Serial Transport Implementation
//!
//! RS-232 link to the PIC through tokio-serial.

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::{debug, error, info, warn};

use super::traits::{LinkCounters, Transport, TransportError};

/// Line settings for the PIC port
#[derive(Debug, Clone)]
pub struct SerialTransportConfig {
    /// Device path, e.g. "/dev/ttyS1"
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    /// "None", "Even" or "Odd"
    pub parity: String,
    /// "None", "Software" or "Hardware"
    pub flow_control: String,
    /// Default wait for one read when the caller gives none
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for SerialTransportConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyS1".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: "None".to_string(),
            flow_control: "None".to_string(),
            read_timeout: Duration::from_millis(1000),
            write_timeout: Duration::from_millis(1000),
        }
    }
}

impl SerialTransportConfig {
    pub fn validate(&self) -> Result<(), TransportError> {
        let problem = if self.port.is_empty() {
            Some("port path is empty")
        } else if self.baud_rate == 0 {
            Some("baud rate must be positive")
        } else if self.data_bits().is_none() {
            Some("data bits must be 5, 6, 7 or 8")
        } else if self.stop_bits().is_none() {
            Some("stop bits must be 1 or 2")
        } else if self.parity().is_none() {
            Some("parity must be None, Even or Odd")
        } else if self.flow_control().is_none() {
            Some("flow control must be None, Software or Hardware")
        } else if self.read_timeout.is_zero() || self.write_timeout.is_zero() {
            Some("read and write timeouts must be positive")
        } else {
            None
        };

        match problem {
            Some(msg) => Err(TransportError::ConfigError(format!("{}: {msg}", self.port))),
            None => Ok(()),
        }
    }

    fn data_bits(&self) -> Option<DataBits> {
        match self.data_bits {
            5 => Some(DataBits::Five),
            6 => Some(DataBits::Six),
            7 => Some(DataBits::Seven),
            8 => Some(DataBits::Eight),
            _ => None,
        }
    }

    fn stop_bits(&self) -> Option<StopBits> {
        match self.stop_bits {
            1 => Some(StopBits::One),
            2 => Some(StopBits::Two),
            _ => None,
        }
    }

    fn parity(&self) -> Option<Parity> {
        match self.parity.as_str() {
            "None" => Some(Parity::None),
            "Even" => Some(Parity::Even),
            "Odd" => Some(Parity::Odd),
            _ => None,
        }
    }

    fn flow_control(&self) -> Option<FlowControl> {
        match self.flow_control.as_str() {
            "None" => Some(FlowControl::None),
            "Software" => Some(FlowControl::Software),
            "Hardware" => Some(FlowControl::Hardware),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct SerialTransport {
    config: SerialTransportConfig,
    connection: Option<SerialStream>,
    counters: LinkCounters,
}

impl SerialTransport {
    /// Validate the settings; the port itself opens on `connect`
    pub fn new(config: SerialTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self {
            config,
            connection: None,
            counters: LinkCounters::default(),
        })
    }

    /// Drop a link that failed mid-operation so the next cycle reopens it
    fn mark_broken(&mut self) {
        if self.connection.take().is_some() {
            self.counters.dropped();
        }
    }
}

fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.config.port
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        debug!("Opening serial port: {}", self.config.port);

        // validate() already ran, the fallbacks are unreachable
        let opened = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.config.data_bits().unwrap_or(DataBits::Eight))
            .parity(self.config.parity().unwrap_or(Parity::None))
            .stop_bits(self.config.stop_bits().unwrap_or(StopBits::One))
            .flow_control(self.config.flow_control().unwrap_or(FlowControl::None))
            .timeout(self.config.read_timeout)
            .open_native_async();

        let mut port = match opened {
            Ok(port) => port,
            Err(e) => {
                self.counters.opened(false);
                return Err(TransportError::ConnectionFailed(format!(
                    "cannot open {}: {e}",
                    self.config.port
                )));
            },
        };

        #[cfg(unix)]
        if let Err(e) = port.set_exclusive(false) {
            self.counters.opened(false);
            return Err(TransportError::ConnectionFailed(format!(
                "cannot share {}: {e}",
                self.config.port
            )));
        }

        self.connection = Some(port);
        self.counters.opened(true);
        info!("Opened serial port: {}", self.config.port);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.connection.take().is_some() {
            info!("Closed serial port: {}", self.config.port);
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let write_timeout = self.config.write_timeout;
        let Some(port) = self.connection.as_mut() else {
            return Err(TransportError::SendFailed(format!(
                "{} is not open",
                self.config.port
            )));
        };

        let write = async {
            port.write_all(data).await?;
            port.flush().await?;
            Ok::<_, std::io::Error>(data.len())
        };

        match timeout(write_timeout, write).await {
            Ok(Ok(n)) => {
                self.counters.sent(n);
                debug!(hex_data = %hex_dump(data), length = n, direction = "send", "[Serial] Raw packet");
                Ok(n)
            },
            Ok(Err(e)) => {
                error!("Write to {} failed: {e}", self.config.port);
                self.mark_broken();
                Err(TransportError::SendFailed(e.to_string()))
            },
            Err(_) => {
                warn!("Write to {} timed out after {write_timeout:?}", self.config.port);
                Err(TransportError::Timeout(format!("write after {write_timeout:?}")))
            },
        }
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        wait: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let wait = wait.unwrap_or(self.config.read_timeout);
        let Some(port) = self.connection.as_mut() else {
            return Err(TransportError::ReceiveFailed(format!(
                "{} is not open",
                self.config.port
            )));
        };

        match timeout(wait, port.read(buffer)).await {
            Ok(Ok(n)) => {
                self.counters.received(n);
                if n > 0 {
                    debug!(hex_data = %hex_dump(&buffer[..n]), length = n, direction = "recv", "[Serial] Raw packet");
                }
                Ok(n)
            },
            Ok(Err(e)) => {
                error!("Read from {} failed: {e}", self.config.port);
                self.mark_broken();
                Err(TransportError::ReceiveFailed(e.to_string()))
            },
            Err(_) => Err(TransportError::Timeout(format!("read after {wait:?}"))),
        }
    }

    async fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn counters(&self) -> LinkCounters {
        self.counters
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(SerialTransportConfig::default().validate().is_ok());

        let config = SerialTransportConfig {
            data_bits: 9,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SerialTransportConfig {
            parity: "Mark".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("/dev/ttyS1"));
        assert!(err.contains("parity"));

        let config = SerialTransportConfig {
            port: String::new(),
            ..Default::default()
        };
        assert!(SerialTransport::new(config).is_err());
    }

    #[tokio::test]
    async fn test_send_without_connection_fails() {
        let mut transport = SerialTransport::new(SerialTransportConfig::default()).unwrap();
        assert!(!transport.is_connected().await);
        assert!(matches!(
            transport.send(b"SS").await,
            Err(TransportError::SendFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_to_missing_port_fails() {
        let config = SerialTransportConfig {
            port: "/dev/acqsrv-does-not-exist".to_string(),
            ..Default::default()
        };
        let mut transport = SerialTransport::new(config).unwrap();
        assert!(transport.connect().await.is_err());
        assert!(!transport.is_connected().await);
        assert_eq!(transport.counters().await.open_failures, 1);
    }
}
