//! Out-of-band digest delivery

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Digest delivery errors
#[derive(Error, Debug, Clone)]
pub enum NotifyError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Digest rejected with status {0}")]
    Status(u16),
}

/// One digest, the only data handed to a delivery worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub station: String,
    pub subject: String,
    pub body: String,
}

/// Delivery channel for digests
#[async_trait]
pub trait AlertSender: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, digest: &Digest) -> Result<(), NotifyError>;
}

/// Posts digests as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookSender {
    client: HttpClient,
    url: String,
}

impl WebhookSender {
    /// `request_timeout` bounds each request inside reqwest as well
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, NotifyError> {
        let client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| NotifyError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertSender for WebhookSender {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, digest: &Digest) -> Result<(), NotifyError> {
        debug!("Posting digest '{}' to {}", digest.subject, self.url);
        let response = self
            .client
            .post(&self.url)
            .json(digest)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status(status.as_u16()))
        }
    }
}

/// Writes digests to the service log
#[derive(Debug, Clone, Default)]
pub struct LogSender;

#[async_trait]
impl AlertSender for LogSender {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, digest: &Digest) -> Result<(), NotifyError> {
        info!(
            station = %digest.station,
            subject = %digest.subject,
            "Digest:\n{}",
            digest.body
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    async fn test_log_sender_writes_digest() {
        let digest = Digest {
            station: "ridge".to_string(),
            subject: "Station report".to_string(),
            body: "2024-01-01 00:00:00: Wind chill below -20".to_string(),
        };
        LogSender.send(&digest).await.unwrap();
        assert!(logs_contain("Wind chill below -20"));
    }

    #[tokio::test]
    async fn test_webhook_unreachable_fails() {
        let sender =
            WebhookSender::new("http://127.0.0.1:9/digest", Duration::from_millis(200)).unwrap();
        let digest = Digest {
            station: "ridge".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        assert!(matches!(
            sender.send(&digest).await,
            Err(NotifyError::Request(_))
        ));
    }

    #[test]
    fn test_digest_serializes_fields() {
        let digest = Digest {
            station: "ridge".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        let json = serde_json::to_value(&digest).unwrap();
        assert_eq!(json["station"], "ridge");
        assert_eq!(json["body"], "b");
    }
}
