//! Mock Transport for Testing
//!
//! A scripted stand-in for the PIC. Tests register a reply per polling
//! command; sending that command queues the reply for the next receive.
//! Clones share state, so a test can keep a handle while the reader owns
//! the boxed transport.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::traits::{LinkCounters, Transport, TransportError};

/// Mock transport state
#[derive(Debug, Default)]
struct MockTransportState {
    connected: bool,
    /// Reply queued whenever the matching command is sent
    replies: HashMap<Vec<u8>, Vec<u8>>,
    /// Bytes waiting to be received
    receive_queue: VecDeque<Vec<u8>>,
    /// History of sent data
    sent_data: Vec<Vec<u8>>,
    /// Remaining connect attempts that should fail
    failing_connects: u32,
    should_fail_send: bool,
    should_fail_receive: bool,
    counters: LinkCounters,
}

/// Mock transport implementation
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<RwLock<MockTransportState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new("mock-pic")
    }
}

impl MockTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(MockTransportState::default())),
        }
    }

    /// Reply with `response` every time `command` is sent
    ///
    /// An empty response simulates a silent PIC.
    pub async fn respond_to(&self, command: &str, response: &str) {
        let mut state = self.state.write().await;
        state
            .replies
            .insert(command.as_bytes().to_vec(), response.as_bytes().to_vec());
    }

    /// Stop replying to `command`
    pub async fn forget(&self, command: &str) {
        let mut state = self.state.write().await;
        state.replies.remove(command.as_bytes());
    }

    /// Add data to the receive queue directly
    pub async fn add_receive_data(&self, data: Vec<u8>) {
        let mut state = self.state.write().await;
        state.receive_queue.push_back(data);
    }

    /// Everything sent so far, as text
    pub async fn sent_commands(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .sent_data
            .iter()
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .collect()
    }

    pub async fn clear_sent_data(&self) {
        let mut state = self.state.write().await;
        state.sent_data.clear();
    }

    /// Make the next `attempts` connects fail
    pub async fn fail_next_connects(&self, attempts: u32) {
        let mut state = self.state.write().await;
        state.failing_connects = attempts;
    }

    pub async fn set_send_failure(&self, should_fail: bool) {
        let mut state = self.state.write().await;
        state.should_fail_send = should_fail;
    }

    pub async fn set_receive_failure(&self, should_fail: bool) {
        let mut state = self.state.write().await;
        state.should_fail_receive = should_fail;
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.write().await;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            state.counters.opened(false);
            return Err(TransportError::ConnectionFailed(
                "Mock connection failure".to_string(),
            ));
        }

        state.connected = true;
        state.counters.opened(true);
        debug!("Mock transport connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.write().await;
        state.connected = false;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state.write().await;
        if !state.connected {
            return Err(TransportError::SendFailed("Not connected".to_string()));
        }
        if state.should_fail_send {
            state.connected = false;
            state.counters.dropped();
            return Err(TransportError::SendFailed("Mock send failure".to_string()));
        }

        state.sent_data.push(data.to_vec());
        state.counters.sent(data.len());
        if let Some(reply) = state.replies.get(data).cloned() {
            if !reply.is_empty() {
                state.receive_queue.push_back(reply);
            }
        }
        Ok(data.len())
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        _timeout: Option<Duration>,
    ) -> Result<usize, TransportError> {
        let mut state = self.state.write().await;
        if !state.connected {
            return Err(TransportError::ReceiveFailed("Not connected".to_string()));
        }
        if state.should_fail_receive {
            state.connected = false;
            state.counters.dropped();
            return Err(TransportError::ReceiveFailed(
                "Mock receive failure".to_string(),
            ));
        }

        let Some(mut chunk) = state.receive_queue.pop_front() else {
            return Err(TransportError::Timeout("Mock receive queue empty".to_string()));
        };

        let n = chunk.len().min(buffer.len());
        buffer[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            state.receive_queue.push_front(chunk.split_off(n));
        }
        state.counters.received(n);
        Ok(n)
    }

    async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    async fn counters(&self) -> LinkCounters {
        self.state.read().await.counters
    }
}
