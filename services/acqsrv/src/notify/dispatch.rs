//! Digest dispatch
//!
//! At most one delivery worker runs at a time. The worker owns only the
//! digest payload and reports back over its own oneshot channel, so an
//! outcome can only ever settle the delivery that produced it. The
//! acquisition loop collects outcomes without blocking. A failed or timed
//! out payload goes back to the front of the spool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::reporter::{Notifier, Reporter};
use super::sender::{AlertSender, Digest};

/// Subject of a digest left over from a previous run
pub const LEFTOVER_SUBJECT: &str = "unsent before restart";

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
    TimedOut,
}

#[derive(Debug)]
struct InFlight {
    payload: String,
    handle: JoinHandle<()>,
    outcome: oneshot::Receiver<DeliveryOutcome>,
}

pub struct DigestDispatcher {
    sender: Arc<dyn AlertSender>,
    station: String,
    subject: String,
    send_timeout: Duration,
    in_flight: Option<InFlight>,
}

impl std::fmt::Debug for DigestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestDispatcher")
            .field("sender", &self.sender.name())
            .field("station", &self.station)
            .field("in_flight", &self.in_flight.is_some())
            .finish()
    }
}

impl DigestDispatcher {
    pub fn new(
        sender: Arc<dyn AlertSender>,
        station: impl Into<String>,
        subject: impl Into<String>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            sender,
            station: station.into(),
            subject: subject.into(),
            send_timeout,
            in_flight: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// End-of-cycle step: settle finished work, then start a new delivery
    /// when idle and the spool has entries
    pub fn dispatch(&mut self, notifier: &mut Notifier) {
        self.collect(notifier);
        if self.in_flight.is_none() {
            let subject = self.subject.clone();
            self.start(notifier, subject);
        }
    }

    /// Deliver whatever a previous run left in the spool
    pub fn send_leftover(&mut self, notifier: &mut Notifier) {
        self.collect(notifier);
        if self.in_flight.is_none() {
            self.start(notifier, LEFTOVER_SUBJECT.to_string());
        }
    }

    /// Shutdown: wait for the running worker, then send and await the rest
    pub async fn flush(&mut self, notifier: &mut Notifier) {
        self.wait_in_flight().await;
        self.collect(notifier);
        self.abandon(notifier);

        let subject = self.subject.clone();
        self.start(notifier, subject);
        self.wait_in_flight().await;
        self.collect(notifier);
        self.abandon(notifier);
    }

    /// Give up on a worker that outlived its wait; the payload goes back to the spool
    fn abandon(&mut self, notifier: &mut Notifier) {
        if let Some(flight) = self.in_flight.as_ref() {
            flight.handle.abort();
            self.settle(DeliveryOutcome::TimedOut, notifier);
        }
    }

    async fn wait_in_flight(&mut self) {
        let limit = self.send_timeout + Duration::from_secs(1);
        if let Some(flight) = self.in_flight.as_mut() {
            if timeout(limit, &mut flight.handle).await.is_err() {
                warn!("Digest worker did not finish within {limit:?}");
            }
        }
    }

    fn collect(&mut self, notifier: &mut Notifier) {
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };
        let outcome = match flight.outcome.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return,
            // Sender dropped unsent: the worker panicked or was aborted
            Err(oneshot::error::TryRecvError::Closed) => {
                DeliveryOutcome::Failed("delivery worker aborted".to_string())
            },
        };
        self.settle(outcome, notifier);
    }

    fn settle(&mut self, outcome: DeliveryOutcome, notifier: &mut Notifier) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };

        let reason = match outcome {
            DeliveryOutcome::Delivered => {
                debug!("Digest delivered via {}", self.sender.name());
                return;
            },
            DeliveryOutcome::Failed(reason) => reason,
            DeliveryOutcome::TimedOut => format!("timed out after {:?}", self.send_timeout),
        };

        if let Err(e) = notifier.spool().prepend(&flight.payload) {
            error!("Lost undelivered digest, spool rewrite failed: {e}");
        }
        notifier.error(&format!(
            "Failed to send digest via {}: {reason}",
            self.sender.name()
        ));
    }

    fn start(&mut self, notifier: &mut Notifier, subject: String) {
        let payload = match notifier.spool().take() {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(e) => {
                error!("Failed to read digest spool: {e}");
                return;
            },
        };

        let digest = Digest {
            station: self.station.clone(),
            subject,
            body: payload.clone(),
        };
        let sender = Arc::clone(&self.sender);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let send_timeout = self.send_timeout;

        let handle = tokio::spawn(async move {
            let outcome = match timeout(send_timeout, sender.send(&digest)).await {
                Ok(Ok(())) => DeliveryOutcome::Delivered,
                Ok(Err(e)) => DeliveryOutcome::Failed(e.to_string()),
                Err(_) => DeliveryOutcome::TimedOut,
            };
            let _ = outcome_tx.send(outcome);
        });

        self.in_flight = Some(InFlight {
            payload,
            handle,
            outcome: outcome_rx,
        });
    }
}
