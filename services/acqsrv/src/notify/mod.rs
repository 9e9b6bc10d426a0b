//! Notifications: sticky latches, severity routing, digest spool and
//! out-of-band delivery

pub mod dispatch;
pub mod latch;
pub mod reporter;
pub mod sender;
pub mod spool;

pub use dispatch::{DeliveryOutcome, DigestDispatcher, LEFTOVER_SUBJECT};
pub use latch::{Latch, LatchSet, LatchState};
pub use reporter::{MemoryReporter, Notifier, Reporter, Severity};
pub use sender::{AlertSender, Digest, LogSender, NotifyError, WebhookSender};
pub use spool::DigestSpool;
