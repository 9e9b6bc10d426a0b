//! Graceful shutdown utilities
//!
//! Signal handling shared by the station services. The acquisition loop only
//! looks at the [`CancellationToken`] at its safe points, so a signal never
//! interrupts a frame read or a conversion pass.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for a shutdown signal
///
/// - On Unix: Ctrl+C (SIGINT), SIGTERM or SIGUSR1
/// - On Windows: Ctrl+C only
///
/// Returns the name of the signal that fired.
pub async fn wait_for_shutdown() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let install = |kind: SignalKind, name: &str| match signal(kind) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("Failed to install {} handler: {}", name, e);
                None
            },
        };

        let mut term_signal = install(SignalKind::terminate(), "SIGTERM");
        let mut usr1_signal = install(SignalKind::user_defined1(), "SIGUSR1");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = async {
                match term_signal.as_mut() {
                    Some(sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => "SIGTERM",
            _ = async {
                match usr1_signal.as_mut() {
                    Some(sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => "SIGUSR1",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT"
    }
}

/// Spawn a task that cancels `token` on the first shutdown signal
///
/// # Example
///
/// ```ignore
/// let token = CancellationToken::new();
/// common::shutdown::spawn_signal_listener(token.clone());
/// while !token.is_cancelled() {
///     // one cycle
/// }
/// ```
pub fn spawn_signal_listener(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = wait_for_shutdown() => {
                info!("Received {}, stopping at next cycle boundary", signal);
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_exits_when_token_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let handle = spawn_signal_listener(token.clone());
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
