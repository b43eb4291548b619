//! Cooperative shutdown.
//!
//! A [`Shutdown`] is triggered at most once, by a termination signal or by
//! the session itself when the input stream breaks. Long-running work polls
//! [`Shutdown::cancelled`] alongside its own waits; nothing is preempted.

use tokio_util::sync::CancellationToken;

/// Set-once shutdown flag shared by every activity of a session.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create an untriggered shutdown flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Later calls have no effect.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown is requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Wait for the first of SIGHUP, SIGINT, SIGTERM or SIGQUIT.
///
/// Returns the signal name.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = hangup.recv() => "SIGHUP",
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Wait for CTRL+C.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("CTRL+C")
}

/// Trigger `shutdown` on the first termination signal.
///
/// Returns early, without touching the flag, if shutdown happens first.
pub(crate) async fn forward_signal(shutdown: Shutdown) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        received = wait_for_signal() => match received {
            Ok(name) => {
                tracing::info!("Closing module ({})", name);
                shutdown.trigger();
            }
            Err(e) => tracing::warn!("Unable to listen for termination signals: {}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_is_idempotent() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_clones_share_state() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();

        other.trigger();
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn test_forward_signal_returns_on_shutdown() {
        let shutdown = Shutdown::new();
        let task = tokio::spawn(forward_signal(shutdown.clone()));

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("forwarder still running")
            .unwrap();
    }
}
