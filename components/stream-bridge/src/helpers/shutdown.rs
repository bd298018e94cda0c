/// ======================================================================
///                                 GOALS
/// ======================================================================
///
/// 1. A tail blocked in a read with no timeout can always be interrupted
/// 2. An interactive ingest stops reading input and exits cleanly
/// 3. Interruption is a normal end of a run, not an error
///
/// ======================================================================
///                             BUILDING BLOCKS
/// ======================================================================
///
/// 1. A cancellation token owned by the runtime and handed to the tailer
/// loop and to the ingestion input.
///
/// 2. A signal listener
/// - A background task that listens for CTRL+C(interactive stop) and
/// SIGTERM(container or systemd stop). Once detected, it cancels the token.
///
/// 3. Co-operative handling: the tail loop races its blocking read against
/// the token, and ingestion input reports EOF once the token fires.
// External crates
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Run-wide shutdown handle, built on-top of a [`CancellationToken`].
///
/// - `token()` is cloned into each component that blocks.
/// - Calling `.trigger()` (or receiving a signal) cancels every clone.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a token for a component that has to stop on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown, waking everything waiting on a token.
    #[instrument(
        name = "stream_bridge_shutdown_trigger",
        target = "helpers::shutdown",
        level = "trace"
    )]
    pub fn trigger(&self) {
        tracing::trace!("Shutdown triggered");
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn the signal listener. The task ends with the first signal or when shutdown was
    /// triggered some other way.
    pub fn listen_for_signals(&self) {
        let shutdown = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.token.cancelled() => {}
                signal = wait_for_signal() => {
                    tracing::info!(signal, "Signal received, shutting down");
                    shutdown.trigger();
                }
            }
        });
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    let mut terminate = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to listen for SIGTERM, only Ctrl+C stops the run");
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        name = wait_for_ctrl_c() => name,
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl+C signal");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_cancel_every_token_on_trigger() {
        let shutdown = Shutdown::new();
        let first = shutdown.token();
        let second = shutdown.clone().token();

        shutdown.trigger();

        first.cancelled().await;
        second.cancelled().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn should_stop_listener_when_triggered_directly() {
        let shutdown = Shutdown::new();
        shutdown.listen_for_signals();

        shutdown.trigger();

        assert!(shutdown.token().is_cancelled());
    }
}
