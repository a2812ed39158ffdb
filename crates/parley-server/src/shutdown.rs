//! Shutdown sequencing: stop the engine, stop accepting, drain serve tasks.

use std::time::Duration;

use parley_realtime::EventDistributor;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long serve tasks get to finish once shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// What a shutdown did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Live connections closed by the engine.
    pub connections_closed: usize,
    /// Whether some serve tasks were still running at the deadline.
    pub timed_out: bool,
}

/// Owns the token the listener waits on.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// New coordinator, not yet triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to `axum::serve(..).with_graceful_shutdown`.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop accepting new connections. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Full shutdown.
    ///
    /// The engine stops first so every socket session sees its connection
    /// close and sends a Close frame; then the listener stops and `handles`
    /// get up to `timeout` (default 10s) to finish. Subscriptions survive.
    pub async fn graceful_shutdown(
        &self,
        engine: &EventDistributor,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> ShutdownReport {
        let connections_closed = engine.stop();
        self.shutdown();

        let timeout = timeout.unwrap_or(DRAIN_TIMEOUT);
        info!(
            connections_closed,
            tasks = handles.len(),
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "draining server tasks"
        );
        let timed_out = tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err();
        if timed_out {
            warn!(?timeout, "shutdown deadline passed with tasks still running");
        }
        ShutdownReport {
            connections_closed,
            timed_out,
        }
    }
}
