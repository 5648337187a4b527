//! Stopping the server: one `CancellationToken` fans out to the HTTP
//! listener, every open stream and the idle sweeper.

use std::time::Duration;

use nudge_core::ChannelRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long open streams get to close before the server task is aborted.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How a drain ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The server task finished on its own.
    Drained,
    /// The timeout elapsed and the server task was aborted with streams
    /// still registered.
    Aborted {
        /// Streams still bound when the task was aborted.
        open_streams: usize,
    },
}

/// Shared stop signal.
#[derive(Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every holder of the token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown and wait for the server task.
    ///
    /// Open streams end their loops on the signal and release their channels,
    /// which lets graceful shutdown complete. If that takes longer than
    /// `timeout`, the task is aborted and the streams still bound in
    /// `registry` are reported.
    pub async fn drain(
        &self,
        mut server: JoinHandle<()>,
        registry: &ChannelRegistry,
        timeout: Duration,
    ) -> DrainOutcome {
        self.shutdown();
        info!(
            open_streams = registry.len(),
            timeout_secs = timeout.as_secs(),
            "draining streams"
        );

        if tokio::time::timeout(timeout, &mut server).await.is_ok() {
            return DrainOutcome::Drained;
        }

        server.abort();
        let open_streams = registry.len();
        warn!(open_streams, "drain timed out after {timeout:?}, server task aborted");
        DrainOutcome::Aborted { open_streams }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use nudge_core::{Channel, SessionId};

    use super::*;

    #[test]
    fn shutdown_reaches_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        assert!(!coord.is_shutting_down());
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn drain_waits_for_cooperative_task() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let server = tokio::spawn(async move {
            token.cancelled().await;
        });

        let outcome = coord
            .drain(server, &ChannelRegistry::new(), DEFAULT_DRAIN_TIMEOUT)
            .await;
        assert_eq!(outcome, DrainOutcome::Drained);
    }

    #[tokio::test]
    async fn drain_aborts_and_reports_stuck_streams() {
        let coord = ShutdownCoordinator::new();
        let registry = ChannelRegistry::new();
        let (channel, _rx) = Channel::open(4);
        let _ = registry.register(&SessionId::parse("stuck").unwrap(), Arc::clone(&channel));

        let server = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });
        let abort = server.abort_handle();

        let outcome = coord
            .drain(server, &registry, Duration::from_millis(50))
            .await;
        assert_eq!(outcome, DrainOutcome::Aborted { open_streams: 1 });
        assert!(coord.is_shutting_down());

        tokio::time::timeout(Duration::from_secs(1), async {
            while !abort.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
