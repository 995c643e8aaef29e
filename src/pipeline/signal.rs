//! Signal handling for graceful shutdown.

use tracing::{info, warn};

/// Wait for SIGINT, or SIGTERM on Unix.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(message = "Signal received.", signal = "SIGINT");
        }
        _ = terminate => {
            info!(message = "Signal received.", signal = "SIGTERM");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_cancellation_propagates_through_clones() {
        let original = CancellationToken::new();
        let clone = original.clone();
        assert!(!clone.is_cancelled());

        original.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_signal_does_not_fire_spontaneously() {
        let result =
            tokio::time::timeout(Duration::from_millis(50), super::shutdown_signal()).await;
        assert!(result.is_err());
    }
}
