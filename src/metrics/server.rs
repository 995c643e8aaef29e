//! Prometheus endpoint for the duration of a run.
//!
//! `/metrics` renders everything recorded through the `metrics` facade and
//! `/health` answers `ok`. The server stops when the run's shutdown token is
//! cancelled.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{BindSnafu, LocalAddrSnafu, MetricsError, PrometheusInitSnafu};

/// A running metrics endpoint.
pub struct MetricsServer {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl MetricsServer {
    /// Address actually bound, useful when asking for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the server to drain after its shutdown token fired.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Metrics server task failed: {}", e);
        }
    }
}

/// Bind `addr`, install the Prometheus recorder and serve until `shutdown`.
///
/// Binding happens first so a taken port fails the run instead of being
/// logged from the background.
pub async fn init(
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<MetricsServer, MetricsError> {
    let listener = TcpListener::bind(addr).await.context(BindSnafu { addr })?;
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;
    serve(listener, handle, shutdown)
}

fn serve(
    listener: TcpListener,
    handle: PrometheusHandle,
    shutdown: CancellationToken,
) -> Result<MetricsServer, MetricsError> {
    let local_addr = listener.local_addr().context(LocalAddrSnafu)?;
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(Extension(handle));

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(MetricsServer { local_addr, task })
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}
