use anyhow::Result;
use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::handlers::{handle_pull_view, handle_push_pull_view, handle_push_view, handle_stats};
use super::protocol::{
    ENDPOINT_PULL_VIEW, ENDPOINT_PUSH_PULL_VIEW, ENDPOINT_PUSH_VIEW, ENDPOINT_STATS,
};
use crate::view::View;

/// Inbound side of the gossip protocol.
///
/// Binds the view's own address and answers push/pull/push-pull exchanges
/// until stopped. Handlers run concurrently; the view lock serializes their
/// effects.
pub struct GossipServer {
    view: Arc<View>,
}

impl GossipServer {
    pub fn new(view: Arc<View>) -> Self {
        Self { view }
    }

    fn router(&self) -> Router {
        Router::new()
            .route(ENDPOINT_PUSH_VIEW, post(handle_push_view))
            .route(ENDPOINT_PULL_VIEW, get(handle_pull_view))
            .route(ENDPOINT_PUSH_PULL_VIEW, post(handle_push_pull_view))
            .route(ENDPOINT_STATS, get(handle_stats))
            .layer(Extension(self.view.clone()))
    }

    /// Bind the listening address and serve in a background task.
    pub async fn start(&self) -> Result<ServerTask> {
        let bind_addr: SocketAddr = self.view.self_node().address.parse()?;
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Gossip server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let app = self.router();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(e) = serve.await {
                tracing::error!("Gossip server failed: {}", e);
            }
        });

        Ok(ServerTask {
            local_addr,
            shutdown: shutdown_tx,
            handle,
        })
    }
}

/// Handle to a running server task.
///
/// `signal` requests termination without waiting; `stop` signals and then
/// joins. In-flight exchange handlers complete on their own view references.
pub struct ServerTask {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ServerTask {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn signal(&self) {
        let _ = self.shutdown.send(true);
    }

    pub async fn stop(self) {
        self.signal();
        if let Err(e) = self.handle.await {
            tracing::warn!("Gossip server task join failed: {}", e);
        }
        tracing::info!("Gossip server on {} stopped", self.local_addr);
    }
}
