use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::client::{ClientTask, GossipClient};
use super::server::{GossipServer, ServerTask};
use crate::view::{PeerSelector, SampleLog, SelectorKind, View};

/// Peer sampling service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address this node binds and advertises, `host:port`.
    pub address: String,
    /// Enable outbound push exchanges.
    pub push: bool,
    /// Enable outbound pull exchanges. With `push` also set, the client loop
    /// performs symmetric push-pull exchanges.
    pub pull: bool,
    /// Seconds the client loop sleeps between exchange rounds.
    pub wait_time_secs: u64,
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
    /// Addresses contacted to join the overlay. Empty means this node starts
    /// a new overlay.
    pub entry_points: Vec<String>,
    /// Strategy behind the view's own `select_peer`.
    pub selector: SelectorKind,
    /// Maximum view occupancy (self excluded).
    pub view_size: usize,
    /// Oldest entries biased for removal on over-capacity merges.
    pub healing: usize,
    /// Just-sent entries removed on over-capacity merges.
    pub swap: usize,
}

/// Lifecycle orchestrator for one overlay node.
///
/// Owns the view, the inbound server and the outbound client, and composes
/// join (`enter`), background start/stop/signal and sampling subscriptions.
pub struct PeerSamplingService {
    view: Arc<View>,
    client: Arc<GossipClient>,
    server: GossipServer,
    entry_points: Vec<String>,
    push: bool,
    pull: bool,
    wait_time: Duration,
    timeout: Duration,
    entered: AtomicBool,
    server_task: Mutex<Option<ServerTask>>,
    client_task: Mutex<Option<ClientTask>>,
}

impl PeerSamplingService {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_selector_log(config, None)
    }

    /// Like [`PeerSamplingService::new`], with a sample log attached to the
    /// view's own selector (required for the logged selector kinds).
    pub fn with_selector_log(config: ServiceConfig, log: Option<Arc<dyn SampleLog>>) -> Self {
        let view = Arc::new(View::new(
            config.address.clone(),
            config.view_size,
            config.healing,
            config.swap,
        ));
        view.init_selector(config.selector, log);

        let wait_time = Duration::from_secs(config.wait_time_secs);
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Arc::new(GossipClient::new(
            config.push,
            config.pull,
            wait_time,
            timeout,
            view.clone(),
        ));
        let server = GossipServer::new(view.clone());

        Self {
            view,
            client,
            server,
            entry_points: config.entry_points,
            push: config.push,
            pull: config.pull,
            wait_time,
            timeout,
            entered: AtomicBool::new(false),
            server_task: Mutex::new(None),
            client_task: Mutex::new(None),
        }
    }

    /// Join the overlay through the configured entry points.
    ///
    /// Keeps trying until one push-pull exchange succeeds, then still
    /// contacts the remaining entry points best-effort: seeding the view from
    /// several servers makes the initial sample healthier. Returns true iff
    /// at least one exchange succeeded, or trivially when no entry points are
    /// configured.
    pub async fn enter(&self) -> bool {
        if self.entry_points.is_empty() {
            tracing::info!("No entry points configured; starting a new overlay");
            self.entered.store(true, Ordering::SeqCst);
            return true;
        }
        for entry_point in &self.entry_points {
            match self.client.push_pull_view_to(entry_point).await {
                Ok(()) => {
                    if !self.entered.swap(true, Ordering::SeqCst) {
                        tracing::info!("Joined overlay via {}", entry_point);
                    }
                }
                Err(e) => {
                    tracing::warn!("Entry point {} unreachable: {}", entry_point, e);
                }
            }
        }
        self.entered.load(Ordering::SeqCst)
    }

    /// Leave the overlay logically: the node no longer counts as entered.
    /// Remote views forget its descriptors through aging.
    pub fn exit(&self) -> bool {
        self.entered.store(false, Ordering::SeqCst);
        false
    }

    pub async fn start_server(&self) -> Result<()> {
        let mut slot = self.server_task.lock().await;
        if slot.is_some() {
            tracing::warn!("Gossip server already running");
            return Ok(());
        }
        *slot = Some(self.server.start().await?);
        Ok(())
    }

    pub async fn stop_server(&self) {
        let task = self.server_task.lock().await.take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    pub async fn signal_server(&self) {
        if let Some(task) = self.server_task.lock().await.as_ref() {
            task.signal();
        }
    }

    /// Start the periodic exchange loop. Refused (returns false) until the
    /// node has entered the overlay.
    pub async fn start_client(&self) -> bool {
        if !self.entered.load(Ordering::SeqCst) {
            tracing::warn!("Refusing to start gossip client before entering the overlay");
            return false;
        }
        let mut slot = self.client_task.lock().await;
        if slot.is_some() {
            tracing::warn!("Gossip client already running");
            return true;
        }
        *slot = Some(self.client.spawn_loop());
        true
    }

    pub async fn stop_client(&self) {
        let task = self.client_task.lock().await.take();
        if let Some(task) = task {
            task.stop().await;
        }
    }

    pub async fn signal_client(&self) {
        if let Some(task) = self.client_task.lock().await.as_ref() {
            task.signal();
        }
    }

    /// Start the server and, when entered, the client loop.
    pub async fn start(&self) -> Result<()> {
        self.start_server().await?;
        self.start_client().await;
        Ok(())
    }

    /// Cooperative shutdown of both sides: the client exits at its next
    /// wakeup, the server tears down its listener.
    pub async fn stop(&self) {
        self.stop_client().await;
        self.stop_server().await;
    }

    /// Request termination of both sides without waiting.
    pub async fn signal(&self) {
        self.signal_client().await;
        self.signal_server().await;
    }

    /// Register an application sampler on the view.
    pub fn subscribe(
        &self,
        kind: SelectorKind,
        log: Option<Arc<dyn SampleLog>>,
    ) -> Option<PeerSelector> {
        self.view.create_subscriber(kind, log)
    }

    pub fn view(&self) -> Arc<View> {
        self.view.clone()
    }

    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn push(&self) -> bool {
        self.push
    }

    pub fn pull(&self) -> bool {
        self.pull
    }

    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
