use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

use super::protocol::{
    ENDPOINT_PULL_VIEW, ENDPOINT_PUSH_PULL_VIEW, ENDPOINT_PUSH_VIEW, ViewMsg,
};
use crate::view::View;

/// Outbound side of the gossip protocol.
///
/// Performs single exchanges against a given peer address, or against a peer
/// drawn from the view. Every request carries an independent deadline of
/// `timeout`; failures are reported upward without retry, the periodic loop
/// being the retry mechanism.
pub struct GossipClient {
    view: Arc<View>,
    http: reqwest::Client,
    push: bool,
    pull: bool,
    wait_time: Duration,
    timeout: Duration,
}

impl GossipClient {
    pub fn new(
        push: bool,
        pull: bool,
        wait_time: Duration,
        timeout: Duration,
        view: Arc<View>,
    ) -> Self {
        Self {
            view,
            http: reqwest::Client::new(),
            push,
            pull,
            wait_time,
            timeout,
        }
    }

    /// Push our fragment to a peer drawn from the view.
    pub async fn push_view(&self) -> Result<()> {
        let peer = self.select_peer()?;
        self.push_view_to(&peer).await
    }

    /// Pull a fragment from a peer drawn from the view.
    pub async fn pull_view(&self) -> Result<()> {
        let peer = self.select_peer()?;
        self.pull_view_to(&peer).await
    }

    /// Symmetric exchange with a peer drawn from the view.
    pub async fn push_pull_view(&self) -> Result<()> {
        let peer = self.select_peer()?;
        self.push_pull_view_to(&peer).await
    }

    /// Send our fragment to `address`. Ages the view when the payload is
    /// built, before the request goes out.
    pub async fn push_view_to(&self, address: &str) -> Result<()> {
        let tx = self.view.tx_nodes();
        self.view.increment_age();
        let msg = ViewMsg::from_descriptors(&tx);

        self.http
            .post(format!("http://{}{}", address, ENDPOINT_PUSH_VIEW))
            .json(&msg)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        tracing::debug!("Push exchange with {} succeeded", address);
        Ok(())
    }

    /// Fetch a fragment from `address` and merge it on success.
    pub async fn pull_view_to(&self, address: &str) -> Result<()> {
        let response = self
            .http
            .get(format!("http://{}{}", address, ENDPOINT_PULL_VIEW))
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let msg: ViewMsg = response.json().await?;
        let received = msg.nodes.len();
        self.view.rx_nodes(msg.into_descriptors());
        self.view.increment_age();
        tracing::debug!(
            "Pull exchange with {} succeeded: {} descriptors",
            address,
            received
        );
        Ok(())
    }

    /// Symmetric exchange with `address`: send our fragment, merge theirs on
    /// success.
    pub async fn push_pull_view_to(&self, address: &str) -> Result<()> {
        let tx = self.view.tx_nodes();
        let msg = ViewMsg::from_descriptors(&tx);

        let response = self
            .http
            .post(format!("http://{}{}", address, ENDPOINT_PUSH_PULL_VIEW))
            .json(&msg)
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;

        let msg: ViewMsg = response.json().await?;
        let received = msg.nodes.len();
        self.view.rx_nodes(msg.into_descriptors());
        self.view.increment_age();
        tracing::debug!(
            "PushPull exchange with {} succeeded: {} descriptors",
            address,
            received
        );
        Ok(())
    }

    /// One round of whichever exchange the configuration enables.
    async fn exchange_round(&self) -> Result<()> {
        if self.push && self.pull {
            self.push_pull_view().await
        } else if self.push {
            self.push_view().await
        } else if self.pull {
            self.pull_view().await
        } else {
            Ok(())
        }
    }

    /// Spawn the periodic exchange loop: select a peer, exchange, sleep
    /// `wait_time`, repeat until signalled.
    pub fn spawn_loop(self: &Arc<Self>) -> ClientTask {
        let active = Arc::new(AtomicBool::new(true));
        let client = self.clone();
        let loop_active = active.clone();

        let handle = tokio::spawn(async move {
            tracing::info!("Gossip client loop started");
            while loop_active.load(Ordering::SeqCst) {
                if let Err(e) = client.exchange_round().await {
                    tracing::warn!("Gossip exchange failed: {}", e);
                }
                tokio::time::sleep(client.wait_time).await;
            }
            tracing::info!("Gossip client loop stopped");
        });

        ClientTask { active, handle }
    }

    fn select_peer(&self) -> Result<String> {
        self.view
            .select_peer()
            .map(|peer| peer.address)
            .ok_or_else(|| anyhow!("no peer available in view"))
    }
}

/// Handle to the running exchange loop.
///
/// `signal` flips the active flag without waiting; `stop` flips it and joins
/// the loop, which exits at its next wakeup (within `wait_time`).
pub struct ClientTask {
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl ClientTask {
    pub fn signal(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub async fn stop(self) {
        self.signal();
        if let Err(e) = self.handle.await {
            tracing::warn!("Gossip client task join failed: {}", e);
        }
    }
}
