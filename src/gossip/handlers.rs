//! Gossip API Handlers
//!
//! HTTP endpoints that expose the local view to the overlay. Each exchange
//! handler is a thin translation between the wire DTOs and the view's
//! `tx_nodes`/`rx_nodes`/`increment_age` primitives; the view's own lock
//! serializes concurrent exchanges.
//!
//! Merge steps that find nothing to do are silent no-ops, so exchange
//! handlers never fail at the HTTP layer.

use axum::{Json, extract::Extension, http::StatusCode};
use serde::Serialize;
use std::sync::Arc;
use sysinfo::System;

use super::protocol::{PushAck, ViewMsg};
use crate::view::View;

/// Inbound push: merge the sender's fragment, then age our entries.
pub async fn handle_push_view(
    Extension(view): Extension<Arc<View>>,
    Json(msg): Json<ViewMsg>,
) -> (StatusCode, Json<PushAck>) {
    tracing::debug!("Push exchange received: {} descriptors", msg.nodes.len());
    view.rx_nodes(msg.into_descriptors());
    view.increment_age();
    (StatusCode::OK, Json(PushAck { success: true }))
}

/// Inbound pull: reply with our fragment, then age our entries.
pub async fn handle_pull_view(
    Extension(view): Extension<Arc<View>>,
) -> (StatusCode, Json<ViewMsg>) {
    let tx = view.tx_nodes();
    view.increment_age();
    tracing::debug!("Pull exchange served: {} descriptors", tx.len());
    (StatusCode::OK, Json(ViewMsg::from_descriptors(&tx)))
}

/// Inbound push-pull: build our reply before merging the sender's fragment,
/// so the response does not echo what they just sent us.
pub async fn handle_push_pull_view(
    Extension(view): Extension<Arc<View>>,
    Json(msg): Json<ViewMsg>,
) -> (StatusCode, Json<ViewMsg>) {
    let tx = view.tx_nodes();
    view.rx_nodes(msg.into_descriptors());
    view.increment_age();
    tracing::debug!("PushPull exchange served: {} descriptors", tx.len());
    (StatusCode::OK, Json(ViewMsg::from_descriptors(&tx)))
}

#[derive(Serialize)]
pub struct NodeStatsResponse {
    pub address: String,
    pub view_len: usize,
    pub view_size: usize,
    pub healing: usize,
    pub swap: usize,
    pub nodes: Vec<String>,
    pub cpu_usage: f32,
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
}

/// Node health snapshot: view occupancy plus host CPU/memory.
pub async fn handle_stats(Extension(view): Extension<Arc<View>>) -> Json<NodeStatsResponse> {
    let nodes = view
        .snapshot()
        .iter()
        .map(|n| format!("{} (age {})", n.address, n.age))
        .collect();

    // Host load snapshot; only CPU and memory are refreshed. Memory comes
    // back in bytes.
    let mut sys = System::new();
    sys.refresh_cpu();
    sys.refresh_memory();
    let to_mb = |bytes: u64| bytes / (1024 * 1024);

    Json(NodeStatsResponse {
        address: view.self_node().address.clone(),
        view_len: view.len(),
        view_size: view.max_size(),
        healing: view.healing(),
        swap: view.swap(),
        nodes,
        cpu_usage: sys.global_cpu_info().cpu_usage(),
        mem_used_mb: to_mb(sys.used_memory()),
        mem_total_mb: to_mb(sys.total_memory()),
    })
}
