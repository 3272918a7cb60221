//! Gossip Wire Protocol
//!
//! Defines the API endpoints and Data Transfer Objects used for the three
//! view-exchange operations between nodes.
//!
//! These structures are serialized as JSON and sent over HTTP. Field order
//! inside `NodeMsg` is fixed by declaration order (address, then age) and
//! must stay stable across implementations.

use serde::{Deserialize, Serialize};

use crate::view::NodeDescriptor;

// --- API Endpoints ---

/// Endpoint receiving a view fragment (send-only exchange).
pub const ENDPOINT_PUSH_VIEW: &str = "/view/push";
/// Endpoint serving a view fragment (receive-only exchange).
pub const ENDPOINT_PULL_VIEW: &str = "/view/pull";
/// Endpoint for the symmetric exchange: reply with ours, merge theirs.
pub const ENDPOINT_PUSH_PULL_VIEW: &str = "/view/push_pull";
/// Node health and view occupancy snapshot.
pub const ENDPOINT_STATS: &str = "/health/stats";

// --- Data Transfer Objects ---

/// One view entry on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMsg {
    /// Endpoint identifier of the described node.
    pub address: String,
    /// Exchange rounds since the descriptor was refreshed at its origin.
    pub age: u32,
}

/// A view fragment: the payload of every exchange operation.
///
/// May be empty when the sender's view is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewMsg {
    pub nodes: Vec<NodeMsg>,
}

/// Acknowledgment for a push exchange.
#[derive(Debug, Serialize, Deserialize)]
pub struct PushAck {
    pub success: bool,
}

impl From<&NodeDescriptor> for NodeMsg {
    fn from(node: &NodeDescriptor) -> Self {
        Self {
            address: node.address.clone(),
            age: node.age,
        }
    }
}

impl From<NodeMsg> for NodeDescriptor {
    fn from(msg: NodeMsg) -> Self {
        Self {
            address: msg.address,
            age: msg.age,
        }
    }
}

impl ViewMsg {
    /// Wire form of an outbound descriptor list, order preserved.
    pub fn from_descriptors(nodes: &[NodeDescriptor]) -> Self {
        Self {
            nodes: nodes.iter().map(NodeMsg::from).collect(),
        }
    }

    /// Internal form of an inbound payload, order preserved.
    pub fn into_descriptors(self) -> Vec<NodeDescriptor> {
        self.nodes.into_iter().map(NodeDescriptor::from).collect()
    }
}
