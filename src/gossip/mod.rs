//! Gossip Exchange Module
//!
//! Implements the network side of the peer sampling service.
//!
//! ## Core Mechanisms
//! - **Three exchange shapes**: push (send our fragment), pull (fetch
//!   theirs), push-pull (symmetric). Fragments are lists of `(address, age)`
//!   descriptors carried as JSON over HTTP with per-request deadlines.
//! - **Server**: answers exchanges against the local view; concurrent
//!   handlers are serialized by the view's own lock.
//! - **Client loop**: periodically draws a peer from the view and runs
//!   whichever exchange the configuration enables. The loop is the retry
//!   mechanism; individual failures are logged and skipped.
//! - **Service**: joins the overlay through entry points and manages both
//!   background tasks.

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod service;

pub use client::GossipClient;
pub use protocol::{NodeMsg, ViewMsg};
pub use server::GossipServer;
pub use service::{PeerSamplingService, ServiceConfig};
