use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::VecDeque;
use std::sync::Arc;

use super::types::{NodeDescriptor, SampleLog, SelectorKind};
use super::view::{View, ViewState};

/// Handle to a registered peer selector.
///
/// Returned by [`View::create_subscriber`]. The handle keeps the view alive
/// (selection state lives inside it) and deregisters itself when dropped, so
/// the view never retains state for subscribers that went away.
pub struct PeerSelector {
    view: Arc<View>,
    slot_id: u64,
}

impl PeerSelector {
    pub(super) fn new(view: Arc<View>, slot_id: u64) -> Self {
        Self { view, slot_id }
    }

    /// Draw a peer from the view using this subscriber's strategy.
    ///
    /// Returns `None` when the view is empty.
    pub fn select_peer(&self) -> Option<NodeDescriptor> {
        self.view.sample(self.slot_id)
    }
}

impl Drop for PeerSelector {
    fn drop(&mut self) {
        self.view.remove_subscriber(self.slot_id);
    }
}

/// Per-subscriber selection state registered with the view.
///
/// All fields are guarded by the view lock; strategies read the view and
/// receive notifications inside the same critical section, which is what
/// keeps selection consistent with merges without a second lock.
pub(super) struct SelectorSlot {
    pub(super) id: u64,
    pub(super) strategy: Strategy,
    pub(super) log: Option<Arc<dyn SampleLog>>,
}

pub(super) enum Strategy {
    /// Last descriptor in the view.
    Tail,
    /// Uniform index into the view.
    UniformRandom,
    /// Uniform without replacement: a shuffled queue of not-recently-drawn
    /// addresses, consumed front to back.
    NoReplacement { queue: VecDeque<String> },
}

impl Strategy {
    /// Build the strategy for `kind`. The no-replacement queue starts out as
    /// the current view contents, in view order.
    pub(super) fn for_kind(kind: SelectorKind, nodes: &[NodeDescriptor]) -> Strategy {
        match kind {
            SelectorKind::Tail | SelectorKind::LoggedTail => Strategy::Tail,
            SelectorKind::UniformRandom | SelectorKind::LoggedUniformRandom => {
                Strategy::UniformRandom
            }
            SelectorKind::UniformRandomNoReplacement
            | SelectorKind::LoggedUniformRandomNoReplacement => Strategy::NoReplacement {
                queue: nodes.iter().map(|n| n.address.clone()).collect(),
            },
        }
    }
}

/// Run one selection for the slot `slot_id` against the locked view state.
pub(super) fn run_slot(state: &mut ViewState, slot_id: u64) -> Option<NodeDescriptor> {
    let ViewState {
        nodes,
        index,
        rng,
        subscribers,
        ..
    } = state;
    let slot = subscribers.iter_mut().find(|slot| slot.id == slot_id)?;

    match &mut slot.strategy {
        Strategy::Tail => nodes.last().cloned(),
        Strategy::UniformRandom => uniform_draw(nodes, rng),
        Strategy::NoReplacement { queue } => {
            // Addresses removed from the view since they were queued are
            // discarded here, on the next pop.
            while let Some(address) = queue.pop_front() {
                if let Some(&pos) = index.get(&address) {
                    return Some(nodes[pos].clone());
                }
            }
            uniform_draw(nodes, rng)
        }
    }
}

/// Batched add notification: extend no-replacement queues and reshuffle so
/// draws are not monotonic in arrival order.
pub(super) fn notify_added(state: &mut ViewState, added: &[NodeDescriptor]) {
    let ViewState {
        rng, subscribers, ..
    } = state;
    for slot in subscribers.iter_mut() {
        if let Strategy::NoReplacement { queue } = &mut slot.strategy {
            queue.extend(added.iter().map(|n| n.address.clone()));
            queue.make_contiguous().shuffle(rng);
        }
    }
}

/// Batched delete notification.
///
/// Every current strategy detects removals lazily (stale queue entries are
/// skipped at the next pop), so there is no state to update here.
pub(super) fn notify_removed(_state: &mut ViewState, _removed: &[String]) {}

fn uniform_draw(nodes: &[NodeDescriptor], rng: &mut impl Rng) -> Option<NodeDescriptor> {
    if nodes.is_empty() {
        return None;
    }
    let idx = rng.gen_range(0..nodes.len());
    Some(nodes[idx].clone())
}
