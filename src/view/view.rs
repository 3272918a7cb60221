use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use super::selector::{self, PeerSelector, SelectorSlot, Strategy};
use super::types::{NodeDescriptor, SampleLog, SelectorKind};

/// Bounded, randomized partial view of the overlay membership.
///
/// Holds at most `size` descriptors (never the node's own), an address index
/// for O(1) membership checks, and the registered peer selectors. One
/// exclusive lock guards all of it; every exchange primitive runs as a single
/// critical section, so observers see either a whole merge or none of it.
/// The lock is never held across I/O.
pub struct View {
    self_node: NodeDescriptor,
    size: usize,
    healing: usize,
    swap: usize,
    state: Mutex<ViewState>,
}

/// Everything behind the view lock.
pub(super) struct ViewState {
    /// Current descriptors, exchange order. Addresses are unique and never
    /// equal to the local address.
    pub(super) nodes: Vec<NodeDescriptor>,
    /// Address -> position in `nodes`.
    pub(super) index: HashMap<String, usize>,
    pub(super) rng: StdRng,
    pub(super) subscribers: Vec<SelectorSlot>,
    next_slot_id: u64,
    primary: Option<u64>,
}

impl View {
    /// New empty view identified by `address`, holding at most `size`
    /// descriptors, healing the `healing` oldest and swapping out the `swap`
    /// just-sent entries on each over-capacity merge.
    pub fn new(address: impl Into<String>, size: usize, healing: usize, swap: usize) -> Self {
        Self::with_rng(address, size, healing, swap, StdRng::from_entropy())
    }

    /// Like [`View::new`] but with a fixed RNG seed, for simulations and
    /// tests that need reproducible shuffles.
    pub fn seeded(
        address: impl Into<String>,
        size: usize,
        healing: usize,
        swap: usize,
        seed: u64,
    ) -> Self {
        Self::with_rng(address, size, healing, swap, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        address: impl Into<String>,
        size: usize,
        healing: usize,
        swap: usize,
        rng: StdRng,
    ) -> Self {
        let address = address.into();
        if healing + swap > size {
            tracing::warn!(
                "View for {}: healing {} + swap {} exceed size {}",
                address,
                healing,
                swap,
                size
            );
        }
        Self {
            self_node: NodeDescriptor::new(address, 0),
            size,
            healing,
            swap,
            state: Mutex::new(ViewState {
                nodes: Vec::new(),
                index: HashMap::new(),
                rng,
                subscribers: Vec::new(),
                next_slot_id: 0,
                primary: None,
            }),
        }
    }

    /// Install the view's own selector, used by [`View::select_peer`].
    ///
    /// Returns false if `kind` is a logged variant and no log was supplied.
    pub fn init_selector(&self, kind: SelectorKind, log: Option<Arc<dyn SampleLog>>) -> bool {
        let mut state = self.state();
        match register_slot(&mut state, kind, log) {
            Some(id) => {
                state.primary = Some(id);
                true
            }
            None => {
                tracing::warn!(
                    "View for {}: refusing logged selector without a log sink",
                    self.self_node.address
                );
                false
            }
        }
    }

    /// Draw a peer through the selector installed with
    /// [`View::init_selector`]. Returns `None` when the view is empty or no
    /// selector was installed.
    pub fn select_peer(&self) -> Option<NodeDescriptor> {
        let primary = self.state().primary?;
        self.sample(primary)
    }

    /// Register an additional selector and hand back its handle.
    ///
    /// Returns `None` if `kind` is a logged variant and no log was supplied.
    pub fn create_subscriber(
        self: &Arc<Self>,
        kind: SelectorKind,
        log: Option<Arc<dyn SampleLog>>,
    ) -> Option<PeerSelector> {
        let slot_id = {
            let mut state = self.state();
            register_slot(&mut state, kind, log)?
        };
        Some(PeerSelector::new(Arc::clone(self), slot_id))
    }

    /// Build the outbound exchange payload: self first (age 0), then the
    /// `(size/2) - 1` head entries of the freshly permuted view, with the
    /// `healing` oldest pushed out of reach at the back.
    pub fn tx_nodes(&self) -> Vec<NodeDescriptor> {
        let mut state = self.state();
        state.permute();
        state.move_old_to_back(self.healing);
        let head = (self.size / 2).saturating_sub(1);
        let mut buf = Vec::with_capacity(head + 1);
        buf.push(self.self_node.clone());
        buf.extend(state.nodes.iter().take(head).cloned());
        buf
    }

    /// Merge an inbound exchange payload and enforce the size bound.
    ///
    /// Unknown addresses are appended; known ones keep the younger age. The
    /// excess is then trimmed in healing, swap, random order so that stale
    /// descriptors go first, just-sent ones second, and the remainder is cut
    /// uniformly.
    pub fn rx_nodes(&self, incoming: Vec<NodeDescriptor>) {
        let mut state = self.state();

        let added = state.append_batch(incoming, &self.self_node.address);
        if !added.is_empty() {
            selector::notify_added(&mut state, &added);
        }

        let excess = state.nodes.len().saturating_sub(self.size);
        let removed = state.remove_old(self.healing.min(excess));
        if !removed.is_empty() {
            selector::notify_removed(&mut state, &removed);
        }

        let excess = state.nodes.len().saturating_sub(self.size);
        let removed = state.remove_head(self.swap.min(excess));
        if !removed.is_empty() {
            selector::notify_removed(&mut state, &removed);
        }

        let excess = state.nodes.len().saturating_sub(self.size);
        let removed = state.remove_random(excess);
        if !removed.is_empty() {
            selector::notify_removed(&mut state, &removed);
        }
    }

    /// Age every descriptor by one exchange round. The local descriptor is
    /// not aged; it is refreshed to 0 at every exchange by construction.
    pub fn increment_age(&self) {
        let mut state = self.state();
        for node in &mut state.nodes {
            node.age = node.age.saturating_add(1);
        }
    }

    /// Insert a descriptor directly, skipping age refresh and size
    /// enforcement. Intended for tests and static-topology simulations.
    pub fn manual_insert(&self, node: NodeDescriptor) {
        self.manual_insert_many(vec![node]);
    }

    /// Batch form of [`View::manual_insert`].
    pub fn manual_insert_many(&self, nodes: Vec<NodeDescriptor>) {
        let mut state = self.state();
        let mut added = Vec::new();
        for node in nodes {
            if node.address == self.self_node.address || state.index.contains_key(&node.address) {
                continue;
            }
            let pos = state.nodes.len();
            state.index.insert(node.address.clone(), pos);
            state.nodes.push(node.clone());
            added.push(node);
        }
        if !added.is_empty() {
            selector::notify_added(&mut state, &added);
        }
    }

    /// Whether `address` is the local node or currently in the view.
    pub fn contains(&self, address: &str) -> bool {
        address == self.self_node.address || self.state().index.contains_key(address)
    }

    /// Number of descriptors currently held (self excluded).
    pub fn len(&self) -> usize {
        self.state().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().nodes.is_empty()
    }

    /// Copy of the current descriptors, view order.
    pub fn snapshot(&self) -> Vec<NodeDescriptor> {
        self.state().nodes.clone()
    }

    pub fn self_node(&self) -> &NodeDescriptor {
        &self.self_node
    }

    pub fn max_size(&self) -> usize {
        self.size
    }

    pub fn healing(&self) -> usize {
        self.healing
    }

    pub fn swap(&self) -> usize {
        self.swap
    }

    /// Run one selection for a registered slot, then append to its log (if
    /// any) outside the view lock so a log sink can never deadlock the view.
    pub(super) fn sample(&self, slot_id: u64) -> Option<NodeDescriptor> {
        let (selected, log) = {
            let mut state = self.state();
            let selected = selector::run_slot(&mut state, slot_id);
            let log = state
                .subscribers
                .iter()
                .find(|slot| slot.id == slot_id)
                .and_then(|slot| slot.log.clone());
            (selected, log)
        };
        if let Some(log) = log {
            let address = selected.as_ref().map(|n| n.address.as_str()).unwrap_or("");
            log.append(&self.self_node.address, address, unix_millis());
        }
        selected
    }

    pub(super) fn remove_subscriber(&self, slot_id: u64) {
        let mut state = self.state();
        state.subscribers.retain(|slot| slot.id != slot_id);
    }

    #[cfg(test)]
    pub(super) fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    #[cfg(test)]
    pub(super) fn index_addresses(&self) -> Vec<String> {
        self.state().index.keys().cloned().collect()
    }

    fn state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn register_slot(
    state: &mut ViewState,
    kind: SelectorKind,
    log: Option<Arc<dyn SampleLog>>,
) -> Option<u64> {
    if kind.is_logged() && log.is_none() {
        return None;
    }
    let id = state.next_slot_id;
    state.next_slot_id += 1;
    let strategy = Strategy::for_kind(kind, &state.nodes);
    state.subscribers.push(SelectorSlot {
        id,
        strategy,
        log: if kind.is_logged() { log } else { None },
    });
    Some(id)
}

impl ViewState {
    /// Merge `incoming` in order: append unknown non-self addresses, keep the
    /// younger age for known ones. Returns the appended descriptors.
    fn append_batch(
        &mut self,
        incoming: Vec<NodeDescriptor>,
        self_address: &str,
    ) -> Vec<NodeDescriptor> {
        let mut added = Vec::new();
        for node in incoming {
            if node.address == self_address {
                continue;
            }
            match self.index.get(&node.address) {
                Some(&pos) => {
                    if self.nodes[pos].age > node.age {
                        self.nodes[pos].age = node.age;
                    }
                }
                None => {
                    let pos = self.nodes.len();
                    self.index.insert(node.address.clone(), pos);
                    self.nodes.push(node.clone());
                    added.push(node);
                }
            }
        }
        added
    }

    /// Fisher-Yates shuffle of the whole view.
    fn permute(&mut self) {
        let ViewState { nodes, rng, .. } = self;
        nodes.shuffle(rng);
        self.reindex();
    }

    /// Partition the `num_move` highest-age descriptors into the last
    /// `num_move` positions. The order of everything else stays arbitrary
    /// (it was just permuted).
    fn move_old_to_back(&mut self, num_move: usize) {
        let len = self.nodes.len();
        if num_move == 0 || len == 0 {
            return;
        }
        let num_move = num_move.min(len);
        if num_move < len {
            self.nodes
                .select_nth_unstable_by_key(len - num_move, |n| n.age);
            self.reindex();
        }
    }

    /// Drop the `num_remove` oldest descriptors. Returns removed addresses.
    fn remove_old(&mut self, num_remove: usize) -> Vec<String> {
        if num_remove == 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        let num_remove = num_remove.min(self.nodes.len());
        self.move_old_to_back(num_remove);
        let mut removed = Vec::with_capacity(num_remove);
        for _ in 0..num_remove {
            if let Some(node) = self.nodes.pop() {
                self.index.remove(&node.address);
                removed.push(node.address);
            }
        }
        removed
    }

    /// Drop the first `num_remove` descriptors (the entries just sent to a
    /// peer sit at the front after `tx_nodes`). Returns removed addresses.
    fn remove_head(&mut self, num_remove: usize) -> Vec<String> {
        if num_remove == 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        let num_remove = num_remove.min(self.nodes.len());
        let removed: Vec<String> = self
            .nodes
            .drain(0..num_remove)
            .map(|node| node.address)
            .collect();
        for address in &removed {
            self.index.remove(address);
        }
        self.reindex();
        removed
    }

    /// Drop `num_remove` descriptors at uniformly random positions. Returns
    /// removed addresses.
    fn remove_random(&mut self, num_remove: usize) -> Vec<String> {
        if num_remove == 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        let num_remove = num_remove.min(self.nodes.len());
        let mut removed = Vec::with_capacity(num_remove);
        for _ in 0..num_remove {
            let idx = self.rng.gen_range(0..self.nodes.len());
            let node = self.nodes.remove(idx);
            self.index.remove(&node.address);
            removed.push(node.address);
        }
        self.reindex();
        removed
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (pos, node) in self.nodes.iter().enumerate() {
            self.index.insert(node.address.clone(), pos);
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
