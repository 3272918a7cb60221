//! View Module Tests
//!
//! Validates the partial view's merge algorithm and the peer selection
//! strategies layered on top of it.
//!
//! ## Test Scopes
//! - **Data Structures**: Descriptor semantics and serialization.
//! - **Merge Algorithm**: Size bound, duplicate handling, healing/swap/random
//!   trimming and age bookkeeping.
//! - **Selectors**: Tail, uniform, no-replacement and logged variants,
//!   including the subscription/notification protocol.

#[cfg(test)]
mod tests {
    use crate::view::types::{MemoryLog, NodeDescriptor, RingLog, SampleLog, SelectorKind};
    use crate::view::view::View;
    use std::collections::HashSet;
    use std::sync::Arc;

    const SIZE: usize = 10;
    const HEALING: usize = 5;
    const SWAP: usize = 5;
    const SELF_ADDR: &str = "192.168.225.1:5012";

    fn seeded_view(kind: SelectorKind) -> Arc<View> {
        let view = Arc::new(View::seeded(SELF_ADDR, SIZE, HEALING, SWAP, 7));
        view.init_selector(kind, None);
        view
    }

    /// `count` descriptors with distinct addresses and ages 0..count.
    fn descriptors(count: usize) -> Vec<NodeDescriptor> {
        (0..count)
            .map(|i| NodeDescriptor::new(format!("192.168.225.1:{}", 5013 + i), i as u32))
            .collect()
    }

    // ============================================================
    // NODE DESCRIPTOR TESTS
    // ============================================================

    #[test]
    fn test_descriptor_construction() {
        let node = NodeDescriptor::new("10.0.0.1:5000", 7);

        assert_eq!(node.address, "10.0.0.1:5000");
        assert_eq!(node.age, 7);
    }

    #[test]
    fn test_descriptor_serialization() {
        let node = NodeDescriptor::new("10.0.0.1:5000", 42);

        let json = serde_json::to_string(&node).expect("Serialization failed");
        let restored: NodeDescriptor =
            serde_json::from_str(&json).expect("Deserialization failed");

        assert_eq!(restored, node);
    }

    // ============================================================
    // EMPTY VIEW TESTS
    // ============================================================

    #[test]
    fn test_empty_view_select_peer() {
        for kind in [
            SelectorKind::Tail,
            SelectorKind::UniformRandom,
            SelectorKind::UniformRandomNoReplacement,
        ] {
            let view = seeded_view(kind);
            assert!(view.select_peer().is_none());
        }
    }

    #[test]
    fn test_empty_view_tx_nodes_is_self_only() {
        let view = seeded_view(SelectorKind::Tail);

        let tx = view.tx_nodes();

        assert_eq!(tx.len(), 1);
        assert_eq!(tx[0].address, SELF_ADDR);
        assert_eq!(tx[0].age, 0);
    }

    #[test]
    fn test_empty_view_rx_empty_payload() {
        let view = seeded_view(SelectorKind::Tail);

        view.rx_nodes(vec![]);

        assert_eq!(view.len(), 0);
        assert!(view.is_empty());
    }

    // ============================================================
    // MERGE TESTS
    // ============================================================

    #[test]
    fn test_rx_below_capacity_contains_all() {
        let view = seeded_view(SelectorKind::Tail);
        let incoming = descriptors(SIZE);

        view.rx_nodes(incoming.clone());

        assert_eq!(view.len(), SIZE);
        for node in &incoming {
            assert!(view.contains(&node.address));
        }
    }

    #[test]
    fn test_rx_never_adds_self() {
        let view = seeded_view(SelectorKind::Tail);

        view.rx_nodes(vec![
            NodeDescriptor::new(SELF_ADDR, 0),
            NodeDescriptor::new("192.168.225.1:5013", 1),
        ]);

        assert_eq!(view.len(), 1);
        assert!(view.contains(SELF_ADDR)); // self is always "present"
        assert!(!view.snapshot().iter().any(|n| n.address == SELF_ADDR));
    }

    #[test]
    fn test_rx_duplicate_keeps_younger_age() {
        let view = seeded_view(SelectorKind::Tail);

        view.rx_nodes(vec![NodeDescriptor::new("10.0.0.1:5000", 9)]);
        view.rx_nodes(vec![NodeDescriptor::new("10.0.0.1:5000", 2)]);

        assert_eq!(view.len(), 1);
        assert_eq!(view.snapshot()[0].age, 2);

        // An older duplicate must not raise the age back up.
        view.rx_nodes(vec![NodeDescriptor::new("10.0.0.1:5000", 8)]);
        assert_eq!(view.snapshot()[0].age, 2);
    }

    #[test]
    fn test_rx_over_capacity_drops_oldest_first() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(SIZE)); // ages 0..9

        let fresh: Vec<NodeDescriptor> = (0..5)
            .map(|i| NodeDescriptor::new(format!("10.0.0.2:{}", 6000 + i), i as u32))
            .collect();
        view.rx_nodes(fresh.clone());

        assert_eq!(view.len(), SIZE);
        // Healing removes the five highest ages (5..9 from the first batch),
        // so every fresh descriptor must survive.
        for node in &fresh {
            assert!(view.contains(&node.address), "lost {}", node.address);
        }
        let addresses: HashSet<String> =
            view.snapshot().into_iter().map(|n| n.address).collect();
        assert_eq!(addresses.len(), SIZE, "duplicate addresses in view");
        for node in view.snapshot() {
            assert!(node.age < 5, "stale descriptor survived healing");
        }
    }

    #[test]
    fn test_index_matches_nodes_after_merges() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(SIZE));
        view.rx_nodes(descriptors(15)); // forces healing + swap + random trim

        let node_addresses: HashSet<String> =
            view.snapshot().into_iter().map(|n| n.address).collect();
        let index_addresses: HashSet<String> = view.index_addresses().into_iter().collect();

        assert_eq!(view.len(), SIZE);
        assert_eq!(node_addresses, index_addresses);
    }

    #[test]
    fn test_increment_age_bumps_every_entry_once() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(SIZE)); // ages 0..9

        view.increment_age();

        let mut ages: Vec<u32> = view.snapshot().into_iter().map(|n| n.age).collect();
        ages.sort_unstable();
        assert_eq!(ages, (1..=SIZE as u32).collect::<Vec<_>>());
        assert_eq!(view.self_node().age, 0);
    }

    // ============================================================
    // TX TESTS
    // ============================================================

    #[test]
    fn test_tx_nodes_shape() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(SIZE));

        let tx = view.tx_nodes();

        assert_eq!(tx.len(), SIZE / 2);
        assert_eq!(tx[0].address, SELF_ADDR);
        let addresses: HashSet<&str> = tx.iter().map(|n| n.address.as_str()).collect();
        assert_eq!(addresses.len(), tx.len(), "duplicate addresses in payload");
    }

    #[test]
    fn test_tx_nodes_excludes_oldest() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(SIZE)); // ages 0..9, healing = 5

        let tx = view.tx_nodes();

        // The healing oldest (ages 5..9) were moved out of sending range.
        for node in &tx[1..] {
            assert!(node.age < (SIZE / 2) as u32);
        }
    }

    #[test]
    fn test_tx_nodes_short_view() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(2));

        let tx = view.tx_nodes();

        assert_eq!(tx.len(), 3); // self + both entries
        assert_eq!(tx[0].address, SELF_ADDR);
    }

    // ============================================================
    // MANUAL INSERT TESTS
    // ============================================================

    #[test]
    fn test_manual_insert_bypasses_size_bound() {
        let view = seeded_view(SelectorKind::Tail);

        view.manual_insert_many(descriptors(SIZE + 5));

        assert_eq!(view.len(), SIZE + 5);
    }

    #[test]
    fn test_manual_insert_skips_self_and_duplicates() {
        let view = seeded_view(SelectorKind::Tail);

        view.manual_insert(NodeDescriptor::new(SELF_ADDR, 0));
        view.manual_insert(NodeDescriptor::new("10.0.0.1:5000", 3));
        view.manual_insert(NodeDescriptor::new("10.0.0.1:5000", 1));

        assert_eq!(view.len(), 1);
        // No age refresh on manual insertion.
        assert_eq!(view.snapshot()[0].age, 3);
    }

    // ============================================================
    // SELECTOR TESTS
    // ============================================================

    #[test]
    fn test_tail_selector_returns_last() {
        let view = seeded_view(SelectorKind::Tail);
        view.manual_insert_many(descriptors(3));

        let selected = view.select_peer().expect("view is not empty");

        assert_eq!(selected.address, view.snapshot().last().unwrap().address);
    }

    #[test]
    fn test_uniform_selector_returns_member() {
        let view = seeded_view(SelectorKind::UniformRandom);
        view.rx_nodes(descriptors(SIZE));

        for _ in 0..20 {
            let selected = view.select_peer().expect("view is not empty");
            assert!(view.contains(&selected.address));
        }
    }

    #[test]
    fn test_urnr_draws_are_distinct() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(SIZE));
        let subscriber = view
            .create_subscriber(SelectorKind::UniformRandomNoReplacement, None)
            .expect("unlogged subscriber");

        let mut returned = HashSet::new();
        for _ in 0..SIZE {
            let selected = subscriber.select_peer().expect("view is not empty");
            assert!(
                returned.insert(selected.address.clone()),
                "{} drawn twice",
                selected.address
            );
        }
        assert_eq!(returned.len(), SIZE);
    }

    #[test]
    fn test_urnr_skips_removed_addresses() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(SIZE));
        let subscriber = view
            .create_subscriber(SelectorKind::UniformRandomNoReplacement, None)
            .expect("unlogged subscriber");

        // Five over-aged arrivals are appended, then healed straight back
        // out, leaving stale entries in the subscriber's queue.
        let stale: Vec<NodeDescriptor> = (0..5)
            .map(|i| NodeDescriptor::new(format!("10.0.0.3:{}", 7000 + i), 100 + i as u32))
            .collect();
        view.rx_nodes(stale);
        assert_eq!(view.len(), SIZE);

        let mut returned = HashSet::new();
        for _ in 0..SIZE {
            let selected = subscriber.select_peer().expect("view is not empty");
            assert!(view.contains(&selected.address));
            returned.insert(selected.address);
        }
        assert_eq!(returned.len(), SIZE);
    }

    #[test]
    fn test_urnr_falls_back_when_queue_exhausted() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(3));
        let subscriber = view
            .create_subscriber(SelectorKind::UniformRandomNoReplacement, None)
            .expect("unlogged subscriber");

        // Drain the queue, then keep drawing: the fallback must still return
        // live members.
        for _ in 0..10 {
            let selected = subscriber.select_peer().expect("view is not empty");
            assert!(view.contains(&selected.address));
        }
    }

    #[test]
    fn test_subscriber_deregisters_on_drop() {
        let view = seeded_view(SelectorKind::Tail);
        assert_eq!(view.subscriber_count(), 1); // the primary selector

        let subscriber = view
            .create_subscriber(SelectorKind::UniformRandom, None)
            .expect("unlogged subscriber");
        assert_eq!(view.subscriber_count(), 2);

        drop(subscriber);
        assert_eq!(view.subscriber_count(), 1);
    }

    #[test]
    fn test_logged_kind_requires_log() {
        let view = seeded_view(SelectorKind::Tail);

        assert!(view.create_subscriber(SelectorKind::LoggedTail, None).is_none());
        assert!(!view.init_selector(SelectorKind::LoggedUniformRandom, None));
    }

    // ============================================================
    // LOGGED SELECTOR TESTS
    // ============================================================

    #[test]
    fn test_logged_tail_records_draws() {
        let view = seeded_view(SelectorKind::Tail);
        view.rx_nodes(descriptors(SIZE));
        let log = Arc::new(MemoryLog::new());
        let subscriber = view
            .create_subscriber(SelectorKind::LoggedTail, Some(log.clone()))
            .expect("log supplied");

        for _ in 0..3 {
            subscriber.select_peer();
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        for pair in entries.windows(2) {
            assert!(pair[0].unix_millis <= pair[1].unix_millis);
        }
        for entry in &entries {
            assert_eq!(entry.id, SELF_ADDR);
            assert!(view.contains(&entry.selected));
        }
    }

    #[test]
    fn test_logged_selector_records_empty_view_draw() {
        let view = seeded_view(SelectorKind::Tail);
        let log = Arc::new(MemoryLog::new());
        let subscriber = view
            .create_subscriber(SelectorKind::LoggedUniformRandom, Some(log.clone()))
            .expect("log supplied");

        assert!(subscriber.select_peer().is_none());

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].selected, "");
    }

    // ============================================================
    // SAMPLE LOG TESTS
    // ============================================================

    #[test]
    fn test_memory_log_concurrent_append() {
        let log = Arc::new(MemoryLog::new());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        log.append(&format!("thread-{}", t), "10.0.0.1:5000", i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("appender thread panicked");
        }

        assert_eq!(log.len(), 400);
    }

    #[test]
    fn test_ring_log_evicts_oldest() {
        let log = RingLog::new(3);

        for i in 0..5u64 {
            log.append("node", &format!("peer-{}", i), i);
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(log.capacity(), 3);
        let selected: Vec<&str> = entries.iter().map(|e| e.selected.as_str()).collect();
        assert_eq!(selected, vec!["peer-2", "peer-3", "peer-4"]);
    }

    #[test]
    fn test_ring_log_concurrent_append() {
        let log = Arc::new(RingLog::new(16));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        log.append(&format!("thread-{}", t), "10.0.0.1:5000", i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("appender thread panicked");
        }

        // 400 appends through a capacity-16 ring leave exactly 16 entries,
        // every one of them intact.
        assert_eq!(log.len(), 16);
        let entries = log.entries();
        assert_eq!(entries.len(), 16);
        for entry in &entries {
            assert!(entry.id.starts_with("thread-"));
            assert_eq!(entry.selected, "10.0.0.1:5000");
        }
    }
}
