use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A single entry of the local membership sample.
///
/// The `address` is an opaque endpoint identifier (`host:port`) and doubles as
/// the node's identity in the overlay. The `age` counts gossip exchange rounds
/// since the owning node last advertised itself; higher means more likely
/// stale. A view never holds two descriptors with the same address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Endpoint identifier, e.g. `10.0.0.7:50000`.
    pub address: String,
    /// Exchange rounds since this descriptor was refreshed at its origin.
    pub age: u32,
}

impl NodeDescriptor {
    pub fn new(address: impl Into<String>, age: u32) -> Self {
        Self {
            address: address.into(),
            age,
        }
    }
}

/// Peer selection strategies a view subscriber can ask for.
///
/// The `Logged*` variants behave like their base strategy but append every
/// draw to a caller-supplied [`SampleLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    /// Last descriptor in the view.
    Tail,
    /// Uniform index into the view.
    UniformRandom,
    /// Uniform over addresses not drawn recently (QoS queue).
    UniformRandomNoReplacement,
    LoggedTail,
    LoggedUniformRandom,
    LoggedUniformRandomNoReplacement,
}

impl SelectorKind {
    /// Whether this kind wraps its strategy with sample logging.
    pub fn is_logged(self) -> bool {
        matches!(
            self,
            SelectorKind::LoggedTail
                | SelectorKind::LoggedUniformRandom
                | SelectorKind::LoggedUniformRandomNoReplacement
        )
    }
}

/// One recorded peer draw.
///
/// `selected` is empty when the selector ran against an empty view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Identity of the sampling view (its own address).
    pub id: String,
    /// Address of the drawn peer, or empty.
    pub selected: String,
    /// Wall-clock time of the draw, milliseconds since the Unix epoch.
    pub unix_millis: u64,
}

/// Sink for recorded peer draws.
///
/// Implementations must be safe under concurrent `append` calls; logged
/// selectors may run from the client loop and application threads at once.
pub trait SampleLog: Send + Sync {
    fn append(&self, id: &str, selected: &str, unix_millis: u64);
}

/// Unbounded in-memory sample log.
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, in append order.
    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl SampleLog for MemoryLog {
    fn append(&self, id: &str, selected: &str, unix_millis: u64) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(LogEntry {
            id: id.to_string(),
            selected: selected.to_string(),
            unix_millis,
        });
    }
}

/// Bounded in-memory sample log.
///
/// Keeps the most recent `capacity` draws; older entries are evicted on
/// overflow. Suited to long-running nodes that only care about recent
/// sampling behavior.
#[derive(Debug)]
pub struct RingLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl RingLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Copy of retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(entries) => entries.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SampleLog for RingLog {
    fn append(&self, id: &str, selected: &str, unix_millis: u64) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            id: id.to_string(),
            selected: selected.to_string(),
            unix_millis,
        });
    }
}
