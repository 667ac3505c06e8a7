//! Fabric trace log.
//!
//! Bounded, append-only record of what happened where. Kernels buffer their
//! own [`TraceEntry`] records; the orchestrator drains them in here once per
//! tick. Separate from `tracing` output, which is for operators.

use hsq_frame::{Message, NodeId};
use hsq_kernel::{TraceEntry, TraceEvent};

/// Default number of entries kept.
pub const DEFAULT_TRACE_CAPACITY: usize = 1000;

#[derive(Clone, Debug)]
pub struct TraceLog {
    entries: Vec<TraceEntry>,
    capacity: usize,
}

impl TraceLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Append an entry built from its parts.
    pub fn trace(
        &mut self,
        tick: u64,
        node: NodeId,
        event: TraceEvent,
        msg: Option<&Message>,
        detail: Option<String>,
    ) {
        let mut entry = TraceEntry::new(tick, node, event);
        if let Some(msg) = msg {
            entry = entry.with_message(msg);
        }
        entry.detail = detail;
        self.record(entry);
    }

    /// Append a pre-built entry.
    pub fn record(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
        self.trim_if_needed();
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = TraceEntry>) {
        self.entries.extend(entries);
        self.trim_if_needed();
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// The last `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> &[TraceEntry] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// One line per entry, `[tick] Node n: EVENT (KIND #id) - detail`.
    pub fn dump(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn trim_if_needed(&mut self) {
        if self.entries.len() > self.capacity {
            let drain_count = self.entries.len() - self.capacity;
            self.entries.drain(0..drain_count);
        }
    }
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsq_frame::MessageType;

    #[test]
    fn test_ring_drops_oldest() {
        let mut log = TraceLog::new(3);
        for tick in 0..5 {
            log.trace(tick, NodeId(1), TraceEvent::Recv, None, None);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries()[0].tick, 2);
        assert_eq!(log.recent(2).iter().map(|e| e.tick).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(log.recent(10).len(), 3);
    }

    #[test]
    fn test_dump_format() {
        let mut log = TraceLog::default();
        let msg = Message::new(MessageType::Execute, 7, NodeId(0), NodeId(2), &[1]);
        log.trace(42, NodeId(2), TraceEvent::Error, Some(&msg), Some("boom".into()));
        log.trace(43, NodeId(3), TraceEvent::Timeout, None, None);
        assert_eq!(
            log.dump(),
            "[    42] Node 2: ERROR (EXECUTE #7) - boom\n[    43] Node 3: TIMEOUT"
        );
    }
}
