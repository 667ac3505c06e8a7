//! Trace records.
//!
//! Kernels buffer records locally; the owner drains them into the
//! coordinator's bounded trace log.

use core::fmt;

use hsq_frame::{Message, MessageType, NodeId};
use serde::{Deserialize, Serialize};

/// Trace event labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// Frame accepted into the inbound queue
    Recv,
    /// Frame accepted into the outbound queue
    Send,
    /// Inbound queue full, frame dropped
    Overflow,
    /// Outbound queue full, frame dropped
    OutboxFull,
    /// Handler failure during dispatch
    Error,
    /// No handler for the message kind
    Unknown,
    /// Node reset
    Reset,
    /// Node halted
    Halt,
    /// Frame discarded by a halted node
    HaltedDrop,
    /// Program id recorded
    Load,
    /// Trace frame reported by a remote node
    Remote,
    /// Bus dropped a frame for an unknown destination
    Dropped,
    /// Heartbeat timeout
    Timeout,
    /// Node forced into ERROR
    Quarantine,
    /// Directory: node came online
    Online,
    /// Directory: node went offline
    Offline,
    /// Directory: node entered ERROR
    NodeError,
    /// Blocking call exhausted its tick budget
    CallTimeout,
}

impl TraceEvent {
    pub fn label(&self) -> &'static str {
        match self {
            TraceEvent::Recv => "RECV",
            TraceEvent::Send => "SEND",
            TraceEvent::Overflow => "OVERFLOW",
            TraceEvent::OutboxFull => "OUTBOX_FULL",
            TraceEvent::Error => "ERROR",
            TraceEvent::Unknown => "UNKNOWN",
            TraceEvent::Reset => "RESET",
            TraceEvent::Halt => "HALT",
            TraceEvent::HaltedDrop => "HALTED_DROP",
            TraceEvent::Load => "LOAD",
            TraceEvent::Remote => "REMOTE",
            TraceEvent::Dropped => "DROPPED",
            TraceEvent::Timeout => "TIMEOUT",
            TraceEvent::Quarantine => "QUARANTINE",
            TraceEvent::Online => "ONLINE",
            TraceEvent::Offline => "OFFLINE",
            TraceEvent::NodeError => "NODE_ERROR",
            TraceEvent::CallTimeout => "CALL_TIMEOUT",
        }
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference to the frame a trace entry is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub kind: MessageType,
    pub id: u8,
}

impl From<&Message> for MessageRef {
    fn from(msg: &Message) -> Self {
        Self {
            kind: msg.kind,
            id: msg.id,
        }
    }
}

/// One trace log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub tick: u64,
    pub node: NodeId,
    pub event: TraceEvent,
    pub message: Option<MessageRef>,
    pub detail: Option<String>,
}

impl TraceEntry {
    pub fn new(tick: u64, node: NodeId, event: TraceEvent) -> Self {
        Self {
            tick,
            node,
            event,
            message: None,
            detail: None,
        }
    }

    pub fn with_message(mut self, msg: &Message) -> Self {
        self.message = Some(MessageRef::from(msg));
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:6}] Node {}: {}", self.tick, self.node, self.event)?;
        if let Some(m) = &self.message {
            write!(f, " ({} #{})", m.kind, m.id)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " - {}", detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_display() {
        let msg = Message::health_check(NodeId(0), NodeId(2), 4);
        let entry = TraceEntry::new(12, NodeId(2), TraceEvent::Recv).with_message(&msg);
        assert_eq!(entry.to_string(), "[    12] Node 2: RECV (HEALTH_CHECK #4)");

        let entry = TraceEntry::new(3, NodeId(1), TraceEvent::Error).with_detail("boom");
        assert_eq!(entry.to_string(), "[     3] Node 1: ERROR - boom");
    }
}
