//! Serializable views of the running system.

use std::collections::BTreeMap;

use hsq_fabric::FabricStats;
use hsq_frame::{MessageType, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};

/// A frame waiting in some outbound queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFrame {
    pub src: NodeId,
    pub dst: NodeId,
    pub kind: MessageType,
}

/// Kernel status and queue depths after a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub status: NodeStatus,
    pub inbox: usize,
    pub outbox: usize,
}

/// What one [`Orchestrator::step`](crate::Orchestrator::step) did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub tick: u64,
    pub delivered: u64,
    /// Outbound frames as they stood before the tick
    pub pending_out: Vec<PendingFrame>,
    pub nodes: BTreeMap<NodeId, NodeState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Coordinator,
    Worker,
}

/// One row of [`Orchestrator::nodes`](crate::Orchestrator::nodes).
///
/// Worker status and load come from the directory; the coordinator has no
/// directory entry and reports its kernel status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeListing {
    pub node: NodeId,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub load: Option<u8>,
    pub msgs_received: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStats {
    pub tick: u64,
    pub booted: bool,
    pub bus_delivered: u64,
    pub bus_dropped: u64,
    pub bus_rejected: u64,
    pub fabric: FabricStats,
}

/// Decoded status-reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: NodeStatus,
    pub inbox: u8,
    pub outbox: u8,
    pub error_code: u8,
    /// Low byte of the received counter
    pub received: u8,
    /// Low byte of the sent counter
    pub sent: u8,
    /// Low byte of the error counter
    pub errors: u8,
}
