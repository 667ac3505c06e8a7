//! Node directory.
//!
//! One [`NodeEntry`] per worker, created OFFLINE when the fabric is built and
//! never removed. Status edges are queued as [`DirectoryEvent`]s for the
//! orchestrator to drain; nothing is called back.

use std::collections::BTreeMap;

use hsq_frame::{capability, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FabricError;

/// Directory record for one worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub node: NodeId,
    pub status: NodeStatus,
    /// Capability bitmask, see [`hsq_frame::capability`]
    pub capabilities: u8,
    /// Inbound queue depth reported by the last heartbeat
    pub load: u8,
    pub program_id: u16,
    /// Tick of the last heartbeat
    pub last_heartbeat: u64,
    pub msg_count: u64,
    pub error_count: u64,
}

impl NodeEntry {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            status: NodeStatus::Offline,
            capabilities: capability::ALL,
            load: 0,
            program_id: 0,
            last_heartbeat: 0,
            msg_count: 0,
            error_count: 0,
        }
    }

    pub fn has_capability(&self, bits: u8) -> bool {
        self.capabilities & bits != 0
    }
}

/// Edge-triggered status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryEvent {
    /// Left OFFLINE
    Online(NodeId),
    /// Entered OFFLINE
    Offline(NodeId),
    /// Entered ERROR
    NodeError(NodeId),
}

impl DirectoryEvent {
    pub fn node(&self) -> NodeId {
        match self {
            DirectoryEvent::Online(n) | DirectoryEvent::Offline(n) | DirectoryEvent::NodeError(n) => *n,
        }
    }
}

/// Classify a status change. HALTED never counts as coming online.
fn edge(old: NodeStatus, new: NodeStatus, node: NodeId) -> Option<DirectoryEvent> {
    if old == new {
        return None;
    }
    match (old, new) {
        (_, NodeStatus::Offline) => Some(DirectoryEvent::Offline(node)),
        (_, NodeStatus::Halted) => None,
        (NodeStatus::Offline, _) => Some(DirectoryEvent::Online(node)),
        (_, NodeStatus::Error) => Some(DirectoryEvent::NodeError(node)),
        _ => None,
    }
}

/// Worker directory keyed by node id.
#[derive(Clone, Debug, Default)]
pub struct Directory {
    entries: BTreeMap<NodeId, NodeEntry>,
    events: Vec<DirectoryEvent>,
}

impl Directory {
    /// Entries for workers `1..=num_workers`, all OFFLINE.
    pub fn new(num_workers: u8) -> Self {
        let entries = (1..=num_workers)
            .map(|i| (NodeId(i), NodeEntry::new(NodeId(i))))
            .collect();
        Self {
            entries,
            events: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn node(&self, node: NodeId) -> Option<&NodeEntry> {
        self.entries.get(&node)
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut NodeEntry> {
        self.entries.get_mut(&node)
    }

    pub fn entries(&self) -> impl Iterator<Item = &NodeEntry> {
        self.entries.values()
    }

    fn entry_mut(&mut self, node: NodeId) -> Result<&mut NodeEntry, FabricError> {
        self.entries.get_mut(&node).ok_or(FabricError::UnknownNode(node))
    }

    /// Update a node's status, returning the edge event if one fired.
    pub fn set_status(
        &mut self,
        node: NodeId,
        status: NodeStatus,
    ) -> Result<Option<DirectoryEvent>, FabricError> {
        let entry = self.entry_mut(node)?;
        if entry.status.is_terminal() {
            return if status.is_terminal() {
                Ok(None)
            } else {
                Err(FabricError::NodeHalted(node))
            };
        }
        let old = entry.status;
        entry.status = status;

        let event = edge(old, status, node);
        if let Some(event) = event {
            debug!(node = node.0, from = %old, to = %status, "directory edge");
            self.events.push(event);
        }
        Ok(event)
    }

    /// Record a heartbeat: last-seen tick, reported status and load.
    pub fn update_heartbeat(
        &mut self,
        node: NodeId,
        tick: u64,
        status: NodeStatus,
        load: u8,
    ) -> Result<Option<DirectoryEvent>, FabricError> {
        let entry = self.entry_mut(node)?;
        if entry.status.is_terminal() {
            return Err(FabricError::NodeHalted(node));
        }
        entry.last_heartbeat = tick;
        entry.load = load;
        self.set_status(node, status)
    }

    pub fn set_capabilities(&mut self, node: NodeId, bits: u8) -> Result<(), FabricError> {
        self.entry_mut(node)?.capabilities = bits;
        Ok(())
    }

    pub fn set_program(&mut self, node: NodeId, program_id: u16) -> Result<(), FabricError> {
        self.entry_mut(node)?.program_id = program_id;
        Ok(())
    }

    /// Count one reply from `node`; failed replies also count as errors.
    pub fn record_reply(&mut self, node: NodeId, ok: bool) -> Result<(), FabricError> {
        let entry = self.entry_mut(node)?;
        entry.msg_count += 1;
        if !ok {
            entry.error_count += 1;
        }
        Ok(())
    }

    /// Nodes that are neither OFFLINE nor HALTED.
    pub fn online_nodes(&self) -> Vec<NodeId> {
        self.entries
            .values()
            .filter(|e| e.status.is_online())
            .map(|e| e.node)
            .collect()
    }

    /// IDLE nodes.
    pub fn available_nodes(&self) -> Vec<NodeId> {
        self.entries
            .values()
            .filter(|e| e.status == NodeStatus::Idle)
            .map(|e| e.node)
            .collect()
    }

    /// Hand over queued status edges, oldest first.
    pub fn drain_events(&mut self) -> Vec<DirectoryEvent> {
        std::mem::take(&mut self.events)
    }
}
