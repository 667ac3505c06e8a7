//! Supervisor service: heartbeats, timeouts and quarantine.
//!
//! The supervisor never sends anything itself. [`FabricKernel::supervisor_tick`]
//! returns the nodes due a health check; the caller sends them, then hands
//! back each request id with [`FabricKernel::await_heartbeat`] so the reply can
//! be matched in [`FabricKernel::handle_heartbeat_reply`].
//!
//! A node with a heartbeat still outstanding is not due again. Outstanding
//! heartbeats older than the timeout are given up through
//! [`FabricKernel::expire_heartbeats`].

use std::collections::BTreeMap;

use hsq_frame::{Message, MessageType, NodeId, NodeStatus};
use hsq_kernel::TraceEvent;
use tracing::{debug, warn};

use crate::error::FabricError;
use crate::fabric::FabricKernel;

/// Ticks between heartbeat rounds.
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 256;

/// Ticks of silence before a node is marked OFFLINE.
pub const DEFAULT_HEARTBEAT_TIMEOUT: u64 = 1024;

/// Supervisor timing state.
#[derive(Clone, Debug)]
pub struct Supervisor {
    pub interval: u64,
    pub timeout: u64,
    last_round: u64,
    /// Outstanding heartbeat request id → (node, tick sent)
    awaiting: BTreeMap<u8, (NodeId, u64)>,
}

impl Supervisor {
    pub fn new(interval: u64, timeout: u64) -> Self {
        Self {
            interval,
            timeout,
            last_round: 0,
            awaiting: BTreeMap::new(),
        }
    }

    /// Tick of the last heartbeat round.
    pub fn last_round(&self) -> u64 {
        self.last_round
    }
}

impl FabricKernel {
    /// Expire silent nodes and, if a round is due, return the nodes to ping.
    pub fn supervisor_tick(&mut self, tick: u64) -> Vec<NodeId> {
        let timeout = self.supervisor.timeout;
        let expired: Vec<NodeId> = self
            .directory
            .entries()
            .filter(|e| e.status.is_online() && tick.saturating_sub(e.last_heartbeat) > timeout)
            .map(|e| e.node)
            .collect();

        for node in expired {
            if let Ok(Some(_)) = self.directory.set_status(node, NodeStatus::Offline) {
                warn!(node = node.0, tick, "heartbeat timeout, node offline");
                self.tracer.trace(tick, node, TraceEvent::Timeout, None, None);
            }
        }

        if tick.saturating_sub(self.supervisor.last_round) < self.supervisor.interval {
            return Vec::new();
        }
        self.supervisor.last_round = tick;
        let due: Vec<NodeId> = self
            .directory
            .online_nodes()
            .into_iter()
            .filter(|node| !self.is_awaiting(*node))
            .collect();
        debug!(tick, nodes = due.len(), "heartbeat round");
        due
    }

    /// Remember that request `id` is a heartbeat sent to `node` at `tick`.
    pub fn await_heartbeat(&mut self, id: u8, node: NodeId, tick: u64) {
        self.supervisor.awaiting.insert(id, (node, tick));
    }

    /// Whether `node` has a heartbeat outstanding.
    pub fn is_awaiting(&self, node: NodeId) -> bool {
        self.supervisor.awaiting.values().any(|(n, _)| *n == node)
    }

    /// Give up on heartbeats unanswered for longer than the timeout.
    /// Returns their request ids so the caller can purge its slots.
    pub fn expire_heartbeats(&mut self, tick: u64) -> Vec<u8> {
        let timeout = self.supervisor.timeout;
        let stale: Vec<u8> = self
            .supervisor
            .awaiting
            .iter()
            .filter(|(_, (_, sent))| tick.saturating_sub(*sent) > timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.supervisor.awaiting.remove(id);
        }
        stale
    }

    /// Request ids of heartbeats still unanswered.
    pub fn awaited_heartbeats(&self) -> Vec<u8> {
        self.supervisor.awaiting.keys().copied().collect()
    }

    /// Forget an unanswered heartbeat.
    pub fn abandon_heartbeat(&mut self, id: u8) -> Option<NodeId> {
        self.supervisor.awaiting.remove(&id).map(|(node, _)| node)
    }

    /// Apply a health-reply to the directory. Returns whether it matched an
    /// awaited heartbeat.
    pub fn handle_heartbeat_reply(&mut self, reply: &Message, tick: u64) -> bool {
        if reply.kind != MessageType::HealthReply {
            return false;
        }
        let Some((node, _)) = self.supervisor.awaiting.remove(&reply.id) else {
            return false;
        };
        let status = NodeStatus::from_u8(reply.arg(0)).unwrap_or(NodeStatus::Idle);
        if let Err(e) = self.directory.update_heartbeat(node, tick, status, reply.arg(1)) {
            debug!(node = node.0, error = %e, "heartbeat ignored");
        }
        true
    }

    /// Force a node into ERROR.
    pub fn quarantine(&mut self, node: NodeId, tick: u64) -> Result<(), FabricError> {
        self.directory.set_status(node, NodeStatus::Error)?;
        if let Some(entry) = self.directory.node_mut(node) {
            entry.error_count += 1;
        }
        warn!(node = node.0, tick, "node quarantined");
        self.tracer.trace(tick, node, TraceEvent::Quarantine, None, None);
        Ok(())
    }

    /// Reset command for `node`.
    pub fn reset_frame(&self, node: NodeId) -> Message {
        Message::reset(NodeId::COORDINATOR, node)
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}
