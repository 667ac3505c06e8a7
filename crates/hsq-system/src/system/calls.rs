//! Blocking-style calls.
//!
//! Each call sends one request from the coordinator, then ticks the whole
//! system until the reply lands or its budget runs out. `None` means no
//! usable reply: timeout, an error reply, or a send the coordinator's
//! outbound queue refused.

use std::collections::BTreeMap;

use hsq_frame::{Message, MessageType, NodeId, NodeStatus, PAYLOAD_SIZE};
use hsq_kernel::MAX_DUMP_BYTES;
use tracing::warn;

use super::Orchestrator;
use crate::report::StatusReport;

/// Ticks allowed for execute, compute, route, status, dump and load.
pub const DEFAULT_CALL_TIMEOUT: u64 = 100;
/// Ticks allowed for a single ping.
pub const DEFAULT_PING_TIMEOUT: u64 = 50;
/// Ticks shared by every target of a broadcast.
pub const DEFAULT_BROADCAST_TIMEOUT: u64 = 200;

const C: NodeId = NodeId::COORDINATOR;

fn pair(reply: &Message, ok: MessageType) -> Option<(u8, u8)> {
    (reply.kind == ok).then(|| (reply.arg(0), reply.arg(1)))
}

impl Orchestrator {
    /// Send `msg` as a request and wait for its reply.
    fn call(&mut self, msg: Message, timeout: u64) -> Option<Message> {
        let node = msg.dst;
        let id = self.send_request(msg)?;
        let reply = self.await_reply(id, timeout)?;
        self.note_reply(node, &reply);
        Some(reply)
    }

    fn note_reply(&mut self, node: NodeId, reply: &Message) {
        let ok = reply.kind != MessageType::ExecuteError;
        // Replies from outside the directory are not counted.
        let _ = self.fabric.record_reply(node, ok);
    }

    /// Run `op` on `node`. Returns `(result, extra)`.
    pub fn execute(
        &mut self,
        node: NodeId,
        op: u8,
        a: u8,
        b: u8,
        flags: u8,
        timeout: u64,
    ) -> Option<(u8, u8)> {
        let reply = self.call(Message::execute(C, node, 0, op, a, b, flags), timeout)?;
        pair(&reply, MessageType::ExecuteOk)
    }

    /// Run `op` as a compute request on `node`.
    pub fn compute(
        &mut self,
        node: NodeId,
        op: u8,
        a: u8,
        b: u8,
        flags: u8,
        timeout: u64,
    ) -> Option<(u8, u8)> {
        let reply = self.call(Message::compute(C, node, 0, op, a, b, flags), timeout)?;
        pair(&reply, MessageType::ComputeOk)
    }

    /// Run `op` on the node the router picks. Returns `(node, result, extra)`.
    pub fn route(
        &mut self,
        op: u8,
        a: u8,
        b: u8,
        flags: u8,
        timeout: u64,
    ) -> Option<(NodeId, u8, u8)> {
        let node = self.fabric.route_to_node()?;
        let (result, extra) = self.execute(node, op, a, b, flags, timeout)?;
        Some((node, result, extra))
    }

    /// Like [`route`](Self::route), restricted to nodes with `capability`.
    pub fn route_capable(
        &mut self,
        capability: u8,
        op: u8,
        a: u8,
        b: u8,
        flags: u8,
        timeout: u64,
    ) -> Option<(NodeId, u8, u8)> {
        let node = self.fabric.route_to_capable(capability)?;
        let (result, extra) = self.execute(node, op, a, b, flags, timeout)?;
        Some((node, result, extra))
    }

    /// Run `op` on every online worker under one shared budget.
    pub fn broadcast_execute(
        &mut self,
        op: u8,
        a: u8,
        b: u8,
        flags: u8,
        timeout: u64,
    ) -> BTreeMap<NodeId, Option<(u8, u8)>> {
        let targets = self.fabric.broadcast_targets();
        let replies = self.fan_out(&targets, |node| Message::execute(C, node, 0, op, a, b, flags), timeout);

        let mut results = BTreeMap::new();
        for (node, reply) in replies {
            let result = reply.and_then(|reply| {
                self.note_reply(node, &reply);
                pair(&reply, MessageType::ExecuteOk)
            });
            results.insert(node, result);
        }
        results
    }

    /// Health-check `node`. Returns its reported `(status, load)`.
    ///
    /// A reply also refreshes the node's directory heartbeat.
    pub fn ping(&mut self, node: NodeId, timeout: u64) -> Option<(NodeStatus, u8)> {
        let reply = self.call(Message::health_check(C, node, 0), timeout)?;
        if reply.kind != MessageType::HealthReply {
            return None;
        }
        let status = NodeStatus::from_u8(reply.arg(0))?;
        let load = reply.arg(1);
        if let Err(e) = self.fabric.update_heartbeat(node, self.tick, status, load) {
            warn!(node = node.0, error = %e, "ping reply not applied to directory");
        }
        Some((status, load))
    }

    /// Ping every worker in turn, splitting `timeout` between them.
    pub fn ping_all(&mut self, timeout: u64) -> BTreeMap<NodeId, bool> {
        let workers = self.worker_ids();
        let per_node = (timeout / workers.len() as u64).max(1);
        workers
            .into_iter()
            .map(|node| (node, self.ping(node, per_node).is_some()))
            .collect()
    }

    /// Fetch `node`'s status registers.
    pub fn status(&mut self, node: NodeId, timeout: u64) -> Option<StatusReport> {
        let reply = self.call(Message::status(C, node, 0), timeout)?;
        if reply.kind != MessageType::StatusReply {
            return None;
        }
        let p = &reply.payload;
        Some(StatusReport {
            status: NodeStatus::from_u8(p[0])?,
            inbox: p[1],
            outbox: p[2],
            error_code: p[3],
            received: p[4],
            sent: p[5],
            errors: p[6],
        })
    }

    /// Read up to 8 bytes of `node`'s memory at `addr`.
    pub fn dump(&mut self, node: NodeId, addr: u16, count: u8, timeout: u64) -> Option<Vec<u8>> {
        let reply = self.call(Message::dump(C, node, 0, addr, count), timeout)?;
        if reply.kind != MessageType::DumpData {
            return None;
        }
        let n = usize::from(count).min(MAX_DUMP_BYTES).min(PAYLOAD_SIZE - 2);
        Some(reply.payload[2..2 + n].to_vec())
    }

    /// Record `program_id` for `node` and tell the node. Returns the id the
    /// node acknowledged.
    pub fn load_program(&mut self, node: NodeId, program_id: u16, timeout: u64) -> Option<u16> {
        let frame = match self.fabric.load_program(node, program_id) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(node = node.0, error = %e, "load refused");
                return None;
            }
        };
        let reply = self.call(frame, timeout)?;
        (reply.kind == MessageType::LoadOk).then(|| u16::from_le_bytes([reply.arg(0), reply.arg(1)]))
    }
}
