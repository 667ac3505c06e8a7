//! Boot, node management, supervision and the tick driver.

use std::collections::BTreeMap;

use hsq_frame::{Message, MessageType, NodeId, NodeStatus};
use tracing::{debug, info};

use super::Orchestrator;
use crate::config::SETTLE_TICKS;
use crate::error::SystemError;
use crate::report::{NodeState, PendingFrame, StepReport};

impl Orchestrator {
    // ========================================================================
    // Boot
    // ========================================================================

    /// Health-check every worker and bring responders online.
    ///
    /// Checks go out only as fast as the coordinator's queues can take their
    /// replies. The whole sequence shares the configured boot budget.
    pub fn boot(&mut self) -> BTreeMap<NodeId, bool> {
        let workers = self.worker_ids();
        for node in &workers {
            // A halted entry stays halted.
            let _ = self.fabric.set_status(*node, NodeStatus::Offline);
        }

        let budget = self.config.boot_budget;
        let replies = self.fan_out(&workers, |node| Message::health_check(NodeId::COORDINATOR, node, 0), budget);

        let mut results = BTreeMap::new();
        for (node, reply) in replies {
            let online = match reply {
                Some(reply) => {
                    let online = reply.kind == MessageType::HealthReply
                        && self
                            .fabric
                            .update_heartbeat(node, self.tick, NodeStatus::Idle, reply.arg(1))
                            .is_ok();
                    let _ = self.fabric.record_reply(node, online);
                    online
                }
                None => false,
            };
            results.insert(node, online);
        }

        self.collect_events();
        self.booted = true;

        let online = results.values().filter(|up| **up).count();
        info!(online, total = workers.len(), tick = self.tick, "boot complete");
        results
    }

    // ========================================================================
    // Node management
    // ========================================================================

    /// Send a reset to `node` and let it settle.
    pub fn reset(&mut self, node: NodeId) -> Result<(), SystemError> {
        self.ensure_node(node)?;
        let frame = self.fabric.reset_frame(node);
        self.send_command(frame)?;
        self.run(SETTLE_TICKS);
        Ok(())
    }

    /// Halt `node` for good. The directory entry becomes HALTED as well.
    pub fn halt(&mut self, node: NodeId) -> Result<(), SystemError> {
        self.ensure_node(node)?;
        self.send_command(Message::halt(NodeId::COORDINATOR, node))?;
        self.run(SETTLE_TICKS);
        if self.fabric.node(node).is_some() {
            self.fabric.set_status(node, NodeStatus::Halted)?;
        }
        Ok(())
    }

    /// Force `node` into ERROR in the directory.
    pub fn quarantine(&mut self, node: NodeId) -> Result<(), SystemError> {
        self.fabric.quarantine(node, self.tick)?;
        self.collect_events();
        Ok(())
    }

    /// Run one supervisor pass now. Returns heartbeats sent.
    pub fn supervise(&mut self) -> usize {
        let sent = self.run_supervisor();
        self.collect_events();
        sent
    }

    pub(crate) fn run_supervisor(&mut self) -> usize {
        for id in self.fabric.expire_heartbeats(self.tick) {
            self.kernels[0].purge(id);
        }

        for node in self.fabric.supervisor_tick(self.tick) {
            if !self.heartbeat_backlog.contains(&node) {
                self.heartbeat_backlog.push_back(node);
            }
        }
        self.send_heartbeats()
    }

    /// Send backlogged heartbeats while the coordinator has room for their
    /// replies. Returns heartbeats sent.
    pub(crate) fn send_heartbeats(&mut self) -> usize {
        let mut sent = 0;
        while self.request_room() > 0 {
            let Some(node) = self.heartbeat_backlog.pop_front() else {
                break;
            };
            if let Some(id) = self.send_request(Message::health_check(NodeId::COORDINATOR, node, 0)) {
                self.fabric.await_heartbeat(id, node, self.tick);
                sent += 1;
            }
        }
        if sent > 0 {
            debug!(sent, backlog = self.heartbeat_backlog.len(), tick = self.tick, "heartbeats sent");
        }
        sent
    }

    fn ensure_node(&self, node: NodeId) -> Result<(), SystemError> {
        if self.node(node).is_none() {
            return Err(SystemError::UnknownNode(node));
        }
        Ok(())
    }

    // ========================================================================
    // Tick driver
    // ========================================================================

    /// Run `ticks` full ticks. Returns frames delivered.
    pub fn run(&mut self, ticks: u64) -> u64 {
        (0..ticks).map(|_| self.advance()).sum()
    }

    /// Run exactly one tick and report what happened.
    pub fn step(&mut self) -> StepReport {
        let pending_out = self
            .kernels
            .iter()
            .flat_map(|k| k.outbound())
            .map(|m| PendingFrame {
                src: m.src,
                dst: m.dst,
                kind: m.kind,
            })
            .collect();

        let delivered = self.advance();

        let nodes = self
            .kernels
            .iter()
            .map(|k| {
                let state = NodeState {
                    status: k.status(),
                    inbox: k.inbox_len(),
                    outbox: k.outbox_len(),
                };
                (k.id(), state)
            })
            .collect();

        StepReport {
            tick: self.tick,
            delivered,
            pending_out,
            nodes,
        }
    }

    /// Step until `done` accepts a report, at most `max_ticks` times.
    /// Returns ticks taken.
    pub fn step_until(&mut self, mut done: impl FnMut(&StepReport) -> bool, max_ticks: u64) -> u64 {
        for taken in 1..=max_ticks {
            if done(&self.step()) {
                return taken;
            }
        }
        max_ticks
    }

    /// Advisory only; the tick driver does not consult it.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}
