//! The orchestrator: owns every kernel, the fabric and the bus, and drives
//! logical time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        ORCHESTRATOR                           │
//! │                                                              │
//! │   ┌──────────────────────┐        ┌──────────────────────┐   │
//! │   │ node 0 (coordinator) │◄──────►│    FabricKernel      │   │
//! │   │  NodeKernel          │        │  directory / router  │   │
//! │   │  pending slots       │        │  supervisor / tracer │   │
//! │   └──────────┬───────────┘        └──────────────────────┘   │
//! │              │                                               │
//! │   ═══════════╪══════════ MessageBus (star) ════════════════  │
//! │        │           │           │                 │           │
//! │   ┌────┴───┐  ┌────┴───┐  ┌────┴───┐        ┌────┴───┐       │
//! │   │ node 1 │  │ node 2 │  │ node 3 │  ...   │ node N │       │
//! │   └────────┘  └────────┘  └────────┘        └────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One tick: every kernel steps once (coordinator first, then workers in id
//! order), the bus makes one delivery pass, buffered trace records and
//! directory events are collected, and (with `auto_supervise`) the
//! supervisor runs once.
//!
//! Blocking-style calls (`execute`, `route`, `ping`, ...) poll by ticking the
//! whole system until their reply lands or their tick budget runs out.

mod calls;
mod lifecycle;

use std::collections::{BTreeMap, VecDeque};

use hsq_fabric::{DirectoryEvent, FabricKernel};
use hsq_frame::{Message, NodeId, NodeStatus};
use hsq_kernel::invariants::{check_all_invariants, InvariantViolation};
use hsq_kernel::{CoProcessor, NodeKernel, OpHandler, TraceEvent};
use tracing::{debug, info, warn};

use crate::bus::MessageBus;
use crate::config::SystemConfig;
use crate::error::SystemError;
use crate::replay::Recorder;
use crate::report::{NodeListing, NodeRole, SystemStats};

pub use calls::{DEFAULT_BROADCAST_TIMEOUT, DEFAULT_CALL_TIMEOUT, DEFAULT_PING_TIMEOUT};

pub struct Orchestrator {
    pub(crate) config: SystemConfig,
    /// Indexed by node id; index 0 is the coordinator
    pub(crate) kernels: Vec<NodeKernel>,
    pub(crate) fabric: FabricKernel,
    pub(crate) bus: MessageBus,
    pub(crate) tick: u64,
    pub(crate) booted: bool,
    pub(crate) paused: bool,
    /// Set while a replay drives the system
    pub(crate) replaying: bool,
    pub(crate) recorder: Recorder,
    /// Nodes due a heartbeat that have not been sent one yet
    pub(crate) heartbeat_backlog: VecDeque<NodeId>,
    events: Vec<DirectoryEvent>,
}

impl Orchestrator {
    pub fn new(config: SystemConfig) -> Result<Self, SystemError> {
        config.validate()?;

        let kernel_config = config.kernel_config();
        let kernels: Vec<NodeKernel> = (0..=config.num_workers)
            .map(|i| NodeKernel::with_config(NodeId(i), kernel_config))
            .collect();

        let mut bus = MessageBus::new();
        for kernel in &kernels {
            bus.register(kernel.id())?;
        }

        info!(workers = config.num_workers, queue = config.queue_capacity, "system created");

        Ok(Self {
            fabric: FabricKernel::new(config.fabric_config()),
            config,
            kernels,
            bus,
            tick: 0,
            booted: false,
            paused: false,
            replaying: false,
            recorder: Recorder::new(),
            heartbeat_backlog: VecDeque::new(),
            events: Vec::new(),
        })
    }

    pub fn with_workers(num_workers: u8) -> Result<Self, SystemError> {
        Self::new(SystemConfig::with_workers(num_workers))
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    pub fn num_workers(&self) -> u8 {
        self.config.num_workers
    }

    pub(crate) fn worker_ids(&self) -> Vec<NodeId> {
        (1..=self.config.num_workers).map(NodeId).collect()
    }

    // ========================================================================
    // Time
    // ========================================================================

    /// One full system tick. Returns frames delivered by the bus.
    pub(crate) fn advance(&mut self) -> u64 {
        self.tick += 1;

        for kernel in &mut self.kernels {
            kernel.step();
        }
        let delivered = self.bus.tick(&mut self.kernels);

        for msg in self.bus.drain_dropped() {
            self.fabric.trace(
                self.tick,
                msg.src,
                TraceEvent::Dropped,
                Some(&msg),
                Some(format!("no node {}", msg.dst)),
            );
        }
        for kernel in &mut self.kernels {
            self.fabric.record_all(kernel.drain_trace());
        }

        if !self.replaying {
            self.collect_heartbeats();
            if self.config.auto_supervise {
                self.run_supervisor();
            } else {
                self.send_heartbeats();
            }
        }
        self.collect_events();

        delivered
    }

    /// Feed heartbeat replies waiting in the coordinator's slots to the
    /// supervisor.
    fn collect_heartbeats(&mut self) {
        for id in self.fabric.awaited_heartbeats() {
            if let Some(reply) = self.kernels[0].take_reply(id) {
                if self.fabric.handle_heartbeat_reply(&reply, self.tick) {
                    let _ = self.fabric.record_reply(reply.src, true);
                }
            }
        }
    }

    /// Drain directory edges into the trace log and the event queue.
    pub(crate) fn collect_events(&mut self) {
        for event in self.fabric.drain_events() {
            let (node, label) = match event {
                DirectoryEvent::Online(n) => {
                    info!(node = n.0, tick = self.tick, "node online");
                    (n, TraceEvent::Online)
                }
                DirectoryEvent::Offline(n) => {
                    warn!(node = n.0, tick = self.tick, "node offline");
                    (n, TraceEvent::Offline)
                }
                DirectoryEvent::NodeError(n) => {
                    warn!(node = n.0, tick = self.tick, "node error");
                    (n, TraceEvent::NodeError)
                }
            };
            self.fabric.trace(self.tick, node, label, None, None);
            self.events.push(event);
        }
    }

    /// Hand over directory events seen since the last call.
    pub fn drain_events(&mut self) -> Vec<DirectoryEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Coordinator sends
    // ========================================================================

    /// Send a request from the coordinator, opening its pending slot.
    pub(crate) fn send_request(&mut self, msg: Message) -> Option<u8> {
        match self.kernels[0].send_request(msg) {
            Ok(id) => {
                self.record_last_send();
                Some(id)
            }
            Err(e) => {
                warn!(error = %e, "coordinator could not send request");
                None
            }
        }
    }

    /// Send a frame from the coordinator without expecting a reply.
    pub(crate) fn send_command(&mut self, msg: Message) -> Result<(), SystemError> {
        self.kernels[0].send(msg)?;
        self.record_last_send();
        Ok(())
    }

    fn record_last_send(&mut self) {
        if self.replaying {
            return;
        }
        if let Some(sent) = self.kernels[0].outbound().last() {
            self.recorder.record(self.tick, sent.clone());
        }
    }

    /// Requests the coordinator can still open. Every open slot may still
    /// owe a reply, so keeping slots within the queue capacity keeps the
    /// replies within the coordinator's inbound queue.
    pub(crate) fn request_room(&self) -> usize {
        let coordinator = &self.kernels[0];
        self.config
            .queue_capacity
            .saturating_sub(coordinator.pending_len().max(coordinator.outbox_len()))
    }

    /// Send one request per target and collect the replies under a single
    /// tick budget.
    ///
    /// Requests go out as room opens up, never more than the coordinator can
    /// take replies for. Targets whose request could not be sent or whose
    /// reply did not arrive within `budget` map to `None`.
    pub(crate) fn fan_out(
        &mut self,
        targets: &[NodeId],
        mut request: impl FnMut(NodeId) -> Message,
        budget: u64,
    ) -> BTreeMap<NodeId, Option<Message>> {
        let mut results = BTreeMap::new();
        let mut queued: VecDeque<NodeId> = targets.iter().copied().collect();
        let mut waiting: BTreeMap<NodeId, u8> = BTreeMap::new();
        let mut ticks = 0;

        loop {
            while ticks < budget && self.request_room() > 0 {
                let Some(node) = queued.pop_front() else {
                    break;
                };
                match self.send_request(request(node)) {
                    Some(id) => {
                        waiting.insert(node, id);
                    }
                    None => {
                        results.insert(node, None);
                    }
                }
            }
            if ticks >= budget || (waiting.is_empty() && queued.is_empty()) {
                break;
            }

            self.advance();
            ticks += 1;

            let arrived: Vec<(NodeId, Message)> = waiting
                .iter()
                .filter_map(|(node, id)| self.kernels[0].take_reply(*id).map(|r| (*node, r)))
                .collect();
            for (node, reply) in arrived {
                waiting.remove(&node);
                results.insert(node, Some(reply));
            }
        }

        for (node, id) in waiting {
            self.abandon(id, budget);
            results.insert(node, None);
        }
        if !queued.is_empty() {
            debug!(unsent = queued.len(), budget, "fan-out budget exhausted before every send");
        }
        for node in queued {
            results.insert(node, None);
        }
        results
    }

    /// Wait up to `timeout` ticks for the reply to request `id`.
    ///
    /// On timeout the pending slot is purged and `None` returned.
    pub(crate) fn await_reply(&mut self, id: u8, timeout: u64) -> Option<Message> {
        for _ in 0..timeout {
            self.advance();
            if let Some(reply) = self.kernels[0].take_reply(id) {
                return Some(reply);
            }
        }
        self.abandon(id, timeout);
        None
    }

    pub(crate) fn abandon(&mut self, id: u8, timeout: u64) {
        self.kernels[0].purge(id);
        debug!(id, timeout, tick = self.tick, "request abandoned");
        self.fabric.trace(
            self.tick,
            NodeId::COORDINATOR,
            TraceEvent::CallTimeout,
            None,
            Some(format!("request #{id} after {timeout} ticks")),
        );
    }

    // ========================================================================
    // Node access
    // ========================================================================

    pub fn node(&self, node: NodeId) -> Option<&NodeKernel> {
        self.kernels.get(usize::from(node.0))
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut NodeKernel> {
        self.kernels.get_mut(usize::from(node.0))
    }

    fn kernel_mut(&mut self, node: NodeId) -> Result<&mut NodeKernel, SystemError> {
        self.kernels
            .get_mut(usize::from(node.0))
            .ok_or(SystemError::UnknownNode(node))
    }

    fn kernel(&self, node: NodeId) -> Result<&NodeKernel, SystemError> {
        self.kernels
            .get(usize::from(node.0))
            .ok_or(SystemError::UnknownNode(node))
    }

    pub fn coordinator(&self) -> &NodeKernel {
        &self.kernels[0]
    }

    pub fn fabric(&self) -> &FabricKernel {
        &self.fabric
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    // ========================================================================
    // Collaborator surface
    // ========================================================================

    pub fn register_handler(
        &mut self,
        node: NodeId,
        op: u8,
        handler: impl OpHandler + 'static,
    ) -> Result<(), SystemError> {
        self.kernel_mut(node)?.register_handler(op, handler);
        Ok(())
    }

    pub fn install_memory_ops(&mut self, node: NodeId) -> Result<(), SystemError> {
        self.kernel_mut(node)?.install_memory_ops();
        Ok(())
    }

    pub fn attach_coprocessor(
        &mut self,
        node: NodeId,
        coprocessor: Box<dyn CoProcessor>,
    ) -> Result<(), SystemError> {
        self.kernel_mut(node)?.attach_coprocessor(coprocessor);
        Ok(())
    }

    pub fn set_capabilities(&mut self, node: NodeId, bits: u8) -> Result<(), SystemError> {
        self.fabric.set_capabilities(node, bits)?;
        Ok(())
    }

    pub fn peek(&self, node: NodeId, addr: usize) -> Result<u8, SystemError> {
        Ok(self.kernel(node)?.peek(addr))
    }

    pub fn poke(&mut self, node: NodeId, addr: usize, value: u8) -> Result<(), SystemError> {
        self.kernel_mut(node)?.poke(addr, value);
        Ok(())
    }

    pub fn peek_word(&self, node: NodeId, addr: usize) -> Result<u16, SystemError> {
        Ok(self.kernel(node)?.peek_word(addr))
    }

    pub fn poke_word(&mut self, node: NodeId, addr: usize, value: u16) -> Result<(), SystemError> {
        self.kernel_mut(node)?.poke_word(addr, value);
        Ok(())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn nodes(&self) -> Vec<NodeListing> {
        self.kernels
            .iter()
            .map(|kernel| {
                let node = kernel.id();
                match self.fabric.node(node) {
                    Some(entry) => NodeListing {
                        node,
                        role: NodeRole::Worker,
                        status: entry.status,
                        load: Some(entry.load),
                        msgs_received: kernel.msgs_received(),
                    },
                    None => NodeListing {
                        node,
                        role: NodeRole::Coordinator,
                        status: kernel.status(),
                        load: None,
                        msgs_received: kernel.msgs_received(),
                    },
                }
            })
            .collect()
    }

    pub fn stats(&self) -> SystemStats {
        SystemStats {
            tick: self.tick,
            booted: self.booted,
            bus_delivered: self.bus.delivered(),
            bus_dropped: self.bus.dropped(),
            bus_rejected: self.bus.rejected(),
            fabric: self.fabric.fabric_stats(),
        }
    }

    /// The last `count` trace entries, formatted one per line.
    pub fn trace(&self, count: usize) -> String {
        self.fabric
            .recent_trace(count)
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn dump_trace(&self) -> String {
        self.fabric.dump_trace()
    }

    /// Kernel statuses straight from the kernels, not the directory.
    pub fn kernel_statuses(&self) -> BTreeMap<NodeId, NodeStatus> {
        self.kernels.iter().map(|k| (k.id(), k.status())).collect()
    }

    /// Invariant violations across every kernel.
    pub fn check_invariants(&self) -> Vec<(NodeId, InvariantViolation)> {
        self.kernels
            .iter()
            .flat_map(|k| check_all_invariants(k).into_iter().map(move |v| (k.id(), v)))
            .collect()
    }
}
