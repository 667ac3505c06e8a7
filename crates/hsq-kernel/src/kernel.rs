//! The node kernel.
//!
//! Runs identically on the coordinator and on every worker. Each call to
//! [`NodeKernel::step`] pops at most one inbound frame and dispatches it by
//! kind. Handler failures never escape: they become an ERROR status, an
//! error counter bump and (for execute/compute) an execute-error reply.

use hsq_frame::{error_code, Message, MessageType, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::correlation::PendingTable;
use crate::error::{HandlerFault, KernelError};
use crate::mailbox::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
use crate::memory::Memory;
use crate::ops::{peek_handler, poke_handler, CoProcessor, HandlerTable, OpHandler, Operands};
use crate::trace::{TraceEntry, TraceEvent};

/// Trace records buffered before the oldest are discarded.
const MAX_BUFFERED_TRACE: usize = 1024;

/// Most bytes a single dump-data reply can carry (payload minus address).
pub const MAX_DUMP_BYTES: usize = 8;

/// Per-kernel configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Inbound queue capacity
    pub inbox_capacity: usize,
    /// Outbound queue capacity
    pub outbox_capacity: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            inbox_capacity: DEFAULT_QUEUE_CAPACITY,
            outbox_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Kernel counters and queue depths.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelStats {
    pub node: NodeId,
    pub status: NodeStatus,
    pub tick: u64,
    pub msgs_received: u64,
    pub msgs_sent: u64,
    pub errors: u64,
    pub inbox_depth: usize,
    pub outbox_depth: usize,
    pub pending_requests: usize,
    pub error_code: u8,
    pub program_id: u16,
}

/// Why a dispatch did not complete normally.
enum DispatchError {
    /// No handler for this message kind
    Unrecognized,
    /// Handler ran and failed
    Fault(HandlerFault),
}

/// The kernel that runs on every node.
pub struct NodeKernel {
    id: NodeId,
    config: KernelConfig,
    status: NodeStatus,
    seq: u8,
    tick: u64,
    error_code: u8,
    program_id: u16,
    memory: Memory,
    inbox: BoundedQueue<Message>,
    outbox: BoundedQueue<Message>,
    pending: PendingTable,
    handlers: HandlerTable,
    coprocessor: Option<Box<dyn CoProcessor>>,
    msgs_received: u64,
    msgs_sent: u64,
    errors: u64,
    trace_buf: Vec<TraceEntry>,
}

impl NodeKernel {
    /// Kernel with default queue capacities.
    pub fn new(id: NodeId) -> Self {
        Self::with_config(id, KernelConfig::default())
    }

    pub fn with_config(id: NodeId, config: KernelConfig) -> Self {
        Self {
            id,
            config,
            status: NodeStatus::Idle,
            seq: 0,
            tick: 0,
            error_code: error_code::NONE,
            program_id: 0,
            memory: Memory::new(),
            inbox: BoundedQueue::new(config.inbox_capacity),
            outbox: BoundedQueue::new(config.outbox_capacity),
            pending: PendingTable::new(),
            handlers: HandlerTable::with_builtins(),
            coprocessor: None,
            msgs_received: 0,
            msgs_sent: 0,
            errors: 0,
            trace_buf: Vec::new(),
        }
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Register (or replace) the handler for operand opcode `op`.
    pub fn register_handler(&mut self, op: u8, handler: impl OpHandler + 'static) {
        self.handlers.register(op, Box::new(handler));
    }

    /// Install the PEEK and POKE memory opcodes.
    pub fn install_memory_ops(&mut self) {
        self.register_handler(hsq_frame::opcode::PEEK, peek_handler());
        self.register_handler(hsq_frame::opcode::POKE, poke_handler());
    }

    /// Attach a co-processor for compute frames.
    pub fn attach_coprocessor(&mut self, coprocessor: Box<dyn CoProcessor>) {
        self.coprocessor = Some(coprocessor);
    }

    /// Detach the co-processor, returning it.
    pub fn detach_coprocessor(&mut self) -> Option<Box<dyn CoProcessor>> {
        self.coprocessor.take()
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    // ========================================================================
    // Mailbox
    // ========================================================================

    /// Accept an inbound frame. Never blocks.
    ///
    /// A full inbound queue drops the frame and bumps the error counter.
    pub fn receive(&mut self, msg: Message) -> Result<(), KernelError> {
        let entry = TraceEntry::new(self.tick, self.id, TraceEvent::Recv).with_message(&msg);
        match self.inbox.push(msg) {
            Ok(()) => {
                self.msgs_received += 1;
                self.record(entry);
                Ok(())
            }
            Err(msg) => {
                self.errors += 1;
                warn!(node = self.id.0, frame = %msg, "inbound queue full, frame dropped");
                self.record(TraceEntry::new(self.tick, self.id, TraceEvent::Overflow).with_message(&msg));
                Err(KernelError::InboxFull)
            }
        }
    }

    /// Queue a frame for the bus, stamping this node as the source.
    pub fn send(&mut self, mut msg: Message) -> Result<(), KernelError> {
        msg.src = self.id;
        let entry = TraceEntry::new(self.tick, self.id, TraceEvent::Send).with_message(&msg);
        match self.outbox.push(msg) {
            Ok(()) => {
                self.msgs_sent += 1;
                self.record(entry);
                Ok(())
            }
            Err(msg) => {
                self.errors += 1;
                warn!(node = self.id.0, frame = %msg, "outbound queue full, frame dropped");
                self.record(TraceEntry::new(self.tick, self.id, TraceEvent::OutboxFull).with_message(&msg));
                Err(KernelError::OutboxFull)
            }
        }
    }

    /// Send a request under the next sequence id and open its pending slot.
    ///
    /// Returns the assigned id. Ids wrap 1, 2, ... 255, 0, 1.
    pub fn send_request(&mut self, mut msg: Message) -> Result<u8, KernelError> {
        self.seq = self.seq.wrapping_add(1);
        let id = self.seq;
        msg.id = id;
        self.pending.open(id, self.tick);
        if let Err(e) = self.send(msg) {
            self.pending.purge(id);
            return Err(e);
        }
        Ok(id)
    }

    /// Next outbound frame, oldest first.
    pub fn take_outbound(&mut self) -> Option<Message> {
        self.outbox.pop()
    }

    /// Frames waiting in the outbound queue.
    pub fn outbound(&self) -> impl Iterator<Item = &Message> {
        self.outbox.iter()
    }

    /// Frames waiting in the inbound queue.
    pub fn inbound(&self) -> impl Iterator<Item = &Message> {
        self.inbox.iter()
    }

    pub fn has_pending_messages(&self) -> bool {
        !self.inbox.is_empty()
    }

    // ========================================================================
    // Correlation
    // ========================================================================

    /// Take the reply for request `id`, if it has arrived.
    pub fn take_reply(&mut self, id: u8) -> Option<Message> {
        self.pending.take(id)
    }

    /// Whether a reply for request `id` is waiting.
    pub fn has_reply(&self, id: u8) -> bool {
        self.pending.is_resolved(id)
    }

    /// Abandon request `id`. A late reply will be ignored.
    pub fn purge(&mut self, id: u8) -> bool {
        self.pending.purge(id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    /// Execute one kernel step. Returns true if a frame was dispatched.
    pub fn step(&mut self) -> bool {
        self.tick += 1;

        let Some(msg) = self.inbox.pop() else {
            return false;
        };

        if self.status.is_terminal() {
            trace!(node = self.id.0, frame = %msg, "halted node discarding frame");
            self.record(TraceEntry::new(self.tick, self.id, TraceEvent::HaltedDrop).with_message(&msg));
            return false;
        }

        self.dispatch(msg);
        true
    }

    fn dispatch(&mut self, msg: Message) {
        debug!(node = self.id.0, tick = self.tick, frame = %msg, "dispatch");
        let previous = self.status;
        self.status = NodeStatus::Busy;

        match self.handle(&msg, previous) {
            Ok(()) => {
                if self.status == NodeStatus::Busy {
                    self.status = if is_observation(msg.kind) {
                        settled(previous)
                    } else {
                        NodeStatus::Idle
                    };
                }
            }
            Err(DispatchError::Unrecognized) => {
                self.status = previous;
                self.errors += 1;
                debug!(node = self.id.0, kind = %msg.kind, "no handler for message kind");
                self.record(TraceEntry::new(self.tick, self.id, TraceEvent::Unknown).with_message(&msg));
            }
            Err(DispatchError::Fault(fault)) => {
                self.status = NodeStatus::Error;
                self.error_code = error_code::HANDLER_FAULT;
                self.errors += 1;
                warn!(node = self.id.0, frame = %msg, %fault, "handler failed");
                let entry = TraceEntry::new(self.tick, self.id, TraceEvent::Error)
                    .with_message(&msg)
                    .with_detail(fault.to_string());
                self.record(entry);
            }
        }
    }

    /// `previous` is the status the frame found the node in; health and
    /// status replies report it.
    fn handle(&mut self, msg: &Message, previous: NodeStatus) -> Result<(), DispatchError> {
        match msg.kind {
            MessageType::Nop => Ok(()),
            MessageType::HealthCheck => {
                let load = self.inbox.len() as u8;
                self.reply(Message::health_reply(self.id, msg.src, msg.id, settled(previous), load));
                Ok(())
            }
            MessageType::Execute => self.handle_execute(msg),
            MessageType::Compute => self.handle_compute(msg),
            MessageType::Status => {
                let payload = [
                    settled(previous).to_u8(),
                    self.inbox.len() as u8,
                    self.outbox.len() as u8,
                    self.error_code,
                    self.msgs_received as u8,
                    self.msgs_sent as u8,
                    self.errors as u8,
                ];
                self.reply(msg.response(&payload));
                Ok(())
            }
            MessageType::Reset => {
                self.inbox.clear();
                self.error_code = error_code::NONE;
                self.status = NodeStatus::Idle;
                self.record(TraceEntry::new(self.tick, self.id, TraceEvent::Reset).with_message(msg));
                Ok(())
            }
            MessageType::Halt => {
                self.status = NodeStatus::Halted;
                self.record(TraceEntry::new(self.tick, self.id, TraceEvent::Halt).with_message(msg));
                Ok(())
            }
            MessageType::Load => {
                self.program_id = u16::from_le_bytes([msg.arg(0), msg.arg(1)]);
                let entry = TraceEntry::new(self.tick, self.id, TraceEvent::Load)
                    .with_message(msg)
                    .with_detail(format!("program {}", self.program_id));
                self.record(entry);
                let echo = self.program_id.to_le_bytes();
                self.reply(msg.response(&echo));
                Ok(())
            }
            MessageType::Dump => {
                let addr = u16::from_le_bytes([msg.arg(0), msg.arg(1)]);
                let count = usize::from(msg.arg(2)).min(MAX_DUMP_BYTES);
                let mut payload = vec![msg.arg(0), msg.arg(1)];
                payload.extend(self.memory.read_block(usize::from(addr), count));
                self.reply(msg.response(&payload));
                Ok(())
            }
            MessageType::Trace if self.id.is_coordinator() => {
                let detail = msg
                    .payload()
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<String>();
                let entry = TraceEntry::new(self.tick, msg.src, TraceEvent::Remote)
                    .with_message(msg)
                    .with_detail(detail);
                self.record(entry);
                Ok(())
            }
            kind if kind.is_reply() => {
                self.pending.resolve(msg);
                Ok(())
            }
            _ => Err(DispatchError::Unrecognized),
        }
    }

    fn handle_execute(&mut self, msg: &Message) -> Result<(), DispatchError> {
        let op = msg.arg(0);
        let args = Operands::from_frame(msg);
        match self.handlers.run(op, args, &mut self.memory) {
            Ok((result, extra)) => {
                self.reply(Message::execute_ok(self.id, msg.src, msg.id, result, extra));
                Ok(())
            }
            Err(fault) => {
                self.reply(msg.error_response(fault.code));
                Err(DispatchError::Fault(fault))
            }
        }
    }

    fn handle_compute(&mut self, msg: &Message) -> Result<(), DispatchError> {
        let op = msg.arg(0);
        let args = Operands::from_frame(msg);
        let outcome = match self.coprocessor.as_mut() {
            Some(cp) => cp.compute(op, args).map_err(|fault| {
                HandlerFault::new(error_code::COMPUTE_FAILED, fault.reason)
            }),
            None => self.handlers.run(op, args, &mut self.memory),
        };
        match outcome {
            Ok((result, extra)) => {
                self.reply(Message::compute_ok(self.id, msg.src, msg.id, result, extra));
                Ok(())
            }
            Err(fault) => {
                self.reply(msg.error_response(fault.code));
                Err(DispatchError::Fault(fault))
            }
        }
    }

    fn reply(&mut self, msg: Message) {
        // Overflow is already counted and traced by `send`.
        let _ = self.send(msg);
    }

    // ========================================================================
    // Memory
    // ========================================================================

    pub fn peek(&self, addr: usize) -> u8 {
        self.memory.peek(addr)
    }

    pub fn poke(&mut self, addr: usize, value: u8) {
        self.memory.poke(addr, value);
    }

    pub fn peek_word(&self, addr: usize) -> u16 {
        self.memory.peek_word(addr)
    }

    pub fn poke_word(&mut self, addr: usize, value: u16) {
        self.memory.poke_word(addr, value);
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    // ========================================================================
    // Tracing
    // ========================================================================

    fn record(&mut self, entry: TraceEntry) {
        if self.trace_buf.len() >= MAX_BUFFERED_TRACE {
            self.trace_buf.remove(0);
        }
        self.trace_buf.push(entry);
    }

    /// Hand over buffered trace records, oldest first.
    pub fn drain_trace(&mut self) -> Vec<TraceEntry> {
        std::mem::take(&mut self.trace_buf)
    }

    // ========================================================================
    // Lifecycle & introspection
    // ========================================================================

    /// Restore post-construction runtime state.
    ///
    /// Queues, tick, sequence counter, status, error register, counters,
    /// pending slots, program id and buffered trace are reset. Memory, the
    /// handler table and the co-processor are kept.
    pub fn reset_state(&mut self) {
        self.status = NodeStatus::Idle;
        self.seq = 0;
        self.tick = 0;
        self.error_code = error_code::NONE;
        self.program_id = 0;
        self.inbox.clear();
        self.outbox.clear();
        self.pending.clear();
        self.msgs_received = 0;
        self.msgs_sent = 0;
        self.errors = 0;
        self.trace_buf.clear();
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn config(&self) -> KernelConfig {
        self.config
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn seq(&self) -> u8 {
        self.seq
    }

    pub fn error_code(&self) -> u8 {
        self.error_code
    }

    pub fn program_id(&self) -> u16 {
        self.program_id
    }

    pub fn msgs_received(&self) -> u64 {
        self.msgs_received
    }

    pub fn msgs_sent(&self) -> u64 {
        self.msgs_sent
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    pub fn stats(&self) -> KernelStats {
        KernelStats {
            node: self.id,
            status: self.status,
            tick: self.tick,
            msgs_received: self.msgs_received,
            msgs_sent: self.msgs_sent,
            errors: self.errors,
            inbox_depth: self.inbox.len(),
            outbox_depth: self.outbox.len(),
            pending_requests: self.pending.len(),
            error_code: self.error_code,
            program_id: self.program_id,
        }
    }
}

/// Kinds that only observe or complete bookkeeping. They leave the status
/// the frame found the node in.
fn is_observation(kind: MessageType) -> bool {
    matches!(
        kind,
        MessageType::Nop
            | MessageType::HealthCheck
            | MessageType::Status
            | MessageType::Dump
            | MessageType::Trace
    ) || kind.is_reply()
}

/// The status a node reports outside dispatch. BUSY only ever exists
/// inside one.
fn settled(status: NodeStatus) -> NodeStatus {
    match status {
        NodeStatus::Busy => NodeStatus::Idle,
        other => other,
    }
}
