//! The 16-byte message frame.
//!
//! Every interaction between nodes (control, computation, health checks)
//! travels as one [`Message`]. The payload is always exactly
//! [`PAYLOAD_SIZE`] bytes; shorter payloads are zero padded and longer
//! ones truncated. The effective length is derived from trailing zero
//! bytes and is never stored independently.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::status::NodeStatus;

/// Size of an encoded frame in bytes.
pub const FRAME_SIZE: usize = 16;

/// Size of the payload area in bytes.
pub const PAYLOAD_SIZE: usize = 10;

/// Node identifier (one byte on the wire).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u8);

impl NodeId {
    /// The coordinator is always node 0.
    pub const COORDINATOR: NodeId = NodeId(0);

    /// Whether this is the coordinator.
    pub fn is_coordinator(&self) -> bool {
        *self == Self::COORDINATOR
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Message types
// ============================================================================

/// Message type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// No operation
    Nop = 0x00,
    /// Health check request
    HealthCheck = 0x01,
    /// Health check response
    HealthReply = 0x02,
    /// Execute an operand opcode
    Execute = 0x03,
    /// Execution succeeded
    ExecuteOk = 0x04,
    /// Execution failed
    ExecuteError = 0x05,
    /// Load program
    Load = 0x06,
    /// Load succeeded
    LoadOk = 0x07,
    /// Memory dump request
    Dump = 0x08,
    /// Memory dump response
    DumpData = 0x09,
    /// Reset node (no reply)
    Reset = 0x0A,
    /// Trace event (fire-and-forget, addressed to the coordinator)
    Trace = 0x0B,
    /// Route work
    Route = 0x0C,
    /// Status request
    Status = 0x0D,
    /// Status response
    StatusReply = 0x0E,
    /// Halt node (no reply)
    Halt = 0x0F,
    /// Compute request (co-processor aware)
    Compute = 0x10,
    /// Compute response
    ComputeOk = 0x11,
}

/// Request kind → success reply kind.
const RESPONSE_KINDS: [(MessageType, MessageType); 6] = [
    (MessageType::HealthCheck, MessageType::HealthReply),
    (MessageType::Execute, MessageType::ExecuteOk),
    (MessageType::Load, MessageType::LoadOk),
    (MessageType::Dump, MessageType::DumpData),
    (MessageType::Status, MessageType::StatusReply),
    (MessageType::Compute, MessageType::ComputeOk),
];

/// Kinds that close an outstanding request.
const REPLY_KINDS: [MessageType; 7] = [
    MessageType::HealthReply,
    MessageType::ExecuteOk,
    MessageType::ExecuteError,
    MessageType::LoadOk,
    MessageType::DumpData,
    MessageType::StatusReply,
    MessageType::ComputeOk,
];

impl MessageType {
    /// Convert from the wire code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(MessageType::Nop),
            0x01 => Some(MessageType::HealthCheck),
            0x02 => Some(MessageType::HealthReply),
            0x03 => Some(MessageType::Execute),
            0x04 => Some(MessageType::ExecuteOk),
            0x05 => Some(MessageType::ExecuteError),
            0x06 => Some(MessageType::Load),
            0x07 => Some(MessageType::LoadOk),
            0x08 => Some(MessageType::Dump),
            0x09 => Some(MessageType::DumpData),
            0x0A => Some(MessageType::Reset),
            0x0B => Some(MessageType::Trace),
            0x0C => Some(MessageType::Route),
            0x0D => Some(MessageType::Status),
            0x0E => Some(MessageType::StatusReply),
            0x0F => Some(MessageType::Halt),
            0x10 => Some(MessageType::Compute),
            0x11 => Some(MessageType::ComputeOk),
            _ => None,
        }
    }

    /// Wire code for this kind.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Is this a request kind (expects a reply)?
    pub fn is_request(&self) -> bool {
        matches!(self, MessageType::Route) || self.response_kind().is_some()
    }

    /// Is this a reply kind that resolves a pending request?
    pub fn is_reply(&self) -> bool {
        REPLY_KINDS.contains(self)
    }

    /// The success reply kind paired with this request kind.
    pub fn response_kind(&self) -> Option<MessageType> {
        RESPONSE_KINDS
            .iter()
            .find(|(request, _)| request == self)
            .map(|(_, reply)| *reply)
    }

    /// Upper-case label used in traces and listings.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Nop => "NOP",
            MessageType::HealthCheck => "HEALTH_CHECK",
            MessageType::HealthReply => "HEALTH_REPLY",
            MessageType::Execute => "EXECUTE",
            MessageType::ExecuteOk => "EXECUTE_OK",
            MessageType::ExecuteError => "EXECUTE_ERROR",
            MessageType::Load => "LOAD",
            MessageType::LoadOk => "LOAD_OK",
            MessageType::Dump => "DUMP",
            MessageType::DumpData => "DUMP_DATA",
            MessageType::Reset => "RESET",
            MessageType::Trace => "TRACE",
            MessageType::Route => "ROUTE",
            MessageType::Status => "STATUS",
            MessageType::StatusReply => "STATUS_REPLY",
            MessageType::Halt => "HALT",
            MessageType::Compute => "COMPUTE",
            MessageType::ComputeOk => "COMPUTE_OK",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Flags
// ============================================================================

/// Message flag bitmask.
///
/// Unknown bits are preserved so a decoded frame re-encodes unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageFlags(pub u8);

impl MessageFlags {
    /// No flags
    pub const NONE: MessageFlags = MessageFlags(0x00);
    /// Acknowledgment required
    pub const ACK_REQ: MessageFlags = MessageFlags(0x01);
    /// High priority
    pub const PRIORITY: MessageFlags = MessageFlags(0x02);
    /// Part of a fragmented message
    pub const FRAGMENT: MessageFlags = MessageFlags(0x04);
    /// Last fragment
    pub const LAST_FRAG: MessageFlags = MessageFlags(0x08);
    /// Deliver to every node except the source
    pub const BROADCAST: MessageFlags = MessageFlags(0x10);

    /// Raw bits.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub fn contains(&self, other: MessageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub fn insert(&mut self, other: MessageFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for MessageFlags {
    type Output = MessageFlags;

    fn bitor(self, rhs: MessageFlags) -> MessageFlags {
        MessageFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for MessageFlags {
    fn bitor_assign(&mut self, rhs: MessageFlags) {
        self.0 |= rhs.0;
    }
}

// ============================================================================
// Message
// ============================================================================

/// Fixed-size message frame (16 bytes on the wire).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message kind
    pub kind: MessageType,
    /// Sequence id used for request/response correlation
    pub id: u8,
    /// Source node
    pub src: NodeId,
    /// Destination node
    pub dst: NodeId,
    /// Flag bitmask
    pub flags: MessageFlags,
    /// Payload, always exactly [`PAYLOAD_SIZE`] bytes
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Message {
    /// Build a frame, padding or truncating `payload` to [`PAYLOAD_SIZE`].
    pub fn new(kind: MessageType, id: u8, src: NodeId, dst: NodeId, payload: &[u8]) -> Self {
        let mut buf = [0u8; PAYLOAD_SIZE];
        let n = payload.len().min(PAYLOAD_SIZE);
        buf[..n].copy_from_slice(&payload[..n]);
        Self {
            kind,
            id,
            src,
            dst,
            flags: MessageFlags::NONE,
            payload: buf,
        }
    }

    /// Same frame with `flags` set.
    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Length of meaningful payload: index of the last non-zero byte + 1.
    pub fn effective_len(&self) -> usize {
        self.payload
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1)
    }

    /// Payload cut at the effective length.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.effective_len()]
    }

    /// Payload byte at `index`, zero when out of range.
    pub fn arg(&self, index: usize) -> u8 {
        self.payload.get(index).copied().unwrap_or(0)
    }

    /// Whether the broadcast flag is set.
    pub fn is_broadcast(&self) -> bool {
        self.flags.contains(MessageFlags::BROADCAST)
    }

    /// Serialize to the 16-byte wire layout.
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut out = [0u8; FRAME_SIZE];
        out[0] = self.kind.to_u8();
        out[1] = self.id;
        out[2] = self.src.0;
        out[3] = self.dst.0;
        out[4] = self.effective_len() as u8;
        out[5] = self.flags.bits();
        out[6..].copy_from_slice(&self.payload);
        out
    }

    /// Parse the 16-byte wire layout.
    ///
    /// Inputs shorter than [`FRAME_SIZE`] are zero padded; bytes past it are
    /// ignored. The stored effective length byte is not trusted.
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let mut raw = [0u8; FRAME_SIZE];
        let n = data.len().min(FRAME_SIZE);
        raw[..n].copy_from_slice(&data[..n]);

        let kind = MessageType::from_u8(raw[0]).ok_or(FrameError::UnknownType(raw[0]))?;
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&raw[6..]);

        Ok(Self {
            kind,
            id: raw[1],
            src: NodeId(raw[2]),
            dst: NodeId(raw[3]),
            flags: MessageFlags(raw[5]),
            payload,
        })
    }

    /// Reply with the paired success kind (NOP for kinds without a pair).
    ///
    /// Keeps the sequence id and swaps source and destination.
    pub fn response(&self, payload: &[u8]) -> Message {
        let kind = self.kind.response_kind().unwrap_or(MessageType::Nop);
        Message::new(kind, self.id, self.dst, self.src, payload)
    }

    /// Reply with an execute-error carrying `code`.
    pub fn error_response(&self, code: u8) -> Message {
        Message::new(MessageType::ExecuteError, self.id, self.dst, self.src, &[code])
    }

    // ------------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------------

    /// Health check request.
    pub fn health_check(src: NodeId, dst: NodeId, id: u8) -> Self {
        Message::new(MessageType::HealthCheck, id, src, dst, &[]).with_flags(MessageFlags::ACK_REQ)
    }

    /// Health check reply carrying status and load.
    pub fn health_reply(src: NodeId, dst: NodeId, id: u8, status: NodeStatus, load: u8) -> Self {
        Message::new(MessageType::HealthReply, id, src, dst, &[status.to_u8(), load])
    }

    /// Execute request `[opcode, a, b, flags]`.
    pub fn execute(src: NodeId, dst: NodeId, id: u8, op: u8, a: u8, b: u8, flags: u8) -> Self {
        Message::new(MessageType::Execute, id, src, dst, &[op, a, b, flags])
            .with_flags(MessageFlags::ACK_REQ)
    }

    /// Execute success reply `[result, extra]`.
    pub fn execute_ok(src: NodeId, dst: NodeId, id: u8, result: u8, extra: u8) -> Self {
        Message::new(MessageType::ExecuteOk, id, src, dst, &[result, extra])
    }

    /// Execute failure reply `[code]`.
    pub fn execute_error(src: NodeId, dst: NodeId, id: u8, code: u8) -> Self {
        Message::new(MessageType::ExecuteError, id, src, dst, &[code])
    }

    /// Compute request `[op, a, b, flags]`.
    pub fn compute(src: NodeId, dst: NodeId, id: u8, op: u8, a: u8, b: u8, flags: u8) -> Self {
        Message::new(MessageType::Compute, id, src, dst, &[op, a, b, flags])
            .with_flags(MessageFlags::ACK_REQ)
    }

    /// Compute success reply `[result, extra]`.
    pub fn compute_ok(src: NodeId, dst: NodeId, id: u8, result: u8, extra: u8) -> Self {
        Message::new(MessageType::ComputeOk, id, src, dst, &[result, extra])
    }

    /// Load request carrying a little-endian program id.
    pub fn load(src: NodeId, dst: NodeId, id: u8, program_id: u16) -> Self {
        Message::new(MessageType::Load, id, src, dst, &program_id.to_le_bytes())
    }

    /// Memory dump request `[addr lo, addr hi, count]`.
    pub fn dump(src: NodeId, dst: NodeId, id: u8, addr: u16, count: u8) -> Self {
        let [lo, hi] = addr.to_le_bytes();
        Message::new(MessageType::Dump, id, src, dst, &[lo, hi, count])
    }

    /// Status request.
    pub fn status(src: NodeId, dst: NodeId, id: u8) -> Self {
        Message::new(MessageType::Status, id, src, dst, &[]).with_flags(MessageFlags::ACK_REQ)
    }

    /// Reset command (no reply).
    pub fn reset(src: NodeId, dst: NodeId) -> Self {
        Message::new(MessageType::Reset, 0, src, dst, &[])
    }

    /// Halt command (no reply).
    pub fn halt(src: NodeId, dst: NodeId) -> Self {
        Message::new(MessageType::Halt, 0, src, dst, &[])
    }

    /// Trace event, always addressed to the coordinator.
    pub fn trace(src: NodeId, event: u8, data: &[u8]) -> Self {
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload[0] = event;
        let n = data.len().min(PAYLOAD_SIZE - 1);
        payload[1..=n].copy_from_slice(&data[..n]);
        Message::new(MessageType::Trace, 0, src, NodeId::COORDINATOR, &payload)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} id={} {}→{} payload=", self.kind, self.id, self.src, self.dst)?;
        let payload = self.payload();
        if payload.is_empty() {
            return f.write_str("(empty)");
        }
        for byte in payload {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
