//! Message Frame & Protocol Constants for hsquares
//!
//! This crate defines:
//! - **The frame** ([`Message`]): the fixed 16-byte unit of communication
//! - **Message types** ([`MessageType`]): control, request and reply kinds
//! - **Operand opcodes** ([`opcode`]): operations carried inside execute/compute
//! - **Node status codes** ([`NodeStatus`]) and **capability bits** ([`capability`])
//!
//! It is the **single source of truth** for every byte value that crosses
//! the bus, so the node kernel, the fabric and the orchestrator never
//! disagree about the protocol.
//!
//! # Wire Layout
//!
//! | Offset    | Field          | Notes                                   |
//! |-----------|----------------|-----------------------------------------|
//! | 0x00      | `type`         | [`MessageType`] code                    |
//! | 0x01      | `id`           | Sequence number, wraps at 256           |
//! | 0x02      | `src`          | Source node id                          |
//! | 0x03      | `dst`          | Destination node id                     |
//! | 0x04      | `effective_len`| Derived: last non-zero payload byte + 1 |
//! | 0x05      | `flags`        | [`MessageFlags`] bitmask                |
//! | 0x06-0x0F | `payload`      | Always 10 bytes, zero padded            |
//!
//! # Operand Opcode Ranges
//!
//! | Range     | Use                                          |
//! |-----------|----------------------------------------------|
//! | 0x00-0x08 | Builtin arithmetic / logic                   |
//! | 0x10-0x12 | Neural placeholders (co-processor territory) |
//! | 0x20-0x22 | Memory ops (registered by collaborators)     |
//! | 0x80-0xFF | Custom handlers                              |
//!
//! # Usage
//!
//! ```rust
//! use hsq_frame::{opcode, Message, MessageType, NodeId};
//!
//! let frame = Message::execute(NodeId::COORDINATOR, NodeId(3), 7, opcode::ADD, 50, 10, 0);
//! let wire = frame.encode();
//! let back = Message::decode(&wire).unwrap();
//! assert_eq!(back.kind, MessageType::Execute);
//! assert_eq!(back.effective_len(), 3);
//! ```

mod error;
mod message;
mod status;

pub use error::FrameError;
pub use message::{Message, MessageFlags, MessageType, NodeId, FRAME_SIZE, PAYLOAD_SIZE};
pub use status::NodeStatus;

// =============================================================================
// Operand Opcodes (carried in payload[0] of execute / compute frames)
// =============================================================================

/// Operand opcodes understood by the node kernel's handler table.
pub mod opcode {
    // === Builtin arithmetic / logic (0x00 - 0x08) ===
    /// No operation, returns (0, 0)
    pub const NOP: u8 = 0x00;
    /// (a + b) mod 256, carry
    pub const ADD: u8 = 0x01;
    /// (a - b) mod 256, borrow
    pub const SUB: u8 = 0x02;
    /// Equality plus ordering bits
    pub const CMP: u8 = 0x03;
    /// Bitwise AND
    pub const AND: u8 = 0x04;
    /// Bitwise OR
    pub const OR: u8 = 0x05;
    /// Bitwise XOR
    pub const XOR: u8 = 0x06;
    /// Shift left, carry-out is the top bit
    pub const SHL: u8 = 0x07;
    /// Shift right, carry-out is the bottom bit
    pub const SHR: u8 = 0x08;

    // === Neural placeholders (0x10 - 0x12) ===
    /// Neural ALU operation (co-processor)
    pub const NEURAL_ALU: u8 = 0x10;
    /// Neural compare (co-processor)
    pub const NEURAL_CMP: u8 = 0x11;
    /// Neural logic (co-processor)
    pub const NEURAL_LOGIC: u8 = 0x12;

    // === Memory range (0x20 - 0x22), installed on demand ===
    /// Read one byte of node memory
    pub const PEEK: u8 = 0x20;
    /// Write one byte of node memory
    pub const POKE: u8 = 0x21;
    /// Block copy (reserved)
    pub const COPY: u8 = 0x22;

    // === Custom handlers (0x80 - 0xFF) ===
    /// First opcode of the custom handler range
    pub const CUSTOM_BASE: u8 = 0x80;

    /// Highest builtin arithmetic/logic opcode.
    pub const BUILTIN_MAX: u8 = SHR;

    /// Whether `op` falls in the builtin arithmetic/logic range.
    ///
    /// Collaborators registering extension handlers should stay clear of it.
    pub const fn is_builtin(op: u8) -> bool {
        op <= BUILTIN_MAX
    }
}

// =============================================================================
// Kernel Error Codes (payload[0] of execute-error frames)
// =============================================================================

/// Error codes carried by execute-error replies and the kernel's error register.
pub mod error_code {
    /// No error recorded
    pub const NONE: u8 = 0x00;
    /// Opcode has no registered handler
    pub const UNKNOWN_OPCODE: u8 = 0x01;
    /// Attached co-processor failed
    pub const COMPUTE_FAILED: u8 = 0x02;
    /// Generic handler fault
    pub const HANDLER_FAULT: u8 = 0xFF;
}

// =============================================================================
// Capability Bits (directory capability bitmask)
// =============================================================================

/// Node capability flags used by the router.
pub mod capability {
    /// Basic operations
    pub const BASIC: u8 = 0x01;
    /// Neural ALU
    pub const NEURAL_ALU: u8 = 0x02;
    /// Neural compare
    pub const NEURAL_CMP: u8 = 0x04;
    /// Neural logic
    pub const NEURAL_LOGIC: u8 = 0x08;
    /// Extended memory
    pub const MEMORY: u8 = 0x10;
    /// Custom handlers
    pub const CUSTOM: u8 = 0x80;
    /// Every capability
    pub const ALL: u8 = 0xFF;
}
