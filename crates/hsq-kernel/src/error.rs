//! Kernel error types.

use hsq_frame::error_code;

/// Errors returned by kernel operations that can refuse work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Outbound queue is full; the frame was dropped.
    #[error("outbound queue full")]
    OutboxFull,
    /// Inbound queue is full; the frame was dropped.
    #[error("inbound queue full")]
    InboxFull,
}

/// Failure reported by an operation handler or co-processor.
///
/// The kernel turns it into an ERROR status transition and an
/// execute-error reply carrying `code`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("handler fault 0x{code:02x}: {reason}")]
pub struct HandlerFault {
    /// Error code placed in the execute-error payload
    pub code: u8,
    /// Human-readable description
    pub reason: String,
}

impl HandlerFault {
    /// Fault with an explicit code.
    pub fn new(code: u8, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Generic handler fault (code 0xFF).
    pub fn fault(reason: impl Into<String>) -> Self {
        Self::new(error_code::HANDLER_FAULT, reason)
    }

    /// No handler registered for `opcode`.
    pub fn unknown_opcode(opcode: u8) -> Self {
        Self::new(
            error_code::UNKNOWN_OPCODE,
            format!("no handler for opcode 0x{opcode:02x}"),
        )
    }
}
