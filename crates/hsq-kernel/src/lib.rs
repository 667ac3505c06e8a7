//! Node Kernel for hsquares
//!
//! The same kernel runs on the coordinator (node 0) and on every worker.
//! It owns the node's private state and communicates only by frames.
//!
//! ```text
//!          bus                                   bus
//!           │                                     ▲
//!           ▼                                     │
//!   ┌──────────────┐   step()   ┌──────────┐   ┌──────────────┐
//!   │ inbound (16) │ ─────────► │ dispatch │ ─►│ outbound (16)│
//!   └──────────────┘  one/tick  └────┬─────┘   └──────────────┘
//!                                    │
//!               ┌────────────────────┼─────────────────────┐
//!               ▼                    ▼                     ▼
//!        ┌─────────────┐    ┌────────────────┐    ┌────────────────┐
//!        │ HandlerTable│    │  PendingTable  │    │ Memory (64 KiB)│
//!        │ op → handler│    │ seq id → reply │    │  peek / poke   │
//!        └─────────────┘    └────────────────┘    └────────────────┘
//! ```
//!
//! # Status machine
//!
//! | From         | Event                       | To       |
//! |--------------|-----------------------------|----------|
//! | any live     | dispatch begins             | BUSY     |
//! | BUSY         | work succeeds               | IDLE     |
//! | BUSY         | query or reply handled      | previous |
//! | BUSY         | handler fails               | ERROR    |
//! | any live     | RESET frame                 | IDLE     |
//! | any live     | HALT frame                  | HALTED   |
//! | HALTED       | anything                    | HALTED   |
//!
//! Handler failures are values ([`HandlerFault`]), never panics.

mod correlation;
mod error;
mod kernel;
mod mailbox;
mod memory;
mod ops;
mod trace;

pub mod invariants;

pub use correlation::PendingTable;
pub use error::{HandlerFault, KernelError};
pub use kernel::{KernelConfig, KernelStats, NodeKernel, MAX_DUMP_BYTES};
pub use mailbox::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
pub use memory::{Memory, MEMORY_SIZE};
pub use ops::{
    op_add, op_and, op_cmp, op_nop, op_or, op_shl, op_shr, op_sub, op_xor, peek_handler,
    poke_handler, BuiltinOp, CoProcessor, HandlerResult, HandlerTable, OpHandler, Operands,
};
pub use trace::{MessageRef, TraceEntry, TraceEvent};
