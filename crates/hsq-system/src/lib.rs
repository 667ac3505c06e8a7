//! hsquares system: message bus, orchestrator and record/replay
//!
//! Ties the node kernels and the fabric kernel together into a running
//! star-topology system driven by logical ticks.
//!
//! # Usage
//!
//! ```rust
//! use hsq_frame::{opcode, NodeId};
//! use hsq_system::{Orchestrator, SystemConfig, DEFAULT_CALL_TIMEOUT};
//!
//! let mut system = Orchestrator::new(SystemConfig::default()).unwrap();
//! let online = system.boot();
//! assert!(online.values().all(|up| *up));
//!
//! let result = system.execute(NodeId(1), opcode::ADD, 50, 10, 0, DEFAULT_CALL_TIMEOUT);
//! assert_eq!(result, Some((60, 0)));
//! ```
//!
//! Frames sent by the coordinator are recorded from construction, so any
//! run can be replayed from reset state and compared by [`Snapshot`].

mod bus;
mod config;
mod error;
mod replay;
mod report;
mod system;

pub use bus::{BusPort, MessageBus};
pub use config::{
    SystemConfig, DEFAULT_BOOT_BUDGET, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT,
    DEFAULT_NUM_WORKERS, DEFAULT_QUEUE_CAPACITY, DEFAULT_TRACE_CAPACITY, SETTLE_TICKS,
};
pub use error::{BusError, SystemError};
pub use replay::{NodeSnapshot, RecordedFrame, Recording, Snapshot};
pub use report::{NodeListing, NodeRole, NodeState, PendingFrame, StatusReport, StepReport, SystemStats};
pub use system::{
    Orchestrator, DEFAULT_BROADCAST_TIMEOUT, DEFAULT_CALL_TIMEOUT, DEFAULT_PING_TIMEOUT,
};
