//! Fabric Kernel for hsquares
//!
//! Runs on the coordinator only. Workers run just the node kernel.
//!
//! | Service    | Responsibility                                          |
//! |------------|---------------------------------------------------------|
//! | Directory  | One [`NodeEntry`] per worker, edge-triggered events     |
//! | Router     | Least-loaded idle node, round-robin among ties          |
//! | Supervisor | Heartbeat rounds, timeouts, quarantine                  |
//! | Loader     | Program id bookkeeping and load frames                  |
//! | Tracer     | Bounded trace log shared by every node                  |
//!
//! The fabric is the sole writer of the directory. It sends no frames of its
//! own: every service that needs the bus returns the frame or the target
//! list, and the orchestrator does the sending.

mod directory;
mod error;
mod fabric;
mod loader;
mod router;
mod supervisor;
mod tracer;

pub use directory::{Directory, DirectoryEvent, NodeEntry};
pub use error::FabricError;
pub use fabric::{FabricConfig, FabricKernel, FabricStats, NodeSummary};
pub use router::Router;
pub use supervisor::{Supervisor, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};
pub use tracer::{TraceLog, DEFAULT_TRACE_CAPACITY};
