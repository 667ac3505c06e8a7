//! System-level error types.

use hsq_fabric::FabricError;
use hsq_frame::NodeId;
use hsq_kernel::KernelError;

/// Errors from bus registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// A port with this node id is already on the bus
    #[error("node {0} is already registered on the bus")]
    AlreadyRegistered(NodeId),
}

/// Errors surfaced by the orchestrator and its configuration.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("no node {0} in this system")]
    UnknownNode(NodeId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Fabric(#[from] FabricError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
