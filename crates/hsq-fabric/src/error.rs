//! Fabric error types.

use hsq_frame::NodeId;

/// Errors returned by directory and supervisor operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FabricError {
    /// No directory entry for the node
    #[error("node {0} is not in the directory")]
    UnknownNode(NodeId),
    /// The node is HALTED and accepts no further status changes
    #[error("node {0} is halted")]
    NodeHalted(NodeId),
}
