//! Node status codes.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Node status, as reported in health replies and tracked by the directory.
///
/// ```text
/// OFFLINE ──health reply──▶ IDLE ◀──▶ BUSY
///    ▲                        │         │
///    └──heartbeat timeout─────┴── ERROR ◀┘ (handler failure)
///
/// any ──halt──▶ HALTED (terminal)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeStatus {
    /// Not reachable (never answered, or timed out)
    Offline = 0x00,
    /// Online and ready for work
    Idle = 0x01,
    /// Dispatching a message
    Busy = 0x02,
    /// Last dispatch failed
    Error = 0x03,
    /// Explicitly halted; no further transitions
    Halted = 0x04,
}

impl NodeStatus {
    /// Convert from the wire code.
    ///
    /// Returns `None` for unassigned values.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(NodeStatus::Offline),
            0x01 => Some(NodeStatus::Idle),
            0x02 => Some(NodeStatus::Busy),
            0x03 => Some(NodeStatus::Error),
            0x04 => Some(NodeStatus::Halted),
            _ => None,
        }
    }

    /// Wire code for this status.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Upper-case label used in traces and listings.
    pub fn name(&self) -> &'static str {
        match self {
            NodeStatus::Offline => "OFFLINE",
            NodeStatus::Idle => "IDLE",
            NodeStatus::Busy => "BUSY",
            NodeStatus::Error => "ERROR",
            NodeStatus::Halted => "HALTED",
        }
    }

    /// Online means reachable: neither OFFLINE nor HALTED.
    pub fn is_online(&self) -> bool {
        !matches!(self, NodeStatus::Offline | NodeStatus::Halted)
    }

    /// HALTED admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Halted)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
