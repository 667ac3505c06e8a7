//! Runtime-checkable kernel invariants
//!
//! These hold between steps on every kernel and are used by tests and by
//! the orchestrator's debug checks.
//!
//! # Invariants
//!
//! 1. **Bounded queues**: neither queue exceeds its configured capacity
//! 2. **No transient status**: BUSY is never observable between steps
//! 3. **Error register**: an ERROR node carries a non-zero error code
//! 4. **Counter coverage**: queued frames never exceed the counters that admitted them

use crate::kernel::NodeKernel;
use hsq_frame::{error_code, NodeStatus};

/// An invariant violation with details
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

/// Check all kernel invariants.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants(kernel: &NodeKernel) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_bounded_queues(kernel));
    violations.extend(check_no_transient_status(kernel));
    violations.extend(check_error_register(kernel));
    violations.extend(check_counter_coverage(kernel));

    violations
}

/// Invariant 1: queue depths stay within capacity
fn check_bounded_queues(kernel: &NodeKernel) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let config = kernel.config();

    if kernel.inbox_len() > config.inbox_capacity {
        violations.push(InvariantViolation {
            invariant: "bounded_queues",
            description: format!(
                "Node {} inbound depth {} exceeds capacity {}",
                kernel.id(),
                kernel.inbox_len(),
                config.inbox_capacity
            ),
        });
    }
    if kernel.outbox_len() > config.outbox_capacity {
        violations.push(InvariantViolation {
            invariant: "bounded_queues",
            description: format!(
                "Node {} outbound depth {} exceeds capacity {}",
                kernel.id(),
                kernel.outbox_len(),
                config.outbox_capacity
            ),
        });
    }

    violations
}

/// Invariant 2: BUSY only exists inside a dispatch
fn check_no_transient_status(kernel: &NodeKernel) -> Vec<InvariantViolation> {
    if kernel.status() == NodeStatus::Busy {
        return vec![InvariantViolation {
            invariant: "no_transient_status",
            description: format!("Node {} left BUSY after a step", kernel.id()),
        }];
    }
    Vec::new()
}

/// Invariant 3: ERROR implies a recorded error code
fn check_error_register(kernel: &NodeKernel) -> Vec<InvariantViolation> {
    if kernel.status() == NodeStatus::Error && kernel.error_code() == error_code::NONE {
        return vec![InvariantViolation {
            invariant: "error_register",
            description: format!("Node {} is in ERROR with no error code", kernel.id()),
        }];
    }
    Vec::new()
}

/// Invariant 4: every queued frame was counted on admission
fn check_counter_coverage(kernel: &NodeKernel) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    if kernel.inbox_len() as u64 > kernel.msgs_received() {
        violations.push(InvariantViolation {
            invariant: "counter_coverage",
            description: format!(
                "Node {} holds {} inbound frames but counted {}",
                kernel.id(),
                kernel.inbox_len(),
                kernel.msgs_received()
            ),
        });
    }
    if kernel.outbox_len() as u64 > kernel.msgs_sent() {
        violations.push(InvariantViolation {
            invariant: "counter_coverage",
            description: format!(
                "Node {} holds {} outbound frames but counted {}",
                kernel.id(),
                kernel.outbox_len(),
                kernel.msgs_sent()
            ),
        });
    }

    violations
}
