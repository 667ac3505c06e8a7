//! Integration tests for the node kernel: queue bounds, terminal halt,
//! builtin arithmetic over the full operand space.

use hsq_frame::{error_code, opcode, Message, MessageType, NodeId, NodeStatus};
use hsq_kernel::invariants::check_all_invariants;
use hsq_kernel::{
    HandlerResult, KernelConfig, KernelError, Memory, NodeKernel, Operands, TraceEvent,
};
use proptest::prelude::*;

const COORD: NodeId = NodeId::COORDINATOR;
const NODE: NodeId = NodeId(2);

fn execute(kernel: &mut NodeKernel, op: u8, a: u8, b: u8) -> Message {
    kernel
        .receive(Message::execute(COORD, NODE, 1, op, a, b, 0))
        .unwrap();
    kernel.step();
    kernel.take_outbound().unwrap()
}

#[test]
fn seventeen_frames_into_sixteen_slots_drops_one() {
    let mut kernel = NodeKernel::new(NODE);
    let mut rejected = 0;
    for i in 0..17u8 {
        if kernel.receive(Message::health_check(COORD, NODE, i)).is_err() {
            rejected += 1;
        }
    }
    assert_eq!(rejected, 1);
    assert_eq!(kernel.inbox_len(), 16);
    assert_eq!(kernel.errors(), 1);

    let overflow = kernel
        .drain_trace()
        .into_iter()
        .filter(|t| t.event == TraceEvent::Overflow)
        .count();
    assert_eq!(overflow, 1);
    assert!(check_all_invariants(&kernel).is_empty());
}

#[test]
fn outbound_overflow_rejects_newest() {
    let config = KernelConfig {
        inbox_capacity: 16,
        outbox_capacity: 2,
    };
    let mut kernel = NodeKernel::with_config(NODE, config);
    for i in 0..3u8 {
        kernel.receive(Message::health_check(COORD, NODE, i)).unwrap();
    }
    for _ in 0..3 {
        kernel.step();
    }
    assert_eq!(kernel.outbox_len(), 2);
    assert_eq!(kernel.errors(), 1);
    let ids: Vec<u8> = kernel.outbound().map(|m| m.id).collect();
    assert_eq!(ids, vec![0, 1]);

    let direct = kernel.send(Message::halt(NODE, COORD));
    assert_eq!(direct, Err(KernelError::OutboxFull));
}

#[test]
fn halted_kernel_discards_everything() {
    let mut kernel = NodeKernel::new(NODE);
    kernel.receive(Message::halt(COORD, NODE)).unwrap();
    kernel.step();

    for kind in [MessageType::HealthCheck, MessageType::Reset, MessageType::Execute] {
        kernel.receive(Message::new(kind, 9, COORD, NODE, &[1, 2, 3])).unwrap();
        assert!(!kernel.step());
    }
    assert_eq!(kernel.status(), NodeStatus::Halted);
    assert_eq!(kernel.outbox_len(), 0);
    let drops = kernel
        .drain_trace()
        .into_iter()
        .filter(|t| t.event == TraceEvent::HaltedDrop)
        .count();
    assert_eq!(drops, 3);
}

#[test]
fn empty_step_only_advances_tick() {
    let mut kernel = NodeKernel::new(NODE);
    assert!(!kernel.step());
    assert!(!kernel.step());
    assert_eq!(kernel.tick(), 2);
    assert_eq!(kernel.status(), NodeStatus::Idle);
}

#[test]
fn custom_handler_keeps_state_between_calls() {
    let mut kernel = NodeKernel::new(NODE);
    let mut calls = 0u8;
    kernel.register_handler(opcode::CUSTOM_BASE, move |_: Operands, _: &mut Memory| -> HandlerResult {
        calls += 1;
        Ok((calls, 0))
    });
    assert_eq!(execute(&mut kernel, opcode::CUSTOM_BASE, 0, 0).arg(0), 1);
    assert_eq!(execute(&mut kernel, opcode::CUSTOM_BASE, 0, 0).arg(0), 2);
}

#[test]
fn unknown_opcode_reply_carries_code() {
    let mut kernel = NodeKernel::new(NODE);
    let reply = execute(&mut kernel, 0x7F, 0, 0);
    assert_eq!(reply.kind, MessageType::ExecuteError);
    assert_eq!(reply.payload(), &[error_code::UNKNOWN_OPCODE]);
    assert!(check_all_invariants(&kernel).is_empty());
}

proptest! {
    #[test]
    fn add_matches_wrapping_arithmetic(a in any::<u8>(), b in any::<u8>()) {
        let mut kernel = NodeKernel::new(NODE);
        let reply = execute(&mut kernel, opcode::ADD, a, b);
        let sum = u16::from(a) + u16::from(b);
        prop_assert_eq!(reply.kind, MessageType::ExecuteOk);
        prop_assert_eq!(reply.arg(0), (sum % 256) as u8);
        prop_assert_eq!(reply.arg(1), (sum > 255) as u8);
    }

    #[test]
    fn sub_matches_wrapping_arithmetic(a in any::<u8>(), b in any::<u8>()) {
        let mut kernel = NodeKernel::new(NODE);
        let reply = execute(&mut kernel, opcode::SUB, a, b);
        prop_assert_eq!(reply.arg(0), a.wrapping_sub(b));
        prop_assert_eq!(reply.arg(1), (a < b) as u8);
    }

    #[test]
    fn cmp_encodes_ordering(a in any::<u8>(), b in any::<u8>()) {
        let mut kernel = NodeKernel::new(NODE);
        let reply = execute(&mut kernel, opcode::CMP, a, b);
        prop_assert_eq!(reply.arg(0), (a == b) as u8);
        prop_assert_eq!(reply.arg(1), (a < b) as u8 | (((a > b) as u8) << 1));
    }

    #[test]
    fn shifts_report_carry(a in any::<u8>()) {
        let mut kernel = NodeKernel::new(NODE);
        let left = execute(&mut kernel, opcode::SHL, a, 0);
        prop_assert_eq!((left.arg(0), left.arg(1)), (a << 1, a >> 7));
        let right = execute(&mut kernel, opcode::SHR, a, 0);
        prop_assert_eq!((right.arg(0), right.arg(1)), (a >> 1, a & 1));
    }
}
