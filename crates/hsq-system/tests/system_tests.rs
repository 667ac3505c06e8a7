//! End-to-end tests for the orchestrator, bus and replay.

use hsq_fabric::DirectoryEvent;
use hsq_frame::{capability, error_code, opcode, Message, NodeId, NodeStatus};
use hsq_kernel::{CoProcessor, HandlerFault, HandlerResult, Memory, Operands};
use hsq_system::{
    Orchestrator, Recording, SystemConfig, SystemError, DEFAULT_BROADCAST_TIMEOUT,
    DEFAULT_CALL_TIMEOUT, DEFAULT_PING_TIMEOUT,
};

const C: NodeId = NodeId::COORDINATOR;

fn booted(workers: u8) -> Orchestrator {
    let mut system = Orchestrator::with_workers(workers).unwrap();
    let online = system.boot();
    assert!(online.values().all(|up| *up));
    system
}

// ============================================================================
// Boot & basic calls
// ============================================================================

#[test]
fn eight_workers_boot_within_budget() {
    let mut system = Orchestrator::new(SystemConfig::default()).unwrap();
    let online = system.boot();
    assert_eq!(online.len(), 8);
    assert!(online.values().all(|up| *up));
    assert!(system.tick() <= 100);
    assert!(system.is_booted());
    assert_eq!(system.fabric().online_nodes().len(), 8);

    let events = system.drain_events();
    assert_eq!(events.len(), 8);
    assert!(events.iter().all(|e| matches!(e, DirectoryEvent::Online(_))));
}

#[test]
fn boot_larger_than_queue_capacity() {
    let config = SystemConfig {
        num_workers: 40,
        ..SystemConfig::default()
    };
    let mut system = Orchestrator::new(config).unwrap();
    let online = system.boot();
    assert_eq!(online.values().filter(|up| **up).count(), 40);
    assert_eq!(system.coordinator().errors(), 0);
}

#[test]
fn execute_add_and_carry() {
    let mut system = booted(8);
    assert_eq!(
        system.execute(NodeId(1), opcode::ADD, 50, 10, 0, DEFAULT_CALL_TIMEOUT),
        Some((60, 0))
    );
    assert_eq!(
        system.execute(NodeId(2), opcode::ADD, 255, 1, 0, DEFAULT_CALL_TIMEOUT),
        Some((0, 1))
    );
    assert_eq!(
        system.execute(NodeId(3), opcode::SUB, 0, 1, 0, DEFAULT_CALL_TIMEOUT),
        Some((255, 1))
    );
}

#[test]
fn execute_reply_arrives_on_third_tick() {
    let mut system = booted(2);
    let start = system.tick();
    system.execute(NodeId(1), opcode::XOR, 1, 3, 0, DEFAULT_CALL_TIMEOUT).unwrap();
    assert_eq!(system.tick() - start, 3);
}

#[test]
fn unknown_opcode_leaves_node_usable() {
    let mut system = booted(2);
    assert_eq!(system.execute(NodeId(1), 0x99, 0, 0, 0, DEFAULT_CALL_TIMEOUT), None);
    assert_eq!(system.node(NodeId(1)).unwrap().status(), NodeStatus::Error);
    assert_eq!(system.fabric().node(NodeId(1)).unwrap().error_count, 1);

    assert_eq!(
        system.execute(NodeId(1), opcode::AND, 0xF0, 0x3C, 0, DEFAULT_CALL_TIMEOUT),
        Some((0x30, 0))
    );
    assert_eq!(system.node(NodeId(1)).unwrap().status(), NodeStatus::Idle);
    assert!(system.check_invariants().is_empty());
}

#[test]
fn failed_node_reports_error_until_reset() {
    let mut system = booted(2);
    assert_eq!(system.execute(NodeId(1), 0x99, 0, 0, 0, DEFAULT_CALL_TIMEOUT), None);

    let report = system.status(NodeId(1), DEFAULT_CALL_TIMEOUT).unwrap();
    assert_eq!(report.status, NodeStatus::Error);
    assert_eq!(report.error_code, error_code::HANDLER_FAULT);
    assert_eq!(system.ping(NodeId(1), DEFAULT_PING_TIMEOUT), Some((NodeStatus::Error, 0)));
    assert_eq!(system.node(NodeId(1)).unwrap().status(), NodeStatus::Error);
    assert_eq!(system.fabric().node(NodeId(1)).unwrap().status, NodeStatus::Error);

    system.reset(NodeId(1)).unwrap();
    assert_eq!(system.ping(NodeId(1), DEFAULT_PING_TIMEOUT), Some((NodeStatus::Idle, 0)));
    assert_eq!(system.fabric().node(NodeId(1)).unwrap().status, NodeStatus::Idle);
}

#[test]
fn route_rotates_over_evenly_loaded_nodes() {
    let mut system = booted(4);
    let first = system.route(opcode::ADD, 100, 55, 0, DEFAULT_CALL_TIMEOUT).unwrap();
    assert_eq!(first, (NodeId(1), 155, 0));
    let second = system.route(opcode::ADD, 1, 1, 0, DEFAULT_CALL_TIMEOUT).unwrap();
    assert_eq!(second.0, NodeId(2));
}

#[test]
fn route_with_no_idle_nodes() {
    let mut system = Orchestrator::with_workers(3).unwrap();
    let before = system.tick();
    assert_eq!(system.route(opcode::ADD, 1, 1, 0, DEFAULT_CALL_TIMEOUT), None);
    assert_eq!(system.tick(), before);
}

#[test]
fn route_capable_picks_only_capable() {
    let mut system = booted(4);
    for node in [1, 2, 4] {
        system.set_capabilities(NodeId(node), capability::BASIC).unwrap();
    }
    system
        .set_capabilities(NodeId(3), capability::BASIC | capability::NEURAL_ALU)
        .unwrap();
    let routed = system
        .route_capable(capability::NEURAL_ALU, opcode::OR, 1, 2, 0, DEFAULT_CALL_TIMEOUT)
        .unwrap();
    assert_eq!(routed, (NodeId(3), 3, 0));
    assert_eq!(
        system.route_capable(capability::MEMORY, opcode::OR, 1, 2, 0, DEFAULT_CALL_TIMEOUT),
        None
    );
}

#[test]
fn broadcast_reaches_every_online_worker() {
    let mut system = booted(8);
    let results = system.broadcast_execute(opcode::ADD, 5, 3, 0, DEFAULT_BROADCAST_TIMEOUT);
    assert_eq!(results.len(), 8);
    assert!(results.values().all(|r| *r == Some((8, 0))));
}

#[test]
fn broadcast_wider_than_queue_capacity() {
    let mut system = booted(20);
    let results = system.broadcast_execute(opcode::ADD, 5, 3, 0, DEFAULT_BROADCAST_TIMEOUT);
    assert_eq!(results.len(), 20);
    assert!(results.values().all(|r| *r == Some((8, 0))));
    assert_eq!(system.coordinator().errors(), 0);
    assert_eq!(system.coordinator().pending_len(), 0);
    assert!(system.check_invariants().is_empty());
}

#[test]
fn broadcast_marks_halted_worker_as_none() {
    let mut system = booted(4);
    // Halt the kernel behind the directory's back.
    system.inject(Message::halt(C, NodeId(2))).unwrap();
    system.run(2);

    let results = system.broadcast_execute(opcode::ADD, 1, 1, 0, 30);
    assert_eq!(results[&NodeId(2)], None);
    assert_eq!(results[&NodeId(1)], Some((2, 0)));
    assert_eq!(system.coordinator().pending_len(), 0);
}

// ============================================================================
// Halt, timeouts, management
// ============================================================================

#[test]
fn execute_against_halted_node_times_out_exactly() {
    let mut system = booted(4);
    system.halt(NodeId(3)).unwrap();
    assert_eq!(system.node(NodeId(3)).unwrap().status(), NodeStatus::Halted);
    assert_eq!(system.fabric().node(NodeId(3)).unwrap().status, NodeStatus::Halted);

    let start = system.tick();
    assert_eq!(system.execute(NodeId(3), opcode::ADD, 1, 1, 0, 25), None);
    assert_eq!(system.tick() - start, 25);
    assert_eq!(system.coordinator().pending_len(), 0);
    assert!(system.dump_trace().contains("CALL_TIMEOUT"));

    // Reset does not revive it.
    system.reset(NodeId(3)).unwrap();
    assert_eq!(system.node(NodeId(3)).unwrap().status(), NodeStatus::Halted);
}

#[test]
fn halted_node_is_never_routed_to() {
    let mut system = booted(2);
    system.halt(NodeId(1)).unwrap();
    for _ in 0..4 {
        let (node, _, _) = system.route(opcode::NOP, 0, 0, 0, DEFAULT_CALL_TIMEOUT).unwrap();
        assert_eq!(node, NodeId(2));
    }
}

#[test]
fn reset_clears_error_state() {
    let mut system = booted(2);
    system.execute(NodeId(2), 0x99, 0, 0, 0, DEFAULT_CALL_TIMEOUT);
    assert_eq!(system.node(NodeId(2)).unwrap().error_code(), error_code::HANDLER_FAULT);
    system.reset(NodeId(2)).unwrap();
    let node = system.node(NodeId(2)).unwrap();
    assert_eq!(node.status(), NodeStatus::Idle);
    assert_eq!(node.error_code(), error_code::NONE);
}

#[test]
fn unknown_node_errors() {
    let mut system = booted(2);
    assert!(matches!(system.reset(NodeId(9)), Err(SystemError::UnknownNode(NodeId(9)))));
    assert!(matches!(system.peek(NodeId(9), 0), Err(SystemError::UnknownNode(_))));
    assert!(matches!(system.quarantine(NodeId(9)), Err(SystemError::Fabric(_))));
    assert_eq!(system.load_program(NodeId(9), 1, 10), None);
}

#[test]
fn quarantine_removes_node_from_routing() {
    let mut system = booted(3);
    system.drain_events();
    system.quarantine(NodeId(2)).unwrap();
    assert_eq!(system.drain_events(), vec![DirectoryEvent::NodeError(NodeId(2))]);
    for _ in 0..3 {
        let (node, _, _) = system.route(opcode::NOP, 0, 0, 0, DEFAULT_CALL_TIMEOUT).unwrap();
        assert_ne!(node, NodeId(2));
    }
    assert!(system.dump_trace().contains("Node 2: QUARANTINE"));
}

#[test]
fn supervisor_marks_silent_node_offline_once() {
    let config = SystemConfig {
        num_workers: 4,
        heartbeat_interval: 16,
        heartbeat_timeout: 64,
        auto_supervise: true,
        ..SystemConfig::default()
    };
    let mut system = Orchestrator::new(config).unwrap();
    system.boot();
    system.drain_events();

    // Kernel halted, directory still believes it is idle.
    system.inject(Message::halt(C, NodeId(4))).unwrap();
    system.run(300);

    let offline: Vec<_> = system
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, DirectoryEvent::Offline(_)))
        .collect();
    assert_eq!(offline, vec![DirectoryEvent::Offline(NodeId(4))]);
    for node in 1..=3 {
        assert_eq!(system.fabric().node(NodeId(node)).unwrap().status, NodeStatus::Idle);
    }
    assert_eq!(system.fabric().node(NodeId(4)).unwrap().status, NodeStatus::Offline);
}

#[test]
fn supervisor_keeps_wide_fabric_online() {
    let config = SystemConfig {
        num_workers: 20,
        heartbeat_interval: 16,
        heartbeat_timeout: 64,
        auto_supervise: true,
        ..SystemConfig::default()
    };
    let mut system = Orchestrator::new(config).unwrap();
    assert!(system.boot().values().all(|up| *up));
    system.run(400);

    for node in 1..=20 {
        let entry = system.fabric().node(NodeId(node)).unwrap();
        assert_eq!(entry.status, NodeStatus::Idle, "node {node}");
        assert!(system.tick() - entry.last_heartbeat <= 64, "node {node}");
    }
    assert_eq!(system.coordinator().errors(), 0);
    assert!(!system
        .drain_events()
        .iter()
        .any(|e| matches!(e, DirectoryEvent::Offline(_))));
}

#[test]
fn manual_supervise_sends_due_heartbeats() {
    let mut system = booted(3);
    system.run(300);
    assert_eq!(system.supervise(), 3);
    system.run(6);
    let beat = system.fabric().node(NodeId(1)).unwrap().last_heartbeat;
    assert!(beat > 300);
}

// ============================================================================
// Introspection calls
// ============================================================================

#[test]
fn ping_and_ping_all() {
    let mut system = booted(4);
    assert_eq!(system.ping(NodeId(1), DEFAULT_PING_TIMEOUT), Some((NodeStatus::Idle, 0)));

    system.halt(NodeId(2)).unwrap();
    let online = system.ping_all(100);
    assert_eq!(online.len(), 4);
    assert!(!online[&NodeId(2)]);
    assert!(online[&NodeId(1)] && online[&NodeId(3)] && online[&NodeId(4)]);
}

#[test]
fn status_dump_and_load() {
    let mut system = booted(3);

    let report = system.status(NodeId(2), DEFAULT_CALL_TIMEOUT).unwrap();
    assert_eq!(report.status, NodeStatus::Idle);
    assert_eq!(report.error_code, 0);
    assert_eq!(report.received, 2);

    system.poke(NodeId(3), 0x0100, 0xAB).unwrap();
    system.poke_word(NodeId(3), 0x0102, 0x0201).unwrap();
    assert_eq!(system.peek_word(NodeId(3), 0x0102).unwrap(), 0x0201);
    assert_eq!(
        system.dump(NodeId(3), 0x0100, 4, DEFAULT_CALL_TIMEOUT),
        Some(vec![0xAB, 0x00, 0x01, 0x02])
    );

    assert_eq!(system.load_program(NodeId(1), 0x1234, DEFAULT_CALL_TIMEOUT), Some(0x1234));
    assert_eq!(system.node(NodeId(1)).unwrap().program_id(), 0x1234);
    assert_eq!(system.fabric().node(NodeId(1)).unwrap().program_id, 0x1234);
}

#[test]
fn memory_ops_through_execute() {
    let mut system = booted(2);
    system.install_memory_ops(NodeId(1)).unwrap();
    system.execute(NodeId(1), opcode::POKE, 0x34, 0x12, 0x5A, DEFAULT_CALL_TIMEOUT).unwrap();
    assert_eq!(system.peek(NodeId(1), 0x1234).unwrap(), 0x5A);
    assert_eq!(
        system.execute(NodeId(1), opcode::PEEK, 0x34, 0x12, 0, DEFAULT_CALL_TIMEOUT),
        Some((0x5A, 0))
    );
}

struct Negate;

impl CoProcessor for Negate {
    fn compute(&mut self, op: u8, args: Operands) -> HandlerResult {
        match op {
            opcode::NEURAL_LOGIC => Ok((!args.a, 0)),
            _ => Err(HandlerFault::fault("unsupported")),
        }
    }
}

#[test]
fn custom_handler_and_coprocessor() {
    let mut system = booted(2);
    system
        .register_handler(NodeId(2), 0x90, |o: Operands, _: &mut Memory| -> HandlerResult {
            Ok((o.a.wrapping_mul(o.b), 0))
        })
        .unwrap();
    assert_eq!(
        system.execute(NodeId(2), 0x90, 6, 7, 0, DEFAULT_CALL_TIMEOUT),
        Some((42, 0))
    );
    assert_eq!(system.execute(NodeId(1), 0x90, 6, 7, 0, DEFAULT_CALL_TIMEOUT), None);

    system.attach_coprocessor(NodeId(1), Box::new(Negate)).unwrap();
    assert_eq!(
        system.compute(NodeId(1), opcode::NEURAL_LOGIC, 0x0F, 0, 0, DEFAULT_CALL_TIMEOUT),
        Some((0xF0, 0))
    );
    assert_eq!(
        system.compute(NodeId(2), opcode::ADD, 2, 2, 0, DEFAULT_CALL_TIMEOUT),
        Some((4, 0))
    );
}

#[test]
fn unknown_destination_is_dropped_and_traced() {
    let mut system = booted(2);
    system.inject(Message::health_check(C, NodeId(42), 0)).unwrap();
    assert_eq!(system.stats().bus_dropped, 1);
    assert!(system.trace(5).contains("DROPPED"));
}

#[test]
fn nodes_and_stats() {
    let mut system = booted(3);
    let nodes = system.nodes();
    assert_eq!(nodes.len(), 4);
    assert_eq!(nodes[0].load, None);
    assert!(nodes[1..].iter().all(|n| n.status == NodeStatus::Idle));

    system.execute(NodeId(1), opcode::ADD, 1, 1, 0, DEFAULT_CALL_TIMEOUT);
    let stats = system.stats();
    assert!(stats.booted);
    assert_eq!(stats.fabric.online_nodes, 3);
    assert_eq!(stats.fabric.total_messages, 4);
    assert!(stats.bus_delivered >= 8);
}

#[test]
fn step_reports_and_step_until() {
    let mut system = booted(2);
    system.inject(Message::health_check(C, NodeId(1), 0)).unwrap();
    let report = system.step();
    assert_eq!(report.nodes.len(), 3);
    assert_eq!(report.pending_out.len(), 0);
    assert_eq!(report.delivered, 1);

    let taken = system.step_until(
        |r| r.nodes.values().all(|n| n.inbox == 0 && n.outbox == 0),
        50,
    );
    assert!(taken <= 2);

    system.pause();
    assert!(system.is_paused());
    system.run(1);
    system.resume();
    assert!(!system.is_paused());
}

// ============================================================================
// Record & replay
// ============================================================================

#[test]
fn replay_recording_reproduces_snapshot() {
    let mut system = booted(8);
    system.execute(NodeId(1), opcode::ADD, 50, 10, 0, DEFAULT_CALL_TIMEOUT);
    system.execute(NodeId(5), 0x99, 0, 0, 0, DEFAULT_CALL_TIMEOUT);
    system.broadcast_execute(opcode::XOR, 3, 5, 0, DEFAULT_BROADCAST_TIMEOUT);
    system.run(7);
    let original = system.snapshot();

    let recording = system.stop_recording();
    assert!(!recording.entries.is_empty());
    assert_eq!(recording.end_tick, original.tick);

    let replayed = system.replay_recording(&recording);
    assert_eq!(replayed, original);
}

#[test]
fn recording_survives_json() {
    let mut system = booted(2);
    system.execute(NodeId(2), opcode::ADD, 1, 2, 0, DEFAULT_CALL_TIMEOUT);
    let recording = system.recording();
    let json = recording.to_json().unwrap();
    assert_eq!(Recording::from_json(&json).unwrap(), recording);
    assert!(system.is_recording());
}

#[test]
fn replay_injects_one_frame_per_tick() {
    let mut system = booted(2);
    let frames = vec![
        Message::execute(C, NodeId(1), 1, opcode::ADD, 1, 1, 0),
        Message::execute(C, NodeId(2), 2, opcode::ADD, 2, 2, 0),
    ];
    let snap = system.replay(&frames);
    assert_eq!(snap.tick, 2);
    assert_eq!(snap.nodes[&C].msgs_sent, 2);
    assert_eq!(snap.nodes[&NodeId(1)].msgs_received, 1);
    assert_eq!(snap.nodes[&NodeId(1)].msgs_sent, 1);
    assert_eq!(snap.nodes[&NodeId(2)].msgs_sent, 0);

    // Same frames, same result.
    assert_eq!(system.replay(&frames), snap);
}

#[test]
fn replay_keeps_memory_and_handlers() {
    let mut system = booted(2);
    system.poke(NodeId(1), 7, 9).unwrap();
    system.install_memory_ops(NodeId(1)).unwrap();
    system.replay(&[]);
    assert_eq!(system.tick(), 0);
    assert_eq!(system.peek(NodeId(1), 7).unwrap(), 9);
    assert_eq!(
        system.execute(NodeId(1), opcode::PEEK, 7, 0, 0, DEFAULT_CALL_TIMEOUT),
        Some((9, 0))
    );
}

#[test]
fn invalid_config_rejected() {
    let config = SystemConfig {
        num_workers: 0,
        ..SystemConfig::default()
    };
    assert!(matches!(Orchestrator::new(config), Err(SystemError::InvalidConfig(_))));
}
