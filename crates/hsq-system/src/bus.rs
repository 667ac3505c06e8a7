//! The message bus.
//!
//! Star topology: every node is a port on one bus. Each tick the bus drains
//! every registered port's outbound queue in ascending node order into its
//! in-flight queue, then delivers in-flight frames strictly FIFO. A frame
//! flagged BROADCAST goes to every registered port except its source; any
//! other frame goes to its destination, or is dropped if nothing is
//! registered there.
//!
//! The bus never owns the ports. The orchestrator lends them for the
//! duration of [`MessageBus::tick`].

use std::collections::{BTreeSet, VecDeque};

use hsq_frame::{Message, NodeId};
use hsq_kernel::NodeKernel;
use tracing::{trace, warn};

use crate::error::BusError;

/// A node as seen from the bus.
pub trait BusPort {
    fn node_id(&self) -> NodeId;

    /// Next frame the node wants sent.
    fn take_outbound(&mut self) -> Option<Message>;

    /// Hand a frame to the node. Returns whether it was accepted.
    fn deliver(&mut self, msg: Message) -> bool;
}

impl BusPort for NodeKernel {
    fn node_id(&self) -> NodeId {
        self.id()
    }

    fn take_outbound(&mut self) -> Option<Message> {
        NodeKernel::take_outbound(self)
    }

    fn deliver(&mut self, msg: Message) -> bool {
        self.receive(msg).is_ok()
    }
}

#[derive(Debug, Default)]
pub struct MessageBus {
    registry: BTreeSet<NodeId>,
    in_flight: VecDeque<Message>,
    /// Frames dropped since the last [`MessageBus::drain_dropped`]
    dropped_frames: Vec<Message>,
    delivered: u64,
    dropped: u64,
    rejected: u64,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a node. Each id may register once.
    pub fn register(&mut self, node: NodeId) -> Result<(), BusError> {
        if !self.registry.insert(node) {
            return Err(BusError::AlreadyRegistered(node));
        }
        Ok(())
    }

    pub fn is_registered(&self, node: NodeId) -> bool {
        self.registry.contains(&node)
    }

    pub fn registered(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.registry.iter().copied()
    }

    /// One collection pass and one delivery pass. Returns frames delivered.
    pub fn tick<P: BusPort>(&mut self, ports: &mut [P]) -> u64 {
        for id in &self.registry {
            if let Some(port) = ports.iter_mut().find(|p| p.node_id() == *id) {
                while let Some(msg) = port.take_outbound() {
                    self.in_flight.push_back(msg);
                }
            }
        }

        let mut delivered = 0;
        while let Some(msg) = self.in_flight.pop_front() {
            if msg.is_broadcast() {
                for id in &self.registry {
                    if *id == msg.src {
                        continue;
                    }
                    if let Some(port) = ports.iter_mut().find(|p| p.node_id() == *id) {
                        if !port.deliver(msg.clone()) {
                            self.rejected += 1;
                        }
                        delivered += 1;
                    }
                }
                continue;
            }

            let port = if self.registry.contains(&msg.dst) {
                ports.iter_mut().find(|p| p.node_id() == msg.dst)
            } else {
                None
            };
            match port {
                Some(port) => {
                    trace!(frame = %msg, "deliver");
                    if !port.deliver(msg) {
                        self.rejected += 1;
                    }
                    delivered += 1;
                }
                None => {
                    warn!(frame = %msg, "no such destination, frame dropped");
                    self.dropped += 1;
                    self.dropped_frames.push(msg);
                }
            }
        }

        self.delivered += delivered;
        delivered
    }

    /// Frames in flight (only non-zero inside a tick).
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Total frames handed to a port since construction, whether or not
    /// the port's inbound queue accepted them.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Hand-offs the receiving port refused (its inbound queue was full).
    /// Counted within [`delivered`](Self::delivered) as well.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Total frames dropped since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Hand over frames dropped since the last call.
    pub fn drain_dropped(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.dropped_frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsq_frame::{MessageFlags, MessageType};

    fn ports(n: u8) -> (MessageBus, Vec<NodeKernel>) {
        let mut bus = MessageBus::new();
        let kernels: Vec<NodeKernel> = (0..n).map(|i| NodeKernel::new(NodeId(i))).collect();
        for k in &kernels {
            bus.register(k.id()).unwrap();
        }
        (bus, kernels)
    }

    #[test]
    fn test_duplicate_registration() {
        let mut bus = MessageBus::new();
        bus.register(NodeId(1)).unwrap();
        assert_eq!(bus.register(NodeId(1)), Err(BusError::AlreadyRegistered(NodeId(1))));
    }

    #[test]
    fn test_unicast_delivery() {
        let (mut bus, mut kernels) = ports(3);
        kernels[0].send(Message::health_check(NodeId(0), NodeId(2), 1)).unwrap();
        assert_eq!(bus.tick(&mut kernels), 1);
        assert_eq!(kernels[2].inbox_len(), 1);
        assert_eq!(kernels[1].inbox_len(), 0);
    }

    #[test]
    fn test_broadcast_skips_source() {
        let (mut bus, mut kernels) = ports(4);
        let msg = Message::new(MessageType::Nop, 0, NodeId(1), NodeId(0), &[])
            .with_flags(MessageFlags::BROADCAST);
        kernels[1].send(msg).unwrap();
        assert_eq!(bus.tick(&mut kernels), 3);
        assert_eq!(kernels[1].inbox_len(), 0);
        assert!(kernels.iter().filter(|k| k.id() != NodeId(1)).all(|k| k.inbox_len() == 1));
    }

    #[test]
    fn test_full_inbox_counts_rejected_hand_off() {
        let (mut bus, mut kernels) = ports(3);
        for i in 0..16u8 {
            kernels[0].send(Message::health_check(NodeId(0), NodeId(2), i)).unwrap();
        }
        kernels[1].send(Message::health_check(NodeId(1), NodeId(2), 99)).unwrap();
        assert_eq!(bus.tick(&mut kernels), 17);
        assert_eq!(bus.delivered(), 17);
        assert_eq!(bus.rejected(), 1);
        assert_eq!(kernels[2].inbox_len(), 16);
    }

    #[test]
    fn test_unknown_destination_dropped() {
        let (mut bus, mut kernels) = ports(2);
        kernels[0].send(Message::health_check(NodeId(0), NodeId(9), 1)).unwrap();
        assert_eq!(bus.tick(&mut kernels), 0);
        assert_eq!(bus.dropped(), 1);
        assert_eq!(bus.drain_dropped().len(), 1);
        assert!(bus.drain_dropped().is_empty());
        assert_eq!(bus.dropped(), 1);
    }

    #[test]
    fn test_unregistered_port_is_ignored() {
        let mut bus = MessageBus::new();
        bus.register(NodeId(0)).unwrap();
        let mut kernels = vec![NodeKernel::new(NodeId(0)), NodeKernel::new(NodeId(1))];
        kernels[1].send(Message::health_check(NodeId(1), NodeId(0), 1)).unwrap();
        kernels[0].send(Message::health_check(NodeId(0), NodeId(1), 1)).unwrap();
        assert_eq!(bus.tick(&mut kernels), 0);
        assert_eq!(bus.dropped(), 1);
        assert_eq!(kernels[1].outbox_len(), 1);
    }
}
