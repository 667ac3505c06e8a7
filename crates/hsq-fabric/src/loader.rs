//! Loader service.
//!
//! Program bytes are not transferred; the loader records the program id in
//! the directory and produces the load frame that tells the node.

use hsq_frame::{Message, NodeId};

use crate::error::FabricError;
use crate::fabric::FabricKernel;

impl FabricKernel {
    /// Record `program_id` for `node` and build its load frame.
    pub fn load_program(&mut self, node: NodeId, program_id: u16) -> Result<Message, FabricError> {
        self.directory.set_program(node, program_id)?;
        Ok(Message::load(NodeId::COORDINATOR, node, 0, program_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsq_frame::MessageType;

    #[test]
    fn test_load_program_frame() {
        let mut fabric = FabricKernel::with_workers(2);
        let frame = fabric.load_program(NodeId(2), 0xBEEF).unwrap();
        assert_eq!(frame.kind, MessageType::Load);
        assert_eq!(frame.dst, NodeId(2));
        assert_eq!(frame.payload(), &[0xEF, 0xBE]);
        assert_eq!(fabric.node(NodeId(2)).unwrap().program_id, 0xBEEF);
        assert!(fabric.load_program(NodeId(3), 1).is_err());
    }
}
