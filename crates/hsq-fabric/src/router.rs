//! Load-aware router.
//!
//! Picks the IDLE node with the strictly lowest reported load. When several
//! share the minimum, a persistent round-robin cursor over `1..=N` breaks the
//! tie, so repeated calls against an evenly loaded fabric visit every node
//! before any repeats.

use hsq_frame::NodeId;

use crate::directory::Directory;

#[derive(Clone, Debug, Default)]
pub struct Router {
    /// Last node id handed out by a tie-break; 0 before the first one.
    cursor: u8,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> u8 {
        self.cursor
    }

    /// Least-loaded idle node.
    pub fn route(&mut self, directory: &Directory) -> Option<NodeId> {
        self.select(directory, |_| true)
    }

    /// Least-loaded idle node holding any of `capability`'s bits.
    pub fn route_capable(&mut self, directory: &Directory, capability: u8) -> Option<NodeId> {
        self.select(directory, |node| {
            directory
                .node(node)
                .is_some_and(|e| e.has_capability(capability))
        })
    }

    fn select(&mut self, directory: &Directory, accept: impl Fn(NodeId) -> bool) -> Option<NodeId> {
        let candidates: Vec<(NodeId, u8)> = directory
            .available_nodes()
            .into_iter()
            .filter(|n| accept(*n))
            .filter_map(|n| directory.node(n).map(|e| (n, e.load)))
            .collect();

        let min_load = candidates.iter().map(|(_, load)| *load).min()?;
        let tied: Vec<NodeId> = candidates
            .iter()
            .filter(|(_, load)| *load == min_load)
            .map(|(n, _)| *n)
            .collect();

        if let [only] = tied.as_slice() {
            return Some(*only);
        }

        let span = directory.len();
        for _ in 0..span {
            self.cursor = (usize::from(self.cursor) % span + 1) as u8;
            if tied.contains(&NodeId(self.cursor)) {
                return Some(NodeId(self.cursor));
            }
        }
        tied.first().copied()
    }
}
