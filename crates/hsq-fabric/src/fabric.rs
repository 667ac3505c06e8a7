//! The fabric kernel: coordinator-only global services.
//!
//! Service methods are split across modules by concern; this file holds the
//! state, the directory and router entry points, and introspection.

use std::collections::BTreeMap;

use hsq_frame::{Message, NodeId, NodeStatus};
use hsq_kernel::{TraceEntry, TraceEvent};
use serde::{Deserialize, Serialize};

use crate::directory::{Directory, DirectoryEvent, NodeEntry};
use crate::error::FabricError;
use crate::router::Router;
use crate::supervisor::{Supervisor, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_HEARTBEAT_TIMEOUT};
use crate::tracer::{TraceLog, DEFAULT_TRACE_CAPACITY};

/// Fabric timing and log sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricConfig {
    pub num_workers: u8,
    pub heartbeat_interval: u64,
    pub heartbeat_timeout: u64,
    pub trace_capacity: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            num_workers: 8,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            trace_capacity: DEFAULT_TRACE_CAPACITY,
        }
    }
}

/// One line of the directory summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub status: NodeStatus,
    pub load: u8,
    pub program_id: u16,
    pub msgs: u64,
    pub errors: u64,
}

/// Fabric-wide counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricStats {
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub available_nodes: usize,
    pub total_messages: u64,
    pub total_errors: u64,
    pub trace_entries: usize,
}

/// Directory, router, supervisor, loader and tracer for one fabric.
pub struct FabricKernel {
    pub(crate) config: FabricConfig,
    pub(crate) directory: Directory,
    pub(crate) router: Router,
    pub(crate) supervisor: Supervisor,
    pub(crate) tracer: TraceLog,
}

impl FabricKernel {
    pub fn new(config: FabricConfig) -> Self {
        Self {
            config,
            directory: Directory::new(config.num_workers),
            router: Router::new(),
            supervisor: Supervisor::new(config.heartbeat_interval, config.heartbeat_timeout),
            tracer: TraceLog::new(config.trace_capacity),
        }
    }

    pub fn with_workers(num_workers: u8) -> Self {
        Self::new(FabricConfig {
            num_workers,
            ..FabricConfig::default()
        })
    }

    pub fn config(&self) -> FabricConfig {
        self.config
    }

    pub fn num_workers(&self) -> u8 {
        self.config.num_workers
    }

    // ========================================================================
    // Directory
    // ========================================================================

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn node(&self, node: NodeId) -> Option<&NodeEntry> {
        self.directory.node(node)
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut NodeEntry> {
        self.directory.node_mut(node)
    }

    pub fn set_status(
        &mut self,
        node: NodeId,
        status: NodeStatus,
    ) -> Result<Option<DirectoryEvent>, FabricError> {
        self.directory.set_status(node, status)
    }

    pub fn update_heartbeat(
        &mut self,
        node: NodeId,
        tick: u64,
        status: NodeStatus,
        load: u8,
    ) -> Result<Option<DirectoryEvent>, FabricError> {
        self.directory.update_heartbeat(node, tick, status, load)
    }

    pub fn set_capabilities(&mut self, node: NodeId, bits: u8) -> Result<(), FabricError> {
        self.directory.set_capabilities(node, bits)
    }

    pub fn record_reply(&mut self, node: NodeId, ok: bool) -> Result<(), FabricError> {
        self.directory.record_reply(node, ok)
    }

    pub fn online_nodes(&self) -> Vec<NodeId> {
        self.directory.online_nodes()
    }

    pub fn available_nodes(&self) -> Vec<NodeId> {
        self.directory.available_nodes()
    }

    pub fn drain_events(&mut self) -> Vec<DirectoryEvent> {
        self.directory.drain_events()
    }

    // ========================================================================
    // Router
    // ========================================================================

    pub fn route_to_node(&mut self) -> Option<NodeId> {
        self.router.route(&self.directory)
    }

    pub fn route_to_capable(&mut self, capability: u8) -> Option<NodeId> {
        self.router.route_capable(&self.directory, capability)
    }

    /// Targets of a broadcast: every online node.
    pub fn broadcast_targets(&self) -> Vec<NodeId> {
        self.directory.online_nodes()
    }

    // ========================================================================
    // Tracer
    // ========================================================================

    pub fn trace(
        &mut self,
        tick: u64,
        node: NodeId,
        event: TraceEvent,
        msg: Option<&Message>,
        detail: Option<String>,
    ) {
        self.tracer.trace(tick, node, event, msg, detail);
    }

    pub fn record(&mut self, entry: TraceEntry) {
        self.tracer.record(entry);
    }

    pub fn record_all(&mut self, entries: impl IntoIterator<Item = TraceEntry>) {
        self.tracer.extend(entries);
    }

    pub fn trace_log(&self) -> &TraceLog {
        &self.tracer
    }

    /// The last `count` trace entries, oldest first.
    pub fn recent_trace(&self, count: usize) -> &[TraceEntry] {
        self.tracer.recent(count)
    }

    pub fn dump_trace(&self) -> String {
        self.tracer.dump()
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn directory_summary(&self) -> BTreeMap<NodeId, NodeSummary> {
        self.directory
            .entries()
            .map(|e| {
                let summary = NodeSummary {
                    status: e.status,
                    load: e.load,
                    program_id: e.program_id,
                    msgs: e.msg_count,
                    errors: e.error_count,
                };
                (e.node, summary)
            })
            .collect()
    }

    pub fn fabric_stats(&self) -> FabricStats {
        FabricStats {
            total_nodes: self.directory.len(),
            online_nodes: self.directory.online_nodes().len(),
            available_nodes: self.directory.available_nodes().len(),
            total_messages: self.directory.entries().map(|e| e.msg_count).sum(),
            total_errors: self.directory.entries().map(|e| e.error_count).sum(),
            trace_entries: self.tracer.len(),
        }
    }
}
