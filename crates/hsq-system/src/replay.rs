//! Deterministic record and replay.
//!
//! Recording is on from construction. Every frame the orchestrator sends
//! from the coordinator is logged with the tick it was sent at; nothing
//! else enters the system from outside, so those frames plus the tick count
//! determine the run.
//!
//! Replay resets every kernel to its post-construction runtime state
//! (memory, handlers and co-processors survive) and re-injects the frames.
//! The directory is fabric state and is left alone.

use std::collections::BTreeMap;

use hsq_frame::{Message, NodeId, NodeStatus};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SystemError;
use crate::system::Orchestrator;

/// A coordinator send and the tick it happened at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub tick: u64,
    pub frame: Message,
}

/// A finished recording.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recording {
    pub entries: Vec<RecordedFrame>,
    /// System tick when recording stopped
    pub end_tick: u64,
}

impl Recording {
    /// The frames alone, in send order.
    pub fn frames(&self) -> Vec<Message> {
        self.entries.iter().map(|e| e.frame.clone()).collect()
    }

    pub fn to_json(&self) -> Result<String, SystemError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SystemError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Recorder {
    active: bool,
    entries: Vec<RecordedFrame>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self {
            active: true,
            entries: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, tick: u64, frame: Message) {
        if self.active {
            self.entries.push(RecordedFrame { tick, frame });
        }
    }
}

/// Per-node counters compared across runs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub status: NodeStatus,
    pub msgs_received: u64,
    pub msgs_sent: u64,
}

/// System state for determinism checks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub nodes: BTreeMap<NodeId, NodeSnapshot>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, SystemError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Orchestrator {
    /// Clear the log and start recording.
    pub fn start_recording(&mut self) {
        self.recorder.active = true;
        self.recorder.entries.clear();
    }

    /// Stop recording and hand over the log.
    pub fn stop_recording(&mut self) -> Recording {
        self.recorder.active = false;
        Recording {
            entries: std::mem::take(&mut self.recorder.entries),
            end_tick: self.tick,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.active
    }

    /// The log so far, without stopping.
    pub fn recording(&self) -> Recording {
        Recording {
            entries: self.recorder.entries.clone(),
            end_tick: self.tick,
        }
    }

    /// Send one frame from the coordinator and tick once.
    pub fn inject(&mut self, frame: Message) -> Result<(), SystemError> {
        self.send_command(frame)?;
        self.advance();
        Ok(())
    }

    fn reset_for_replay(&mut self) {
        for kernel in &mut self.kernels {
            kernel.reset_state();
        }
        self.heartbeat_backlog.clear();
        self.tick = 0;
    }

    /// Reset, then inject each frame followed by one tick.
    pub fn replay(&mut self, frames: &[Message]) -> Snapshot {
        self.reset_for_replay();
        self.replaying = true;
        for frame in frames {
            if let Err(e) = self.send_command(frame.clone()) {
                tracing::warn!(error = %e, frame = %frame, "replay frame refused");
            }
            self.advance();
        }
        self.replaying = false;

        info!(frames = frames.len(), tick = self.tick, "replay complete");
        self.snapshot()
    }

    /// Reset, then inject each frame at its recorded tick and run to the
    /// recording's end tick.
    pub fn replay_recording(&mut self, recording: &Recording) -> Snapshot {
        self.reset_for_replay();
        self.replaying = true;
        for entry in &recording.entries {
            while self.tick < entry.tick {
                self.advance();
            }
            if let Err(e) = self.send_command(entry.frame.clone()) {
                tracing::warn!(error = %e, frame = %entry.frame, "replay frame refused");
            }
        }
        while self.tick < recording.end_tick {
            self.advance();
        }
        self.replaying = false;

        info!(frames = recording.entries.len(), tick = self.tick, "replay complete");
        self.snapshot()
    }

    pub fn snapshot(&self) -> Snapshot {
        let nodes = self
            .kernels
            .iter()
            .map(|k| {
                let snap = NodeSnapshot {
                    status: k.status(),
                    msgs_received: k.msgs_received(),
                    msgs_sent: k.msgs_sent(),
                };
                (k.id(), snap)
            })
            .collect();
        Snapshot {
            tick: self.tick,
            nodes,
        }
    }
}
