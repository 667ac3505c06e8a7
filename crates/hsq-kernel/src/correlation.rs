//! Request/response correlation.
//!
//! Every request sent with [`NodeKernel::send_request`](crate::NodeKernel::send_request)
//! opens a slot keyed by its sequence id. The matching reply fills the slot
//! once; the owner takes it out (or purges it on timeout). Nothing is called
//! back, so the kernel never holds references into its caller.

use std::collections::BTreeMap;

use hsq_frame::Message;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
struct Slot {
    opened_at: u64,
    reply: Option<Message>,
}

/// Pending-request table: sequence id → result slot.
#[derive(Clone, Debug, Default)]
pub struct PendingTable {
    slots: BTreeMap<u8, Slot>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an empty slot for `id`.
    ///
    /// Ids are one byte wide; reopening a live id replaces the older slot.
    pub fn open(&mut self, id: u8, tick: u64) {
        if let Some(old) = self.slots.insert(
            id,
            Slot {
                opened_at: tick,
                reply: None,
            },
        ) {
            warn!(id, opened_at = old.opened_at, "sequence id reused while still pending");
        }
    }

    /// Fill the slot matching `reply.id`.
    ///
    /// Returns false when no slot is open or the slot was already filled;
    /// such replies are ignored.
    pub fn resolve(&mut self, reply: &Message) -> bool {
        match self.slots.get_mut(&reply.id) {
            Some(slot) if slot.reply.is_none() => {
                slot.reply = Some(reply.clone());
                true
            }
            Some(_) => {
                debug!(id = reply.id, "duplicate reply ignored");
                false
            }
            None => {
                debug!(id = reply.id, kind = %reply.kind, "unmatched reply ignored");
                false
            }
        }
    }

    /// Whether a slot for `id` is open (filled or not).
    pub fn is_open(&self, id: u8) -> bool {
        self.slots.contains_key(&id)
    }

    /// Whether the slot for `id` holds a reply.
    pub fn is_resolved(&self, id: u8) -> bool {
        self.slots.get(&id).is_some_and(|s| s.reply.is_some())
    }

    /// Remove and return a filled slot's reply. Empty slots stay open.
    pub fn take(&mut self, id: u8) -> Option<Message> {
        if !self.is_resolved(id) {
            return None;
        }
        self.slots.remove(&id).and_then(|s| s.reply)
    }

    /// Remove the slot for `id` whatever its state.
    pub fn purge(&mut self, id: u8) -> bool {
        self.slots.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
