use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::BlockKind;

/// Address of one server inside the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ServerRef {
    pub block: BlockKind,
    pub index: usize,
}

impl ServerRef {
    pub fn new(block: BlockKind, index: usize) -> Self {
        Self { block, index }
    }
}

/// Token returned by `EventList::insert`, used to delete that exact event.
#[derive(Clone, Copy, Debug)]
pub struct EventHandle {
    time: f64,
    seq: u64,
}

impl EventHandle {
    pub fn time(&self) -> f64 {
        self.time
    }
}

impl Ord for EventHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for EventHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for EventHandle {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventHandle {}

/// A scheduled service completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub handle: EventHandle,
    pub server: ServerRef,
}

impl Completion {
    pub fn time(&self) -> f64 {
        self.handle.time
    }
}

/// Pending completions ordered by time, then by insertion order.
#[derive(Debug, Default)]
pub struct EventList {
    entries: BTreeMap<EventHandle, ServerRef>,
    next_seq: u64,
    misses: u64,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, time: f64, server: ServerRef) -> EventHandle {
        let handle = EventHandle {
            time,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.entries.insert(handle, server);
        handle
    }

    pub fn peek_min(&self) -> Option<Completion> {
        self.entries
            .first_key_value()
            .map(|(handle, server)| Completion {
                handle: *handle,
                server: *server,
            })
    }

    /// Time of the earliest completion, or infinity when nothing is
    /// scheduled.
    pub fn next_time(&self) -> f64 {
        self.entries
            .first_key_value()
            .map_or(f64::INFINITY, |(handle, _)| handle.time)
    }

    pub fn delete(&mut self, handle: EventHandle) -> Result<ServerRef> {
        match self.entries.remove(&handle) {
            Some(server) => Ok(server),
            None => {
                self.misses += 1;
                warn!(time = handle.time, seq = handle.seq, "completion not found in event list");
                Err(Error::EventNotFound(handle.time))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of failed deletions since the list was created.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
        self.misses = 0;
    }
}
