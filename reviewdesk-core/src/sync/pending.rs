//! Ledger of optimistic status writes awaiting the remote outcome

use std::collections::HashMap;

use crate::request::{RequestId, RequestStatus};

/// Action to take on the local entry after a failed remote write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Put the status back to this value
    Restore(RequestStatus),
    /// Leave the entry alone; a newer state has replaced the optimistic one
    Keep,
}

#[derive(Debug, Clone)]
struct PendingWrite {
    seq: u64,
    /// Status the entry had before this write was applied locally
    previous: RequestStatus,
    target: RequestStatus,
    /// Set when the feed delivered a state for this id after the write began
    superseded: bool,
}

/// In-flight optimistic writes, tagged with a monotonically increasing sequence
#[derive(Debug, Default)]
pub struct PendingWrites {
    next_seq: u64,
    writes: HashMap<RequestId, Vec<PendingWrite>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an optimistic write and return its sequence number
    pub fn begin(&mut self, id: &RequestId, previous: RequestStatus, target: RequestStatus) -> u64 {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.writes.entry(id.clone()).or_default().push(PendingWrite {
            seq,
            previous,
            target,
            superseded: false,
        });
        seq
    }

    fn take(&mut self, id: &RequestId, seq: u64, failed: bool) -> Option<(PendingWrite, bool)> {
        let writes = self.writes.get_mut(id)?;
        let idx = writes.iter().position(|w| w.seq == seq)?;
        let write = writes.remove(idx);
        let has_newer = idx < writes.len();

        if !has_newer {
            if writes.is_empty() {
                self.writes.remove(id);
            }
            return Some((write, false));
        }

        if failed && !write.superseded {
            // The newer write was based on a value that never reached the
            // store, so on failure it must restore what this one would have.
            writes[idx].previous = write.previous;
        }
        Some((write, true))
    }

    /// The remote write succeeded
    pub fn confirm(&mut self, id: &RequestId, seq: u64) {
        self.take(id, seq, false);
    }

    /// The remote write failed; decide whether the local entry is rolled back
    pub fn fail(&mut self, id: &RequestId, seq: u64) -> Resolution {
        match self.take(id, seq, true) {
            Some((write, false)) if !write.superseded => Resolution::Restore(write.previous),
            _ => Resolution::Keep,
        }
    }

    /// A feed event delivered authoritative state for `id`
    pub fn touch(&mut self, id: &RequestId) {
        if let Some(writes) = self.writes.get_mut(id) {
            for write in writes {
                write.superseded = true;
            }
        }
    }

    /// A fetch read `status` from the store for `id`
    ///
    /// The oldest write for the id has not landed as far as the store is
    /// concerned, so its failure must restore the fetched value.
    pub fn rebase(&mut self, id: &RequestId, status: RequestStatus) {
        if let Some(oldest) = self.writes.get_mut(id).and_then(|w| w.first_mut()) {
            oldest.previous = status;
        }
    }

    /// Latest optimistic status per id that the feed has not overtaken
    ///
    /// Used to re-apply local edits on top of a fresh fetch.
    pub fn optimistic(&self) -> impl Iterator<Item = (&RequestId, RequestStatus)> + '_ {
        self.writes.iter().filter_map(|(id, writes)| {
            writes
                .last()
                .filter(|w| !w.superseded)
                .map(|w| (id, w.target))
        })
    }

    #[cfg(test)]
    pub fn is_pending(&self, id: &RequestId) -> bool {
        self.writes.contains_key(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.writes.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Forget every write, e.g. when the session owner changes
    pub fn clear(&mut self) {
        self.writes.clear();
    }
}
