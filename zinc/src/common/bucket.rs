// vim: tw=80

//! Per-priority queueing structures (§3, §4.2).
//!
//! Each priority class owns one `DirectionQueue` per read/write
//! direction (a FIFO plus a sector-sorted index over the same requests)
//! and an immediate-dispatch list for head-inserted requests.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound::{Excluded, Included, Unbounded};
use std::sync::atomic::AtomicU64;

use crate::common::request::{Request, RequestHandle, RwDirection};

/// Monotonic insertion sequence, used only to break sector ties in index
/// order.
pub type Seq = u64;

/// A FIFO plus a sector-sorted index over the same set of requests, for
/// one (priority, direction) pair.
pub struct DirectionQueue {
    /// FIFO order, oldest first; holds only the index key, the `Arc` lives
    /// in `by_sector`.
    fifo: VecDeque<(u64, Seq)>,
    by_sector: BTreeMap<(u64, Seq), RequestHandle>,
    /// Where the next batched dispatch should resume from.
    cursor: Option<(u64, Seq)>,
    next_seq: Seq,
}

impl DirectionQueue {
    pub fn new() -> Self {
        DirectionQueue {
            fifo: VecDeque::new(),
            by_sector: BTreeMap::new(),
            cursor: None,
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    /// Insert at the FIFO tail and into the sector index.
    pub fn insert(&mut self, req: RequestHandle) -> (u64, Seq) {
        let key = (req.start_sector(), self.next_seq);
        self.next_seq += 1;
        self.fifo.push_back(key);
        self.by_sector.insert(key, req);
        key
    }

    pub fn get(&self, key: (u64, Seq)) -> Option<&RequestHandle> {
        self.by_sector.get(&key)
    }

    pub fn peek_fifo_head(&self) -> Option<&RequestHandle> {
        self.fifo.front().and_then(|k| self.by_sector.get(k))
    }

    pub fn fifo_head_key(&self) -> Option<(u64, Seq)> {
        self.fifo.front().copied()
    }

    /// True iff the FIFO head's expiry deadline has passed.
    pub fn fifo_expired(&self, now_nanos: u64) -> bool {
        self.peek_fifo_head()
            .map(|req| req.expiry_nanos() <= now_nanos)
            .unwrap_or(false)
    }

    pub fn cursor(&self) -> Option<(u64, Seq)> {
        self.cursor
    }

    pub fn set_cursor(&mut self, key: Option<(u64, Seq)>) {
        self.cursor = key;
    }

    pub fn successor_key(&self, key: (u64, Seq)) -> Option<(u64, Seq)> {
        self.by_sector
            .range((Excluded(key), Unbounded))
            .next()
            .map(|(k, _)| *k)
    }

    pub fn predecessor_key(&self, key: (u64, Seq)) -> Option<(u64, Seq)> {
        self.by_sector
            .range((Unbounded, Excluded(key)))
            .next_back()
            .map(|(k, _)| *k)
    }

    /// Remove an entry from both the FIFO and the sector index.
    pub fn remove(&mut self, key: (u64, Seq)) -> Option<RequestHandle> {
        let req = self.by_sector.remove(&key)?;
        if let Some(pos) = self.fifo.iter().position(|k| *k == key) {
            self.fifo.remove(pos);
        }
        if self.cursor == Some(key) {
            self.cursor = self.successor_key(key);
        }
        Some(req)
    }

    /// A request whose start sector is exactly `sector` (front-merge
    /// candidate lookup, §4.2).
    pub fn find_by_start_sector(&self, sector: u64) -> Option<(u64, Seq)> {
        self.by_sector
            .range((Included((sector, 0)), Excluded((sector + 1, 0))))
            .next()
            .map(|(k, _)| *k)
    }

    /// Re-index an entry after a front-merge moved its start sector
    /// backward. The FIFO slot is unchanged; only the sector key moves.
    pub fn reposition(&mut self, old_key: (u64, Seq), new_start_sector: u64) -> Option<(u64, Seq)> {
        let req = self.by_sector.remove(&old_key)?;
        let new_key = (new_start_sector, old_key.1);
        self.by_sector.insert(new_key, req);
        if let Some(slot) = self.fifo.iter_mut().find(|k| **k == old_key) {
            *slot = new_key;
        }
        if self.cursor == Some(old_key) {
            self.cursor = Some(new_key);
        }
        Some(new_key)
    }

    /// `donor` is being coalesced into `recipient` (§4.2 "requests
    /// merged"): the earlier of the two deadlines survives, the
    /// recipient moves to the donor's FIFO slot, and the donor is
    /// removed entirely.
    pub fn absorb(&mut self, recipient_key: (u64, Seq), donor_key: (u64, Seq)) -> bool {
        let (donor_deadline, recipient_deadline) = {
            let donor = match self.by_sector.get(&donor_key) {
                Some(d) => d,
                None => return false,
            };
            let recipient = match self.by_sector.get(&recipient_key) {
                Some(r) => r,
                None => return false,
            };
            (donor.expiry_nanos(), recipient.expiry_nanos())
        };

        if donor_deadline < recipient_deadline {
            if let Some(recipient) = self.by_sector.get(&recipient_key) {
                recipient.set_expiry_nanos(donor_deadline);
            }
            if let (Some(rpos), Some(_)) = (
                self.fifo.iter().position(|k| *k == recipient_key),
                self.fifo.iter().position(|k| *k == donor_key),
            ) {
                self.fifo.remove(rpos);
                if let Some(dpos) = self.fifo.iter().position(|k| *k == donor_key) {
                    self.fifo.insert(dpos, recipient_key);
                }
            }
        }
        self.remove(donor_key);
        true
    }
}

impl Default for DirectionQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// The full set of queueing state for one priority class.
pub struct PriorityBucket {
    pub read: DirectionQueue,
    pub write: DirectionQueue,
    /// Head-inserted requests, dispatched ahead of the sorted queues
    /// (§3, §4.3a).
    pub immediate: VecDeque<RequestHandle>,
    pub inserted: u64,
    pub merged: u64,
    pub dispatched: u64,
    pub completed: AtomicU64,
}

impl PriorityBucket {
    pub fn new() -> Self {
        PriorityBucket {
            read: DirectionQueue::new(),
            write: DirectionQueue::new(),
            immediate: VecDeque::new(),
            inserted: 0,
            merged: 0,
            dispatched: 0,
            completed: AtomicU64::new(0),
        }
    }

    pub fn queued(&self) -> usize {
        self.read.len() + self.write.len() + self.immediate.len()
    }

    pub fn has_work(&self) -> bool {
        self.queued() > 0
    }

    pub fn dir(&self, d: RwDirection) -> &DirectionQueue {
        match d {
            RwDirection::Read => &self.read,
            RwDirection::Write => &self.write,
        }
    }

    pub fn dir_mut(&mut self, d: RwDirection) -> &mut DirectionQueue {
        match d {
            RwDirection::Read => &mut self.read,
            RwDirection::Write => &mut self.write,
        }
    }
}

impl Default for PriorityBucket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::classifier::OpCode;
    use crate::common::request::{BasicRequest, Priority};
    use std::sync::Arc;

    fn req(sector: u64) -> RequestHandle {
        Arc::new(BasicRequest::new(OpCode::Write, sector, 8, 0, Priority::BestEffort))
    }

    #[test]
    fn insert_maintains_fifo_and_sector_order() {
        let mut q = DirectionQueue::new();
        q.insert(req(100));
        q.insert(req(10));
        q.insert(req(50));

        assert_eq!(q.fifo_head_key().unwrap().0, 100);
        let first_sorted = *q.by_sector.keys().next().unwrap();
        assert_eq!(first_sorted.0, 10);
    }

    #[test]
    fn remove_updates_cursor_to_successor() {
        let mut q = DirectionQueue::new();
        let k1 = q.insert(req(10));
        let k2 = q.insert(req(20));
        q.insert(req(30));
        q.set_cursor(Some(k1));
        q.remove(k1);
        assert_eq!(q.cursor(), Some(k2));
    }

    #[test]
    fn find_by_start_sector_locates_front_merge_candidate() {
        let mut q = DirectionQueue::new();
        q.insert(req(100));
        let key = q.find_by_start_sector(100).unwrap();
        assert_eq!(key.0, 100);
        assert!(q.find_by_start_sector(99).is_none());
    }

    #[test]
    fn absorb_inherits_earlier_deadline_and_drops_donor() {
        let mut q = DirectionQueue::new();
        let recipient = req(10);
        recipient.set_expiry_nanos(500);
        let donor = req(18);
        donor.set_expiry_nanos(100);

        let rk = q.insert(recipient);
        let dk = q.insert(donor);
        assert!(q.absorb(rk, dk));

        assert!(q.get(dk).is_none());
        assert_eq!(q.get(rk).unwrap().expiry_nanos(), 100);
        assert_eq!(q.len(), 1);
    }
}
