// vim: tw=80

//! Adapter onto the block layer's merge primitives (§4.5). The merge
//! predicate and the coalescing of two requests' buffers are the block
//! layer's own job; this module only keeps the scheduler's indices
//! consistent with the outcome.

use crate::common::bucket::{DirectionQueue, Seq};
use crate::common::request::RequestHandle;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MergeVerdict {
    /// No mergeable request is indexed at this sector.
    None,
    /// A front-merge candidate was found.
    Front,
    /// Discard-mergeable, handled by a distinct path by the block layer.
    Discard,
}

/// Probe for a front-merge candidate: a bio whose end sector equals some
/// indexed request's start sector.
pub fn front_merge_candidate(
    queue: &DirectionQueue,
    bio_end_sector: u64,
) -> Option<((u64, Seq), RequestHandle)> {
    let key = queue.find_by_start_sector(bio_end_sector)?;
    let req = queue.get(key)?.clone();
    Some((key, req))
}

/// Re-index a request after a successful front-merge extended its start
/// sector backward.
pub fn reposition_after_front_merge(
    queue: &mut DirectionQueue,
    old_key: (u64, Seq),
    new_start_sector: u64,
) -> Option<(u64, Seq)> {
    queue.reposition(old_key, new_start_sector)
}

/// Apply requests-merged bookkeeping and remove the donor.
pub fn requests_merged(
    queue: &mut DirectionQueue,
    recipient_key: (u64, Seq),
    donor_key: (u64, Seq),
) -> bool {
    queue.absorb(recipient_key, donor_key)
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
    fn front_merge_candidate_matches_on_end_sector() {
        let mut q = DirectionQueue::new();
        q.insert(req(100));
        assert!(front_merge_candidate(&q, 100).is_some());
        assert!(front_merge_candidate(&q, 99).is_none());
    }

    #[test]
    fn reposition_moves_the_sector_key_only() {
        let mut q = DirectionQueue::new();
        let key = q.insert(req(100));
        let fifo_key_before = q.fifo_head_key().unwrap();
        let new_key = reposition_after_front_merge(&mut q, key, 92).unwrap();
        assert_eq!(new_key.0, 92);
        assert_eq!(new_key.1, fifo_key_before.1);
        assert_eq!(q.fifo_head_key().unwrap(), new_key);
    }
}
