// vim: tw=80

//! The deadline dispatch engine: priority ordering with aging,
//! per-bucket batching, zoned-write admissibility, and read/write
//! starvation control.

use crate::common::bucket::{PriorityBucket, Seq};
use crate::common::request::{RequestHandle, RwDirection};
use crate::common::zone::ZonedDevice;

/// Parameters the dispatcher needs on every call; these mirror the live
/// tunables in `SchedulerConfig` but are read once per call so the
/// algorithm sees a consistent view.
pub struct DispatchParams {
    pub read_expire_nanos: u64,
    pub write_expire_nanos: u64,
    pub prio_aging_expire_nanos: u64,
    pub fifo_batch: u32,
    pub writes_starved_limit: u32,
}

fn start_time_of(req: &RequestHandle, dir: RwDirection, params: &DispatchParams) -> u64 {
    let interval = match dir {
        RwDirection::Read => params.read_expire_nanos,
        RwDirection::Write => params.write_expire_nanos,
    };
    req.expiry_nanos().saturating_sub(interval)
}

fn oldest_start_time(bucket: &PriorityBucket, params: &DispatchParams) -> Option<u64> {
    let r = bucket
        .read
        .peek_fifo_head()
        .map(|req| start_time_of(req, RwDirection::Read, params));
    let w = bucket
        .write
        .peek_fifo_head()
        .map(|req| start_time_of(req, RwDirection::Write, params));
    match (r, w) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Find a non-`RealTime` priority class (index 1 or 2) whose oldest
/// request has aged past `prio_aging_expire`, provided at least two
/// classes currently have queued work.
fn aged_priority(buckets: &[PriorityBucket; 3], params: &DispatchParams, now_nanos: u64) -> Option<usize> {
    let classes_with_work = buckets.iter().filter(|b| b.has_work()).count();
    if classes_with_work < 2 {
        return None;
    }
    let threshold = now_nanos.saturating_sub(params.prio_aging_expire_nanos);
    for idx in 1..3 {
        if let Some(start) = oldest_start_time(&buckets[idx], params) {
            if start < threshold {
                return Some(idx);
            }
        }
    }
    None
}

fn choose_direction(
    bucket: &PriorityBucket,
    writes_starved: &mut u32,
    params: &DispatchParams,
) -> Option<RwDirection> {
    let reads_queued = !bucket.read.is_empty();
    let writes_queued = !bucket.write.is_empty();
    if reads_queued && (!writes_queued || *writes_starved < params.writes_starved_limit) {
        *writes_starved += 1;
        Some(RwDirection::Read)
    } else if writes_queued {
        *writes_starved = 0;
        Some(RwDirection::Write)
    } else {
        None
    }
}

fn is_sequential(a: &RequestHandle, b: &RequestHandle) -> bool {
    a.start_sector() + a.nr_sectors() as u64 == b.start_sector()
}

/// Walk candidates from `start_key` in sector order, honoring zoned-write
/// admissibility and the `latest_start` bound. Reads always take the
/// first candidate; writes skip zones that are currently locked,
/// skipping an entire sequential run at once on rotational devices.
fn select_admissible<Z: ZonedDevice>(
    bucket: &PriorityBucket,
    dir: RwDirection,
    start_key: (u64, Seq),
    params: &DispatchParams,
    latest_start_nanos: u64,
    device: &Z,
) -> Option<((u64, Seq), RequestHandle)> {
    let queue = bucket.dir(dir);
    let mut key = start_key;
    loop {
        let req = queue.get(key)?.clone();
        if start_time_of(&req, dir, params) > latest_start_nanos {
            return None;
        }
        if dir == RwDirection::Read || !device.zone_locked(req.zone()) {
            return Some((key, req));
        }

        // Write target's zone is locked: skip the sequential run
        // attached to it as a group on rotational devices, otherwise
        // just skip this one candidate.
        let mut next = queue.successor_key(key);
        if device.is_rotational() {
            let mut last = req.clone();
            while let Some(nk) = next {
                let nreq = match queue.get(nk) {
                    Some(r) => r,
                    None => break,
                };
                if is_sequential(&last, nreq) {
                    last = nreq.clone();
                    next = queue.successor_key(nk);
                } else {
                    break;
                }
            }
        }
        key = next?;
    }
}

/// Per-priority dispatch: immediate list, batching continuation,
/// direction selection, and commit. Returns `None` if this priority
/// class currently has no dispatchable request (whether or not it has
/// queued work).
fn dispatch_from_priority<Z: ZonedDevice>(
    bucket: &mut PriorityBucket,
    last_dispatched: &mut Option<RwDirection>,
    batch: &mut u32,
    writes_starved: &mut u32,
    params: &DispatchParams,
    latest_start_nanos: u64,
    device: &Z,
) -> Option<RequestHandle> {
    if let Some(req) = bucket.immediate.front() {
        if req.expiry_nanos() <= latest_start_nanos {
            bucket.dispatched += 1;
            return bucket.immediate.pop_front();
        }
    }

    let mut from_batch = false;
    let dir = if let Some(d) = *last_dispatched {
        if *batch < params.fifo_batch && bucket.dir(d).cursor().is_some() {
            from_batch = true;
            d
        } else {
            choose_direction(bucket, writes_starved, params)?
        }
    } else {
        choose_direction(bucket, writes_starved, params)?
    };

    if Some(dir) != *last_dispatched {
        *batch = 0;
    }

    let queue = bucket.dir(dir);
    let expired = queue.fifo_expired(latest_start_nanos);
    let continuation = if from_batch || !expired {
        queue.cursor().and_then(|c| queue.successor_key(c))
    } else {
        None
    };
    let start_key = match continuation {
        Some(k) => k,
        None => queue.fifo_head_key()?,
    };

    let (key, req) = select_admissible(bucket, dir, start_key, params, latest_start_nanos, device)?;
    let next_cursor = bucket.dir(dir).successor_key(key);
    bucket.dir_mut(dir).remove(key);
    bucket.dir_mut(dir).set_cursor(next_cursor);

    *last_dispatched = Some(dir);
    *batch += 1;
    bucket.dispatched += 1;

    if dir == RwDirection::Write {
        device.try_lock_zone(req.zone());
    }

    Some(req)
}

/// Top of the per-priority-class dispatch hierarchy: priority aging,
/// then strict priority order. Does not evaluate the management gate;
/// callers run that first.
pub fn dispatch_normal<Z: ZonedDevice>(
    buckets: &mut [PriorityBucket; 3],
    last_dispatched: &mut Option<RwDirection>,
    batch: &mut u32,
    writes_starved: &mut u32,
    params: &DispatchParams,
    now_nanos: u64,
    device: &Z,
) -> Option<RequestHandle> {
    if let Some(idx) = aged_priority(buckets, params, now_nanos) {
        if let Some(req) = dispatch_from_priority(
            &mut buckets[idx],
            last_dispatched,
            batch,
            writes_starved,
            params,
            now_nanos,
            device,
        ) {
            return Some(req);
        }
    }

    for bucket in buckets.iter_mut() {
        if !bucket.has_work() {
            continue;
        }
        return dispatch_from_priority(
            bucket,
            last_dispatched,
            batch,
            writes_starved,
            params,
            now_nanos,
            device,
        );
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::classifier::OpCode;
    use crate::common::refdev::RefDevice;
    use crate::common::request::{BasicRequest, Priority};
    use std::sync::Arc;
    use std::time::Duration;

    fn params() -> DispatchParams {
        DispatchParams {
            read_expire_nanos: Duration::from_millis(500).as_nanos() as u64,
            write_expire_nanos: Duration::from_millis(5000).as_nanos() as u64,
            prio_aging_expire_nanos: Duration::from_secs(10).as_nanos() as u64,
            fifo_batch: 16,
            writes_starved_limit: 2,
        }
    }

    fn fresh_buckets() -> [PriorityBucket; 3] {
        [PriorityBucket::new(), PriorityBucket::new(), PriorityBucket::new()]
    }

    fn read_req(sector: u64, now: u64, p: &DispatchParams) -> RequestHandle {
        let r = Arc::new(BasicRequest::new(OpCode::Read, sector, 8, 0, Priority::BestEffort));
        r.set_expiry_nanos(now + p.read_expire_nanos);
        r
    }

    fn write_req(sector: u64, zone: u32, now: u64, p: &DispatchParams) -> RequestHandle {
        let r = Arc::new(BasicRequest::new(OpCode::Write, sector, 8, zone, Priority::BestEffort));
        r.set_expiry_nanos(now + p.write_expire_nanos);
        r
    }

    #[test]
    fn restarts_from_fifo_head_then_continues_in_sector_order() {
        // Insertion order 200, 100, 300: the first dispatch must take the
        // oldest-inserted request (200), then continue batching from its
        // position in the sector index (next higher sector, 300), and
        // only fall back to the remaining FIFO head (100) once the
        // sector-sorted successor runs out.
        let p = params();
        let mut buckets = fresh_buckets();
        buckets[1].read.insert(read_req(200, 0, &p));
        buckets[1].read.insert(read_req(100, 0, &p));
        buckets[1].read.insert(read_req(300, 0, &p));

        let dev = RefDevice::new(4, 1024, false);
        let mut last = None;
        let mut batch = 0;
        let mut starved = 0;

        let r1 = dispatch_normal(&mut buckets, &mut last, &mut batch, &mut starved, &p, 0, &dev).unwrap();
        assert_eq!(r1.start_sector(), 200);
        let r2 = dispatch_normal(&mut buckets, &mut last, &mut batch, &mut starved, &p, 0, &dev).unwrap();
        assert_eq!(r2.start_sector(), 300);
        let r3 = dispatch_normal(&mut buckets, &mut last, &mut batch, &mut starved, &p, 0, &dev).unwrap();
        assert_eq!(r3.start_sector(), 100);
    }

    #[test]
    fn higher_priority_bucket_blocks_lower_even_when_empty_of_dispatchable_work() {
        let p = params();
        let mut buckets = fresh_buckets();
        // RealTime bucket has a write whose zone is locked: can't dispatch.
        buckets[0].write.insert(write_req(10, 0, 0, &p));
        // BestEffort bucket has a perfectly dispatchable read.
        buckets[1].read.insert(read_req(10, 0, &p));

        let dev = RefDevice::new(4, 1024, false);
        dev.try_lock_zone(0);
        let mut last = None;
        let mut batch = 0;
        let mut starved = 0;

        let out = dispatch_normal(&mut buckets, &mut last, &mut batch, &mut starved, &p, 0, &dev);
        assert!(out.is_none());
    }

    #[test]
    fn writes_starved_limit_interleaves_reads_and_writes() {
        // fifo_batch = 1 forces a fresh direction choice on every
        // dispatch, which is where the writes_starved counter is
        // consulted; a large fifo_batch would let one direction's batch
        // run to completion before the counter is ever checked.
        let mut p = params();
        p.fifo_batch = 1;
        let mut buckets = fresh_buckets();
        for s in 0..5 {
            buckets[1].read.insert(read_req(100 + s, 0, &p));
        }
        buckets[1].write.insert(write_req(10, 1, 0, &p));

        let dev = RefDevice::new(4, 1024, false);
        let mut last = None;
        let mut batch = 0;
        let mut starved = 0;

        // writes_starved_limit = 2: after two reads, a write must be
        // considered even though reads remain queued.
        let mut dirs = Vec::new();
        for _ in 0..3 {
            let req = dispatch_normal(&mut buckets, &mut last, &mut batch, &mut starved, &p, 0, &dev).unwrap();
            dirs.push(req.op());
        }
        assert!(dirs.contains(&OpCode::Write));
    }

    #[test]
    fn locked_zone_is_skipped_for_writes_but_not_reads() {
        let p = params();
        let mut buckets = fresh_buckets();
        buckets[1].write.insert(write_req(10, 0, 0, &p));
        buckets[1].write.insert(write_req(20, 1, 0, &p));

        let dev = RefDevice::new(4, 1024, false);
        dev.try_lock_zone(0);
        let mut last = None;
        let mut batch = 0;
        let mut starved = 0;

        let req = dispatch_normal(&mut buckets, &mut last, &mut batch, &mut starved, &p, 0, &dev).unwrap();
        assert_eq!(req.zone(), 1);
    }
}
