// vim: tw=80

//! The management gate: ZINC's core contribution. Two independent
//! streams (reset, finish) share this logic; `Scheduler` instantiates
//! one of each.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::debug;

use crate::common::config::StreamKnobs;
use crate::common::request::RequestHandle;

/// A management request's side queue. Head-inserted, so admission order
/// is LIFO, moderated by hold-count aging.
#[derive(Default)]
pub struct ManagementQueue {
    requests: VecDeque<RequestHandle>,
}

impl ManagementQueue {
    pub fn new() -> Self {
        ManagementQueue { requests: VecDeque::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn push(&mut self, req: RequestHandle) {
        self.requests.push_front(req);
    }

    pub fn pop(&mut self) -> Option<RequestHandle> {
        self.requests.pop_front()
    }

    /// Age every held request by one epoch (the "defer" outcome).
    pub fn age_all(&self) {
        for req in &self.requests {
            req.add_hold(1);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequestHandle> {
        self.requests.iter()
    }
}

/// Atomics touched outside the scheduler mutex: inflight/dispatched
/// write volume in 8 KiB units, and the armed flag.
pub struct StreamCounters {
    armed: AtomicBool,
    inflight_writes: AtomicU64,
    dispatched_writes: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        StreamCounters {
            armed: AtomicBool::new(false),
            inflight_writes: AtomicU64::new(0),
            dispatched_writes: AtomicU64::new(0),
        }
    }

    pub fn inflight_writes(&self) -> u64 {
        self.inflight_writes.load(Ordering::Relaxed)
    }

    pub fn dispatched_writes(&self) -> u64 {
        self.dispatched_writes.load(Ordering::Relaxed)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    /// CAS-consume the armed flag: true iff this call observed and
    /// cleared an armed epoch.
    fn consume_armed(&self) -> bool {
        self.armed
            .compare_exchange(true, false, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Timer fire, or an eager re-arm on low inflight.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::Relaxed);
    }

    /// Re-arm eagerly if inflight writes are already below `threshold`,
    /// so a stream doesn't have to wait out a full epoch once pressure
    /// has already dropped.
    pub fn maybe_eager_arm(&self, threshold: u64) {
        if self.inflight_writes() < threshold {
            self.arm();
        }
    }

    /// A dispatched write contributes to both streams' counters.
    pub fn account_write_dispatch(&self, units: u64) {
        self.inflight_writes.fetch_add(units, Ordering::Relaxed);
        self.dispatched_writes.fetch_add(units, Ordering::Relaxed);
    }

    /// Completion decrements inflight only; the dispatched counter only
    /// resets on admission.
    pub fn account_write_completion(&self, units: u64) {
        self.inflight_writes.fetch_sub(units, Ordering::Relaxed);
    }

    fn reset_dispatched(&self) {
        self.dispatched_writes.store(0, Ordering::Relaxed);
    }
}

impl Default for StreamCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdmissionCase {
    Drain,
    Token,
    Starvation,
}

/// Evaluate one stream's admission logic. Called with the scheduler
/// mutex already held (the queue lives in the scheduler's state); the
/// counters are read via relaxed atomics. A request completing mid
/// evaluation can make this look slightly stale, which is fine: the
/// gate re-runs on every dispatch call.
pub fn evaluate(
    name: &str,
    queue: &mut ManagementQueue,
    counters: &StreamCounters,
    knobs: &StreamKnobs,
) -> Option<(RequestHandle, AdmissionCase)> {
    if !counters.consume_armed() {
        return None;
    }

    let inflight = counters.inflight_writes();
    let dispatched = counters.dispatched_writes();
    let threshold = knobs.minimum_concurrency_threshold();

    if inflight < threshold && !queue.is_empty() {
        let req = queue.pop().expect("checked non-empty");
        counters.reset_dispatched();
        debug!("zinc: {name} gate admitted via drain case (inflight={inflight} < {threshold})");
        return Some((req, AdmissionCase::Drain));
    }

    if dispatched > knobs.command_tokens() && !queue.is_empty() {
        let req = queue.pop().expect("checked non-empty");
        counters.reset_dispatched();
        debug!("zinc: {name} gate admitted via token case (dispatched={dispatched})");
        return Some((req, AdmissionCase::Token));
    }

    if !queue.is_empty() {
        let head_holds = queue.requests.front().expect("checked non-empty").hold_count();
        if head_holds >= knobs.maximum_epoch_holds() {
            let req = queue.pop().expect("checked non-empty");
            counters.reset_dispatched();
            debug!("zinc: {name} gate admitted via starvation case (hold_count={head_holds})");
            return Some((req, AdmissionCase::Starvation));
        }
    }

    queue.age_all();
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::classifier::OpCode;
    use crate::common::request::{BasicRequest, Priority};
    use std::sync::Arc;

    fn mgmt_req() -> RequestHandle {
        Arc::new(BasicRequest::management(OpCode::ZoneReset, 3, Priority::BestEffort))
    }

    #[test]
    fn unarmed_stream_never_admits() {
        let mut q = ManagementQueue::new();
        q.push(mgmt_req());
        let counters = StreamCounters::new();
        let knobs = StreamKnobs::new(100, 10, 3, 3);
        assert!(evaluate("reset", &mut q, &counters, &knobs).is_none());
    }

    #[test]
    fn drain_case_admits_under_low_inflight() {
        let mut q = ManagementQueue::new();
        q.push(mgmt_req());
        let counters = StreamCounters::new();
        counters.arm();
        let knobs = StreamKnobs::new(100, 10, 3, 3);
        let (_, case) = evaluate("reset", &mut q, &counters, &knobs).unwrap();
        assert_eq!(case, AdmissionCase::Drain);
    }

    #[test]
    fn token_case_admits_past_budget() {
        let mut q = ManagementQueue::new();
        q.push(mgmt_req());
        let counters = StreamCounters::new();
        counters.account_write_dispatch(20);
        counters.arm();
        let knobs = StreamKnobs::new(100, 10, 0, 3);
        let (_, case) = evaluate("reset", &mut q, &counters, &knobs).unwrap();
        assert_eq!(case, AdmissionCase::Token);
    }

    #[test]
    fn starvation_case_admits_when_held_too_long() {
        let mut q = ManagementQueue::new();
        q.push(mgmt_req());
        q.age_all();
        q.age_all();
        q.age_all();
        let counters = StreamCounters::new();
        counters.account_write_dispatch(5);
        counters.arm();
        let knobs = StreamKnobs::new(100, 10, 0, 3);
        let (_, case) = evaluate("reset", &mut q, &counters, &knobs).unwrap();
        assert_eq!(case, AdmissionCase::Starvation);
    }

    #[test]
    fn deferred_evaluation_ages_the_queue() {
        let mut q = ManagementQueue::new();
        let r = mgmt_req();
        q.push(r.clone());
        let counters = StreamCounters::new();
        counters.account_write_dispatch(5);
        counters.arm();
        let knobs = StreamKnobs::new(100, 10, 0, 100);
        assert!(evaluate("reset", &mut q, &counters, &knobs).is_none());
        assert_eq!(r.hold_count(), 1);
    }
}
