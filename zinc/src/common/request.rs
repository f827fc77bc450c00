// vim: tw=80

//! The request handle the scheduler operates on, and a plain
//! implementation for tests, the reference device, and `zinc-cli`.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::common::classifier::OpCode;
use crate::common::ZoneT;

/// I/O priority class (§3). Declaration order doubles as dispatch
/// ranking: `RealTime` is strictly higher than `BestEffort`, which is
/// strictly higher than `Idle`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Priority {
    RealTime = 0,
    BestEffort = 1,
    Idle = 2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::RealTime, Priority::BestEffort, Priority::Idle];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Workload read/write direction, as distinct from the classifier's
/// broader `Direction` (which also covers management commands).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RwDirection {
    Read,
    Write,
}

/// A request handle as observed by the scheduler.
///
/// The scheduler never owns a request outright: it holds `Arc<dyn
/// Request>` between insert and dispatch/completion, the same way the
/// surrounding block layer holds the underlying I/O descriptor for its
/// own, longer lifetime. Expiry and hold-count are exposed as plain
/// owned values rather than atomic handles, so implementors are free to
/// back them however they like (and so the trait can be mocked).
#[cfg_attr(test, mockall::automock)]
pub trait Request: Send + Sync {
    /// The operation this request performs.
    fn op(&self) -> OpCode;

    /// Starting sector (512-byte units). Meaningful for reads and
    /// writes; management commands use `zone()` instead.
    fn start_sector(&self) -> u64;

    /// Length in sectors.
    fn nr_sectors(&self) -> u32;

    /// Length in bytes, used for 8 KiB unit write accounting (§4.4).
    fn byte_len(&self) -> u32;

    /// The zone this request targets.
    fn zone(&self) -> ZoneT;

    /// I/O priority class.
    fn priority(&self) -> Priority;

    /// Was this request inserted at the head, for immediate dispatch?
    fn head_inserted(&self) -> bool {
        false
    }

    /// For FIFO-queued requests: expiry deadline, nanoseconds since the
    /// scheduler clock's epoch. For head-inserted requests: start-time,
    /// reusing the same field since the two are never compared in the
    /// same context. `u64::MAX` denotes "not yet assigned".
    fn expiry_nanos(&self) -> u64;

    /// Set the expiry/start-time deadline, as assigned by the scheduler
    /// at insert time.
    fn set_expiry_nanos(&self, value: u64);

    /// Epochs this request has been held by the management gate while
    /// awaiting admission (§4.4).
    fn hold_count(&self) -> u32;

    /// Age this request by `n` epochs (the gate's "defer" outcome).
    fn add_hold(&self, n: u32);
}

pub type RequestHandle = Arc<dyn Request>;

/// A straightforward `Request` for the reference device, `zinc-cli`, and
/// tests. Real integrations wrap their own in-flight descriptors
/// instead.
pub struct BasicRequest {
    op: OpCode,
    start_sector: u64,
    nr_sectors: u32,
    zone: ZoneT,
    priority: Priority,
    head: bool,
    expiry: AtomicU64,
    hold_count: AtomicU32,
}

impl BasicRequest {
    pub fn new(
        op: OpCode,
        start_sector: u64,
        nr_sectors: u32,
        zone: ZoneT,
        priority: Priority,
    ) -> Self {
        BasicRequest {
            op,
            start_sector,
            nr_sectors,
            zone,
            priority,
            head: false,
            expiry: AtomicU64::new(u64::MAX),
            hold_count: AtomicU32::new(0),
        }
    }

    /// Build a management (reset/finish) request targeting `zone`.
    pub fn management(op: OpCode, zone: ZoneT, priority: Priority) -> Self {
        BasicRequest::new(op, 0, 0, zone, priority)
    }

    pub fn head_inserted(mut self) -> Self {
        self.head = true;
        self
    }
}

impl Request for BasicRequest {
    fn op(&self) -> OpCode {
        self.op
    }

    fn start_sector(&self) -> u64 {
        self.start_sector
    }

    fn nr_sectors(&self) -> u32 {
        self.nr_sectors
    }

    fn byte_len(&self) -> u32 {
        self.nr_sectors * 512
    }

    fn zone(&self) -> ZoneT {
        self.zone
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn head_inserted(&self) -> bool {
        self.head
    }

    fn expiry_nanos(&self) -> u64 {
        self.expiry.load(Ordering::Relaxed)
    }

    fn set_expiry_nanos(&self, value: u64) {
        self.expiry.store(value, Ordering::Relaxed);
    }

    fn hold_count(&self) -> u32 {
        self.hold_count.load(Ordering::Relaxed)
    }

    fn add_hold(&self, n: u32) {
        self.hold_count.fetch_add(n, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::classifier::{classify, Direction};
    use pretty_assertions::assert_eq;

    #[test]
    fn priority_ranks_by_declaration_order() {
        assert!(Priority::RealTime.index() < Priority::BestEffort.index());
        assert!(Priority::BestEffort.index() < Priority::Idle.index());
    }

    #[test]
    fn fresh_request_has_no_expiry_and_no_holds() {
        let r = BasicRequest::new(OpCode::Read, 10, 8, 0, Priority::BestEffort);
        assert_eq!(r.expiry_nanos(), u64::MAX);
        assert_eq!(r.hold_count(), 0);
        assert_eq!(r.byte_len(), 4096);
    }

    /// `MockRequest` is mockall-generated from the `Request` trait
    /// itself (via `#[automock]`); this exercises it as the polymorphic
    /// `Arc<dyn Request>` handle the scheduler actually operates on.
    #[test]
    fn mock_request_satisfies_the_trait_object_contract() {
        let mut mock = MockRequest::new();
        mock.expect_op().return_const(OpCode::Write);
        mock.expect_start_sector().return_const(42u64);
        mock.expect_zone().return_const(3u32);
        mock.expect_priority().return_const(Priority::RealTime);

        let handle: RequestHandle = Arc::new(mock);
        assert_eq!(classify(handle.op()), Direction::Write);
        assert_eq!(handle.start_sector(), 42);
        assert_eq!(handle.zone(), 3);
        assert_eq!(handle.priority(), Priority::RealTime);
    }
}
