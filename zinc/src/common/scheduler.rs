// vim: tw=80

//! The scheduler: wires the per-priority dispatch engine together with
//! the management gate, live configuration, and the attached device.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use log::{debug, info};
use uuid::Uuid;

use crate::common::bucket::PriorityBucket;
use crate::common::classifier::{self, Direction, OpCode};
use crate::common::clock::{Clock, SystemClock};
use crate::common::config::SchedulerConfig;
use crate::common::depth;
use crate::common::dispatch::{self, DispatchParams};
use crate::common::epoch::EpochTimer;
use crate::common::error::{Error, Result};
use crate::common::gate::{self, ManagementQueue, StreamCounters};
use crate::common::merge::{self, MergeVerdict};
use crate::common::request::{Priority, RequestHandle, RwDirection};
use crate::common::stats::{GateStats, PriorityStats, SchedulerStats};
use crate::common::zone::ZonedDevice;

struct SchedulerState {
    buckets: [PriorityBucket; 3],
    reset_queue: ManagementQueue,
    finish_queue: ManagementQueue,
    last_dispatched: Option<RwDirection>,
    batch: u32,
    writes_starved: u32,
}

impl SchedulerState {
    fn new() -> Self {
        SchedulerState {
            buckets: [PriorityBucket::new(), PriorityBucket::new(), PriorityBucket::new()],
            reset_queue: ManagementQueue::new(),
            finish_queue: ManagementQueue::new(),
            last_dispatched: None,
            batch: 0,
            writes_starved: 0,
        }
    }
}

/// 8 KiB accounting units, rounding up.
fn write_units(byte_len: u32) -> u64 {
    ((byte_len as u64) + 8191) / 8192
}

/// The zoned-device I/O scheduler.
pub struct Scheduler<Z: ZonedDevice, C: Clock = SystemClock> {
    state: Mutex<SchedulerState>,
    config: Arc<SchedulerConfig>,
    reset_counters: Arc<StreamCounters>,
    finish_counters: Arc<StreamCounters>,
    reset_timer: Mutex<Option<EpochTimer>>,
    finish_timer: Mutex<Option<EpochTimer>>,
    device: Arc<Z>,
    clock: Arc<C>,
    uuid: Uuid,
}

impl<Z: ZonedDevice + 'static> Scheduler<Z, SystemClock> {
    pub fn attach(device: Arc<Z>, config: Arc<SchedulerConfig>) -> Self {
        Self::attach_with_clock(device, Arc::new(SystemClock::new()), config)
    }
}

impl<Z: ZonedDevice + 'static, C: Clock + 'static> Scheduler<Z, C> {
    /// Attach the scheduler to a device, starting both epoch timers.
    pub fn attach_with_clock(device: Arc<Z>, clock: Arc<C>, config: Arc<SchedulerConfig>) -> Self {
        let reset_counters = Arc::new(StreamCounters::new());
        let finish_counters = Arc::new(StreamCounters::new());
        let reset_timer = EpochTimer::start("reset", Arc::clone(&reset_counters), config.reset.epoch_interval());
        let finish_timer =
            EpochTimer::start("finish", Arc::clone(&finish_counters), config.finish.epoch_interval());

        let uuid = Uuid::new_v4();
        info!("zinc: scheduler {uuid} attached, {} zones", device.nr_zones());

        Scheduler {
            state: Mutex::new(SchedulerState::new()),
            config,
            reset_counters,
            finish_counters,
            reset_timer: Mutex::new(Some(reset_timer)),
            finish_timer: Mutex::new(Some(finish_timer)),
            device,
            clock,
            uuid,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The tag-allocation depth a request of this kind should be capped
    /// to, out of a device with `nr_requests` total tags. Asynchronous
    /// and write requests are shallowed; synchronous reads get the full
    /// depth.
    pub fn limit_depth(&self, is_async: bool, is_write: bool, nr_requests: u32) -> u32 {
        if depth::is_depth_limited(is_async, is_write) {
            depth::async_depth(nr_requests)
        } else {
            nr_requests
        }
    }

    /// Stop both epoch timers synchronously. Called implicitly by
    /// `Drop`; exposed so callers can detach deterministically without
    /// waiting on the struct's own drop glue.
    pub fn detach(&self) {
        if let Some(mut t) = self.reset_timer.lock().unwrap().take() {
            t.disarm();
        }
        if let Some(mut t) = self.finish_timer.lock().unwrap().take() {
            t.disarm();
        }
    }

    fn dispatch_params(&self) -> DispatchParams {
        DispatchParams {
            read_expire_nanos: self.config.read_expire().as_nanos() as u64,
            write_expire_nanos: self.config.write_expire().as_nanos() as u64,
            prio_aging_expire_nanos: self.config.prio_aging_expire().as_nanos() as u64,
            fifo_batch: self.config.fifo_batch(),
            writes_starved_limit: self.config.writes_starved(),
        }
    }

    /// True iff any priority bucket has queued work or either
    /// management queue is non-empty (§6's `has_work` vtable entry).
    pub fn has_work(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.buckets.iter().any(PriorityBucket::has_work)
            || !state.reset_queue.is_empty()
            || !state.finish_queue.is_empty()
    }

    /// Front-merge a bio ending at `bio_end_sector` into an
    /// already-queued request of the given priority/direction, per
    /// §4.5 (the `bio_merge`/`request_merged` vtable entries): the
    /// sector-index lookup and reposition both run under the state
    /// mutex. The caller (the block layer) supplies the new, extended
    /// start sector once it has applied the merge to its own buffers;
    /// this method does not itself judge merge legality.
    pub fn front_merge(
        &self,
        priority: Priority,
        direction: RwDirection,
        bio_end_sector: u64,
        new_start_sector: u64,
    ) -> MergeVerdict {
        let mut state = self.state.lock().unwrap();
        let idx = priority.index();
        let queue = state.buckets[idx].dir_mut(direction);
        let (key, _) = match merge::front_merge_candidate(queue, bio_end_sector) {
            Some(found) => found,
            None => return MergeVerdict::None,
        };
        merge::reposition_after_front_merge(queue, key, new_start_sector);
        state.buckets[idx].merged += 1;
        MergeVerdict::Front
    }

    /// Coalesce two already-queued requests of the same
    /// priority/direction (§4.5's `requests_merged` vtable entry): the
    /// earlier of the two deadlines survives, the donor is dropped, and
    /// the merge counter is bumped. Returns `false` if either sector is
    /// not currently queued.
    pub fn merge_requests(
        &self,
        priority: Priority,
        direction: RwDirection,
        recipient_start_sector: u64,
        donor_start_sector: u64,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        let idx = priority.index();
        let queue = state.buckets[idx].dir_mut(direction);
        let recipient_key = match queue.find_by_start_sector(recipient_start_sector) {
            Some(k) => k,
            None => return false,
        };
        let donor_key = match queue.find_by_start_sector(donor_start_sector) {
            Some(k) => k,
            None => return false,
        };
        if recipient_key == donor_key {
            return false;
        }
        if merge::requests_merged(queue, recipient_key, donor_key) {
            state.buckets[idx].merged += 1;
            true
        } else {
            false
        }
    }

    /// Insert a request. Read/Write requests enter a priority bucket;
    /// Reset/Finish requests enter the management gate. Anything else
    /// (including zone-append) is rejected.
    pub fn insert(&self, req: RequestHandle) -> Result<()> {
        let dir = classifier::classify(req.op());
        let now = self.clock.now_nanos();

        match dir {
            Direction::Read | Direction::Write => {
                let mut state = self.state.lock().unwrap();
                let idx = req.priority().index();
                if req.head_inserted() {
                    req.set_expiry_nanos(now);
                    state.buckets[idx].immediate.push_back(req);
                } else {
                    let interval = if dir == Direction::Read {
                        self.config.read_expire().as_nanos() as u64
                    } else {
                        self.config.write_expire().as_nanos() as u64
                    };
                    req.set_expiry_nanos(now + interval);
                    let queue = match dir {
                        Direction::Read => &mut state.buckets[idx].read,
                        _ => &mut state.buckets[idx].write,
                    };
                    queue.insert(req);
                }
                state.buckets[idx].inserted += 1;
                Ok(())
            }
            Direction::Reset => {
                let mut state = self.state.lock().unwrap();
                state.reset_queue.push(req);
                self.reset_counters.maybe_eager_arm(self.config.reset.minimum_concurrency_threshold());
                Ok(())
            }
            Direction::Finish => {
                let mut state = self.state.lock().unwrap();
                state.finish_queue.push(req);
                self.finish_counters
                    .maybe_eager_arm(self.config.finish.minimum_concurrency_threshold());
                Ok(())
            }
            Direction::Other => Err(Error::unsupported_operation()),
        }
    }

    /// Produce the next request to issue to the device, or `None` if
    /// nothing is currently dispatchable. The management gate (reset,
    /// then finish) is evaluated first, ahead of the normal dispatch
    /// path.
    pub fn dispatch(&self) -> Option<RequestHandle> {
        let now = self.clock.now_nanos();
        let mut state = self.state.lock().unwrap();

        if let Some((req, case)) = gate::evaluate(
            "reset",
            &mut state.reset_queue,
            &self.reset_counters,
            &self.config.reset,
        ) {
            debug!("zinc: dispatching reset zone={} case={:?}", req.zone(), case);
            return Some(req);
        }

        if let Some((req, case)) = gate::evaluate(
            "finish",
            &mut state.finish_queue,
            &self.finish_counters,
            &self.config.finish,
        ) {
            debug!("zinc: dispatching finish zone={} case={:?}", req.zone(), case);
            return Some(req);
        }

        let params = self.dispatch_params();
        let state = &mut *state;
        let req = dispatch::dispatch_normal(
            &mut state.buckets,
            &mut state.last_dispatched,
            &mut state.batch,
            &mut state.writes_starved,
            &params,
            now,
            self.device.as_ref(),
        )?;

        if classifier::classify(req.op()) == Direction::Write {
            let units = write_units(req.byte_len());
            self.reset_counters.account_write_dispatch(units);
            self.finish_counters.account_write_dispatch(units);
        }

        Some(req)
    }

    /// Signal that `req` has completed. Decrements write-inflight
    /// accounting, releases the request's zone lock if it held one, and
    /// re-arms either gate eagerly if pressure has now dropped below its
    /// threshold. Per §4.7, only requests admitted through a priority
    /// bucket (Read/Write) bump the per-priority completed counter;
    /// management completions (Reset/Finish) were never counted in any
    /// bucket's `dispatched` and must not inflate `completed` past it.
    pub fn complete(&self, req: &RequestHandle) {
        let dir = classifier::classify(req.op());

        if dir == Direction::Write {
            let units = write_units(req.byte_len());
            self.reset_counters.account_write_completion(units);
            self.finish_counters.account_write_completion(units);
            self.reset_counters
                .maybe_eager_arm(self.config.reset.minimum_concurrency_threshold());
            self.finish_counters
                .maybe_eager_arm(self.config.finish.minimum_concurrency_threshold());
            self.device.unlock_zone(req.zone());
        }

        if dir == Direction::Read || dir == Direction::Write {
            let idx = req.priority().index();
            let state = self.state.lock().unwrap();
            state.buckets[idx].completed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// A point-in-time snapshot for the admin surface.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock().unwrap();
        let names = ["real_time", "best_effort", "idle"];
        let priorities = Priority::ALL
            .iter()
            .zip(names.iter())
            .map(|(p, name)| {
                let b = &state.buckets[p.index()];
                PriorityStats {
                    priority: name.to_string(),
                    queued_read: b.read.len(),
                    queued_write: b.write.len(),
                    queued_immediate: b.immediate.len(),
                    inserted: b.inserted,
                    merged: b.merged,
                    dispatched: b.dispatched,
                    completed: b.completed.load(Ordering::Relaxed),
                }
            })
            .collect();

        SchedulerStats {
            priorities,
            reset: GateStats {
                queued: state.reset_queue.len(),
                inflight_writes: self.reset_counters.inflight_writes(),
                dispatched_writes: self.reset_counters.dispatched_writes(),
                armed: self.reset_counters.is_armed(),
            },
            finish: GateStats {
                queued: state.finish_queue.len(),
                inflight_writes: self.finish_counters.inflight_writes(),
                dispatched_writes: self.finish_counters.dispatched_writes(),
                armed: self.finish_counters.is_armed(),
            },
            batch: state.batch,
            writes_starved: state.writes_starved,
        }
    }
}

impl<Z: ZonedDevice, C: Clock> Drop for Scheduler<Z, C> {
    fn drop(&mut self) {
        if let Some(mut t) = self.reset_timer.lock().unwrap().take() {
            t.disarm();
        }
        if let Some(mut t) = self.finish_timer.lock().unwrap().take() {
            t.disarm();
        }
    }
}
