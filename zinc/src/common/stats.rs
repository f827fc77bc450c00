// vim: tw=80

//! Observability snapshots, serializable for the admin CLI's JSON mode.

use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct PriorityStats {
    pub priority: String,
    pub queued_read: usize,
    pub queued_write: usize,
    pub queued_immediate: usize,
    pub inserted: u64,
    pub merged: u64,
    pub dispatched: u64,
    pub completed: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct GateStats {
    pub queued: usize,
    pub inflight_writes: u64,
    pub dispatched_writes: u64,
    pub armed: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SchedulerStats {
    pub priorities: Vec<PriorityStats>,
    pub reset: GateStats,
    pub finish: GateStats,
    pub batch: u32,
    pub writes_starved: u32,
}
