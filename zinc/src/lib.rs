// vim: tw=80

//! ZINC: an I/O scheduler for zoned block devices that coexists workload
//! reads/writes with zone-management commands (reset, finish).
//!
//! The scheduler inherits a classical multi-queue deadline dispatch path
//! (priority classes, per-direction FIFOs, sector-sorted batching, read/write
//! starvation control, priority aging) and adds a management-command gate
//! that holds RESET/FINISH requests in side queues and releases them on
//! epoch boundaries, bounded by write-inflight pressure and a starvation
//! ceiling.

pub mod common;

pub use common::error::{Error, Result};
pub use common::scheduler::Scheduler;
