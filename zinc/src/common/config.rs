// vim: tw=80

//! Per-device tunables, each a live-updatable atomic so the admin
//! surface can adjust them without pausing dispatch.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;

/// Configuration for one management stream (reset or finish).
pub struct StreamKnobs {
    epoch_interval_ms: AtomicU64,
    command_tokens: AtomicU64,
    minimum_concurrency_threshold: AtomicU64,
    maximum_epoch_holds: AtomicU32,
}

impl StreamKnobs {
    pub fn new(
        epoch_interval_ms: u64,
        command_tokens: u64,
        minimum_concurrency_threshold: u64,
        maximum_epoch_holds: u32,
    ) -> Self {
        StreamKnobs {
            epoch_interval_ms: AtomicU64::new(epoch_interval_ms.max(1)),
            command_tokens: AtomicU64::new(command_tokens),
            minimum_concurrency_threshold: AtomicU64::new(minimum_concurrency_threshold),
            maximum_epoch_holds: AtomicU32::new(maximum_epoch_holds),
        }
    }

    pub fn epoch_interval(&self) -> Duration {
        Duration::from_millis(self.epoch_interval_ms.load(Ordering::Relaxed))
    }

    pub fn command_tokens(&self) -> u64 {
        self.command_tokens.load(Ordering::Relaxed)
    }

    pub fn minimum_concurrency_threshold(&self) -> u64 {
        self.minimum_concurrency_threshold.load(Ordering::Relaxed)
    }

    pub fn maximum_epoch_holds(&self) -> u32 {
        self.maximum_epoch_holds.load(Ordering::Relaxed)
    }

    /// Out-of-bounds writes clamp rather than reject; the epoch interval
    /// floors at one millisecond.
    pub fn set_epoch_interval_ms(&self, value: u64) -> u64 {
        let clamped = value.max(1);
        if clamped != value {
            warn!("zinc: epoch_interval_ms clamped {value} to {clamped}");
        }
        self.epoch_interval_ms.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn set_command_tokens(&self, value: u64) {
        self.command_tokens.store(value, Ordering::Relaxed);
    }

    pub fn set_minimum_concurrency_threshold(&self, value: u64) {
        self.minimum_concurrency_threshold.store(value, Ordering::Relaxed);
    }

    pub fn set_maximum_epoch_holds(&self, value: u32) {
        self.maximum_epoch_holds.store(value, Ordering::Relaxed);
    }
}

/// Top-level scheduler tunables.
pub struct SchedulerConfig {
    read_expire_ms: AtomicU64,
    write_expire_ms: AtomicU64,
    writes_starved: AtomicU32,
    front_merges: AtomicBool,
    fifo_batch: AtomicU32,
    prio_aging_expire_ms: AtomicU64,
    pub reset: Arc<StreamKnobs>,
    pub finish: Arc<StreamKnobs>,
}

impl SchedulerConfig {
    pub fn read_expire(&self) -> Duration {
        Duration::from_millis(self.read_expire_ms.load(Ordering::Relaxed))
    }

    pub fn write_expire(&self) -> Duration {
        Duration::from_millis(self.write_expire_ms.load(Ordering::Relaxed))
    }

    pub fn writes_starved(&self) -> u32 {
        self.writes_starved.load(Ordering::Relaxed)
    }

    pub fn front_merges_enabled(&self) -> bool {
        self.front_merges.load(Ordering::Relaxed)
    }

    pub fn fifo_batch(&self) -> u32 {
        self.fifo_batch.load(Ordering::Relaxed)
    }

    pub fn prio_aging_expire(&self) -> Duration {
        Duration::from_millis(self.prio_aging_expire_ms.load(Ordering::Relaxed))
    }

    pub fn set_read_expire_ms(&self, value: u64) -> u64 {
        let clamped = value.max(1);
        self.read_expire_ms.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn set_write_expire_ms(&self, value: u64) -> u64 {
        let clamped = value.max(1);
        self.write_expire_ms.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn set_writes_starved(&self, value: u32) {
        self.writes_starved.store(value, Ordering::Relaxed);
    }

    pub fn set_front_merges_enabled(&self, value: bool) {
        self.front_merges.store(value, Ordering::Relaxed);
    }

    pub fn set_fifo_batch(&self, value: u32) -> u32 {
        let clamped = value.max(1);
        self.fifo_batch.store(clamped, Ordering::Relaxed);
        clamped
    }

    pub fn set_prio_aging_expire_ms(&self, value: u64) {
        self.prio_aging_expire_ms.store(value, Ordering::Relaxed);
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            read_expire_ms: AtomicU64::new(500),
            write_expire_ms: AtomicU64::new(5000),
            writes_starved: AtomicU32::new(2),
            front_merges: AtomicBool::new(true),
            fifo_batch: AtomicU32::new(16),
            prio_aging_expire_ms: AtomicU64::new(10_000),
            reset: Arc::new(StreamKnobs::new(64, 2000, 3, 3)),
            finish: Arc::new(StreamKnobs::new(64, 2000, 3, 3)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_interval_floors_at_one_millisecond() {
        let k = StreamKnobs::new(64, 10, 1, 1);
        assert_eq!(k.set_epoch_interval_ms(0), 1);
    }

    #[test]
    fn defaults_are_sane() {
        let c = SchedulerConfig::default();
        assert_eq!(c.read_expire(), Duration::from_millis(500));
        assert_eq!(c.write_expire(), Duration::from_millis(5000));
        assert_eq!(c.writes_starved(), 2);
        assert!(c.front_merges_enabled());
    }
}
