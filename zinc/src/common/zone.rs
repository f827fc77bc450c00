// vim: tw=80

//! The zoned-device boundary. ZINC depends only on this minimal trait;
//! a real ZNS/NVMe backend implements it. `common::refdev` ships an
//! in-memory implementation for tests and `zinc-cli`.

use crate::common::ZoneT;

/// Per-zone write exclusion, plus the handful of geometry facts the
/// dispatcher needs (§4.3e, §6).
pub trait ZonedDevice: Send + Sync {
    /// Total number of zones on the device.
    fn nr_zones(&self) -> ZoneT;

    /// Sectors per zone.
    fn sectors_per_zone(&self) -> u64;

    /// Non-rotational (SSD-class) devices don't need sequential-run
    /// skipping when walking past a locked zone (§4.3e).
    fn is_rotational(&self) -> bool;

    /// Is `zone` currently write-locked?
    fn zone_locked(&self, zone: ZoneT) -> bool;

    /// Attempt to acquire the write-lock for `zone`. `true` on success.
    fn try_lock_zone(&self, zone: ZoneT) -> bool;

    /// Release a previously-acquired write-lock.
    fn unlock_zone(&self, zone: ZoneT);
}
