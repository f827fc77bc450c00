// vim: tw=80

//! An in-memory `ZonedDevice`, standing in for a real ZNS backend. Used
//! by `zinc-cli`'s demo mode and the integration tests.

use std::sync::Mutex;

use fixedbitset::FixedBitSet;

use crate::common::zone::ZonedDevice;
use crate::common::ZoneT;

pub struct RefDevice {
    sectors_per_zone: u64,
    rotational: bool,
    locked: Mutex<FixedBitSet>,
}

impl RefDevice {
    pub fn new(nr_zones: ZoneT, sectors_per_zone: u64, rotational: bool) -> Self {
        RefDevice {
            sectors_per_zone,
            rotational,
            locked: Mutex::new(FixedBitSet::with_capacity(nr_zones as usize)),
        }
    }
}

impl ZonedDevice for RefDevice {
    fn nr_zones(&self) -> ZoneT {
        self.locked.lock().unwrap().len() as ZoneT
    }

    fn sectors_per_zone(&self) -> u64 {
        self.sectors_per_zone
    }

    fn is_rotational(&self) -> bool {
        self.rotational
    }

    fn zone_locked(&self, zone: ZoneT) -> bool {
        self.locked.lock().unwrap()[zone as usize]
    }

    fn try_lock_zone(&self, zone: ZoneT) -> bool {
        let mut locked = self.locked.lock().unwrap();
        if locked[zone as usize] {
            false
        } else {
            locked.set(zone as usize, true);
            true
        }
    }

    fn unlock_zone(&self, zone: ZoneT) {
        self.locked.lock().unwrap().set(zone as usize, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive() {
        let dev = RefDevice::new(4, 1024, false);
        assert!(dev.try_lock_zone(1));
        assert!(!dev.try_lock_zone(1));
        assert!(dev.zone_locked(1));
        dev.unlock_zone(1);
        assert!(!dev.zone_locked(1));
        assert!(dev.try_lock_zone(1));
    }

    #[test]
    fn zones_are_independent() {
        let dev = RefDevice::new(4, 1024, false);
        assert!(dev.try_lock_zone(0));
        assert!(dev.try_lock_zone(1));
        assert!(dev.zone_locked(0));
        assert!(dev.zone_locked(1));
    }
}
