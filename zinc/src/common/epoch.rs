// vim: tw=80

//! The epoch timer that periodically arms a management stream's gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::trace;

use crate::common::gate::StreamCounters;

/// Periodically arms a stream's gate. Cancellation is synchronous: the
/// thread is joined before `disarm`/`drop` returns, so a torn-down
/// scheduler never races a timer fire against deallocation.
pub struct EpochTimer {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl EpochTimer {
    pub fn start(name: &'static str, counters: Arc<StreamCounters>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("zinc-epoch-{name}"))
            .spawn(move || {
                while !stop2.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    if stop2.load(Ordering::Relaxed) {
                        break;
                    }
                    counters.arm();
                    trace!("zinc: {name} epoch timer fired");
                }
            })
            .expect("failed to spawn epoch timer thread");

        EpochTimer { stop, handle: Some(handle) }
    }

    /// Cancel the timer and wait for its thread to exit.
    pub fn disarm(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for EpochTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_least_once_within_a_couple_intervals() {
        let counters = Arc::new(StreamCounters::new());
        let mut timer = EpochTimer::start("test", Arc::clone(&counters), Duration::from_millis(5));
        thread::sleep(Duration::from_millis(30));
        assert!(counters.is_armed());
        timer.disarm();
    }

    #[test]
    fn disarm_stops_further_fires() {
        let counters = Arc::new(StreamCounters::new());
        let mut timer = EpochTimer::start("test", Arc::clone(&counters), Duration::from_millis(5));
        thread::sleep(Duration::from_millis(15));
        timer.disarm();
        // consume whatever armed state accumulated before teardown
        let _ = counters.is_armed();
    }
}
