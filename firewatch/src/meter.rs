//! Process-wide counters of the polling loop.
//!
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

pub static METER: Meter = Meter::new();

#[derive(Default)]
pub struct Meter {
    fetched_frames: AtomicU64,
    offline_frames: AtomicU64,
    failed_frames: AtomicU64,
    alerts_sent: AtomicU64,
    alerts_failed: AtomicU64,
}

/// Counter values at one point in time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MeterSnapshot {
    pub fetched_frames: u64,
    pub offline_frames: u64,
    pub failed_frames: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            fetched_frames: AtomicU64::new(0),
            offline_frames: AtomicU64::new(0),
            failed_frames: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            alerts_failed: AtomicU64::new(0),
        }
    }

    pub fn tick_fetched(&self) {
        self.fetched_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_offline(&self) {
        self.offline_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_failed(&self) {
        self.failed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_alert(&self, sent: bool) {
        match sent {
            true => self.alerts_sent.fetch_add(1, Ordering::Relaxed),
            false => self.alerts_failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            fetched_frames: self.fetched_frames.load(Ordering::Relaxed),
            offline_frames: self.offline_frames.load(Ordering::Relaxed),
            failed_frames: self.failed_frames.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn counts_ticks() {
        let meter = Meter::new();
        meter.tick_fetched();
        meter.tick_fetched();
        meter.tick_offline();
        meter.tick_alert(true);
        meter.tick_alert(false);
        meter.tick_alert(false);

        assert_eq!(
            meter.snapshot(),
            MeterSnapshot {
                fetched_frames: 2,
                offline_frames: 1,
                failed_frames: 0,
                alerts_sent: 1,
                alerts_failed: 2,
            }
        );
    }
}
