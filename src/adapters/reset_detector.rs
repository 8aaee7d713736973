//! Multi-reset detector.
//!
//! Implements [`ResetDetector`] by counting boots in persistent storage.
//! Every boot bumps a counter; `tick()` zeroes it once the device has
//! stayed up for `timeout_ms`.  If the counter reaches `times` at boot, the
//! operator power-cycled quickly enough and a burst is reported.
//!
//! `times = 2` gives the classic double-reset detector.

use log::{debug, info, warn};

use crate::app::ports::{ResetDetector, StoragePort, SystemPort};

/// Resets needed to count as a burst.
pub const DEFAULT_RESET_TIMES: u8 = 3;
/// Window within which the resets must happen.
pub const DEFAULT_RESET_TIMEOUT_MS: u64 = 10_000;

const NAMESPACE: &str = "netprov";
const COUNTER_KEY: &str = "wm_mrd";

pub struct MultiResetDetector<S, C> {
    storage: S,
    clock: C,
    times: u8,
    timeout_ms: u64,
    boot_ms: u64,
    waiting: bool,
}

impl<S: StoragePort, C: SystemPort> MultiResetDetector<S, C> {
    pub fn new(storage: S, clock: C) -> Self {
        Self::with_params(storage, clock, DEFAULT_RESET_TIMES, DEFAULT_RESET_TIMEOUT_MS)
    }

    /// `times` is clamped to at least 2.
    pub fn with_params(storage: S, clock: C, times: u8, timeout_ms: u64) -> Self {
        Self {
            storage,
            clock,
            times: times.max(2),
            timeout_ms,
            boot_ms: 0,
            waiting: false,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Give the storage back, e.g. to carry it across a simulated reboot.
    pub fn into_storage(self) -> S {
        self.storage
    }

    fn count(&self) -> u8 {
        let mut buf = [0u8; 1];
        match self.storage.read(NAMESPACE, COUNTER_KEY, &mut buf) {
            Ok(1) => buf[0],
            _ => 0,
        }
    }

    fn store_count(&mut self, count: u8) {
        if let Err(e) = self.storage.write(NAMESPACE, COUNTER_KEY, &[count]) {
            warn!("ResetDetector: counter not saved ({})", e);
        }
    }
}

impl<S: StoragePort, C: SystemPort> ResetDetector for MultiResetDetector<S, C> {
    fn detect_burst(&mut self) -> bool {
        self.boot_ms = self.clock.now_ms();
        let count = self.count().saturating_add(1);
        debug!("ResetDetector: boot {} of {}", count, self.times);
        if count >= self.times {
            info!("ResetDetector: {} resets within window", count);
            self.store_count(0);
            self.waiting = false;
            return true;
        }
        self.store_count(count);
        self.waiting = true;
        false
    }

    fn tick(&mut self) {
        if self.waiting && self.clock.now_ms().saturating_sub(self.boot_ms) >= self.timeout_ms {
            self.store_count(0);
            self.waiting = false;
            debug!("ResetDetector: window closed");
        }
    }
}

/// Detector for boards without one.  Never reports a burst.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResetDetector;

impl ResetDetector for NoResetDetector {
    fn detect_burst(&mut self) -> bool {
        false
    }

    fn tick(&mut self) {}
}
