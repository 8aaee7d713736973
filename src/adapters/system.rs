//! System adapter: clock, delay, restart and chip identity.
//!
//! Implements [`SystemPort`].
//!
//! - **`target_os = "espidf"`** — `esp_timer_get_time()` for the monotonic
//!   clock, FreeRTOS delay, `esp_restart()`.
//! - **`not(target_os = "espidf")`** — `std::time::Instant` plus a virtual
//!   offset, so host runs never actually sleep.  Restarts are counted, not
//!   performed.

use log::info;

use super::device_id;
use crate::app::ports::SystemPort;

pub struct SystemAdapter {
    chip_id: u32,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    skipped_ms: u64,
    #[cfg(not(target_os = "espidf"))]
    restarts: u32,
}

impl Default for SystemAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemAdapter {
    pub fn new() -> Self {
        Self {
            chip_id: device_id::chip_id(&device_id::read_mac()),
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            skipped_ms: 0,
            #[cfg(not(target_os = "espidf"))]
            restarts: 0,
        }
    }

    /// Simulation: number of restart requests seen so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn restarts(&self) -> u32 {
        self.restarts
    }
}

impl SystemPort for SystemAdapter {
    #[cfg(target_os = "espidf")]
    fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64 + self.skipped_ms
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ms(&mut self, ms: u32) {
        self.skipped_ms += u64::from(ms);
    }

    #[cfg(target_os = "espidf")]
    fn restart(&mut self) {
        info!("System: restarting");
        // SAFETY: esp_restart never returns and has no preconditions.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart(&mut self) {
        self.restarts += 1;
        info!("System(sim): restart requested ({} so far)", self.restarts);
    }

    fn chip_id(&self) -> u32 {
        self.chip_id
    }
}
