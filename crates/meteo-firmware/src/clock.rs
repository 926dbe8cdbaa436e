//! Microsecond clock backed by the embassy time driver

use embassy_time::Instant;
use meteo_core::Monotonic;

/// Reads the embassy time driver that `esp_rtos::start` installs.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Monotonic for EmbassyClock {
    #[inline]
    fn now_us(&self) -> u64 {
        Instant::now().as_micros()
    }
}
