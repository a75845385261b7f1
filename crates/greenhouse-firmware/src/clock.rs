use embassy_time::Instant;
use greenhouse_core::hal::Clock;

/// Milliseconds since boot from the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}
