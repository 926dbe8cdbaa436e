//! Monotonic time source and deadline-bounded line waits
//!
//! The single-wire protocol measures pulse widths and bounds every wait with
//! a wall-clock deadline, so the decoder's correctness does not depend on how
//! fast the polling loop happens to run.

use embedded_hal::digital::{InputPin, PinState};

use crate::sensors::SensorError;

/// A free-running microsecond clock.
///
/// Implementations must never go backwards. On target this is backed by the
/// embassy time driver; on the host by [`crate::simulation::SimClock`].
pub trait Monotonic {
    /// Microseconds elapsed since an arbitrary fixed origin.
    fn now_us(&self) -> u64;
}

impl<M: Monotonic + ?Sized> Monotonic for &M {
    #[inline]
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// An absolute point in time after which a wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at_us: u64,
}

impl Deadline {
    /// A deadline `timeout_us` microseconds from now.
    pub fn after<M: Monotonic>(clock: &M, timeout_us: u32) -> Self {
        Self {
            at_us: clock.now_us().saturating_add(u64::from(timeout_us)),
        }
    }

    #[inline]
    pub fn has_passed<M: Monotonic>(&self, clock: &M) -> bool {
        clock.now_us() >= self.at_us
    }
}

/// Busy-poll `pin` until it reads `state`, or fail once `timeout_us` elapses.
///
/// The pin is sampled at least once, even with a zero timeout. On success
/// returns the clock reading taken right after the matching sample.
pub fn wait_for_level<P, M>(
    pin: &mut P,
    clock: &M,
    state: PinState,
    timeout_us: u32,
    sensor: &'static str,
    phase: &'static str,
) -> Result<u64, SensorError>
where
    P: InputPin,
    M: Monotonic,
{
    let deadline = Deadline::after(clock, timeout_us);
    loop {
        let reached = match state {
            PinState::High => pin.is_high(),
            PinState::Low => pin.is_low(),
        }
        .map_err(|e| {
            log::error!("{}: pin read failed during {}: {:?}", sensor, phase, e);
            SensorError::Gpio {
                sensor,
                operation: "sampling the data line",
            }
        })?;

        if reached {
            return Ok(clock.now_us());
        }
        if deadline.has_passed(clock) {
            return Err(SensorError::Timeout { sensor, phase });
        }
    }
}
