//! Bounded retries for flaky sensor reads

use embedded_hal_async::delay::DelayNs;
use log::{debug, warn};

use crate::sensors::{Sensor, SensorError};

/// How often a failed read is repeated, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero behaves as one.
    pub max_attempts: u8,
    /// Pause after a failed attempt that will be retried.
    pub backoff_ms: u32,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u8, backoff_ms: u32) -> Self {
        Self {
            max_attempts,
            backoff_ms,
        }
    }

    /// Single attempt, no back-off.
    pub const fn once() -> Self {
        Self::new(1, 0)
    }

    #[inline]
    const fn attempts(&self) -> u8 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 1000)
    }
}

/// Result of a read with retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome<R> {
    /// A read succeeded on attempt number `attempts`.
    Success { readings: R, attempts: u8 },
    /// Every attempt failed; `last_error` is from the final one.
    Exhausted { attempts: u8, last_error: SensorError },
}

impl<R> RetryOutcome<R> {
    pub fn attempts(&self) -> u8 {
        match self {
            Self::Success { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn readings(&self) -> Option<&R> {
        match self {
            Self::Success { readings, .. } => Some(readings),
            Self::Exhausted { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<R, SensorError> {
        match self {
            Self::Success { readings, .. } => Ok(readings),
            Self::Exhausted { last_error, .. } => Err(last_error),
        }
    }
}

/// Read `sensor` until it succeeds or the policy runs out of attempts.
///
/// Each failure that will be retried is logged and followed by the policy's
/// back-off. No pause follows the final failure.
pub async fn read_with_retry<S, D>(
    sensor: &mut S,
    policy: &RetryPolicy,
    delay: &mut D,
) -> RetryOutcome<S::Readings>
where
    S: Sensor,
    D: DelayNs,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match sensor.read().await {
            Ok(readings) => {
                return RetryOutcome::Success {
                    readings,
                    attempts: attempt,
                };
            }
            Err(e) if attempt >= max_attempts => {
                return RetryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: e,
                };
            }
            Err(e) => {
                debug!("Attempt {} error: {}", attempt, e);
                warn!("Attempt {} failed, retrying...", attempt);
                delay.delay_ms(policy.backoff_ms).await;
                attempt += 1;
            }
        }
    }
}
