pub mod bmp280;
pub mod dht11;

use thiserror_no_std::Error;

/// Errors surfaced by the sensor drivers.
///
/// Every variant is recoverable: the monitor loop logs it and moves on to the
/// next attempt or cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SensorError {
    /// A watched line transition did not happen before its deadline.
    #[error("{sensor}: timed out waiting for {phase}")]
    Timeout {
        sensor: &'static str,
        phase: &'static str,
    },

    /// The decoded frame failed its additive checksum.
    #[error("checksum mismatch (frame says {expected:#04x}, computed {computed:#04x})")]
    ChecksumMismatch { expected: u8, computed: u8 },

    /// The GPIO driver reported an error.
    #[error("{sensor}: GPIO error while {operation}")]
    Gpio {
        sensor: &'static str,
        operation: &'static str,
    },

    /// The SPI device reported an error.
    #[error("{sensor}: bus error while {operation}")]
    Bus {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// Trait for sensors that produce typed readings.
pub trait Sensor {
    /// The type of readings this sensor produces.
    type Readings;

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}

pub use bmp280::{Bmp280Sensor, PressureReadings};
pub use dht11::{Dht11Readings, Dht11Sensor, RawFrame};
