//! Hardware-independent core library for meteo-rs
//!
//! This crate contains all platform-agnostic logic for the meteo station:
//! the DHT11 single-wire decoder, the BMP280 SPI driver and its fixed-point
//! pressure compensation, the retry policy and the monitor loop that ties
//! them together.
//!
//! It is `#![no_std]` so it compiles on both the embedded target (ESP32-S3)
//! and desktop hosts (for the simulator and tests).

#![no_std]

#[cfg(test)]
extern crate std;

pub mod compensation;
pub mod config;
pub mod monitor;
pub mod retry;
pub mod sensors;
#[cfg(any(test, feature = "simulation"))]
pub mod simulation;
pub mod timing;

pub use compensation::{CalibrationSet, CompensatedPressure, compensate};
pub use config::MonitorConfig;
pub use monitor::{CycleReport, Monitor};
pub use retry::{RetryOutcome, RetryPolicy, read_with_retry};
pub use sensors::{Sensor, SensorError};
pub use timing::Monotonic;
