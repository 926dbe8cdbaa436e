//! ESP32-S3 firmware-specific modules for meteo-rs
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: GPIO register manipulation for the DHT11 single-wire line and the
//! embassy-backed microsecond clock the decoders measure pulses with.

#![no_std]

pub mod clock;
pub mod single_wire_pin;
