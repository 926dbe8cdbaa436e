//! Desktop simulator for the meteo-rs weather station.
//!
//! Runs the real meteo-core monitor loop against a simulated DHT11 line and a
//! simulated BMP280 register file, printing the same log lines the firmware
//! emits over RTT. Climate and pressure drift slowly over time, and every few
//! transmissions the DHT11 answers with a corrupted checksum so the retry path
//! is exercised.
//!
//! # Usage
//!
//! ```text
//! meteo-simulator [CYCLES]
//! ```
//!
//! Without `CYCLES` the simulator runs until interrupted. Set `RUST_LOG` to
//! change verbosity (defaults to `info`).

use std::thread;
use std::time::Duration;

use embassy_futures::block_on;
use embedded_hal::digital::PinState;
use embedded_hal_async::delay::DelayNs;
use env_logger::Env;
use log::{info, warn};

use meteo_core::config::Bmp280Config;
use meteo_core::sensors::{Bmp280Sensor, Dht11Sensor};
use meteo_core::simulation::{
    SimClock, SimDelay, SimulatedBmp280, SimulatedLine, Waveform, WaveformSource,
};
use meteo_core::{CalibrationSet, Monitor, MonitorConfig};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Wall-clock pauses are divided by this factor.
const SPEEDUP: u32 = 10;

/// Every Nth DHT11 transmission carries a bad checksum.
const CORRUPT_EVERY: u32 = 4;

/// Raw ADC value around which the simulated pressure drifts.
const BASE_RAW_PRESSURE: f64 = 415_148.0;

/// Trimming values from the BMP280 datasheet's worked example.
const DATASHEET_CALIBRATION: CalibrationSet = CalibrationSet {
    p1: 36477,
    p2: -10685,
    p3: 3024,
    p4: 2855,
    p5: 140,
    p6: -7,
    p7: 15500,
    p8: -14600,
    p9: 6000,
};

// ---------------------------------------------------------------------------
// Simulated devices
// ---------------------------------------------------------------------------

/// DHT11 answers with slowly varying humidity and temperature.
struct DriftingClimate {
    transmissions: u32,
}

impl DriftingClimate {
    fn new() -> Self {
        Self { transmissions: 0 }
    }

    fn frame(&self) -> [u8; 5] {
        let t = f64::from(self.transmissions);

        // Humidity: 40–60 %, temperature: 19–27 °C
        let humidity = (50.0 + 10.0 * (t / 15.0).sin()).round() as u8;
        let temperature = (23.0 + 4.0 * (t / 25.0).cos()).round() as u8;

        let mut checksum = humidity.wrapping_add(temperature);
        if self.transmissions % CORRUPT_EVERY == CORRUPT_EVERY - 1 {
            checksum = checksum.wrapping_add(1);
        }
        [humidity, 0, temperature, 0, checksum]
    }
}

impl WaveformSource for DriftingClimate {
    fn next_transmission(&mut self) -> Waveform {
        let frame = self.frame();
        self.transmissions += 1;
        Waveform::dht11(frame).unwrap_or_else(|_| {
            warn!("DHT11 waveform did not fit, line stays idle");
            Waveform::new()
        })
    }
}

/// Raw pressure sample for a given cycle.
fn raw_pressure_at(cycle: u32) -> u32 {
    let t = f64::from(cycle);
    (BASE_RAW_PRESSURE + 1_500.0 * (t / 40.0).sin()) as u32
}

/// Calibration block as the BMP280 stores it from register 0x88.
fn calibration_block(calibration: &CalibrationSet) -> [u8; 24] {
    let words = [
        calibration.p1.to_le_bytes(),
        calibration.p2.to_le_bytes(),
        calibration.p3.to_le_bytes(),
        calibration.p4.to_le_bytes(),
        calibration.p5.to_le_bytes(),
        calibration.p6.to_le_bytes(),
        calibration.p7.to_le_bytes(),
        calibration.p8.to_le_bytes(),
        calibration.p9.to_le_bytes(),
    ];
    let mut block = [0u8; 24];
    for (chunk, word) in block.chunks_exact_mut(2).zip(words) {
        chunk.copy_from_slice(&word);
    }
    block
}

/// Sleeps the calling thread, shortened by [`SPEEDUP`].
struct ThreadDelay;

impl DelayNs for ThreadDelay {
    async fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns / SPEEDUP)));
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cycles = match std::env::args().nth(1).map(|arg| arg.parse::<u32>()) {
        Some(Ok(cycles)) => Some(cycles),
        Some(Err(e)) => {
            eprintln!("Invalid cycle count: {e}");
            std::process::exit(2);
        }
        None => None,
    };

    info!("meteo-simulator starting (speed-up x{})", SPEEDUP);

    let clock = SimClock::new();
    let line = SimulatedLine::new(&clock, DriftingClimate::new(), PinState::High);
    let dht11 = Dht11Sensor::new(line, SimDelay::new(&clock), &clock);

    let mut device =
        SimulatedBmp280::new().with_calibration(calibration_block(&DATASHEET_CALIBRATION));
    device.set_raw_pressure(raw_pressure_at(0));
    let bmp280 = match Bmp280Sensor::init(device, Bmp280Config::default()) {
        Ok(bmp280) => bmp280,
        Err(e) => {
            eprintln!("BMP280 initialisation failed: {e}");
            std::process::exit(1);
        }
    };

    let config = MonitorConfig::default();
    let mut monitor = Monitor::new(dht11, bmp280, ThreadDelay, config);

    block_on(async {
        let mut cycle = 0u32;
        while cycles.is_none_or(|limit| cycle < limit) {
            monitor
                .bmp280_mut()
                .spi_mut()
                .set_raw_pressure(raw_pressure_at(cycle));
            monitor.run_cycle().await;
            cycle += 1;
            ThreadDelay.delay_ms(config.cycle_period_ms).await;
        }
    });

    info!("meteo-simulator finished after {} cycles", cycles.unwrap_or_default());
}
