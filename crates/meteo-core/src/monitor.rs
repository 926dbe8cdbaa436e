//! The station's main loop
//!
//! Each cycle reads the DHT11 with bounded retries, reports humidity and
//! temperature, then reads and compensates the BMP280 pressure and reports it.
//! Sensor failures are logged and never stop the loop.

use embedded_hal::delay::DelayNs as SyncDelay;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::SpiDevice;
use embedded_hal_async::delay::DelayNs as AsyncDelay;
use log::{debug, error, info};

use crate::compensation::CompensatedPressure;
use crate::config::MonitorConfig;
use crate::retry::{RetryOutcome, read_with_retry};
use crate::sensors::{Bmp280Sensor, Dht11Readings, Dht11Sensor, SensorError};
use crate::timing::Monotonic;

/// What one cycle observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub climate: RetryOutcome<Dht11Readings>,
    pub pressure: Result<CompensatedPressure, SensorError>,
}

/// Owns both sensors and runs the read-report-sleep loop.
pub struct Monitor<P, D, M, S, W> {
    dht11: Dht11Sensor<P, D, M>,
    bmp280: Bmp280Sensor<S>,
    delay: W,
    config: MonitorConfig,
}

impl<P, D, M, S, W> Monitor<P, D, M, S, W>
where
    P: InputPin + OutputPin,
    D: SyncDelay + AsyncDelay,
    M: Monotonic,
    S: SpiDevice,
    W: AsyncDelay,
{
    pub fn new(
        dht11: Dht11Sensor<P, D, M>,
        bmp280: Bmp280Sensor<S>,
        delay: W,
        config: MonitorConfig,
    ) -> Self {
        Self {
            dht11,
            bmp280,
            delay,
            config,
        }
    }

    pub fn dht11_mut(&mut self) -> &mut Dht11Sensor<P, D, M> {
        &mut self.dht11
    }

    pub fn bmp280_mut(&mut self) -> &mut Bmp280Sensor<S> {
        &mut self.bmp280
    }

    /// Read and report both sensors once.
    pub async fn run_cycle(&mut self) -> CycleReport {
        info!("Reading DHT11...");
        let climate = read_with_retry(&mut self.dht11, &self.config.retry, &mut self.delay).await;
        match &climate {
            RetryOutcome::Success { readings, .. } => {
                info!(
                    "Humidity: {}%, Temperature: {}°C",
                    readings.humidity_percent, readings.temperature_celsius
                );
                self.bmp280
                    .set_reference_temperature(i32::from(readings.temperature_celsius));
            }
            RetryOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                debug!("Last DHT11 error: {}", last_error);
                error!("Failed to read DHT11 after {} attempts", attempts);
            }
        }

        let pressure = self.bmp280.measure().map(|readings| readings.pressure);
        match &pressure {
            Ok(pressure) => info!("Pressure: {}", pressure),
            Err(e) => error!("Failed to read pressure: {}", e),
        }

        CycleReport { climate, pressure }
    }

    /// Run cycles forever, pausing for the configured period after each one.
    pub async fn run(&mut self) -> ! {
        loop {
            self.run_cycle().await;
            self.delay.delay_ms(self.config.cycle_period_ms).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compensation::{CalibrationSet, compensate};
    use crate::config::Bmp280Config;
    use crate::retry::RetryPolicy;
    use crate::simulation::{SimClock, SimDelay, SimulatedBmp280, SimulatedLine, Waveform};
    use embassy_futures::block_on;
    use embedded_hal::digital::PinState;
    use embedded_hal_mock::eh1::delay::NoopDelay;

    const SEQUENTIAL_BLOCK: [u8; 24] = [
        1, 0, 2, 0, 3, 0, 4, 0, 5, 0, 6, 0, 7, 0, 8, 0, 9, 0, 0, 0, 0, 0, 0, 0,
    ];
    const RAW_PRESSURE: u32 = 415_148;

    fn bmp280() -> Bmp280Sensor<SimulatedBmp280> {
        let mut device = SimulatedBmp280::new().with_calibration(SEQUENTIAL_BLOCK);
        device.set_raw_pressure(RAW_PRESSURE);
        Bmp280Sensor::init(device, Bmp280Config::default()).unwrap()
    }

    #[test]
    fn test_cycle_with_healthy_sensors() {
        let clock = SimClock::new();
        let line = SimulatedLine::new(
            &clock,
            Waveform::dht11([52, 0, 25, 0, 77]).unwrap(),
            PinState::High,
        );
        let dht = Dht11Sensor::new(line, SimDelay::new(&clock), &clock);
        let mut monitor = Monitor::new(dht, bmp280(), NoopDelay::new(), MonitorConfig::default());

        let report = block_on(monitor.run_cycle());

        assert_eq!(
            report.climate,
            RetryOutcome::Success {
                readings: Dht11Readings {
                    humidity_percent: 52,
                    temperature_celsius: 25
                },
                attempts: 1
            }
        );
        // Pressure is evaluated at the DHT11 temperature.
        let calibration = CalibrationSet::from_bytes(&SEQUENTIAL_BLOCK);
        assert_eq!(
            report.pressure,
            Ok(compensate(RAW_PRESSURE, &calibration, 25 * 5120))
        );
        assert_eq!(monitor.bmp280_mut().t_fine(), 128_000);
    }

    #[test]
    fn test_cycle_continues_after_dht11_failure() {
        let clock = SimClock::new();
        let line = SimulatedLine::idle(&clock, PinState::High);
        let dht = Dht11Sensor::new(line, SimDelay::new(&clock), &clock);
        let config = MonitorConfig {
            retry: RetryPolicy::new(5, 1000),
            ..MonitorConfig::default()
        };
        let mut monitor = Monitor::new(dht, bmp280(), NoopDelay::new(), config);

        let report = block_on(monitor.run_cycle());

        assert!(matches!(
            report.climate,
            RetryOutcome::Exhausted {
                attempts: 5,
                last_error: SensorError::Timeout { .. }
            }
        ));
        // No temperature yet, so compensation ran at t_fine = 0.
        let calibration = CalibrationSet::from_bytes(&SEQUENTIAL_BLOCK);
        assert_eq!(report.pressure, Ok(compensate(RAW_PRESSURE, &calibration, 0)));
    }

    #[test]
    fn test_cycle_keeps_last_temperature_after_failure() {
        let clock = SimClock::new();
        let line = SimulatedLine::new(
            &clock,
            Waveform::dht11([40, 0, 18, 0, 58]).unwrap(),
            PinState::High,
        );
        let dht = Dht11Sensor::new(line, SimDelay::new(&clock), &clock);
        let mut monitor = Monitor::new(dht, bmp280(), NoopDelay::new(), MonitorConfig::default());

        block_on(monitor.run_cycle());
        // Corrupt every following transmission.
        *monitor.dht11_mut().pin_mut().source_mut() = Waveform::dht11([40, 0, 18, 0, 0]).unwrap();
        let report = block_on(monitor.run_cycle());

        assert!(matches!(
            report.climate,
            RetryOutcome::Exhausted {
                last_error: SensorError::ChecksumMismatch { .. },
                ..
            }
        ));
        assert_eq!(monitor.bmp280_mut().t_fine(), 18 * 5120);
    }

    #[test]
    fn test_cycle_reports_pressure_bus_error() {
        let clock = SimClock::new();
        let line = SimulatedLine::new(
            &clock,
            Waveform::dht11([52, 0, 25, 0, 77]).unwrap(),
            PinState::High,
        );
        let dht = Dht11Sensor::new(line, SimDelay::new(&clock), &clock);
        let mut monitor = Monitor::new(dht, bmp280(), NoopDelay::new(), MonitorConfig::default());
        monitor.bmp280_mut().spi_mut().set_disconnected(true);

        let report = block_on(monitor.run_cycle());

        assert!(report.climate.readings().is_some());
        assert!(matches!(report.pressure, Err(SensorError::Bus { .. })));
    }
}
