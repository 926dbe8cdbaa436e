//! DHT11 humidity and temperature sensor on a bit-banged single-wire line.
//!
//! # Protocol
//!
//! ```txt
//!   host start        sensor ack          bit 0            bit 1
//!  ┐            ┌─────┐      ┌──────┐      ┌───┐      ┌───────┐
//!  │            │     │      │      │      │   │      │       │
//!  └────────────┘     └──────┘      └──────┘   └──────┘       └──
//!      20 ms     50µs   80 µs  80 µs   50 µs 26µs 50 µs  70 µs
//! ```
//!
//! The host holds the line low, drives it high briefly and releases it. The
//! sensor acknowledges with a low then a high pulse and transmits 40 bits,
//! MSB first. Every bit starts with a fixed low period; the width of the
//! following high pulse carries the value. The fifth byte is the sum of the
//! first four, modulo 256.
//!
//! The start signal's long low phase awaits an async delay. Everything after
//! the line is released is a synchronous busy-poll: the sensor does not wait.

use embedded_hal::delay::DelayNs as SyncDelay;
use embedded_hal::digital::{InputPin, OutputPin, PinState};
use embedded_hal_async::delay::DelayNs as AsyncDelay;
use log::{debug, error};

use super::{Sensor, SensorError};
use crate::config::Dht11Config;
use crate::timing::{Monotonic, wait_for_level};

const SENSOR: &str = "DHT11";
const FRAME_BITS: usize = 40;

/// Humidity and temperature from one valid frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dht11Readings {
    /// Relative humidity, integral part (% RH).
    pub humidity_percent: u8,
    /// Temperature, integral part (°C).
    pub temperature_celsius: u8,
}

/// The five bytes of one transmission: humidity (integral, decimal),
/// temperature (integral, decimal), checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawFrame(pub [u8; 5]);

impl RawFrame {
    /// Shift the `index`-th received bit into its byte, MSB first.
    #[inline]
    pub(crate) fn push_bit(&mut self, index: usize, one: bool) {
        let byte = &mut self.0[index / 8];
        *byte = (*byte << 1) | u8::from(one);
    }

    /// Low eight bits of the sum of the four data bytes.
    pub fn computed_checksum(&self) -> u8 {
        self.0[..4].iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
    }

    /// Validate the checksum and extract the reading.
    ///
    /// The frame is consumed either way.
    pub fn decode(self) -> Result<Dht11Readings, SensorError> {
        let computed = self.computed_checksum();
        let expected = self.0[4];
        if computed != expected {
            return Err(SensorError::ChecksumMismatch { expected, computed });
        }
        Ok(Dht11Readings {
            humidity_percent: self.0[0],
            temperature_celsius: self.0[2],
        })
    }
}

/// Bit value encoded by a high pulse of `width_us`.
///
/// Widths at or below the threshold are zeros, anything longer is a one.
#[inline]
pub const fn bit_from_pulse_width(width_us: u64, one_threshold_us: u32) -> bool {
    width_us > one_threshold_us as u64
}

/// DHT11 driver over an open-drain pin with a pull-up.
///
/// `set_high` must release the line rather than drive it, so the sensor can
/// pull it low. The clock provides the pulse-width measurements and every
/// transition deadline.
pub struct Dht11Sensor<P, D, M> {
    pin: P,
    delay: D,
    clock: M,
    config: Dht11Config,
}

impl<P, D, M> Dht11Sensor<P, D, M>
where
    P: InputPin + OutputPin,
    D: SyncDelay + AsyncDelay,
    M: Monotonic,
{
    pub fn new(pin: P, delay: D, clock: M) -> Self {
        Self::with_config(pin, delay, clock, Dht11Config::default())
    }

    pub fn with_config(pin: P, delay: D, clock: M, config: Dht11Config) -> Self {
        Self {
            pin,
            delay,
            clock,
            config,
        }
    }

    pub fn pin_mut(&mut self) -> &mut P {
        &mut self.pin
    }

    /// Release the driver's resources.
    pub fn into_inner(self) -> (P, D, M) {
        (self.pin, self.delay, self.clock)
    }

    async fn send_start_signal(&mut self) -> Result<(), SensorError> {
        let start = self.config.start;

        self.pin.set_low().map_err(|e| {
            error!("DHT11 failed to pull the line low: {:?}", e);
            SensorError::Gpio {
                sensor: SENSOR,
                operation: "driving the start signal low",
            }
        })?;
        AsyncDelay::delay_ms(&mut self.delay, start.low_ms).await;

        self.pin.set_high().map_err(|e| {
            error!("DHT11 failed to release the line: {:?}", e);
            SensorError::Gpio {
                sensor: SENSOR,
                operation: "releasing the line",
            }
        })?;
        SyncDelay::delay_us(&mut self.delay, start.high_us);

        Ok(())
    }

    fn wait_for(&mut self, state: PinState, phase: &'static str) -> Result<u64, SensorError> {
        wait_for_level(
            &mut self.pin,
            &self.clock,
            state,
            self.config.edge_timeout_us,
            SENSOR,
            phase,
        )
    }

    fn wait_for_acknowledge(&mut self) -> Result<(), SensorError> {
        self.wait_for(PinState::Low, "sensor response")?;
        self.wait_for(PinState::High, "end of acknowledge low")?;
        self.wait_for(PinState::Low, "end of acknowledge high")?;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame, SensorError> {
        let mut frame = RawFrame::default();
        for index in 0..FRAME_BITS {
            let rise = self.wait_for(PinState::High, "data bit start")?;
            let fall = self.wait_for(PinState::Low, "data bit end")?;
            let width_us = fall.saturating_sub(rise);
            frame.push_bit(
                index,
                bit_from_pulse_width(width_us, self.config.one_threshold_us),
            );
        }
        Ok(frame)
    }
}

impl<P, D, M> Sensor for Dht11Sensor<P, D, M>
where
    P: InputPin + OutputPin,
    D: SyncDelay + AsyncDelay,
    M: Monotonic,
{
    type Readings = Dht11Readings;

    async fn read(&mut self) -> Result<Dht11Readings, SensorError> {
        self.send_start_signal().await?;
        self.wait_for_acknowledge()?;
        let frame = self.read_frame()?;
        debug!("DHT11 frame: {:02x?}", frame.0);
        frame.decode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{RetryOutcome, RetryPolicy, read_with_retry};
    use crate::simulation::{Dht11Timing, SimClock, SimDelay, SimulatedLine, Waveform};
    use embassy_futures::block_on;
    use embedded_hal_mock::eh1::MockError;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::digital::{Mock as PinMock, State, Transaction as PinTransaction};
    use std::io::ErrorKind;

    fn frame_for(humidity: u8, temperature: u8) -> [u8; 5] {
        let checksum = humidity.wrapping_add(temperature);
        [humidity, 0, temperature, 0, checksum]
    }

    fn read_waveform(waveform: Waveform) -> Result<Dht11Readings, SensorError> {
        let clock = SimClock::new();
        let line = SimulatedLine::new(&clock, waveform, PinState::High);
        let mut dht = Dht11Sensor::new(line, SimDelay::new(&clock), &clock);
        block_on(dht.read())
    }

    #[test]
    fn test_send_start_signal() {
        let expectations = [
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High),
        ];
        let pin = PinMock::new(&expectations);
        let clock = SimClock::new();
        let mut dht = Dht11Sensor::new(pin, NoopDelay::new(), &clock);

        block_on(dht.send_start_signal()).unwrap();

        dht.pin.done();
    }

    #[test]
    fn test_start_signal_reports_gpio_error() {
        let expectations = [PinTransaction::set(State::Low)
            .with_error(MockError::Io(ErrorKind::NotConnected))];
        let pin = PinMock::new(&expectations);
        let clock = SimClock::new();
        let mut dht = Dht11Sensor::new(pin, NoopDelay::new(), &clock);

        let result = block_on(dht.send_start_signal());
        assert_eq!(
            result,
            Err(SensorError::Gpio {
                sensor: "DHT11",
                operation: "driving the start signal low"
            })
        );

        dht.pin.done();
    }

    #[test]
    fn test_release_failure_reports_gpio_error() {
        let expectations = [
            PinTransaction::set(State::Low),
            PinTransaction::set(State::High).with_error(MockError::Io(ErrorKind::NotConnected)),
        ];
        let pin = PinMock::new(&expectations);
        let clock = SimClock::new();
        let mut dht = Dht11Sensor::new(pin, NoopDelay::new(), &clock);

        let result = block_on(dht.read());
        assert!(matches!(
            result,
            Err(SensorError::Gpio {
                operation: "releasing the line",
                ..
            })
        ));

        dht.pin.done();
    }

    #[test]
    fn test_gpio_errors_are_retried() {
        let error = MockError::Io(ErrorKind::NotConnected);
        let expectations = [
            PinTransaction::set(State::Low).with_error(error.clone()),
            PinTransaction::set(State::Low).with_error(error.clone()),
            PinTransaction::set(State::Low).with_error(error),
        ];
        let pin = PinMock::new(&expectations);
        let clock = SimClock::new();
        let mut dht = Dht11Sensor::new(pin, NoopDelay::new(), &clock);
        let mut backoff = NoopDelay::new();

        let outcome = block_on(read_with_retry(
            &mut dht,
            &RetryPolicy::new(3, 1000),
            &mut backoff,
        ));
        assert!(matches!(
            outcome,
            RetryOutcome::Exhausted {
                attempts: 3,
                last_error: SensorError::Gpio { .. }
            }
        ));

        // Every attempt reached the pin.
        dht.pin.done();
    }

    #[test]
    fn test_start_signal_holds_configured_timings() {
        let clock = SimClock::new();
        let line = SimulatedLine::idle(&clock, PinState::High);
        let mut dht = Dht11Sensor::new(line, SimDelay::new(&clock), &clock);

        block_on(dht.send_start_signal()).unwrap();

        assert_eq!(clock.now_us(), 20_000 + 50);
    }

    #[test]
    fn test_minimal_start_signal() {
        let clock = SimClock::new();
        let line = SimulatedLine::idle(&clock, PinState::High);
        let config = Dht11Config {
            start: crate::config::StartSignal::MINIMAL,
            ..Dht11Config::default()
        };
        let mut dht = Dht11Sensor::with_config(line, SimDelay::new(&clock), &clock, config);

        block_on(dht.send_start_signal()).unwrap();

        assert_eq!(clock.now_us(), 18_000 + 40);
    }

    #[test]
    fn test_bit_threshold_boundary() {
        assert!(!bit_from_pulse_width(26, 50));
        assert!(!bit_from_pulse_width(49, 50));
        assert!(!bit_from_pulse_width(50, 50));
        assert!(bit_from_pulse_width(51, 50));
        assert!(bit_from_pulse_width(70, 50));
    }

    #[test]
    fn test_push_bits_msb_first() {
        let mut frame = RawFrame::default();
        for (index, one) in [true, false, true, false, false, false, false, true]
            .into_iter()
            .enumerate()
        {
            frame.push_bit(index, one);
        }
        frame.push_bit(8, true);
        assert_eq!(frame.0[0], 0b1010_0001);
        assert_eq!(frame.0[1], 0b0000_0001);
    }

    #[test]
    fn test_decode_valid_frame() {
        let readings = RawFrame([55, 0, 23, 0, 78]).decode().unwrap();
        assert_eq!(
            readings,
            Dht11Readings {
                humidity_percent: 55,
                temperature_celsius: 23
            }
        );
    }

    #[test]
    fn test_decode_ignores_decimal_bytes() {
        let readings = RawFrame([40, 7, 21, 3, 71]).decode().unwrap();
        assert_eq!(readings.humidity_percent, 40);
        assert_eq!(readings.temperature_celsius, 21);
    }

    #[test]
    fn test_checksum_wraps_modulo_256() {
        let frame = RawFrame([200, 100, 30, 0, 74]);
        assert_eq!(frame.computed_checksum(), 74);
        assert!(frame.decode().is_ok());
    }

    #[test]
    fn test_checksum_mismatch() {
        let result = RawFrame([55, 0, 23, 0, 77]).decode();
        assert_eq!(
            result,
            Err(SensorError::ChecksumMismatch {
                expected: 77,
                computed: 78
            })
        );
    }

    #[test]
    fn test_read_full_transmission() {
        let readings = read_waveform(Waveform::dht11(frame_for(61, 24)).unwrap()).unwrap();
        assert_eq!(readings.humidity_percent, 61);
        assert_eq!(readings.temperature_celsius, 24);
    }

    #[test]
    fn test_read_extreme_bytes() {
        let readings = read_waveform(Waveform::dht11([0xFF, 0xFF, 0x00, 0x00, 0xFE]).unwrap());
        assert_eq!(
            readings,
            Ok(Dht11Readings {
                humidity_percent: 0xFF,
                temperature_celsius: 0
            })
        );
    }

    #[test]
    fn test_read_rejects_corrupted_checksum() {
        let mut frame = frame_for(61, 24);
        frame[4] ^= 0x01;
        let result = read_waveform(Waveform::dht11(frame).unwrap());
        assert!(matches!(result, Err(SensorError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_read_pulse_widths_around_threshold() {
        // 50 µs highs still decode as zeros, 51 µs as ones.
        let timing = Dht11Timing {
            zero_high_us: 50,
            one_high_us: 51,
            ..Dht11Timing::default()
        };
        let frame = frame_for(0b1000_0001, 0b0111_1110);
        let readings = read_waveform(Waveform::dht11_with_timing(frame, timing).unwrap()).unwrap();
        assert_eq!(readings.humidity_percent, 0b1000_0001);
        assert_eq!(readings.temperature_celsius, 0b0111_1110);
    }

    #[test]
    fn test_read_pulse_widths_just_below_threshold() {
        let timing = Dht11Timing {
            zero_high_us: 49,
            one_high_us: 51,
            ..Dht11Timing::default()
        };
        let frame = frame_for(0x5A, 0x18);
        let readings = read_waveform(Waveform::dht11_with_timing(frame, timing).unwrap()).unwrap();
        assert_eq!(readings.humidity_percent, 0x5A);
        assert_eq!(readings.temperature_celsius, 0x18);
    }

    #[test]
    fn test_read_times_out_without_sensor() {
        let result = read_waveform(Waveform::new());
        assert_eq!(
            result,
            Err(SensorError::Timeout {
                sensor: "DHT11",
                phase: "sensor response"
            })
        );
    }

    #[test]
    fn test_read_times_out_on_truncated_transmission() {
        let full = Waveform::dht11(frame_for(61, 24)).unwrap();
        let mut truncated = Waveform::new();
        for segment in &full.segments()[..20] {
            truncated.push(segment.level, segment.duration_us).unwrap();
        }
        // The line floats high after the last scripted segment, so the next
        // bit never ends.
        let result = read_waveform(truncated);
        assert_eq!(
            result,
            Err(SensorError::Timeout {
                sensor: "DHT11",
                phase: "data bit end"
            })
        );
    }

    #[test]
    fn test_read_times_out_on_stuck_acknowledge() {
        let mut waveform = Waveform::new();
        waveform.push(PinState::High, 80).unwrap();
        waveform.push(PinState::Low, 5_000).unwrap();
        let result = read_waveform(waveform);
        assert_eq!(
            result,
            Err(SensorError::Timeout {
                sensor: "DHT11",
                phase: "end of acknowledge low"
            })
        );
    }

    #[test]
    fn test_consecutive_reads_replay() {
        let clock = SimClock::new();
        let line = SimulatedLine::new(
            &clock,
            Waveform::dht11(frame_for(45, 19)).unwrap(),
            PinState::High,
        );
        let mut dht = Dht11Sensor::new(line, SimDelay::new(&clock), &clock);

        let first = block_on(dht.read()).unwrap();
        let second = block_on(dht.read()).unwrap();
        assert_eq!(first, second);

        let (line, _, _) = dht.into_inner();
        assert_eq!(line.transmissions(), 2);
    }
}
