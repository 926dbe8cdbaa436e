//! Simulated peripherals for host runs
//!
//! A deterministic microsecond clock, a single-wire line that replays a
//! scripted waveform after every host start signal, a delay that advances the
//! simulated clock instead of sleeping, and a BMP280 register file behind an
//! SPI device. The simulator binary and the unit tests drive the real
//! decoders through these.

use core::cell::Cell;
use core::convert::Infallible;

use embedded_hal::digital::{self, InputPin, OutputPin, PinState};
use embedded_hal::spi::{self, Operation, SpiDevice};
use heapless::Vec;

use crate::timing::Monotonic;

/// Maximum number of segments a single scripted transmission can hold.
pub const MAX_SEGMENTS: usize = 96;

/// Simulated time a single pin sample costs.
pub const POLL_COST_US: u64 = 1;

/// A manually advanced microsecond clock.
#[derive(Debug, Default)]
pub struct SimClock {
    now_us: Cell<u64>,
}

impl SimClock {
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    pub const fn starting_at(now_us: u64) -> Self {
        Self {
            now_us: Cell::new(now_us),
        }
    }

    pub fn advance(&self, us: u64) {
        self.now_us.set(self.now_us.get().saturating_add(us));
    }
}

impl Monotonic for SimClock {
    fn now_us(&self) -> u64 {
        self.now_us.get()
    }
}

/// Delay provider that moves a [`SimClock`] forward instead of sleeping.
pub struct SimDelay<'a> {
    clock: &'a SimClock,
}

impl<'a> SimDelay<'a> {
    pub const fn new(clock: &'a SimClock) -> Self {
        Self { clock }
    }
}

impl embedded_hal::delay::DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(u64::from(ns.div_ceil(1000)));
    }
}

impl embedded_hal_async::delay::DelayNs for SimDelay<'_> {
    async fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(u64::from(ns.div_ceil(1000)));
    }
}

/// One constant-level stretch of a waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub level: PinState,
    pub duration_us: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveformFull;

/// Pulse timings the simulated DHT11 answers with.
#[derive(Debug, Clone, Copy)]
pub struct Dht11Timing {
    /// Time from the host releasing the line until the sensor pulls it low.
    pub response_delay_us: u32,
    pub ack_low_us: u32,
    pub ack_high_us: u32,
    pub bit_low_us: u32,
    pub zero_high_us: u32,
    pub one_high_us: u32,
}

impl Default for Dht11Timing {
    fn default() -> Self {
        Self {
            response_delay_us: 80,
            ack_low_us: 80,
            ack_high_us: 80,
            bit_low_us: 50,
            zero_high_us: 26,
            one_high_us: 70,
        }
    }
}

/// What the line does after the host releases it.
#[derive(Debug, Clone, Default)]
pub struct Waveform {
    segments: Vec<Segment, MAX_SEGMENTS>,
}

impl Waveform {
    pub const fn new() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn push(&mut self, level: PinState, duration_us: u32) -> Result<(), WaveformFull> {
        self.segments
            .push(Segment { level, duration_us })
            .map_err(|_| WaveformFull)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// A complete DHT11 answer carrying `frame`, with nominal timings.
    pub fn dht11(frame: [u8; 5]) -> Result<Self, WaveformFull> {
        Self::dht11_with_timing(frame, Dht11Timing::default())
    }

    pub fn dht11_with_timing(frame: [u8; 5], timing: Dht11Timing) -> Result<Self, WaveformFull> {
        let mut waveform = Self::new();
        waveform.push(PinState::High, timing.response_delay_us)?;
        waveform.push(PinState::Low, timing.ack_low_us)?;
        waveform.push(PinState::High, timing.ack_high_us)?;
        for byte in frame {
            for bit in (0..8).rev() {
                let high_us = if byte & (1 << bit) != 0 {
                    timing.one_high_us
                } else {
                    timing.zero_high_us
                };
                waveform.push(PinState::Low, timing.bit_low_us)?;
                waveform.push(PinState::High, high_us)?;
            }
        }
        // End-of-frame low before the sensor lets the line float again.
        waveform.push(PinState::Low, timing.bit_low_us)?;
        Ok(waveform)
    }

    fn level_at(&self, offset_us: u64) -> Option<PinState> {
        let mut end = 0u64;
        for segment in &self.segments {
            end += u64::from(segment.duration_us);
            if offset_us < end {
                return Some(segment.level);
            }
        }
        None
    }
}

/// Supplies the waveform played after each host start signal.
pub trait WaveformSource {
    fn next_transmission(&mut self) -> Waveform;
}

/// A fixed waveform replays identically on every start signal.
impl WaveformSource for Waveform {
    fn next_transmission(&mut self) -> Waveform {
        self.clone()
    }
}

/// An open-drain line with a pull-up and a scripted device on the far end.
///
/// While the host drives it low the line reads low. When the host releases it
/// after driving it low, the next waveform from the source starts playing; once
/// the waveform runs out the line floats back to its idle level. Every sample
/// advances the clock by [`POLL_COST_US`].
pub struct SimulatedLine<'a, S = Waveform> {
    clock: &'a SimClock,
    source: S,
    idle: PinState,
    driven_low: bool,
    playing: Option<(u64, Waveform)>,
    transmissions: u32,
}

impl<'a> SimulatedLine<'a, Waveform> {
    /// A line nothing is attached to.
    pub fn idle(clock: &'a SimClock, idle: PinState) -> Self {
        Self::new(clock, Waveform::new(), idle)
    }

    /// Append a segment to the replayed waveform.
    pub fn pulse(&mut self, level: PinState, duration_us: u32) -> Result<(), WaveformFull> {
        self.source.push(level, duration_us)
    }
}

impl<'a, S: WaveformSource> SimulatedLine<'a, S> {
    pub fn new(clock: &'a SimClock, source: S, idle: PinState) -> Self {
        Self {
            clock,
            source,
            idle,
            driven_low: false,
            playing: None,
            transmissions: 0,
        }
    }

    /// Start playing the next waveform now, as if the host had just released
    /// the line.
    pub fn play(&mut self) {
        let waveform = self.source.next_transmission();
        self.playing = Some((self.clock.now_us(), waveform));
        self.transmissions += 1;
    }

    /// Number of waveforms started so far.
    pub fn transmissions(&self) -> u32 {
        self.transmissions
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn level(&self) -> PinState {
        if self.driven_low {
            return PinState::Low;
        }
        self.playing
            .as_ref()
            .and_then(|(origin, waveform)| {
                waveform.level_at(self.clock.now_us().saturating_sub(*origin))
            })
            .unwrap_or(self.idle)
    }

    fn sample(&mut self) -> PinState {
        let level = self.level();
        self.clock.advance(POLL_COST_US);
        level
    }
}

impl<S> digital::ErrorType for SimulatedLine<'_, S> {
    type Error = Infallible;
}

impl<S: WaveformSource> InputPin for SimulatedLine<'_, S> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.sample() == PinState::High)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.sample() == PinState::Low)
    }
}

impl<S: WaveformSource> OutputPin for SimulatedLine<'_, S> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.driven_low = true;
        self.playing = None;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.driven_low {
            self.driven_low = false;
            self.play();
        }
        Ok(())
    }
}

/// Bus fault reported by a disconnected [`SimulatedBmp280`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimBusError;

impl spi::Error for SimBusError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// BMP280 register file behind an SPI device.
///
/// The first written byte of a transaction addresses a register: bit 7 set
/// starts an auto-incrementing read, bit 7 clear starts `[address, value]`
/// write pairs.
pub struct SimulatedBmp280 {
    registers: [u8; 256],
    disconnected: bool,
    transactions: u32,
}

impl Default for SimulatedBmp280 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBmp280 {
    pub const CALIBRATION_START: u8 = 0x88;
    pub const PRESSURE_MSB: u8 = 0xF7;

    pub const fn new() -> Self {
        Self {
            registers: [0; 256],
            disconnected: false,
            transactions: 0,
        }
    }

    /// Fill the 24-byte calibration block starting at 0x88.
    pub fn with_calibration(mut self, block: [u8; 24]) -> Self {
        let start = usize::from(Self::CALIBRATION_START);
        self.registers[start..start + block.len()].copy_from_slice(&block);
        self
    }

    /// Store a 20-bit pressure sample in the `press_msb..press_xlsb` registers.
    pub fn set_raw_pressure(&mut self, raw: u32) {
        let start = usize::from(Self::PRESSURE_MSB);
        self.registers[start] = (raw >> 12) as u8;
        self.registers[start + 1] = (raw >> 4) as u8;
        self.registers[start + 2] = ((raw & 0x0F) << 4) as u8;
    }

    pub fn set_disconnected(&mut self, disconnected: bool) {
        self.disconnected = disconnected;
    }

    pub fn register(&self, address: u8) -> u8 {
        self.registers[usize::from(address)]
    }

    pub fn transactions(&self) -> u32 {
        self.transactions
    }
}

impl spi::ErrorType for SimulatedBmp280 {
    type Error = SimBusError;
}

impl SpiDevice<u8> for SimulatedBmp280 {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        if self.disconnected {
            return Err(SimBusError);
        }
        self.transactions += 1;

        let mut cursor: Option<(u8, bool)> = None;
        for operation in operations.iter_mut() {
            match operation {
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        cursor = match cursor {
                            None => Some((byte | 0x80, byte & 0x80 != 0)),
                            Some((address, false)) => {
                                self.registers[usize::from(address)] = byte;
                                None
                            }
                            Some(reading) => Some(reading),
                        };
                    }
                }
                Operation::Read(buffer) => {
                    if let Some((address, true)) = cursor {
                        for (i, slot) in buffer.iter_mut().enumerate() {
                            *slot = self.registers[usize::from(address.wrapping_add(i as u8))];
                        }
                        cursor = Some((address.wrapping_add(buffer.len() as u8), true));
                    } else {
                        buffer.fill(0);
                    }
                }
                Operation::Transfer(read, _) => read.fill(0),
                Operation::TransferInPlace(buffer) => buffer.fill(0),
                Operation::DelayNs(_) => {}
            }
        }
        Ok(())
    }
}
