//! Compile-time configuration for the station
//!
//! Everything here is fixed when the image is built. The defaults reproduce
//! the timings and register values the station has always run with.

use crate::retry::RetryPolicy;

/// Host start signal that wakes the DHT11.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartSignal {
    /// How long the host holds the line low (datasheet minimum is 18 ms).
    pub low_ms: u32,
    /// How long the host drives the line high before releasing it.
    pub high_us: u32,
}

impl StartSignal {
    pub const fn new(low_ms: u32, high_us: u32) -> Self {
        Self { low_ms, high_us }
    }

    /// The shortest sequence the sensor accepts: 18 ms low, 40 µs high.
    pub const MINIMAL: Self = Self::new(18, 40);
}

impl Default for StartSignal {
    fn default() -> Self {
        Self::new(20, 50)
    }
}

/// DHT11 protocol timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dht11Config {
    pub start: StartSignal,
    /// Deadline for every individual line transition.
    pub edge_timeout_us: u32,
    /// High pulses strictly longer than this encode a 1 bit.
    pub one_threshold_us: u32,
}

impl Default for Dht11Config {
    fn default() -> Self {
        Self {
            start: StartSignal::default(),
            edge_timeout_us: 1000,
            one_threshold_us: 50,
        }
    }
}

/// Oversampling factor for one BMP280 measurement channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Oversampling {
    Skipped = 0b000,
    X1 = 0b001,
    X2 = 0b010,
    X4 = 0b011,
    X8 = 0b100,
    X16 = 0b101,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerMode {
    Sleep = 0b00,
    Forced = 0b01,
    Normal = 0b11,
}

/// Inactive time between measurements in normal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Standby {
    Ms0_5 = 0b000,
    Ms62_5 = 0b001,
    Ms125 = 0b010,
    Ms250 = 0b011,
    Ms500 = 0b100,
    Ms1000 = 0b101,
    Ms2000 = 0b110,
    Ms4000 = 0b111,
}

/// IIR filter coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Filter {
    Off = 0b000,
    X2 = 0b001,
    X4 = 0b010,
    X8 = 0b011,
    X16 = 0b100,
}

/// BMP280 measurement setup written once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bmp280Config {
    pub temperature_oversampling: Oversampling,
    pub pressure_oversampling: Oversampling,
    pub mode: PowerMode,
    pub standby: Standby,
    pub filter: Filter,
}

impl Bmp280Config {
    /// Value for the `ctrl_meas` register (0xF4).
    pub const fn ctrl_meas(&self) -> u8 {
        (self.temperature_oversampling as u8) << 5
            | (self.pressure_oversampling as u8) << 2
            | self.mode as u8
    }

    /// Value for the `config` register (0xF5). 3-wire SPI stays disabled.
    pub const fn config(&self) -> u8 {
        (self.standby as u8) << 5 | (self.filter as u8) << 2
    }
}

impl Default for Bmp280Config {
    fn default() -> Self {
        Self {
            temperature_oversampling: Oversampling::X1,
            pressure_oversampling: Oversampling::X1,
            mode: PowerMode::Normal,
            standby: Standby::Ms1000,
            filter: Filter::Off,
        }
    }
}

/// Settings for the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub retry: RetryPolicy,
    /// Pause between the end of one cycle and the start of the next.
    pub cycle_period_ms: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            cycle_period_ms: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_register_values() {
        let config = Bmp280Config::default();
        assert_eq!(config.ctrl_meas(), 0x27);
        assert_eq!(config.config(), 0xA0);
    }

    #[test]
    fn test_register_field_packing() {
        let config = Bmp280Config {
            temperature_oversampling: Oversampling::X2,
            pressure_oversampling: Oversampling::X16,
            mode: PowerMode::Forced,
            standby: Standby::Ms62_5,
            filter: Filter::X4,
        };
        assert_eq!(config.ctrl_meas(), 0b010_101_01);
        assert_eq!(config.config(), 0b001_010_00);
    }

    #[test]
    fn test_default_start_signal_within_protocol_window() {
        let start = StartSignal::default();
        assert!((18..=20).contains(&start.low_ms));
        assert!((40..=50).contains(&start.high_us));
    }
}
