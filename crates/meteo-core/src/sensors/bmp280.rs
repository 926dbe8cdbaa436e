//! BMP280 barometric pressure sensor over 4-wire SPI.
//!
//! In SPI mode the register address travels in the first byte of every
//! transaction with bit 7 selecting the direction: set for reads
//! (auto-incrementing), cleared for writes. The `SpiDevice` owns chip-select
//! and keeps it asserted for the whole transaction.

use embedded_hal::spi::{Operation, SpiDevice};
use log::{debug, error, info};

use super::{Sensor, SensorError};
use crate::compensation::{
    CALIBRATION_LEN, CalibrationSet, CompensatedPressure, compensate, t_fine_from_celsius,
};
use crate::config::Bmp280Config;

const SENSOR: &str = "BMP280";

const REG_CALIB_00: u8 = 0x88;
const REG_CTRL_MEAS: u8 = 0xF4;
const REG_CONFIG: u8 = 0xF5;
const REG_PRESS_MSB: u8 = 0xF7;

const READ: u8 = 0x80;
const WRITE_MASK: u8 = 0x7F;

/// One compensated pressure sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressureReadings {
    /// The 20-bit ADC value the pressure was computed from.
    pub raw_adc: u32,
    pub pressure: CompensatedPressure,
}

/// Assemble the 20-bit pressure sample from `press_msb`, `press_lsb` and
/// `press_xlsb[7:4]`.
#[inline]
pub const fn raw_pressure_from_bytes(bytes: [u8; 3]) -> u32 {
    (bytes[0] as u32) << 12 | (bytes[1] as u32) << 4 | (bytes[2] as u32) >> 4
}

/// BMP280 driver holding the calibration it loaded at startup.
pub struct Bmp280Sensor<S> {
    spi: S,
    calibration: CalibrationSet,
    t_fine: i32,
}

impl<S: SpiDevice> Bmp280Sensor<S> {
    /// Load the calibration block and write the measurement configuration.
    ///
    /// This is the only way to build the driver, so compensation never runs
    /// without calibration.
    pub fn init(mut spi: S, config: Bmp280Config) -> Result<Self, SensorError> {
        let calibration = load_calibration(&mut spi)?;
        debug!("BMP280 calibration: {:?}", calibration);
        configure(&mut spi, &config)?;
        info!(
            "BMP280 configured (ctrl_meas={:#04x}, config={:#04x})",
            config.ctrl_meas(),
            config.config()
        );

        Ok(Self {
            spi,
            calibration,
            t_fine: 0,
        })
    }

    pub fn calibration(&self) -> &CalibrationSet {
        &self.calibration
    }

    /// Fine temperature term the next compensations run at.
    pub fn t_fine(&self) -> i32 {
        self.t_fine
    }

    pub fn set_t_fine(&mut self, t_fine: i32) {
        self.t_fine = t_fine;
    }

    /// Evaluate compensation at an ambient temperature in whole °C.
    pub fn set_reference_temperature(&mut self, celsius: i32) {
        self.t_fine = t_fine_from_celsius(celsius);
    }

    /// Read the raw 20-bit pressure sample.
    pub fn read_raw_pressure(&mut self) -> Result<u32, SensorError> {
        let mut bytes = [0u8; 3];
        read_registers(&mut self.spi, REG_PRESS_MSB, &mut bytes, "reading raw pressure")?;
        Ok(raw_pressure_from_bytes(bytes))
    }

    /// Read and compensate one pressure sample.
    pub fn measure(&mut self) -> Result<PressureReadings, SensorError> {
        let raw_adc = self.read_raw_pressure()?;
        let pressure = compensate(raw_adc, &self.calibration, self.t_fine);
        debug!(
            "BMP280 raw={} t_fine={} -> {}",
            raw_adc,
            self.t_fine,
            pressure.raw()
        );
        Ok(PressureReadings { raw_adc, pressure })
    }

    pub fn spi_mut(&mut self) -> &mut S {
        &mut self.spi
    }

    /// Release the SPI device.
    pub fn release(self) -> S {
        self.spi
    }
}

impl<S: SpiDevice> Sensor for Bmp280Sensor<S> {
    type Readings = PressureReadings;

    async fn read(&mut self) -> Result<PressureReadings, SensorError> {
        self.measure()
    }
}

/// Read the 24-byte calibration block in a single transaction.
pub fn load_calibration<S: SpiDevice>(spi: &mut S) -> Result<CalibrationSet, SensorError> {
    let mut block = [0u8; CALIBRATION_LEN];
    read_registers(spi, REG_CALIB_00, &mut block, "reading calibration")?;
    Ok(CalibrationSet::from_bytes(&block))
}

/// Write `ctrl_meas` then `config`, one transaction each.
pub fn configure<S: SpiDevice>(spi: &mut S, config: &Bmp280Config) -> Result<(), SensorError> {
    write_register(spi, REG_CTRL_MEAS, config.ctrl_meas(), "writing ctrl_meas")?;
    write_register(spi, REG_CONFIG, config.config(), "writing config")?;
    Ok(())
}

fn read_registers<S: SpiDevice>(
    spi: &mut S,
    start: u8,
    buffer: &mut [u8],
    operation: &'static str,
) -> Result<(), SensorError> {
    spi.transaction(&mut [Operation::Write(&[start | READ]), Operation::Read(buffer)])
        .map_err(|e| {
            error!("BMP280 SPI read at {:#04x} failed: {:?}", start, e);
            SensorError::Bus {
                sensor: SENSOR,
                operation,
            }
        })
}

fn write_register<S: SpiDevice>(
    spi: &mut S,
    register: u8,
    value: u8,
    operation: &'static str,
) -> Result<(), SensorError> {
    spi.write(&[register & WRITE_MASK, value]).map_err(|e| {
        error!("BMP280 SPI write to {:#04x} failed: {:?}", register, e);
        SensorError::Bus {
            sensor: SENSOR,
            operation,
        }
    })
}
