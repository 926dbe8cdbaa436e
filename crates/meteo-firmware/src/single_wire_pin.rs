//! Open-drain single-wire GPIO for ESP32-S3
//!
//! The DHT11 data line is shared: the host pulls it low for the start signal
//! and then lets the external pull-up and the sensor own it. This module drives
//! the pin through raw GPIO registers, switching the output driver on only
//! while the line is held low.
//!
//! The pad itself (input enable and pull-up) is configured through `esp_hal`
//! before a [`SingleWirePin`] takes over.

use core::convert::Infallible;
use core::ptr::{read_volatile, write_volatile};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

// ESP32-S3 GPIO register addresses for GPIO 0-31 (low bank)
const GPIO_OUT_W1TC_REG: u32 = 0x6000_400C; // Clear output bits
const GPIO_ENABLE_W1TS_REG: u32 = 0x6000_4020; // Enable output driver
const GPIO_ENABLE_W1TC_REG: u32 = 0x6000_4024; // Disable output driver (release)
const GPIO_IN_REG: u32 = 0x6000_403C; // Input levels

// ESP32-S3 GPIO register addresses for GPIO 32-48 (high bank)
const GPIO_OUT1_W1TC_REG: u32 = 0x6000_4018;
const GPIO_ENABLE1_W1TS_REG: u32 = 0x6000_4030;
const GPIO_ENABLE1_W1TC_REG: u32 = 0x6000_4034;
const GPIO_IN1_REG: u32 = 0x6000_4040;

// Output signal selection, one word per GPIO
const GPIO_FUNC0_OUT_SEL_CFG_REG: u32 = 0x6000_4554;
// Route the pad to the plain GPIO_OUT bit
const SIMPLE_GPIO_OUTPUT: u32 = 0x100;

struct Registers {
    out_clear: u32,
    enable_set: u32,
    enable_clear: u32,
    input: u32,
    bit: u32,
}

/// A GPIO that pulls the line low or releases it, and reads it back.
///
/// The const generic `PIN` parameter specifies the GPIO number (0-48 for ESP32-S3).
/// `set_high` never drives the line: it turns the output driver off so the
/// pull-up and the sensor decide the level.
///
/// # Example
/// ```ignore
/// let _pad = Input::new(peripherals.GPIO21, InputConfig::default().with_pull(Pull::Up));
/// let dht_pin = SingleWirePin::<21>::new();
/// ```
pub struct SingleWirePin<const PIN: u8> {
    _private: (),
}

impl<const PIN: u8> SingleWirePin<PIN> {
    /// Route the pad to the GPIO output register and release the line.
    ///
    /// The caller must keep the pad configured as an input with a pull-up and
    /// must not drive the same GPIO elsewhere.
    pub fn new() -> Self {
        let pin = Self { _private: () };
        let out_sel = GPIO_FUNC0_OUT_SEL_CFG_REG + 4 * PIN as u32;
        critical_section::with(|_| unsafe {
            write_volatile(out_sel as *mut u32, SIMPLE_GPIO_OUTPUT);
        });
        pin.release();
        pin
    }

    #[inline]
    const fn registers(&self) -> Registers {
        if PIN < 32 {
            Registers {
                out_clear: GPIO_OUT_W1TC_REG,
                enable_set: GPIO_ENABLE_W1TS_REG,
                enable_clear: GPIO_ENABLE_W1TC_REG,
                input: GPIO_IN_REG,
                bit: 1u32 << PIN,
            }
        } else {
            Registers {
                out_clear: GPIO_OUT1_W1TC_REG,
                enable_set: GPIO_ENABLE1_W1TS_REG,
                enable_clear: GPIO_ENABLE1_W1TC_REG,
                input: GPIO_IN1_REG,
                bit: 1u32 << (PIN - 32),
            }
        }
    }

    /// Drive the line low.
    pub fn pull_low(&self) {
        let regs = self.registers();
        critical_section::with(|_| unsafe {
            // Output latch first so enabling the driver never glitches high
            write_volatile(regs.out_clear as *mut u32, regs.bit);
            write_volatile(regs.enable_set as *mut u32, regs.bit);
        });
    }

    /// Stop driving the line.
    pub fn release(&self) {
        let regs = self.registers();
        critical_section::with(|_| unsafe {
            write_volatile(regs.enable_clear as *mut u32, regs.bit);
        });
    }

    /// Current level on the pad.
    #[inline]
    pub fn level(&self) -> bool {
        let regs = self.registers();
        unsafe { read_volatile(regs.input as *const u32) & regs.bit != 0 }
    }
}

impl<const PIN: u8> ErrorType for SingleWirePin<PIN> {
    type Error = Infallible;
}

impl<const PIN: u8> OutputPin for SingleWirePin<PIN> {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.pull_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.release();
        Ok(())
    }
}

impl<const PIN: u8> InputPin for SingleWirePin<PIN> {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level())
    }
}
