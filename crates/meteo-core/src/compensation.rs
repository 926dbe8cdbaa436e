//! BMP280 pressure compensation
//!
//! Converts a raw 20-bit pressure sample into pascals with the vendor's 64-bit
//! fixed-point formula. The arithmetic is reproduced step by step, including
//! truncating division and arithmetic shifts, because any deviation changes
//! the reported value.

use core::fmt;

/// Size in bytes of the calibration block read from the device.
pub const CALIBRATION_LEN: usize = 24;

/// Pressure trimming constants read once from the sensor's NVM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationSet {
    pub p1: u16,
    pub p2: i16,
    pub p3: i16,
    pub p4: i16,
    pub p5: i16,
    pub p6: i16,
    pub p7: i16,
    pub p8: i16,
    pub p9: i16,
}

impl CalibrationSet {
    /// Decode nine little-endian words from the start of the block.
    ///
    /// The trailing six bytes are not part of the pressure trimming set.
    pub fn from_bytes(block: &[u8; CALIBRATION_LEN]) -> Self {
        let word = |i: usize| [block[2 * i], block[2 * i + 1]];
        Self {
            p1: u16::from_le_bytes(word(0)),
            p2: i16::from_le_bytes(word(1)),
            p3: i16::from_le_bytes(word(2)),
            p4: i16::from_le_bytes(word(3)),
            p5: i16::from_le_bytes(word(4)),
            p6: i16::from_le_bytes(word(5)),
            p7: i16::from_le_bytes(word(6)),
            p8: i16::from_le_bytes(word(7)),
            p9: i16::from_le_bytes(word(8)),
        }
    }
}

/// Pressure in pascals as Q24.8 fixed point (`raw / 256` Pa).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompensatedPressure(pub i32);

impl CompensatedPressure {
    #[inline]
    pub const fn raw(&self) -> i32 {
        self.0
    }

    /// Whole pascals, truncated toward zero.
    #[inline]
    pub const fn pascals(&self) -> i32 {
        self.0 / 256
    }

    /// Whole pascals, rounded half away from zero.
    ///
    /// One pascal is a hundredth of a hectopascal, so this is exactly the
    /// precision the console line shows.
    #[inline]
    pub const fn rounded_pascals(&self) -> i32 {
        let magnitude = ((self.0 as i64).unsigned_abs() + 128) >> 8;
        if self.0 < 0 {
            -(magnitude as i32)
        } else {
            magnitude as i32
        }
    }

    #[inline]
    pub fn hectopascals(&self) -> f64 {
        f64::from(self.0) / 25_600.0
    }
}

impl fmt::Display for CompensatedPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pascals = self.rounded_pascals();
        let sign = if pascals < 0 { "-" } else { "" };
        let magnitude = pascals.unsigned_abs();
        write!(f, "{}{}.{:02} hPa", sign, magnitude / 100, magnitude % 100)
    }
}

/// Fine temperature term for a temperature in whole degrees Celsius.
///
/// `t_fine` carries temperature in units of 1/5120 °C.
#[inline]
pub const fn t_fine_from_celsius(celsius: i32) -> i32 {
    celsius.saturating_mul(5120)
}

/// Compensate a raw pressure sample.
///
/// Pure function of its inputs. Returns zero when the calibration makes the
/// divisor vanish (for example an all-zero calibration set).
pub fn compensate(raw_adc: u32, calibration: &CalibrationSet, t_fine: i32) -> CompensatedPressure {
    let p1 = i64::from(calibration.p1);
    let p2 = i64::from(calibration.p2);
    let p3 = i64::from(calibration.p3);
    let p4 = i64::from(calibration.p4);
    let p5 = i64::from(calibration.p5);
    let p6 = i64::from(calibration.p6);
    let p7 = i64::from(calibration.p7);
    let p8 = i64::from(calibration.p8);
    let p9 = i64::from(calibration.p9);

    let mut var1 = i64::from(t_fine).wrapping_sub(128_000);
    let mut var2 = var1.wrapping_mul(var1).wrapping_mul(p6);
    var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 17);
    var2 = var2.wrapping_add(p4 << 35);
    var1 = (var1.wrapping_mul(var1).wrapping_mul(p3) >> 8).wrapping_add(var1.wrapping_mul(p2) << 12);
    var1 = ((1_i64 << 47).wrapping_add(var1)).wrapping_mul(p1) >> 33;

    if var1 == 0 {
        return CompensatedPressure(0);
    }

    let mut p = 1_048_576_i64.wrapping_sub(i64::from(raw_adc));
    p = ((p << 31).wrapping_sub(var2)).wrapping_mul(3125).wrapping_div(var1);
    var1 = p9.wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
    var2 = p8.wrapping_mul(p) >> 19;
    p = (p.wrapping_add(var1).wrapping_add(var2) >> 8).wrapping_add(p7 << 4);

    CompensatedPressure(p as i32)
}
