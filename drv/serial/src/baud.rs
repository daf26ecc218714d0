//! Baud-rate arithmetic.
//!
//! Everything here is `const` so the firmware can precompute its divisor and
//! idle delay at build time.
//!
//! The divisor model is the STM32 USART with 16x oversampling: one bit lasts
//! `divisor` kernel clock cycles, and the divisor register is 16 bits wide
//! with a floor of 16.

use core::fmt;

/// Smallest divisor the peripheral accepts with 16x oversampling.
pub const MIN_DIVISOR: u32 = 16;
pub const MAX_DIVISOR: u32 = u16::MAX as u32;

/// Largest deviation from the requested rate we accept, in parts per
/// thousand. Asynchronous receivers start misreading somewhere past 2%.
pub const MAX_ERROR_PERMILLE: u32 = 20;

/// Start bit, eight data bits, stop bit.
pub const FRAME_BITS: u32 = 10;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BaudError {
    ZeroBaud,
    /// The divisor needed doesn't fit the register.
    DivisorOutOfRange(u32),
    /// The closest achievable rate is too far from the requested one.
    RateError { actual: u32, permille: u32 },
}

impl fmt::Display for BaudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroBaud => f.write_str("baud rate must be non-zero"),
            Self::DivisorOutOfRange(d) => write!(
                f,
                "divisor {d} outside {MIN_DIVISOR}..={MAX_DIVISOR}",
            ),
            Self::RateError { actual, permille } => write!(
                f,
                "closest rate {actual} is off by {permille}/1000",
            ),
        }
    }
}

/// Computes the divisor for `baud` from a `clock_hz` kernel clock, rounded to
/// nearest.
pub const fn divisor(clock_hz: u32, baud: u32) -> Result<u16, BaudError> {
    if baud == 0 {
        return Err(BaudError::ZeroBaud);
    }
    let d = ((clock_hz as u64 + baud as u64 / 2) / baud as u64) as u32;
    if d < MIN_DIVISOR || d > MAX_DIVISOR {
        return Err(BaudError::DivisorOutOfRange(d));
    }
    let actual = actual_rate(clock_hz, d as u16);
    let permille = error_permille(baud, actual);
    if permille > MAX_ERROR_PERMILLE {
        return Err(BaudError::RateError { actual, permille });
    }
    Ok(d as u16)
}

/// Rate the peripheral will actually run at with `divisor`.
pub const fn actual_rate(clock_hz: u32, divisor: u16) -> u32 {
    if divisor == 0 {
        return 0;
    }
    clock_hz / divisor as u32
}

/// Deviation of `actual` from `wanted`, in parts per thousand, rounded up.
pub const fn error_permille(wanted: u32, actual: u32) -> u32 {
    if wanted == 0 {
        return 0;
    }
    let diff = wanted.abs_diff(actual) as u64;
    ((diff * 1000 + wanted as u64 - 1) / wanted as u64) as u32
}

/// CPU cycles in one bit-period, rounded up.
pub const fn bit_cycles(cpu_hz: u32, baud: u32) -> u32 {
    if baud == 0 {
        return 0;
    }
    cpu_hz.div_ceil(baud)
}

/// CPU cycles to hold the line idle after enabling the transmitter, so the
/// far end doesn't mistake the rising edge at enable for part of a frame.
///
/// One full frame is used, which is comfortably more than the one
/// bit-period a receiver needs.
pub const fn idle_cycles(cpu_hz: u32, baud: u32) -> u32 {
    bit_cycles(cpu_hz, baud).saturating_mul(FRAME_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_rates() {
        assert_eq!(divisor(16_000_000, 9600), Ok(1667));
        assert_eq!(divisor(64_000_000, 9600), Ok(6667));
        assert_eq!(divisor(64_000_000, 115_200), Ok(556));
    }

    #[test]
    fn reference_rate_is_accurate() {
        let actual = actual_rate(16_000_000, 1667);
        assert_eq!(actual, 9598);
        assert_eq!(error_permille(9600, actual), 1);
    }

    #[test]
    fn zero_baud() {
        assert_eq!(divisor(16_000_000, 0), Err(BaudError::ZeroBaud));
    }

    #[test]
    fn divisor_too_small() {
        assert_eq!(
            divisor(16_000_000, 2_000_000),
            Err(BaudError::DivisorOutOfRange(8)),
        );
    }

    #[test]
    fn divisor_too_large() {
        assert_eq!(
            divisor(64_000_000, 300),
            Err(BaudError::DivisorOutOfRange(213_333)),
        );
    }

    #[test]
    fn coarse_divisor_is_refused() {
        // 46 kbaud rounds to /22 (1.2% off); 61 kbaud rounds to /16 (2.5%
        // off).
        assert_eq!(divisor(1_000_000, 46_000), Ok(22));
        assert_eq!(
            divisor(1_000_000, 61_000),
            Err(BaudError::RateError { actual: 62_500, permille: 25 }),
        );
    }

    #[test]
    fn idle_is_at_least_a_bit() {
        assert_eq!(bit_cycles(16_000_000, 9600), 1667);
        assert_eq!(idle_cycles(16_000_000, 9600), 16_670);
        assert!(idle_cycles(4_000_000, 9600) >= bit_cycles(4_000_000, 9600));
    }
}
