//! Boot-time option table.
//!
//! These are decided when the board is configured and consumed once at
//! reset. The serial driver only cares about the resulting clock frequency;
//! the rest is here so firmware can check that the part was flashed the way
//! the board config says.

use core::fmt;

use bitflags::bitflags;

/// Where the system clock comes from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "kebab-case"))]
pub enum Oscillator {
    /// The 16 MHz internal RC oscillator, as it comes out of reset.
    Hsi16,
    /// HSI16 through the PLL, x8 then /2.
    Hsi16Pll64,
}

impl Oscillator {
    pub const fn hz(self) -> u32 {
        match self {
            Self::Hsi16 => 16_000_000,
            Self::Hsi16Pll64 => 64_000_000,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "kebab-case"))]
pub enum Watchdog {
    /// Off unless software starts it.
    Software,
    /// Started by hardware at reset.
    Hardware,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "kebab-case"))]
pub enum ReadProtection {
    Level0,
    Level1,
    /// Permanent. Debug access is gone for good.
    Level2,
}

/// Where the debugger attaches.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "kebab-case"))]
pub enum DebugPort {
    /// Serial wire debug on PA13 (SWDIO) and PA14 (SWCLK). Those pins are
    /// off limits to the application.
    Swd,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "kebab-case"))]
pub struct BootOptions {
    pub oscillator: Oscillator,
    pub watchdog: Watchdog,
    pub brown_out: bool,
    pub read_protection: ReadProtection,
    pub debug_port: DebugPort,
}

impl BootOptions {
    pub const fn clock_hz(&self) -> u32 {
        self.oscillator.hz()
    }

    /// Compares the table against what's actually programmed.
    pub fn verify(&self, actual: OptionBytes) -> Result<(), BootMismatch> {
        let mut bad = BootMismatch::empty();
        bad.set(BootMismatch::WATCHDOG, actual.watchdog() != self.watchdog);
        bad.set(BootMismatch::BROWN_OUT, actual.brown_out() != self.brown_out);
        bad.set(
            BootMismatch::READ_PROTECTION,
            actual.read_protection() != self.read_protection,
        );
        if bad.is_empty() {
            Ok(())
        } else {
            Err(bad)
        }
    }
}

bitflags! {
    /// Options whose programmed value differs from the table.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct BootMismatch: u8 {
        const WATCHDOG = 1 << 0;
        const BROWN_OUT = 1 << 1;
        const READ_PROTECTION = 1 << 2;
    }
}

impl fmt::Display for BootMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("option bytes differ:")?;
        for (name, _) in self.iter_names() {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for BootMismatch {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "BootMismatch({=u8:#05b})", self.bits())
    }
}

/// The STM32G0 `FLASH_OPTR` word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OptionBytes(pub u32);

impl OptionBytes {
    const RDP_LEVEL0: u8 = 0xAA;
    const RDP_LEVEL2: u8 = 0xCC;
    const BOR_EN: u32 = 1 << 8;
    const IWDG_SW: u32 = 1 << 16;

    pub fn read_protection(self) -> ReadProtection {
        match self.0 as u8 {
            Self::RDP_LEVEL0 => ReadProtection::Level0,
            Self::RDP_LEVEL2 => ReadProtection::Level2,
            _ => ReadProtection::Level1,
        }
    }

    pub fn brown_out(self) -> bool {
        self.0 & Self::BOR_EN != 0
    }

    pub fn watchdog(self) -> Watchdog {
        if self.0 & Self::IWDG_SW != 0 {
            Watchdog::Software
        } else {
            Watchdog::Hardware
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: BootOptions = BootOptions {
        oscillator: Oscillator::Hsi16,
        watchdog: Watchdog::Software,
        brown_out: false,
        read_protection: ReadProtection::Level0,
        debug_port: DebugPort::Swd,
    };

    // Software watchdog, no brown-out reset, RDP level 0.
    const FLASHED: OptionBytes = OptionBytes(0x0001_00AA);

    #[test]
    fn clock() {
        assert_eq!(BOARD.clock_hz(), 16_000_000);
        assert_eq!(Oscillator::Hsi16Pll64.hz(), 64_000_000);
    }

    #[test]
    fn matching_option_bytes() {
        assert_eq!(FLASHED.read_protection(), ReadProtection::Level0);
        assert!(!FLASHED.brown_out());
        assert_eq!(FLASHED.watchdog(), Watchdog::Software);
        assert_eq!(BOARD.verify(FLASHED), Ok(()));
    }

    #[test]
    fn read_protection_levels() {
        assert_eq!(OptionBytes(0xCC).read_protection(), ReadProtection::Level2);
        assert_eq!(OptionBytes(0x00).read_protection(), ReadProtection::Level1);
        assert_eq!(OptionBytes(0xBB).read_protection(), ReadProtection::Level1);
    }

    #[test]
    fn mismatches_are_collected() {
        assert_eq!(
            BOARD.verify(OptionBytes(0x0000_01AA)),
            Err(BootMismatch::WATCHDOG | BootMismatch::BROWN_OUT),
        );
        let text = BootMismatch::WATCHDOG.union(BootMismatch::BROWN_OUT).to_string();
        assert_eq!(text, "option bytes differ: WATCHDOG BROWN_OUT");
    }
}
