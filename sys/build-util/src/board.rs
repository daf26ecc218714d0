//! Typed board configuration, its checks, and the Rust it turns into.

use std::fmt;
use std::io::Write;

use drv_serial::boot::{BootOptions, DebugPort, Watchdog};
use drv_serial::driver::SerialConfig;
use drv_serial::tx::TERMINATOR;
use miette::{bail, miette, Context as _, IntoDiagnostic as _};
use serde::Deserialize;

/// Capacity of the receive and transmit buffers unless the board says
/// otherwise.
pub const DEFAULT_CAPACITY: usize = 20;

/// Highest alternate function number on the STM32G0 (AF0-7).
pub const MAX_AF: u8 = 7;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BoardConfig {
    pub boot: BootOptions,
    pub serial: SerialSection,
    pub pins: PinsSection,
    /// Output lit once data has been received.
    pub led: PinName,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SerialSection {
    pub baud_rate: u32,
    #[serde(default = "default_capacity")]
    pub rx_capacity: usize,
    #[serde(default = "default_capacity")]
    pub tx_capacity: usize,
    pub greeting: String,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinsSection {
    pub rx: PinAf,
    pub tx: PinAf,
}

/// A pin and the alternate function that connects it to the USART.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinAf {
    pub name: PinName,
    pub af: u8,
}

/// GPIO ports present on the STM32G031.
pub const PORTS: &str = "ABCDF";

/// A GPIO pin written the way the datasheet does, e.g. `A3`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct PinName {
    pub port: char,
    pub pin: u8,
}

impl TryFrom<String> for PinName {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl std::str::FromStr for PinName {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let mut chars = name.chars();
        let port = chars
            .next()
            .filter(|c| PORTS.contains(*c))
            .ok_or_else(|| {
                format!("pin `{name}` should start with a port letter, one of {PORTS}")
            })?;
        let pin = chars
            .as_str()
            .parse::<u8>()
            .ok()
            .filter(|&p| p < 16)
            .ok_or_else(|| format!("pin `{name}` should end with a pin number 0-15"))?;
        Ok(Self { port, pin })
    }
}

impl fmt::Display for PinName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}{}", self.port, self.pin)
    }
}

/// Pins the SWD debug port occupies.
const SWD_PINS: [PinName; 2] = [
    PinName { port: 'A', pin: 13 },
    PinName { port: 'A', pin: 14 },
];

impl BoardConfig {
    /// Parses and checks a board config document.
    pub fn parse(text: &str) -> miette::Result<Self> {
        let doc: kdl::KdlDocument = text.parse()?;
        let json = crate::embed::doc_to_json(&doc)?;
        let config: Self = serde_json::from_value(json)
            .into_diagnostic()
            .wrap_err("board config has the wrong shape")?;
        config.validate()?;
        Ok(config)
    }

    pub fn clock_hz(&self) -> u32 {
        self.boot.clock_hz()
    }

    /// Checks everything the firmware would otherwise find out the hard way.
    pub fn validate(&self) -> miette::Result<()> {
        let serial = &self.serial;

        SerialConfig::new(self.clock_hz(), serial.baud_rate).map_err(|e| miette!(
            help = "pick a standard rate, or a faster boot.oscillator",
            "serial.baud-rate {} can't be made from a {} Hz clock: {e}",
            serial.baud_rate, self.clock_hz(),
        ))?;

        if serial.rx_capacity == 0 {
            bail!("serial.rx-capacity must be at least 1");
        }
        let greeting = serial.greeting.as_bytes();
        if greeting.contains(&TERMINATOR) {
            bail!("serial.greeting can't contain a NUL byte; it marks the end of the message");
        }
        if greeting.len() >= serial.tx_capacity {
            bail!(
                help = format!("raise serial.tx-capacity to at least {}", greeting.len() + 1),
                "serial.greeting is {} bytes, which leaves no room for the terminator in a {}-byte buffer",
                greeting.len(), serial.tx_capacity,
            );
        }

        for (what, p) in [("rx", &self.pins.rx), ("tx", &self.pins.tx)] {
            if p.af > MAX_AF {
                bail!("pins.{what} uses AF{}, but this part only has AF0-{MAX_AF}", p.af);
            }
        }

        let used = [
            ("pins.rx", self.pins.rx.name),
            ("pins.tx", self.pins.tx.name),
            ("led", self.led),
        ];
        for (i, (a, pa)) in used.iter().enumerate() {
            for (b, pb) in &used[i + 1..] {
                if pa == pb {
                    bail!("{a} and {b} are both {pa}");
                }
            }
            if self.boot.debug_port == DebugPort::Swd && SWD_PINS.contains(pa) {
                bail!(
                    help = "PA13 and PA14 carry SWDIO and SWCLK",
                    "{a} can't use {pa} while boot.debug-port is \"swd\"",
                );
            }
        }

        if self.boot.watchdog == Watchdog::Hardware {
            bail!(
                help = "set boot.watchdog to \"software\"",
                "a hardware watchdog would reset the board; this firmware never services it",
            );
        }

        Ok(())
    }

    /// Writes the `config` module the firmware includes.
    pub fn write_config_module(&self, out: &mut impl Write) -> std::io::Result<()> {
        let boot = &self.boot;
        let serial = &self.serial;

        writeln!(out, "pub(crate) mod config {{")?;
        writeln!(out, "use crate::gpio::Port;")?;
        writeln!(out, "use drv_serial::boot;")?;
        writeln!(out, "use drv_serial::pins::PinMap;")?;
        writeln!(out)?;
        writeln!(out, "pub const BOOT: boot::BootOptions = boot::BootOptions {{")?;
        writeln!(out, "    oscillator: boot::Oscillator::{:?},", boot.oscillator)?;
        writeln!(out, "    watchdog: boot::Watchdog::{:?},", boot.watchdog)?;
        writeln!(out, "    brown_out: {},", boot.brown_out)?;
        writeln!(out, "    read_protection: boot::ReadProtection::{:?},", boot.read_protection)?;
        writeln!(out, "    debug_port: boot::DebugPort::{:?},", boot.debug_port)?;
        writeln!(out, "}};")?;
        writeln!(out, "pub const CLOCK_HZ: u32 = {};", self.clock_hz())?;
        writeln!(out, "pub const BAUD_RATE: u32 = {};", serial.baud_rate)?;
        writeln!(out, "pub const RX_CAPACITY: usize = {};", serial.rx_capacity)?;
        writeln!(out, "pub const TX_CAPACITY: usize = {};", serial.tx_capacity)?;
        writeln!(out, "pub const GREETING: &[u8] = &{:?};", serial.greeting.as_bytes())?;
        writeln!(out, "pub const PINS: PinMap<(Port, u8, u8)> = PinMap {{")?;
        for (what, p) in [("rx", &self.pins.rx), ("tx", &self.pins.tx)] {
            writeln!(out, "    {what}: (Port::{}, {}, {}),", p.name.port, p.name.pin, p.af)?;
        }
        writeln!(out, "}};")?;
        writeln!(out, "pub const LED: (Port, u8) = (Port::{}, {});", self.led.port, self.led.pin)?;
        writeln!(out, "}}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_serial::boot::Oscillator;

    const NUCLEO: &str = r#"
        boot {
            oscillator "hsi16"
            watchdog "software"
            brown-out false
            read-protection "level0"
            debug-port "swd"
        }
        serial {
            baud-rate 9600
            greeting "Microchip\r\n"
        }
        pins {
            rx name="A3" af=1
            tx name="A2" af=1
        }
        led "C6"
    "#;

    fn parse(text: &str) -> miette::Result<BoardConfig> {
        BoardConfig::parse(text).map_err(|e| e.with_source_code(text.to_string()))
    }

    fn nucleo_with(from: &str, to: &str) -> String {
        assert!(NUCLEO.contains(from), "test bug: {from} not in NUCLEO");
        NUCLEO.replace(from, to)
    }

    fn error_text(text: &str) -> String {
        let e = parse(text).unwrap_err();
        let mut s = e.to_string();
        if let Some(help) = e.help() {
            s.push_str(&format!(" / {help}"));
        }
        s
    }

    #[test]
    fn reference_board() {
        let config = parse(NUCLEO).unwrap();
        assert_eq!(config.boot.oscillator, Oscillator::Hsi16);
        assert_eq!(config.clock_hz(), 16_000_000);
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.rx_capacity, DEFAULT_CAPACITY);
        assert_eq!(config.serial.tx_capacity, DEFAULT_CAPACITY);
        assert_eq!(config.serial.greeting, "Microchip\r\n");
        assert_eq!(config.pins.rx.name, PinName { port: 'A', pin: 3 });
        assert_eq!(config.pins.tx.af, 1);
        assert_eq!(config.led.to_string(), "PC6");
    }

    #[test]
    fn capacities_can_be_overridden() {
        let config = parse(&nucleo_with(
            "baud-rate 9600",
            "baud-rate 9600\nrx-capacity 64\ntx-capacity 32",
        )).unwrap();
        assert_eq!(config.serial.rx_capacity, 64);
        assert_eq!(config.serial.tx_capacity, 32);
    }

    #[test]
    fn pin_names() {
        assert_eq!("B15".parse(), Ok(PinName { port: 'B', pin: 15 }));
        assert!("G1".parse::<PinName>().is_err());
        assert!("E1".parse::<PinName>().is_err());
        assert!("A16".parse::<PinName>().is_err());
        assert!("A".parse::<PinName>().is_err());
        assert!("".parse::<PinName>().is_err());
    }

    #[test]
    fn bad_pin_name_fails_to_load() {
        let e = error_text(&nucleo_with(r#"led "C6""#, r#"led "Z9""#));
        assert!(e.contains("wrong shape"), "{e}");
    }

    #[test]
    fn unknown_keys_are_refused() {
        assert!(parse(&nucleo_with("baud-rate 9600", "baud-rate 9600\nparity \"even\"")).is_err());
    }

    #[test]
    fn unreachable_baud_rate() {
        let e = error_text(&nucleo_with("baud-rate 9600", "baud-rate 3000000"));
        assert!(e.contains("serial.baud-rate 3000000"), "{e}");
    }

    #[test]
    fn faster_clock_reaches_higher_rates() {
        let text = nucleo_with(r#"oscillator "hsi16""#, r#"oscillator "hsi16-pll64""#)
            .replace("baud-rate 9600", "baud-rate 2000000");
        assert_eq!(parse(&text).unwrap().clock_hz(), 64_000_000);
    }

    #[test]
    fn greeting_must_leave_room_for_terminator() {
        let long = "x".repeat(DEFAULT_CAPACITY);
        let e = error_text(&nucleo_with(r#""Microchip\r\n""#, &format!("{long:?}")));
        assert!(e.contains("no room for the terminator"), "{e}");
        assert!(e.contains("at least 21"), "{e}");

        let fits = "x".repeat(DEFAULT_CAPACITY - 1);
        parse(&nucleo_with(r#""Microchip\r\n""#, &format!("{fits:?}"))).unwrap();
    }

    #[test]
    fn greeting_cannot_contain_nul() {
        let e = error_text(&nucleo_with(r#""Microchip\r\n""#, r#""a\u{0}b""#));
        assert!(e.contains("NUL"), "{e}");
    }

    #[test]
    fn alternate_function_range() {
        let e = error_text(&nucleo_with(r#"rx name="A3" af=1"#, r#"rx name="A3" af=8"#));
        assert!(e.contains("AF8"), "{e}");
    }

    #[test]
    fn pins_must_be_distinct() {
        let e = error_text(&nucleo_with(r#"led "C6""#, r#"led "A2""#));
        assert_eq!(e, "pins.tx and led are both PA2");
    }

    #[test]
    fn swd_pins_are_reserved() {
        let e = error_text(&nucleo_with(r#"led "C6""#, r#"led "A13""#));
        assert!(e.contains("led can't use PA13"), "{e}");
    }

    #[test]
    fn hardware_watchdog_is_refused() {
        let e = error_text(&nucleo_with(r#"watchdog "software""#, r#"watchdog "hardware""#));
        assert!(e.contains("never services it"), "{e}");
    }

    #[test]
    fn generated_module() {
        let mut out = Vec::new();
        parse(NUCLEO).unwrap().write_config_module(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        for line in [
            "    oscillator: boot::Oscillator::Hsi16,",
            "    read_protection: boot::ReadProtection::Level0,",
            "pub const CLOCK_HZ: u32 = 16000000;",
            "pub const BAUD_RATE: u32 = 9600;",
            "pub const RX_CAPACITY: usize = 20;",
            "pub const GREETING: &[u8] = &[77, 105, 99, 114, 111, 99, 104, 105, 112, 13, 10];",
            "    rx: (Port::A, 3, 1),",
            "    tx: (Port::A, 2, 1),",
            "pub const LED: (Port, u8) = (Port::C, 6);",
        ] {
            assert!(text.lines().any(|l| l == line), "missing {line:?} in:\n{text}");
        }
        assert!(text.starts_with("pub(crate) mod config {"));
        assert!(text.ends_with("}\n"));
    }
}
