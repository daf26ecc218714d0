//! Serial peripheral bring-up, polled transmit, and the receive interrupt
//! body.

use bitflags::bitflags;

use crate::baud::{self, BaudError};
use crate::pins::Routed;
use crate::rx::{LineErrors, Producer, RxError};
use crate::tx::TxMessage;

bitflags! {
    /// Peripheral interrupt sources.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct Interrupts: u8 {
        const RX = 1 << 0;
        const TX = 1 << 1;
    }
}

/// Register-level access to one serial peripheral.
///
/// Implementations should be thin: each method is meant to be one or two
/// register accesses. The sequencing lives in [`Serial`] and [`service_rx`].
pub trait Usart {
    /// Returns mode and status configuration to reset defaults: 8 data
    /// bits, no parity, one stop bit, line idle high, peripheral disabled.
    fn reset(&mut self);
    fn set_divisor(&mut self, divisor: u16);
    /// Clears any stale interrupt-pending flags, receive and transmit.
    fn clear_pending(&mut self);
    /// Enables exactly the given interrupt sources.
    fn set_interrupts(&mut self, enabled: Interrupts);
    /// Turns on the peripheral, its transmitter, and its receiver.
    fn enable(&mut self);

    /// True while the transmitter can't accept another byte.
    fn tx_full(&self) -> bool;
    fn write_tx(&mut self, byte: u8);

    /// True while a received byte is waiting to be read.
    fn rx_ready(&self) -> bool;
    /// Line errors flagged against the byte in the receive register.
    fn rx_errors(&self) -> LineErrors;
    /// Takes the waiting byte. Only meaningful after `rx_ready`.
    fn read_rx(&mut self) -> u8;
    /// Acknowledges the receive interrupt, clearing the pending flag and
    /// the given error flags.
    fn ack_rx(&mut self, errors: LineErrors);
}

/// Precomputed peripheral settings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub divisor: u16,
    /// CPU cycles to wait after enabling, before the first transmit.
    pub idle_cycles: u32,
}

impl SerialConfig {
    /// Derives settings for `baud_rate` when both the CPU and the peripheral
    /// run from `clock_hz`.
    pub const fn new(clock_hz: u32, baud_rate: u32) -> Result<Self, BaudError> {
        match baud::divisor(clock_hz, baud_rate) {
            Ok(divisor) => Ok(Self {
                baud_rate,
                divisor,
                idle_cycles: baud::idle_cycles(clock_hz, baud_rate),
            }),
            Err(e) => Err(e),
        }
    }
}

/// An initialized serial peripheral, owned by the main context.
#[derive(Debug)]
pub struct Serial<U> {
    usart: U,
}

impl<U: Usart> Serial<U> {
    /// Brings up the peripheral with the receive interrupt on and the
    /// transmit interrupt off, then holds the line idle for
    /// `config.idle_cycles` using `delay`.
    ///
    /// Call once. The `Routed` token shows the pins were remapped first.
    pub fn init(
        mut usart: U,
        config: &SerialConfig,
        _pins: Routed,
        delay: impl FnOnce(u32),
    ) -> Self {
        usart.reset();
        usart.set_divisor(config.divisor);
        usart.clear_pending();
        // Transmit is polled, so its interrupt stays off.
        usart.set_interrupts(Interrupts::RX);
        usart.enable();
        delay(config.idle_cycles);
        Self { usart }
    }

    /// Sends `byte`, first spinning until the transmitter has room.
    pub fn write_byte(&mut self, byte: u8) {
        while self.usart.tx_full() {
            // spin
        }
        self.usart.write_tx(byte);
    }

    pub fn write_all(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }

    /// Sends `message` up to its terminator and returns the byte count.
    /// Blocks until the last byte is handed to the peripheral.
    pub fn transmit<const N: usize>(&mut self, message: &TxMessage<N>) -> usize {
        let mut sent = 0;
        for b in message.iter() {
            self.write_byte(b);
            sent += 1;
        }
        sent
    }

    pub fn into_inner(self) -> U {
        self.usart
    }
}

/// Receive interrupt body: moves at most one byte from `usart` into `rx`.
///
/// Never blocks and does a bounded amount of work. Every outcome is also
/// recorded in the buffer, so callers in interrupt context can ignore the
/// result.
///
/// A byte flagged with parity, framing or noise errors is discarded. An
/// overrun is recorded, but the byte that did arrive is kept. If no byte is
/// waiting (the peripheral can raise the receive interrupt for an overrun
/// alone), the errors are recorded and acknowledged and the receive register
/// is not read.
pub fn service_rx<U: Usart, const N: usize>(
    usart: &mut U,
    rx: &mut Producer<'_, N>,
) -> Result<usize, RxError> {
    let errors = usart.rx_errors();
    if !usart.rx_ready() {
        rx.note(errors);
        usart.ack_rx(errors);
        return Err(RxError::Empty);
    }
    let byte = usart.read_rx();

    if errors.contains(LineErrors::OVERRUN) {
        rx.note(LineErrors::OVERRUN);
    }
    let corrupt = errors & LineErrors::CORRUPT;
    let result = if corrupt.is_empty() {
        rx.push(byte)
    } else {
        Err(rx.reject(corrupt))
    };

    usart.ack_rx(errors);
    result
}
