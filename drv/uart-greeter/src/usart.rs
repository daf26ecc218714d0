//! `Usart` for the STM32G0 USARTs, in their default (FIFO off) mode.

use drv_serial::driver::{Interrupts, Usart};
use drv_serial::rx::LineErrors;
use stm32_metapac::usart;

/// ICR bits 0-6: parity, framing, noise, overrun, idle, TX FIFO empty,
/// transmission complete.
const ICR_STALE: u32 = 0x7F;
/// RQR.RXFRQ: discard whatever is in RDR.
const RQR_RXFRQ: u32 = 1 << 3;

#[derive(Copy, Clone)]
pub struct Stm32Usart(usart::Usart);

impl Stm32Usart {
    pub fn new(regs: usart::Usart) -> Self {
        Self(regs)
    }
}

/// Turns on the USART2 bus clock (APBENR1.USART2EN).
pub fn enable_usart2_clock() {
    stm32_metapac::RCC.apbenr1().modify(|r| r.0 |= 1 << 17);
}

impl Usart for Stm32Usart {
    fn reset(&mut self) {
        // All-zero control registers are 8N1, 16x oversampling, disabled.
        self.0.cr1().write(|w| w.0 = 0);
        self.0.cr2().write(|w| w.0 = 0);
        self.0.cr3().write(|w| w.0 = 0);
    }

    fn set_divisor(&mut self, divisor: u16) {
        self.0.brr().write(|w| w.set_brr(divisor));
    }

    fn clear_pending(&mut self) {
        self.0.icr().write(|w| w.0 = ICR_STALE);
        self.0.rqr().write(|w| w.0 = RQR_RXFRQ);
    }

    fn set_interrupts(&mut self, enabled: Interrupts) {
        self.0.cr1().modify(|w| {
            w.set_rxneie(enabled.contains(Interrupts::RX));
            w.set_txeie(enabled.contains(Interrupts::TX));
        });
    }

    fn enable(&mut self) {
        self.0.cr1().modify(|w| {
            w.set_ue(true);
            w.set_te(true);
            w.set_re(true);
        });
    }

    fn tx_full(&self) -> bool {
        !self.0.isr().read().txe()
    }

    fn write_tx(&mut self, byte: u8) {
        self.0.tdr().write(|w| w.set_dr(u16::from(byte)));
    }

    fn rx_ready(&self) -> bool {
        self.0.isr().read().rxne()
    }

    fn rx_errors(&self) -> LineErrors {
        // PE, FE, NE and ORE are ISR bits 0-3, in the same order.
        LineErrors::from_bits_truncate(self.0.isr().read().0 as u8)
    }

    fn read_rx(&mut self) -> u8 {
        // Reading RDR also clears RXNE.
        self.0.rdr().read().dr() as u8
    }

    fn ack_rx(&mut self, errors: LineErrors) {
        if !errors.is_empty() {
            self.0.icr().write(|w| w.0 = u32::from(errors.bits()));
        }
    }
}
