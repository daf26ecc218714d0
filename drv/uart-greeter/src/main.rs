//! Serial greeter for the NUCLEO-G031K8.
//!
//! Brings up USART2 (the ST-LINK virtual COM port), sends a greeting, and
//! then collects whatever the host sends into a fixed buffer from the receive
//! interrupt. The user LED comes on once anything has arrived.
//!
//! Everything `board.kdl` controls shows up here as constants in `config`.

#![no_std]
#![no_main]

mod clock;
mod gpio;
mod usart;

use cortex_m::peripheral::NVIC;
use cortex_m_rt::{entry, interrupt};
use drv_serial::boot::OptionBytes;
use drv_serial::{pins, service_rx, Monitor, RxBuffer, Serial, SerialConfig, TxMessage};
use stm32_metapac::Interrupt;
// `#[interrupt]` checks handler names against this.
use stm32_metapac::Interrupt as interrupt;
use {defmt_rtt as _, panic_probe as _};

use crate::usart::Stm32Usart;

/// Everything received from the host, in order. Only the USART2 handler
/// writes it. Unmangled so it can be found from the debugger.
#[no_mangle]
static RX: RxBuffer<{ config::RX_CAPACITY }> = RxBuffer::new();

static GREETING: TxMessage<{ config::TX_CAPACITY }> = TxMessage::new(config::GREETING);

const SERIAL: SerialConfig = match SerialConfig::new(config::CLOCK_HZ, config::BAUD_RATE) {
    Ok(c) => c,
    Err(_) => panic!("baud rate can't be made from the configured clock"),
};

#[entry]
fn main() -> ! {
    clock::start(config::BOOT.oscillator);
    defmt::info!("clock {=u32} Hz, serial {}", config::CLOCK_HZ, SERIAL);

    let optr = OptionBytes(stm32_metapac::FLASH.optr().read().0);
    if let Err(mismatch) = config::BOOT.verify(optr) {
        defmt::warn!("{} (OPTR {=u32:#010x})", mismatch, optr.0);
    }

    gpio::enable_ports();
    let mut led = gpio::Led::new(config::LED);
    let routed = pins::remap(&mut gpio::AltFunction, &config::PINS);

    usart::enable_usart2_clock();
    let mut serial = Serial::init(
        Stm32Usart::new(stm32_metapac::USART2),
        &SERIAL,
        routed,
        cortex_m::asm::delay,
    );

    // Safety: the handler only touches RX through its producer, and nothing
    // here depends on it staying masked.
    unsafe { NVIC::unmask(Interrupt::USART2) };

    let sent = serial.transmit(&GREETING);
    defmt::info!("sent greeting, {=usize} bytes", sent);

    let mut monitor = Monitor::new();
    loop {
        let Some(change) = monitor.poll(&RX, &mut led) else {
            continue;
        };
        if change.data_seen {
            defmt::info!("data available");
        }
        if change.dropped != 0 {
            defmt::warn!("buffer full, dropped {=u32}", change.dropped);
        }
        if change.rejected != 0 {
            defmt::warn!("rejected {=u32} corrupt", change.rejected);
        }
        if !change.errors.is_empty() {
            defmt::warn!("line errors {}", change.errors);
        }
    }
}

/// USART2 receive interrupt.
#[interrupt]
fn USART2() {
    let mut usart = Stm32Usart::new(stm32_metapac::USART2);
    // Safety: this is RX's only writer, and it can't preempt itself.
    let mut rx = unsafe { RX.producer() };
    // Every outcome is also counted in RX, for the main loop to report.
    let _ = service_rx(&mut usart, &mut rx);
}

include!(concat!(env!("OUT_DIR"), "/board_config.rs"));
