//! Just enough GPIO for routing the USART and driving an LED.

use drv_serial::monitor::Indicator;
use drv_serial::pins::PinRemap;
use stm32_metapac::gpio::{vals::{Moder, Pupdr}, Gpio};

/// GPIO ports on the STM32G031. There is no port E.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Port {
    A,
    B,
    C,
    D,
    F,
}

fn get_port(port: Port) -> Gpio {
    match port {
        Port::A => stm32_metapac::GPIOA,
        Port::B => stm32_metapac::GPIOB,
        Port::C => stm32_metapac::GPIOC,
        Port::D => stm32_metapac::GPIOD,
        Port::F => stm32_metapac::GPIOF,
    }
}

/// Turns on the clocks to every port (IOPAEN through IOPDEN, and IOPFEN).
pub fn enable_ports() {
    stm32_metapac::RCC.gpioenr().modify(|r| r.0 |= 0b101111);
}

/// Connects USART signals to pins by switching them to an alternate
/// function.
pub struct AltFunction;

impl AltFunction {
    fn select(gpio: Gpio, pin: usize, af: u8) {
        // Set the AF before the mode, so the pin never briefly drives some
        // other function.
        gpio.afr(pin / 8).modify(|v| v.set_afr(pin % 8, af));
        gpio.moder().modify(|v| v.set_moder(pin, Moder::ALTERNATE));
    }
}

impl PinRemap for AltFunction {
    /// Port, pin number, alternate function.
    type Pin = (Port, u8, u8);

    fn route_rx(&mut self, (port, pin, af): Self::Pin) {
        let gpio = get_port(port);
        let pin = usize::from(pin & 0xF);
        // Hold the line at idle if nothing is connected.
        gpio.pupdr().modify(|v| v.set_pupdr(pin, Pupdr::PULLUP));
        Self::select(gpio, pin, af);
    }

    fn route_tx(&mut self, (port, pin, af): Self::Pin) {
        Self::select(get_port(port), usize::from(pin & 0xF), af);
    }
}

/// A push-pull output, active high.
pub struct Led {
    gpio: Gpio,
    pin: usize,
}

impl Led {
    /// Configures the pin as an output, driven low.
    pub fn new((port, pin): (Port, u8)) -> Self {
        let gpio = get_port(port);
        let pin = usize::from(pin & 0xF);
        gpio.bsrr().write(|v| v.set_br(pin, true));
        gpio.moder().modify(|v| v.set_moder(pin, Moder::OUTPUT));
        Self { gpio, pin }
    }
}

impl Indicator for Led {
    fn set(&mut self, on: bool) {
        let pin = self.pin;
        self.gpio.bsrr().write(|v| if on {
            v.set_bs(pin, true);
        } else {
            v.set_br(pin, true);
        });
    }
}
