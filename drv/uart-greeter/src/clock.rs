//! System clock bring-up.

use drv_serial::boot::Oscillator;
use stm32_metapac::{
    self as device,
    flash::vals::Latency,
    rcc::vals::{Pllm, Plln, Pllp, Pllq, Pllr, Pllsrc, Sw},
};

/// Puts the system clock on `oscillator`. Call once, before any peripheral
/// that cares about its input clock.
///
/// The APB prescaler is left at its reset value of 1 and USART2 left on PCLK,
/// so the USART kernel clock is `oscillator.hz()` either way.
pub fn start(oscillator: Oscillator) {
    match oscillator {
        // Reset leaves us here already.
        Oscillator::Hsi16 => (),
        Oscillator::Hsi16Pll64 => pll_64mhz(),
    }
}

/// HSI16 x8 in the VCO (128 MHz), /2 on the R tap.
///
/// Frequencies above 16 MHz need voltage range 1, which is what the part
/// resets into.
fn pll_64mhz() {
    let flash = device::FLASH;
    let rcc = device::RCC;

    // Two wait states at 64 MHz. ACR has an undocumented reserved bit (18)
    // that must stay set for the debugger to keep working, so modify only.
    flash.acr().modify(|w| {
        w.set_prften(true);
        w.set_latency(Latency::WS2);
    });
    while flash.acr().read().latency() != Latency::WS2 {
        // spin
    }

    rcc.pllcfgr().modify(|w| {
        w.set_pllsrc(Pllsrc::HSI);
        w.set_pllm(Pllm::DIV1);
        w.set_plln(Plln::MUL8);
        // P and Q are set to legal values but stay off.
        w.set_pllr(Pllr::DIV2);
        w.set_pllp(Pllp::DIV2);
        w.set_pllq(Pllq::DIV2);
        w.set_pllren(true);
    });
    // CR is still at reset, with HSI16 on.
    rcc.cr().modify(|w| w.set_pllon(true));
    while !rcc.cr().read().pllrdy() {
        // spin
    }

    rcc.cfgr().write(|w| w.set_sw(Sw::PLL1_R));
    while rcc.cfgr().read().sws() != Sw::PLL1_R {
        // spin
    }
}
