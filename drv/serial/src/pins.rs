//! Routing the serial signals to physical pins.

/// Which pins carry the serial signals.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinMap<P> {
    pub rx: P,
    pub tx: P,
}

/// Binds physical pins to the serial peripheral's receive and transmit
/// functions.
pub trait PinRemap {
    type Pin: Copy;

    fn route_rx(&mut self, pin: Self::Pin);
    fn route_tx(&mut self, pin: Self::Pin);
}

/// Proof that the pins have been routed.
///
/// [`crate::driver::Serial::init`] requires one of these, which turns "remap
/// before enabling the peripheral" from a comment into a type error. The
/// hardware can't tell us if this was skipped; it would just put bits on the
/// wrong pins.
#[derive(Debug)]
#[must_use]
pub struct Routed(());

/// Routes RX, then TX, according to `map`.
pub fn remap<R: PinRemap>(remapper: &mut R, map: &PinMap<R::Pin>) -> Routed {
    remapper.route_rx(map.rx);
    remapper.route_tx(map.tx);
    Routed(())
}
