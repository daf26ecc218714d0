//! Interrupt-driven serial driver core.
//!
//! This is the part of the serial greeter that doesn't care which chip it
//! runs on. The firmware supplies the register-level pieces through the
//! [`driver::Usart`], [`pins::PinRemap`] and [`monitor::Indicator`] traits,
//! and this crate supplies the rest:
//!
//! - one-time peripheral initialization, which can only happen after the pins
//!   have been routed ([`pins::remap`] → [`driver::Serial::init`]),
//! - a blocking, polled transmit of a fixed message ([`tx::TxMessage`]),
//! - the receive interrupt body ([`driver::service_rx`]), which appends into
//!   a fixed-capacity buffer shared with the main loop ([`rx::RxBuffer`]),
//! - the main-loop state machine that lights an indicator once anything has
//!   been received ([`monitor::Monitor`]).
//!
//! There is exactly one writer (the interrupt) and one reader (the main loop)
//! of the receive buffer, and no lock. See the [`rx`] module for how that is
//! kept sound.

#![cfg_attr(not(test), no_std)]

pub mod baud;
pub mod boot;
pub mod driver;
pub mod monitor;
pub mod pins;
pub mod rx;
pub mod tx;

pub use driver::{service_rx, Serial, SerialConfig, Usart};
pub use monitor::{Indicator, LinkState, Monitor};
pub use rx::{LineErrors, RxBuffer, RxError};
pub use tx::TxMessage;
