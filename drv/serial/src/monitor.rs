//! Main-loop side of the receive path.
//!
//! The main loop calls [`Monitor::poll`] over and over. Each call reads the
//! receive buffer's counters once and, the first time anything has arrived,
//! turns on the indicator. It never blocks and never writes the buffer.

use crate::rx::{LineErrors, RxBuffer, RxStats};

/// A single on/off output, such as an LED.
pub trait Indicator {
    fn set(&mut self, on: bool);
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Nothing received yet.
    #[default]
    Idle,
    /// At least one byte has been received. There is no way back out.
    DataSeen,
}

/// What a poll noticed that the previous one didn't.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Change {
    /// This poll moved `Idle` → `DataSeen`.
    pub data_seen: bool,
    /// Bytes newly dropped for lack of space.
    pub dropped: u32,
    /// Bytes newly rejected as corrupt.
    pub rejected: u32,
    /// Line error kinds seen for the first time.
    pub errors: LineErrors,
}

#[derive(Debug, Default)]
pub struct Monitor {
    state: LinkState,
    last: RxStats,
}

impl Monitor {
    pub const fn new() -> Self {
        Self {
            state: LinkState::Idle,
            last: RxStats {
                len: 0,
                dropped: 0,
                rejected: 0,
                errors: LineErrors::empty(),
            },
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// The "data available" flag. Set once, never cleared.
    pub fn data_available(&self) -> bool {
        self.state == LinkState::DataSeen
    }

    /// One iteration of the poll loop.
    ///
    /// Returns `None` when nothing has changed since the last call, which is
    /// almost always.
    pub fn poll<const N: usize>(
        &mut self,
        rx: &RxBuffer<N>,
        indicator: &mut impl Indicator,
    ) -> Option<Change> {
        let now = rx.stats();
        let mut change = Change::default();

        if self.state == LinkState::Idle && now.len > 0 {
            self.state = LinkState::DataSeen;
            indicator.set(true);
            change.data_seen = true;
        }
        change.dropped = now.dropped.wrapping_sub(self.last.dropped);
        change.rejected = now.rejected.wrapping_sub(self.last.rejected);
        change.errors = now.errors.difference(self.last.errors);
        self.last = now;

        (change != Change::default()).then_some(change)
    }
}
