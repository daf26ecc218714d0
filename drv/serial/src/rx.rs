//! Receive buffer shared between the receive interrupt and the main loop.
//!
//! The buffer is append-only and is never reset. The interrupt handler is the
//! only writer; it goes through a [`Producer`]. Everyone else gets `&RxBuffer`
//! and can only read.
//!
//! Soundness rests on three facts:
//!
//! - Every counter has exactly one writer, so plain atomic loads and stores
//!   are enough. (armv6-m has no read-modify-write atomics, so this is also
//!   the only option there.)
//! - A byte is stored _before_ the length that covers it is published with
//!   `Release`, and readers fetch the length with `Acquire`. Anything below
//!   the observed length is therefore initialized.
//! - Slots below the published length are never written again, so handing
//!   out a `&[u8]` over them can't race the producer, which only ever touches
//!   the slot at the current length.

use core::cell::UnsafeCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU8, AtomicUsize, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Line-level receive errors.
    ///
    /// The bit layout matches the low four bits of the STM32 USART `ISR` and
    /// `ICR` registers, so drivers for that family can convert directly.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct LineErrors: u8 {
        const PARITY = 1 << 0;
        const FRAMING = 1 << 1;
        const NOISE = 1 << 2;
        /// A byte arrived before the previous one was read, and was lost in
        /// the peripheral.
        const OVERRUN = 1 << 3;
    }
}

impl LineErrors {
    /// Errors that mean the byte currently in the receive register can't be
    /// trusted.
    pub const CORRUPT: Self = Self::PARITY.union(Self::FRAMING).union(Self::NOISE);
}

#[cfg(feature = "defmt")]
impl defmt::Format for LineErrors {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(f, "LineErrors({=u8:#06b})", self.bits())
    }
}

/// Why a received byte did not make it into the buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// The buffer was already full. The byte was discarded and counted in
    /// [`RxBuffer::dropped`].
    Overflow,
    /// The byte arrived with the given line errors. It was discarded and
    /// counted in [`RxBuffer::rejected`].
    Line(LineErrors),
    /// The interrupt ran with nothing in the receive register, e.g. for an
    /// overrun flagged after the last byte was already taken. Any flagged
    /// errors were recorded; nothing was stored.
    Empty,
}

impl fmt::Display for RxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow => f.write_str("receive buffer full, byte dropped"),
            Self::Line(e) => write!(f, "line error {:#06b}, byte rejected", e.bits()),
            Self::Empty => f.write_str("no byte waiting"),
        }
    }
}

/// Point-in-time copy of the buffer's counters.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStats {
    pub len: usize,
    pub dropped: u32,
    pub rejected: u32,
    pub errors: LineErrors,
}

/// Fixed-capacity, append-only receive buffer.
///
/// Intended to live in a `static` for the whole program: there is no process
/// exit on the target, so nothing ever tears it down.
pub struct RxBuffer<const N: usize> {
    data: UnsafeCell<[u8; N]>,
    len: AtomicUsize,
    dropped: AtomicU32,
    rejected: AtomicU32,
    errors: AtomicU8,
}

// Safety: all shared mutation goes through `Producer`, of which there is at
// most one (see `RxBuffer::producer`), and readers only see published slots.
unsafe impl<const N: usize> Sync for RxBuffer<N> {}

impl<const N: usize> RxBuffer<N> {
    pub const fn new() -> Self {
        Self {
            data: UnsafeCell::new([0; N]),
            len: AtomicUsize::new(0),
            dropped: AtomicU32::new(0),
            rejected: AtomicU32::new(0),
            errors: AtomicU8::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes received so far. Never exceeds `N`.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes received so far, in arrival order.
    pub fn as_slice(&self) -> &[u8] {
        let len = self.len();
        // Safety: slots below `len` were written before `len` was published
        // and are never written again (see module docs).
        unsafe { core::slice::from_raw_parts(self.data.get().cast::<u8>(), len) }
    }

    /// Bytes discarded because the buffer was full.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Bytes discarded because they arrived corrupted.
    pub fn rejected(&self) -> u32 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Every line error seen since startup. Bits are only ever added.
    pub fn line_errors(&self) -> LineErrors {
        LineErrors::from_bits_truncate(self.errors.load(Ordering::Relaxed))
    }

    pub fn stats(&self) -> RxStats {
        RxStats {
            len: self.len(),
            dropped: self.dropped(),
            rejected: self.rejected(),
            errors: self.line_errors(),
        }
    }

    /// Gets the write handle for this buffer.
    ///
    /// # Safety
    ///
    /// At most one `Producer` for a given buffer may be alive at a time, and
    /// it must not be used from two contexts at once. In firmware this is met
    /// by only calling this from the receive interrupt handler, which never
    /// preempts itself.
    pub unsafe fn producer(&self) -> Producer<'_, N> {
        Producer { buf: self }
    }
}

impl<const N: usize> Default for RxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for RxBuffer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxBuffer")
            .field("data", &self.as_slice())
            .field("capacity", &N)
            .field("dropped", &self.dropped())
            .field("rejected", &self.rejected())
            .field("errors", &self.line_errors())
            .finish()
    }
}

/// The single write handle of an [`RxBuffer`].
pub struct Producer<'a, const N: usize> {
    buf: &'a RxBuffer<N>,
}

impl<const N: usize> Producer<'_, N> {
    /// Appends `byte`, returning the new length.
    ///
    /// If the buffer is full the byte is discarded and counted instead.
    pub fn push(&mut self, byte: u8) -> Result<usize, RxError> {
        let buf = self.buf;
        // We're the only writer of `len`, so our own last store is current.
        let len = buf.len.load(Ordering::Relaxed);
        if len >= N {
            bump(&buf.dropped);
            return Err(RxError::Overflow);
        }
        // Safety: `len < N`, and the slot at `len` is not visible to readers
        // until the store below. Going through a raw pointer to the one slot
        // avoids asserting exclusive access to the slots readers can see.
        unsafe {
            buf.data.get().cast::<u8>().add(len).write(byte);
        }
        buf.len.store(len + 1, Ordering::Release);
        Ok(len + 1)
    }

    /// Records a byte that was discarded because of `errors`.
    pub fn reject(&mut self, errors: LineErrors) -> RxError {
        self.note(errors);
        bump(&self.buf.rejected);
        RxError::Line(errors)
    }

    /// Records line errors without discarding anything.
    pub fn note(&mut self, errors: LineErrors) {
        let cell = &self.buf.errors;
        cell.store(cell.load(Ordering::Relaxed) | errors.bits(), Ordering::Relaxed);
    }
}

fn bump(counter: &AtomicU32) {
    counter.store(counter.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let rx = RxBuffer::<20>::new();
        assert!(rx.is_empty());
        assert_eq!(rx.capacity(), 20);
        assert_eq!(rx.as_slice(), b"");
        assert_eq!(rx.stats(), RxStats::default());
    }

    #[test]
    fn every_prefix_up_to_capacity_is_kept_in_order() {
        for n in 0..=20 {
            let rx = RxBuffer::<20>::new();
            let input: Vec<u8> = (0..n as u8).map(|i| b'a' + i).collect();
            let mut p = unsafe { rx.producer() };
            for (i, &b) in input.iter().enumerate() {
                assert_eq!(p.push(b), Ok(i + 1));
                assert_eq!(rx.len(), i + 1);
            }
            assert_eq!(rx.as_slice(), &input[..]);
            assert_eq!(rx.dropped(), 0);
        }
    }

    #[test]
    fn overflow_drops_and_counts() {
        let rx = RxBuffer::<20>::new();
        let mut p = unsafe { rx.producer() };
        let mut overflowed = 0;
        for i in 0..25u8 {
            match p.push(i) {
                Ok(_) => {}
                Err(RxError::Overflow) => overflowed += 1,
                Err(e) => panic!("unexpected {e:?}"),
            }
        }
        assert_eq!(overflowed, 5);
        assert_eq!(rx.len(), 20);
        assert_eq!(rx.dropped(), 5);
        assert_eq!(rx.as_slice(), &(0..20).collect::<Vec<u8>>()[..]);
    }

    #[test]
    fn zero_capacity_drops_everything() {
        let rx = RxBuffer::<0>::new();
        let mut p = unsafe { rx.producer() };
        assert_eq!(p.push(1), Err(RxError::Overflow));
        assert_eq!(rx.len(), 0);
        assert_eq!(rx.dropped(), 1);
    }

    #[test]
    fn rejected_bytes_are_not_stored() {
        let rx = RxBuffer::<4>::new();
        let mut p = unsafe { rx.producer() };
        p.push(b'x').unwrap();
        assert_eq!(
            p.reject(LineErrors::FRAMING),
            RxError::Line(LineErrors::FRAMING),
        );
        p.reject(LineErrors::PARITY);
        assert_eq!(rx.as_slice(), b"x");
        assert_eq!(rx.rejected(), 2);
        assert_eq!(rx.line_errors(), LineErrors::FRAMING | LineErrors::PARITY);
    }

    #[test]
    fn noted_errors_accumulate() {
        let rx = RxBuffer::<4>::new();
        let mut p = unsafe { rx.producer() };
        p.note(LineErrors::OVERRUN);
        p.note(LineErrors::NOISE);
        assert_eq!(rx.line_errors(), LineErrors::OVERRUN | LineErrors::NOISE);
        assert_eq!(rx.rejected(), 0);
    }

    #[test]
    fn reader_sees_a_prefix_of_the_writer() {
        let rx = RxBuffer::<64>::new();
        let expected: Vec<u8> = (0..64).collect();
        std::thread::scope(|s| {
            s.spawn(|| {
                let mut p = unsafe { rx.producer() };
                for &b in &expected {
                    p.push(b).unwrap();
                }
            });
            loop {
                let seen = rx.as_slice();
                assert_eq!(seen, &expected[..seen.len()]);
                if seen.len() == expected.len() {
                    break;
                }
                std::thread::yield_now();
            }
        });
        assert_eq!(rx.dropped(), 0);
    }
}
