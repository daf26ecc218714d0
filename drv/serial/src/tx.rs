//! Fixed outbound message.

use core::fmt;

/// Marks the end of the message inside a [`TxMessage`].
pub const TERMINATOR: u8 = 0;

/// A message of fewer than `N` bytes, stored terminator-padded in a fixed
/// array.
///
/// Built once (normally in a `static`) and never modified. The terminator
/// byte can't appear inside the message, and there is always at least one
/// terminator after it.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct TxMessage<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> TxMessage<N> {
    /// Copies `text` into a new message.
    ///
    /// # Panics
    ///
    /// If `text` doesn't leave room for the terminator, or contains it. Use
    /// this in a `const` or `static` initializer and those become build
    /// errors.
    pub const fn new(text: &[u8]) -> Self {
        assert!(text.len() < N, "message does not fit with its terminator");
        let mut bytes = [TERMINATOR; N];
        let mut i = 0;
        while i < text.len() {
            assert!(text[i] != TERMINATOR, "message contains the terminator byte");
            bytes[i] = text[i];
            i += 1;
        }
        Self { bytes }
    }

    /// Number of bytes before the terminator.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.first().map_or(true, |&b| b == TERMINATOR)
    }

    pub fn as_bytes(&self) -> &[u8] {
        let end = self.bytes.iter()
            .position(|&b| b == TERMINATOR)
            .unwrap_or(N);
        &self.bytes[..end]
    }

    /// Bytes in send order, stopping at the terminator.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.bytes.iter().copied().take_while(|&b| b != TERMINATOR)
    }
}

impl<const N: usize> fmt::Debug for TxMessage<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TxMessage")
            .field(&format_args!("{}", self.as_bytes().escape_ascii()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREETING: TxMessage<20> = TxMessage::new(b"Microchip\r\n");

    #[test]
    fn greeting_stops_at_terminator() {
        assert_eq!(GREETING.len(), 11);
        assert_eq!(GREETING.as_bytes(), b"Microchip\r\n");
        assert_eq!(GREETING.iter().collect::<Vec<_>>(), b"Microchip\r\n".to_vec());
    }

    #[test]
    fn empty_message() {
        let m = TxMessage::<1>::new(b"");
        assert!(m.is_empty());
        assert_eq!(m.len(), 0);
        assert_eq!(m.iter().count(), 0);
    }

    #[test]
    fn longest_message_that_fits() {
        let m = TxMessage::<4>::new(b"abc");
        assert_eq!(m.as_bytes(), b"abc");
        assert!(!m.is_empty());
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn message_filling_capacity_is_refused() {
        let _ = TxMessage::<3>::new(b"abc");
    }

    #[test]
    #[should_panic(expected = "terminator byte")]
    fn embedded_terminator_is_refused() {
        let _ = TxMessage::<8>::new(b"ab\0cd");
    }

    #[test]
    fn debug_is_escaped() {
        assert_eq!(
            format!("{GREETING:?}"),
            r#"TxMessage(Microchip\r\n)"#,
        );
    }
}
