//! Bounded read cursor over a received chunk

/// Forward-only view over a byte slice
///
/// Reads past the end are impossible: `peek` and `next_byte` return `None`,
/// `take` returns a shorter slice.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Unread bytes
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Next byte without consuming it
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume up to `n` bytes
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        let n = n.min(self.remaining());
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    /// Consume one byte
    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_is_clamped_to_remaining() {
        let mut cursor = ByteCursor::new(b"hello");
        assert_eq!(cursor.take(2), b"he");
        assert_eq!(cursor.remaining(), 3);
        assert_eq!(cursor.take(10), b"llo");
        assert!(cursor.is_empty());
        assert_eq!(cursor.take(1), b"");
    }

    #[test]
    fn peek_does_not_advance() {
        let mut cursor = ByteCursor::new(b"ab");
        assert_eq!(cursor.peek(), Some(b'a'));
        assert_eq!(cursor.next_byte(), Some(b'a'));
        assert_eq!(cursor.next_byte(), Some(b'b'));
        assert_eq!(cursor.next_byte(), None);
        assert_eq!(cursor.peek(), None);
    }
}
