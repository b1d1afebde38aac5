//! Bounded response buffer

use std::sync::Arc;

use super::pool::Lease;
use crate::{Error, Result};

/// Owned byte region with a fixed granted capacity
///
/// `len() <= capacity()` always holds: writes that do not fit are rejected
/// whole with [`Error::BufferFull`]. Dropping the buffer returns its bytes to
/// the pool it came from.
#[derive(Debug)]
pub struct ResponseBuffer {
    data: Vec<u8>,
    capacity: usize,
    pool: Arc<str>,
    _lease: Option<Lease>,
}

impl ResponseBuffer {
    pub(crate) fn from_parts(
        data: Vec<u8>,
        capacity: usize,
        pool: Arc<str>,
        lease: Option<Lease>,
    ) -> Self {
        Self {
            data,
            capacity,
            pool,
            _lease: lease,
        }
    }

    /// Buffer on the system heap that belongs to no pool
    #[must_use]
    pub fn unpooled(capacity: usize) -> Self {
        Self::from_parts(Vec::with_capacity(capacity), capacity, Arc::from("unpooled"), None)
    }

    /// Granted capacity; the only valid bound for writes
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently stored
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes that can still be written
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.data.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// Name of the pool the buffer was granted from
    #[must_use]
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Append one byte
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferFull`] if the buffer is at capacity
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.is_full() {
            return Err(Error::BufferFull {
                capacity: self.capacity,
            });
        }
        self.data.push(byte);
        Ok(())
    }

    /// Append a slice, all or nothing
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferFull`] if `bytes` does not fit in the remaining space
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(Error::BufferFull {
                capacity: self.capacity,
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Forget the contents, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_beyond_capacity_are_rejected_whole() {
        let mut buf = ResponseBuffer::unpooled(4);
        buf.extend_from_slice(b"abc").unwrap();

        let err = buf.extend_from_slice(b"de").unwrap_err();
        assert!(matches!(err, Error::BufferFull { capacity: 4 }));
        assert_eq!(buf.as_slice(), b"abc");

        buf.push(b'd').unwrap();
        assert!(buf.is_full());
        assert!(buf.push(b'e').is_err());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn clear_restores_space() {
        let mut buf = ResponseBuffer::unpooled(2);
        buf.extend_from_slice(b"xy").unwrap();
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.remaining(), 2);
    }
}
