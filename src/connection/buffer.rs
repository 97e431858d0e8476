//! Growable input buffer with an explicit read cursor
//!
//! Bytes between `start` and the end of `data` are unconsumed input. Capacity
//! only grows; consumed bytes are reclaimed by moving the unconsumed tail to
//! the front before the next read.

use crate::{Error, Result};
use std::io::{self, Read};

/// Smallest free space offered to a single read
const MIN_READ: usize = 8192;

/// Result of one read attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// This many bytes were appended
    Read(usize),
    /// The peer closed the connection
    Eof,
    /// Nothing available right now
    WouldBlock,
}

/// Input buffer owned by one connection
#[derive(Debug, Default)]
pub struct InBuffer {
    data: Vec<u8>,
    start: usize,
}

impl InBuffer {
    /// Create an empty buffer with some initial capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            start: 0,
        }
    }

    /// Unconsumed bytes
    pub fn data(&self) -> &[u8] {
        &self.data[self.start..]
    }

    /// Number of unconsumed bytes
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    /// Whether there is no unconsumed input
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total allocated size
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Mark `n` bytes as consumed
    pub fn consume(&mut self, n: usize) {
        self.start = (self.start + n).min(self.data.len());
        if self.start == self.data.len() {
            self.data.clear();
            self.start = 0;
        }
    }

    /// Drop all input, keeping the allocation
    pub fn clear(&mut self) {
        self.data.clear();
        self.start = 0;
    }

    fn compact(&mut self) {
        if self.start > 0 {
            self.data.drain(..self.start);
            self.start = 0;
        }
    }

    /// Make room for at least `required` unconsumed bytes
    ///
    /// Allocation failure leaves the buffer and its contents untouched.
    pub fn reserve_total(&mut self, required: usize) -> Result<()> {
        self.compact();
        let additional = required.saturating_sub(self.data.len());
        self.data.try_reserve(additional).map_err(|_| {
            Error::OutOfMemory(format!(
                "cannot grow input buffer to {} bytes",
                required
            ))
        })
    }

    /// Read once from `src` into the free space, growing to hold `required`
    /// unconsumed bytes first
    pub fn fill_from<R: Read>(&mut self, src: &mut R, required: usize) -> Result<Fill> {
        self.reserve_total(required.max(self.data.len() + MIN_READ))?;

        let filled = self.data.len();
        let capacity = self.data.capacity();
        self.data.resize(capacity, 0);

        loop {
            match src.read(&mut self.data[filled..]) {
                Ok(0) => {
                    self.data.truncate(filled);
                    return Ok(Fill::Eof);
                }
                Ok(n) => {
                    self.data.truncate(filled + n);
                    return Ok(Fill::Read(n));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.data.truncate(filled);
                    return Ok(Fill::WouldBlock);
                }
                Err(e) => {
                    self.data.truncate(filled);
                    return Err(Error::Socket(format!(
                        "could not receive data from server: {}",
                        e
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct Chunks(Vec<io::Result<Vec<u8>>>);

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            match self.0.remove(0) {
                Ok(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Err(e) => Err(e),
            }
        }
    }

    #[test]
    fn test_fill_and_consume() {
        let mut buf = InBuffer::with_capacity(16);
        let mut src = Cursor::new(b"hello world".to_vec());

        assert_eq!(buf.fill_from(&mut src, 0).unwrap(), Fill::Read(11));
        assert_eq!(buf.data(), b"hello world");

        buf.consume(6);
        assert_eq!(buf.data(), b"world");
        assert_eq!(buf.len(), 5);

        assert_eq!(buf.fill_from(&mut src, 0).unwrap(), Fill::Eof);
        assert_eq!(buf.data(), b"world");

        buf.consume(5);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_grows_for_declared_length() {
        let mut buf = InBuffer::with_capacity(16);
        let before = buf.capacity();
        buf.reserve_total(1 << 20).unwrap();
        assert!(buf.capacity() >= 1 << 20);
        assert!(buf.capacity() > before);
    }

    #[test]
    fn test_capacity_never_shrinks() {
        let mut buf = InBuffer::with_capacity(16);
        buf.reserve_total(100_000).unwrap();
        let grown = buf.capacity();

        let mut src = Cursor::new(vec![7u8; 64]);
        buf.fill_from(&mut src, 0).unwrap();
        buf.consume(64);
        buf.clear();
        assert!(buf.capacity() >= grown);
    }

    #[test]
    fn test_would_block_and_interrupted() {
        let mut buf = InBuffer::default();
        let mut src = Chunks(vec![
            Err(io::Error::from(io::ErrorKind::Interrupted)),
            Ok(b"ab".to_vec()),
            Err(io::Error::from(io::ErrorKind::WouldBlock)),
        ]);

        assert_eq!(buf.fill_from(&mut src, 0).unwrap(), Fill::Read(2));
        assert_eq!(buf.fill_from(&mut src, 0).unwrap(), Fill::WouldBlock);
        assert_eq!(buf.data(), b"ab");
    }

    #[test]
    fn test_read_error() {
        let mut buf = InBuffer::default();
        let mut src = Chunks(vec![Err(io::Error::from(io::ErrorKind::ConnectionReset))]);
        assert!(matches!(
            buf.fill_from(&mut src, 0),
            Err(Error::Socket(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_absurd_reservation_fails_cleanly() {
        let mut buf = InBuffer::default();
        let mut src = Cursor::new(b"keep".to_vec());
        buf.fill_from(&mut src, 0).unwrap();

        let err = buf.reserve_total(usize::MAX).unwrap_err();
        assert!(matches!(err, Error::OutOfMemory(_)));
        assert_eq!(buf.data(), b"keep");
    }
}
