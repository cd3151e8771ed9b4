//! L0 — buffer machinery: chunk pool, single-block ring buffer, shared
//! spans, multi-block buffer, and encode/decode wrappers.

mod chunk;
mod multi;
mod span;
mod wrapper;

pub use chunk::{BufferChunk, ChunkPool};
pub use multi::MultiBlockBuffer;
pub use span::SharedSpan;
pub use wrapper::{DecodeWrapper, EncodeWrapper};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("write would exceed buffer capacity")]
    CapacityExceeded,
    #[error("read requested past writable data")]
    Underrun,
    #[error("attempted to consume a negative amount")]
    NegativeMove,
}

/// Default size of one pooled chunk. Matches the original's block-pool
/// default (a few network MTUs' worth), generous enough that a single
/// datagram almost never spans chunks.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// A fixed-window single-block buffer: `read_pos <= write_pos <= capacity`,
/// never torn. This is the base case, used directly for
/// per-level CRYPTO reassembly before a second chunk is needed.
#[derive(Debug)]
pub struct SingleBlockBuffer {
    data: bytes::BytesMut,
    read_pos: usize,
    write_pos: usize,
}

impl SingleBlockBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut data = bytes::BytesMut::with_capacity(capacity);
        data.resize(capacity, 0);
        Self { data, read_pos: 0, write_pos: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Copies as much of `bytes` as fits before `capacity`. Returns the
    /// number of bytes actually copied; never tears a partial copy across a
    /// caller-visible boundary (every byte written stays written).
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let free = self.capacity() - self.write_pos;
        let n = free.min(bytes.len());
        self.data[self.write_pos..self.write_pos + n].copy_from_slice(&bytes[..n]);
        self.write_pos += n;
        n
    }

    /// Copies readable bytes into `out` and advances `read_pos`.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek(out);
        self.read_pos += n;
        n
    }

    /// Copies readable bytes into `out` without advancing `read_pos`.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let readable = self.write_pos - self.read_pos;
        let n = readable.min(out.len());
        out[..n].copy_from_slice(&self.data[self.read_pos..self.read_pos + n]);
        n
    }

    /// Advances `read_pos` by a non-negative amount, clamped at `write_pos`.
    /// Negative movement is not part of this
    /// contract; roll back via a buffer clone instead.
    pub fn move_read(&mut self, n: usize) -> usize {
        let n = n.min(self.write_pos - self.read_pos);
        self.read_pos += n;
        n
    }

    /// Advances `write_pos` by a non-negative amount, clamped at capacity.
    /// Used by [`super::EncodeWrapper`] to commit bytes staged directly
    /// into the writable span via `writable_span()`.
    pub fn commit_staged(&mut self, n: usize) -> usize {
        let n = n.min(self.capacity() - self.write_pos);
        self.write_pos += n;
        n
    }

    pub fn readable_len(&self) -> usize {
        self.write_pos - self.read_pos
    }

    pub fn writable_len(&self) -> usize {
        self.capacity() - self.write_pos
    }

    pub fn readable_span(&self) -> &[u8] {
        &self.data[self.read_pos..self.write_pos]
    }

    pub fn writable_span(&mut self) -> &mut [u8] {
        &mut self.data[self.write_pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_past_capacity_is_clamped_without_corruption() {
        let mut buf = SingleBlockBuffer::with_capacity(4);
        let n = buf.write(b"abcdef");
        assert_eq!(n, 4);
        assert_eq!(buf.readable_span(), b"abcd");
    }

    #[test]
    fn read_advances_and_peek_does_not() {
        let mut buf = SingleBlockBuffer::with_capacity(8);
        buf.write(b"hello");
        let mut scratch = [0u8; 3];
        assert_eq!(buf.peek(&mut scratch), 3);
        assert_eq!(&scratch, b"hel");
        assert_eq!(buf.readable_len(), 5, "peek must not advance read_pos");
        assert_eq!(buf.read(&mut scratch), 3);
        assert_eq!(buf.readable_len(), 2);
    }
}
