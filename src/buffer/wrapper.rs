//! Encode/decode wrappers with commit-on-drop semantics: a scoped builder
//! that commits on explicit success, and a scoped decoder that rolls back
//! on drop unless `commit()` is called.
//!
//! Grounded on the original's `BufferEncodeWrapper`/`BufferDecodeWrapper`:
//! both stage movement against a shadow cursor and only touch the real
//! buffer position on flush. The Rust version makes the rollback-by-default
//! behavior explicit via `Drop` instead of a `flushed_` bool callers must
//! remember to check.

use super::SingleBlockBuffer;

/// Stages writes against a target buffer's writable span; advances the
/// buffer's write position on `flush()` or on drop if not already flushed.
pub struct EncodeWrapper<'a> {
    buffer: &'a mut SingleBlockBuffer,
    staged: usize,
    committed: bool,
}

impl<'a> EncodeWrapper<'a> {
    pub fn new(buffer: &'a mut SingleBlockBuffer) -> Self {
        Self { buffer, staged: 0, committed: false }
    }

    /// Writes into the staged region, returning `false` if it would not
    /// fit in the remaining writable span.
    pub fn write(&mut self, bytes: &[u8]) -> bool {
        let span = self.buffer.writable_span();
        if self.staged + bytes.len() > span.len() {
            return false;
        }
        span[self.staged..self.staged + bytes.len()].copy_from_slice(bytes);
        self.staged += bytes.len();
        true
    }

    pub fn staged_len(&self) -> usize {
        self.staged
    }

    /// Commits the staged writes by advancing the buffer's write position.
    /// Idempotent: calling twice only advances once.
    pub fn flush(&mut self) {
        if !self.committed {
            self.buffer.commit_staged(self.staged);
            self.committed = true;
        }
    }
}

impl Drop for EncodeWrapper<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Mirrors [`EncodeWrapper`] for reads: advances are recorded in a shadow
/// cursor and only applied to the buffer's real `read_pos` on `commit()`,
/// enabling "decode or roll back cleanly" semantics for incremental frame
/// decoding (a partially parsed frame at the end of a datagram must not
/// consume bytes it never actually used).
pub struct DecodeWrapper<'a> {
    buffer: &'a mut SingleBlockBuffer,
    cursor: usize,
}

impl<'a> DecodeWrapper<'a> {
    pub fn new(buffer: &'a mut SingleBlockBuffer) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn remaining(&self) -> &[u8] {
        &self.buffer.readable_span()[self.cursor..]
    }

    /// Reads `out.len()` bytes from the shadow cursor without touching the
    /// real buffer position yet.
    pub fn read(&mut self, out: &mut [u8]) -> bool {
        let remaining = self.remaining();
        if remaining.len() < out.len() {
            return false;
        }
        out.copy_from_slice(&remaining[..out.len()]);
        self.cursor += out.len();
        true
    }

    pub fn advance(&mut self, n: usize) -> bool {
        if self.remaining().len() < n {
            return false;
        }
        self.cursor += n;
        true
    }

    /// Applies the shadow cursor to the real buffer, consuming the wrapper.
    /// Without a call to `commit`, dropping the wrapper rolls back: the
    /// shadow cursor is simply discarded and `read_pos` never moves.
    pub fn commit(self) {
        // consuming `self` here is what makes rollback-by-default safe:
        // a wrapper that goes out of scope without calling commit can only
        // have done so via plain `Drop`, which touches nothing.
        let DecodeWrapper { buffer, cursor } = self;
        buffer.move_read(cursor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SingleBlockBuffer;

    #[test]
    fn encode_wrapper_commits_on_drop() {
        let mut buf = SingleBlockBuffer::with_capacity(16);
        {
            let mut enc = EncodeWrapper::new(&mut buf);
            assert!(enc.write(&[1, 2, 3]));
        }
        assert_eq!(buf.readable_span(), &[1, 2, 3]);
    }

    #[test]
    fn decode_wrapper_rolls_back_without_commit() {
        let mut buf = SingleBlockBuffer::with_capacity(16);
        buf.write(&[9, 9, 9]);
        {
            let mut dec = DecodeWrapper::new(&mut buf);
            let mut scratch = [0u8; 2];
            assert!(dec.read(&mut scratch));
            // dropped without commit
        }
        assert_eq!(buf.readable_len(), 3, "rollback must not consume bytes");
    }

    #[test]
    fn decode_wrapper_commits_explicitly() {
        let mut buf = SingleBlockBuffer::with_capacity(16);
        buf.write(&[9, 9, 9]);
        let mut dec = DecodeWrapper::new(&mut buf);
        let mut scratch = [0u8; 2];
        assert!(dec.read(&mut scratch));
        dec.commit();
        assert_eq!(buf.readable_len(), 1);
    }
}
