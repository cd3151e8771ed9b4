//! Chunk pool: a lock-free freelist of fixed-size memory blocks, with a
//! fallback to the process allocator under contention. Grounded
//! on the original's `BufferChunk`/`BlockMemoryPool` pairing: the pool is
//! the strong root, a chunk holds only a weak handle back to it and falls
//! back to plain deallocation if the pool has already been torn down.

use std::sync::{Arc, Weak};

use bytes::BytesMut;
use crossbeam_queue::ArrayQueue;

use super::DEFAULT_CHUNK_SIZE;

/// Lock-free freelist of pre-sized chunks, shared by every connection on a
/// worker thread. `acquire` never blocks: on an empty or full queue it just
/// allocates/drops through the process allocator.
pub struct ChunkPool {
    chunk_size: usize,
    free: ArrayQueue<BytesMut>,
}

impl ChunkPool {
    pub fn new(chunk_size: usize, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            chunk_size,
            free: ArrayQueue::new(capacity.max(1)),
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn take(&self) -> BytesMut {
        match self.free.pop() {
            Some(mut buf) => {
                buf.clear();
                buf.resize(self.chunk_size, 0);
                buf
            }
            None => {
                let mut buf = BytesMut::with_capacity(self.chunk_size);
                buf.resize(self.chunk_size, 0);
                buf
            }
        }
    }

    fn give_back(&self, buf: BytesMut) {
        // ArrayQueue::push fails silently (returns Err) when full; that's
        // the intended "fall back to process allocator" behavior — the
        // chunk is simply dropped and its memory freed normally.
        let _ = self.free.push(buf);
    }
}

impl Default for ChunkPool {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            free: ArrayQueue::new(256),
        }
    }
}

/// Owns exactly one contiguous slab, sourced from a [`ChunkPool`]. On drop
/// the slab returns to the pool if it is still alive, otherwise it is freed
/// normally — the weak handle is what lets a pool die before its chunks.
pub struct BufferChunk {
    pool: Weak<ChunkPool>,
    data: Option<BytesMut>,
}

impl BufferChunk {
    pub fn from_pool(pool: &Arc<ChunkPool>) -> Self {
        Self {
            pool: Arc::downgrade(pool),
            data: Some(pool.take()),
        }
    }

    /// A chunk that owns its memory directly, with no pool to return to —
    /// used for oversized allocations the pool's fixed chunk size can't
    /// satisfy (e.g. a caller-supplied buffer larger than one chunk).
    pub fn standalone(size: usize) -> Self {
        let mut data = BytesMut::with_capacity(size);
        data.resize(size, 0);
        Self { pool: Weak::new(), data: Some(data) }
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }

    /// Freezes the chunk's bytes into a refcounted [`bytes::Bytes`] for use
    /// by a [`super::SharedSpan`]. This detaches the data from pool return —
    /// a frozen chunk's memory is reclaimed by the last `Bytes` clone
    /// dropping, not by this pool.
    pub fn freeze(mut self) -> bytes::Bytes {
        self.data.take().unwrap_or_default().freeze()
    }
}

impl Drop for BufferChunk {
    fn drop(&mut self) {
        if let (Some(data), Some(pool)) = (self.data.take(), self.pool.upgrade()) {
            pool.give_back(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_round_trips_through_pool() {
        let pool = ChunkPool::new(64, 4);
        let ptr_before = {
            let mut chunk = BufferChunk::from_pool(&pool);
            chunk.as_mut_slice()[0] = 0xAB;
            chunk.as_slice().as_ptr() as usize
        };
        // after drop, the underlying allocation should be reused rather
        // than re-allocated from the process allocator.
        let chunk2 = BufferChunk::from_pool(&pool);
        assert_eq!(chunk2.as_slice().as_ptr() as usize, ptr_before);
    }

    #[test]
    fn dead_pool_falls_back_to_direct_free() {
        let pool = ChunkPool::new(64, 4);
        let chunk = BufferChunk::from_pool(&pool);
        drop(pool);
        // must not panic even though the pool is gone.
        drop(chunk);
    }
}
