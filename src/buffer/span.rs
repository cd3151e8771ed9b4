//! A Shared Span is a non-owning view over chunk-owned bytes, with a strong
//! handle keeping the chunk alive for the span's lifetime. Built directly
//! on `bytes::Bytes`, whose internal refcount already
//! gives us "freed on last clone drop" for free — no custom refcounting
//! needed, unlike the original's raw-pointer `BufferChunk` + `BufferSpan`
//! pair.

use bytes::Bytes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedSpan {
    bytes: Bytes,
}

impl SharedSpan {
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    pub fn from_static(data: &'static [u8]) -> Self {
        Self { bytes: Bytes::from_static(data) }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Non-owning sub-view; shares the same underlying allocation.
    pub fn slice(&self, range: std::ops::Range<usize>) -> SharedSpan {
        SharedSpan { bytes: self.bytes.slice(range) }
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl From<Vec<u8>> for SharedSpan {
    fn from(v: Vec<u8>) -> Self {
        Self { bytes: Bytes::from(v) }
    }
}

impl AsRef<[u8]> for SharedSpan {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_shares_allocation_and_outlives_parent() {
        let parent = SharedSpan::from(vec![1, 2, 3, 4, 5]);
        let child = parent.slice(1..3);
        drop(parent);
        assert_eq!(child.as_slice(), &[2, 3]);
    }
}
