//! L9 QPACK error kind.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum QpackError {
    #[error("not enough bytes to decode")]
    NeedMoreData,
    #[error("not enough free space to encode")]
    NoCapacity,
    #[error("malformed string literal or instruction")]
    Malformed,
    #[error("index referenced a static table entry beyond its fixed size")]
    InvalidStaticIndex,
    #[error("index referenced a dynamic table entry that was never inserted or was evicted")]
    InvalidDynamicIndex,
    #[error("entry is larger than the dynamic table's total capacity")]
    EntryTooLarge,
    #[error("dynamic table capacity update exceeds the peer-advertised maximum")]
    CapacityExceedsLimit,
    #[error("cannot evict an entry a header block still references")]
    EvictionOfReferencedEntry,
    #[error("required insert count decoding disagreed with the current table state")]
    BadRequiredInsertCount,
    #[error("a header block referenced insertions beyond what the encoder has sent")]
    DecoderBlocked,
    #[error("section acknowledgement or stream cancellation named a stream with no pending header block")]
    UnknownStream,
}

impl From<crate::codec::CodecError> for QpackError {
    fn from(e: crate::codec::CodecError) -> Self {
        match e {
            crate::codec::CodecError::NeedMoreData => QpackError::NeedMoreData,
            crate::codec::CodecError::NoCapacity => QpackError::NoCapacity,
            crate::codec::CodecError::ValueTooLarge | crate::codec::CodecError::InvalidHuffman => {
                QpackError::Malformed
            }
        }
    }
}
