//! L4 frame-codec error kind.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum FrameError {
    #[error("not enough bytes to decode this frame")]
    NeedMoreData,
    #[error("unknown frame type {0:#x}")]
    UnknownType(u64),
    #[error("a STREAM id's role/direction bits disagree with local role")]
    BadStreamId,
    #[error("an ACK range underflowed below packet number zero")]
    AckRangeUnderflow,
    #[error("frame contents malformed for its declared length")]
    Malformed,
}
