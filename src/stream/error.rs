//! L5 stream-engine error kind.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum StreamError {
    #[error("stream is already closed for this direction")]
    AlreadyClosed,
    #[error("data offset disagrees with a previously signaled final size")]
    FinalSizeMismatch,
    #[error("peer violated the stream data flow control limit")]
    FlowControlViolation,
    #[error("frame referenced a stream this endpoint never opened or accepted")]
    UnknownStream,
    #[error("peer is not allowed to open a stream with this id")]
    StreamLimitExceeded,
}
