//! L8 HTTP/3 error kind.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum H3Error {
    #[error("not enough bytes buffered to decode this frame yet")]
    NeedMoreData,
    #[error("frame type is not permitted on this stream in this state")]
    FrameUnexpected,
    #[error("frame payload malformed for its declared length")]
    FrameError,
    #[error("control stream's first frame was not SETTINGS")]
    MissingSettings,
    #[error("a SETTINGS parameter repeats one already sent on this connection")]
    SettingsError,
    #[error("unidirectional stream type is unrecognized or payload is malformed")]
    StreamCreationError,
    #[error("a critical stream (control, QPACK encoder/decoder) was reset or closed")]
    ClosedCriticalStream,
    #[error("qpack: {0}")]
    Qpack(#[from] crate::qpack::QpackError),
}
