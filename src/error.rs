//! Crate-wide error types.
//!
//! Every layer gets its own `thiserror` enum so callers can match on the
//! failure mode that matters to them (drop-packet vs close-connection)
//! without string comparison. [`QuicheError`] is the top-level
//! union every public entry point returns.

use thiserror::Error;

/// Transport-level error codes, numeric values fixed by RFC 9000 §20.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum TransportErrorCode {
    NoError = 0x00,
    InternalError = 0x01,
    ConnectionRefused = 0x02,
    FlowControlError = 0x03,
    StreamLimitError = 0x04,
    StreamStateError = 0x05,
    FinalSizeError = 0x06,
    FrameEncodingError = 0x07,
    TransportParameterError = 0x08,
    ConnectionIdLimitError = 0x09,
    ProtocolViolation = 0x0a,
    InvalidToken = 0x0b,
    ApplicationError = 0x0c,
    CryptoBufferExceeded = 0x0d,
    KeyUpdateError = 0x0e,
    AeadLimitReached = 0x0f,
    NoViablePath = 0x10,
}

impl TransportErrorCode {
    pub const fn code(self) -> u64 {
        self as u64
    }
}

/// HTTP/3 error codes, RFC 9114 §8.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum H3ErrorCode {
    H3NoError = 0x0100,
    H3GeneralProtocolError = 0x0101,
    H3InternalError = 0x0102,
    H3StreamCreationError = 0x0103,
    H3ClosedCriticalStream = 0x0104,
    H3FrameUnexpected = 0x0105,
    H3FrameError = 0x0106,
    H3ExcessiveLoad = 0x0107,
    H3IdError = 0x0108,
    H3SettingsError = 0x0109,
    H3MissingSettings = 0x010a,
    H3RequestRejected = 0x010b,
    H3RequestCancelled = 0x010c,
    H3RequestIncomplete = 0x010d,
    H3MessageError = 0x010e,
    H3ConnectError = 0x010f,
    H3VersionFallback = 0x0110,
    QpackDecompressionFailed = 0x0200,
    QpackEncoderStreamError = 0x0201,
    QpackDecoderStreamError = 0x0202,
}

impl H3ErrorCode {
    pub const fn code(self) -> u64 {
        self as u64
    }
}

/// Top-level error returned by public entry points. Carries enough
/// structure that a [`crate::connection::Connection`] can decide whether to
/// drop a packet silently or close with a transport/application error.
#[derive(Debug, Error)]
pub enum QuicheError {
    #[error("buffer: {0}")]
    Buffer(#[from] crate::buffer::BufferError),

    #[error("codec: {0}")]
    Codec(#[from] crate::codec::CodecError),

    #[error("crypto: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),

    #[error("packet: {0}")]
    Packet(#[from] crate::packet::PacketError),

    #[error("frame: {0}")]
    Frame(#[from] crate::frame::FrameError),

    #[error("stream: {0}")]
    Stream(#[from] crate::stream::StreamError),

    #[error("connection: {0}")]
    Connection(#[from] crate::connection::TransportError),

    #[error("transport error {code:?}: {reason}")]
    Transport {
        code: TransportErrorCode,
        frame_type: Option<u64>,
        reason: String,
    },

    #[error("h3: {0}")]
    H3(#[from] crate::h3::H3Error),

    #[error("qpack: {0}")]
    Qpack(#[from] crate::qpack::QpackError),
}

impl QuicheError {
    pub fn transport(code: TransportErrorCode, reason: impl Into<String>) -> Self {
        QuicheError::Transport {
            code,
            frame_type: None,
            reason: reason.into(),
        }
    }

    pub fn transport_on_frame(
        code: TransportErrorCode,
        frame_type: u64,
        reason: impl Into<String>,
    ) -> Self {
        QuicheError::Transport {
            code,
            frame_type: Some(frame_type),
            reason: reason.into(),
        }
    }

    /// Whether this error should drop the offending packet only, as opposed
    /// to tearing down the whole connection.
    pub fn is_drop_only(&self) -> bool {
        matches!(self, QuicheError::Crypto(crate::crypto::CryptoError::AuthenticationFailed))
    }
}

pub type QuicheResult<T> = Result<T, QuicheError>;

pub(crate) fn require(cond: bool, code: TransportErrorCode, msg: impl Into<String>) -> QuicheResult<()> {
    if cond {
        Ok(())
    } else {
        Err(QuicheError::transport(code, msg))
    }
}
