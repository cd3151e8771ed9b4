//! L3 packet-codec error kind. Distinct from [`crate::frame::FrameError`]
//! so a caller can tell "this datagram's header didn't even parse" apart
//! from "the header parsed but the frames inside didn't".

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum PacketError {
    #[error("not enough bytes to decode this packet")]
    NeedMoreData,
    #[error("fixed bit was not set")]
    FixedBitUnset,
    #[error("connection ID length exceeds 20 bytes")]
    CidTooLong,
    #[error("unsupported QUIC version")]
    UnsupportedVersion,
    #[error("Retry integrity tag did not verify")]
    BadRetryIntegrityTag,
    #[error("packet length field disagrees with remaining datagram bytes")]
    InconsistentLength,
    #[error("header protection or AEAD failed — drop this packet, not the connection")]
    AeadFailure,
    #[error("no installed keys for this encryption level")]
    NoKeysForLevel,
    #[error("codec: {0}")]
    Codec(crate::codec::CodecError),
}

impl From<crate::codec::CodecError> for PacketError {
    fn from(e: crate::codec::CodecError) -> Self {
        PacketError::Codec(e)
    }
}
