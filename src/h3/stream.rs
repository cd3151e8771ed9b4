//! RFC 9114 §6: unidirectional stream type preambles, and the control
//! stream's SETTINGS-first policy. Every unidirectional stream opens with a
//! one-varint type preamble before any frames; unrecognized types (future
//! extensions or deliberate greasing, RFC 9114 §7.2.9) must be tolerated —
//! this endpoint just stops interpreting the stream rather than closing the
//! connection over it.

use bytes::Buf;

use crate::codec::VarInt;

use super::error::H3Error;
use super::frame::H3Frame;

pub mod stream_type {
    pub const CONTROL: u64 = 0x00;
    pub const PUSH: u64 = 0x01;
    pub const QPACK_ENCODER: u64 = 0x02;
    pub const QPACK_DECODER: u64 = 0x03;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniStreamType {
    Control,
    Push,
    QpackEncoder,
    QpackDecoder,
    Unknown(u64),
}

/// Decodes the one-varint stream-type preamble. Like [`super::frame::decode_one`],
/// `H3Error::NeedMoreData` means "try again once more bytes arrive", not a
/// protocol violation.
pub fn decode_preamble(buf: &[u8]) -> Result<(UniStreamType, usize), H3Error> {
    let mut cursor = buf;
    let ty = VarInt::decode(&mut cursor).map_err(|_| H3Error::NeedMoreData)?.into_inner();
    let consumed = buf.len() - cursor.remaining();
    let kind = match ty {
        stream_type::CONTROL => UniStreamType::Control,
        stream_type::PUSH => UniStreamType::Push,
        stream_type::QPACK_ENCODER => UniStreamType::QpackEncoder,
        stream_type::QPACK_DECODER => UniStreamType::QpackDecoder,
        other => UniStreamType::Unknown(other),
    };
    Ok((kind, consumed))
}

/// RFC 9114 §7.2.4: the first frame on either side's control stream must be
/// SETTINGS, and exactly one SETTINGS frame is permitted for the lifetime
/// of the stream.
#[derive(Debug, Default)]
pub struct ControlStreamPolicy {
    settings_received: bool,
}

impl ControlStreamPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_frame(&mut self, frame: &H3Frame) -> Result<(), H3Error> {
        if !self.settings_received {
            return match frame {
                H3Frame::Settings(_) => {
                    self.settings_received = true;
                    Ok(())
                }
                _ => Err(H3Error::MissingSettings),
            };
        }
        match frame {
            H3Frame::Settings(_) => Err(H3Error::FrameUnexpected),
            H3Frame::Data(_) | H3Frame::Headers(_) | H3Frame::PushPromise { .. } => Err(H3Error::FrameUnexpected),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h3::settings::Settings;
    use bytes::Bytes;

    #[test]
    fn known_preambles_decode() {
        let mut buf = Vec::new();
        VarInt::from_u32(stream_type::QPACK_ENCODER as u32).encode(&mut buf).unwrap();
        let (kind, consumed) = decode_preamble(&buf).unwrap();
        assert_eq!(kind, UniStreamType::QpackEncoder);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn unknown_preamble_is_tolerated_not_rejected() {
        let mut buf = Vec::new();
        VarInt::from_u64(0x401).unwrap().encode(&mut buf).unwrap();
        let (kind, _) = decode_preamble(&buf).unwrap();
        assert_eq!(kind, UniStreamType::Unknown(0x401));
    }

    #[test]
    fn control_stream_requires_settings_first() {
        let mut policy = ControlStreamPolicy::new();
        let goaway = H3Frame::Goaway { id: 0 };
        assert_eq!(policy.on_frame(&goaway), Err(H3Error::MissingSettings));

        let settings = H3Frame::Settings(Settings::default());
        assert!(policy.on_frame(&settings).is_ok());
        assert!(policy.on_frame(&goaway).is_ok());
    }

    #[test]
    fn duplicate_settings_is_frame_unexpected() {
        let mut policy = ControlStreamPolicy::new();
        let settings = H3Frame::Settings(Settings::default());
        assert!(policy.on_frame(&settings).is_ok());
        assert_eq!(policy.on_frame(&settings), Err(H3Error::FrameUnexpected));
    }

    #[test]
    fn data_frame_on_control_stream_is_rejected() {
        let mut policy = ControlStreamPolicy::new();
        policy.on_frame(&H3Frame::Settings(Settings::default())).unwrap();
        assert_eq!(policy.on_frame(&H3Frame::Data(Bytes::from_static(b"x"))), Err(H3Error::FrameUnexpected));
    }
}
