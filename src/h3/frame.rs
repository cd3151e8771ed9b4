//! RFC 9114 §7.2: the HTTP/3 frame layer. Every frame is `type (varint) ||
//! length (varint) || payload (length bytes)`; [`decode_one`] reassembles
//! exactly one from the front of a byte slice that may be a partial prefix
//! of a larger buffer a stream has accumulated so far, telling the caller
//! either how many bytes it consumed or that it needs to see more before
//! it can make progress — the same "drop vs need-more-data vs consumed"
//! shape as [`crate::packet::decode_one`] one layer down.

use bytes::{Buf, Bytes};

use crate::codec::VarInt;

use super::error::H3Error;
use super::settings::Settings;

pub mod ty {
    pub const DATA: u64 = 0x00;
    pub const HEADERS: u64 = 0x01;
    pub const CANCEL_PUSH: u64 = 0x03;
    pub const SETTINGS: u64 = 0x04;
    pub const PUSH_PROMISE: u64 = 0x05;
    pub const GOAWAY: u64 = 0x07;
    pub const MAX_PUSH_ID: u64 = 0x0D;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum H3Frame {
    Data(Bytes),
    /// QPACK-encoded field section; this layer never interprets it, that's
    /// [`crate::qpack`]'s job.
    Headers(Bytes),
    CancelPush { push_id: u64 },
    Settings(Settings),
    PushPromise { push_id: u64, encoded_field_section: Bytes },
    Goaway { id: u64 },
    MaxPushId { push_id: u64 },
    /// A frame type this build doesn't recognize — RFC 9114 §9 requires
    /// these to be ignored, not rejected, to leave room for extensions.
    Unknown { frame_type: u64, payload: Bytes },
}

pub struct DecodedFrame {
    pub frame: H3Frame,
    /// Bytes of the input slice this frame consumed; the caller advances
    /// its stream-level read cursor by this much.
    pub consumed: usize,
}

/// Decodes exactly one frame from the front of `buf`. Returns
/// `H3Error::NeedMoreData` (never panics, never reads past `buf`) if the
/// type, length, or payload hasn't fully arrived yet; the caller should
/// simply retry once more bytes are available, not treat it as malformed.
pub fn decode_one(buf: &[u8]) -> Result<DecodedFrame, H3Error> {
    let mut cursor = buf;
    let frame_type = VarInt::decode(&mut cursor).map_err(|_| H3Error::NeedMoreData)?.into_inner();
    let length = VarInt::decode(&mut cursor).map_err(|_| H3Error::NeedMoreData)?.as_usize();
    if cursor.remaining() < length {
        return Err(H3Error::NeedMoreData);
    }
    let payload = Bytes::copy_from_slice(&cursor[..length]);
    cursor.advance(length);
    let consumed = buf.len() - cursor.len();

    let frame = decode_payload(frame_type, payload)?;
    Ok(DecodedFrame { frame, consumed })
}

fn decode_payload(frame_type: u64, payload: Bytes) -> Result<H3Frame, H3Error> {
    Ok(match frame_type {
        ty::DATA => H3Frame::Data(payload),
        ty::HEADERS => H3Frame::Headers(payload),
        ty::CANCEL_PUSH => H3Frame::CancelPush { push_id: decode_single_varint(&payload)? },
        ty::SETTINGS => H3Frame::Settings(Settings::decode(&payload)?),
        ty::PUSH_PROMISE => {
            let mut rest: &[u8] = &payload;
            let push_id = VarInt::decode(&mut rest).map_err(|_| H3Error::FrameError)?.into_inner();
            H3Frame::PushPromise { push_id, encoded_field_section: Bytes::copy_from_slice(rest) }
        }
        ty::GOAWAY => H3Frame::Goaway { id: decode_single_varint(&payload)? },
        ty::MAX_PUSH_ID => H3Frame::MaxPushId { push_id: decode_single_varint(&payload)? },
        other => H3Frame::Unknown { frame_type: other, payload },
    })
}

fn decode_single_varint(payload: &[u8]) -> Result<u64, H3Error> {
    let mut rest = payload;
    let v = VarInt::decode(&mut rest).map_err(|_| H3Error::FrameError)?;
    if rest.has_remaining() {
        return Err(H3Error::FrameError);
    }
    Ok(v.into_inner())
}

pub fn encode_data(data: &[u8], out: &mut Vec<u8>) {
    encode_header(ty::DATA, data.len(), out);
    out.extend_from_slice(data);
}

pub fn encode_headers(encoded_field_section: &[u8], out: &mut Vec<u8>) {
    encode_header(ty::HEADERS, encoded_field_section.len(), out);
    out.extend_from_slice(encoded_field_section);
}

pub fn encode_settings(settings: &Settings, out: &mut Vec<u8>) -> Result<(), H3Error> {
    let mut payload = Vec::new();
    settings.encode(&mut payload)?;
    encode_header(ty::SETTINGS, payload.len(), out);
    out.extend_from_slice(&payload);
    Ok(())
}

fn encode_header(frame_type: u64, len: usize, out: &mut Vec<u8>) {
    VarInt::from_u64(frame_type).expect("frame type fits a varint").encode(out).expect("Vec always has capacity");
    VarInt::from_u64(len as u64).expect("frame length fits a varint").encode(out).expect("Vec always has capacity");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_frame_round_trips() {
        let mut out = Vec::new();
        encode_data(b"hello", &mut out);
        let decoded = decode_one(&out).unwrap();
        assert_eq!(decoded.frame, H3Frame::Data(Bytes::from_static(b"hello")));
        assert_eq!(decoded.consumed, out.len());
    }

    #[test]
    fn settings_frame_round_trips() {
        let settings = Settings { qpack_max_table_capacity: 100, ..Default::default() };
        let mut out = Vec::new();
        encode_settings(&settings, &mut out).unwrap();
        let decoded = decode_one(&out).unwrap();
        assert_eq!(decoded.frame, H3Frame::Settings(settings));
    }

    #[test]
    fn truncated_frame_needs_more_data_at_every_split_point() {
        let mut out = Vec::new();
        encode_data(b"hello world", &mut out);
        for cut in 0..out.len() {
            assert_eq!(decode_one(&out[..cut]), Err(H3Error::NeedMoreData));
        }
        assert!(decode_one(&out).is_ok());
    }

    #[test]
    fn unrecognized_frame_type_is_preserved_as_unknown() {
        let mut out = Vec::new();
        encode_header(0x2A, 3, &mut out);
        out.extend_from_slice(b"abc");
        let decoded = decode_one(&out).unwrap();
        assert_eq!(decoded.frame, H3Frame::Unknown { frame_type: 0x2A, payload: Bytes::from_static(b"abc") });
    }

    #[test]
    fn two_coalesced_frames_decode_one_at_a_time() {
        let mut out = Vec::new();
        encode_data(b"first", &mut out);
        let first_len = out.len();
        encode_data(b"second", &mut out);

        let d1 = decode_one(&out).unwrap();
        assert_eq!(d1.consumed, first_len);
        let d2 = decode_one(&out[d1.consumed..]).unwrap();
        assert_eq!(d2.frame, H3Frame::Data(Bytes::from_static(b"second")));
    }
}
