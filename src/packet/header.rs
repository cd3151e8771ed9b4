//! Long/short header parse and serialize. Parsing here only
//! covers the *cleartext* header fields — the packet number itself is still
//! under header protection at this point and is recovered separately once
//! [`crate::crypto::LevelCryptographer::decrypt_header`] has unmasked it
//! (expect header, remove header protection, then read the fields).

use bytes::{Buf, BufMut, Bytes};

use crate::codec::VarInt;

use super::error::PacketError;
use super::types::ConnectionId;

/// QUIC v1.
pub const VERSION_1: u32 = 0x0000_0001;
/// The reserved "version" value that marks a Version Negotiation packet.
pub const VERSION_NEGOTIATION: u32 = 0x0000_0000;

const FIXED_BIT: u8 = 0x40;
const LONG_HEADER_FORM: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongPacketType {
    Initial,
    ZeroRtt,
    Handshake,
    Retry,
}

impl LongPacketType {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => LongPacketType::Initial,
            0b01 => LongPacketType::ZeroRtt,
            0b10 => LongPacketType::Handshake,
            0b11 => LongPacketType::Retry,
            _ => unreachable!(),
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            LongPacketType::Initial => 0b00,
            LongPacketType::ZeroRtt => 0b01,
            LongPacketType::Handshake => 0b10,
            LongPacketType::Retry => 0b11,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LongHeader {
    pub packet_type: LongPacketType,
    pub version: u32,
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
    /// Initial packets only; `None` for ZeroRtt/Handshake.
    pub token: Option<Bytes>,
    /// Length of (truncated packet number + ciphertext), the `Length`
    /// varint field. The packet number's own length isn't known until
    /// header protection is removed, so this covers both.
    pub remainder_len: usize,
}

#[derive(Debug, Clone)]
pub struct RetryHeader {
    pub version: u32,
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
    pub retry_token: Bytes,
    pub integrity_tag: [u8; 16],
}

#[derive(Debug, Clone)]
pub enum Header {
    Initial(LongHeader),
    ZeroRtt(LongHeader),
    Handshake(LongHeader),
    Retry(RetryHeader),
    VersionNegotiation { dcid: ConnectionId, scid: ConnectionId, supported_versions: Vec<u32> },
    Short { dcid: ConnectionId },
}

/// Result of a successful cleartext-header parse: the header plus the byte
/// offset within the original buffer at which the (still-protected) packet
/// number begins.
pub struct ParsedHeader {
    pub header: Header,
    pub pn_offset: usize,
}

impl Header {
    pub fn is_long(&self) -> bool {
        !matches!(self, Header::Short { .. })
    }

    /// Parses the cleartext portion of one packet from the front of `buf`.
    /// For long headers, `buf` is left positioned just past `pn_offset`
    /// (i.e. at the first still-protected packet-number byte); the caller
    /// is expected to have kept the original slice around for header
    /// protection removal, since this function only advances a cursor.
    ///
    /// `local_short_dcid_len` is the length the caller issued for its own
    /// CIDs — short headers carry no explicit DCID length, so
    /// ("callers must tell the codec which length to assume").
    pub fn parse(buf: &[u8], local_short_dcid_len: usize) -> Result<ParsedHeader, PacketError> {
        if buf.is_empty() {
            return Err(PacketError::NeedMoreData);
        }
        let first = buf[0];
        if first & LONG_HEADER_FORM == 0 {
            return Self::parse_short(buf, local_short_dcid_len);
        }
        Self::parse_long(buf, first)
    }

    fn parse_long(buf: &[u8], first: u8) -> Result<ParsedHeader, PacketError> {
        let mut cur = &buf[1..];
        if cur.remaining() < 4 {
            return Err(PacketError::NeedMoreData);
        }
        let version = cur.get_u32();

        if version == VERSION_NEGOTIATION {
            let dcid = read_cid(&mut cur)?;
            let scid = read_cid(&mut cur)?;
            let mut supported_versions = Vec::new();
            while cur.remaining() >= 4 {
                supported_versions.push(cur.get_u32());
            }
            let consumed = buf.len() - cur.remaining();
            return Ok(ParsedHeader {
                header: Header::VersionNegotiation { dcid, scid, supported_versions },
                pn_offset: consumed,
            });
        }
        if first & FIXED_BIT == 0 {
            return Err(PacketError::FixedBitUnset);
        }

        let dcid = read_cid(&mut cur)?;
        let scid = read_cid(&mut cur)?;
        let packet_type = LongPacketType::from_bits(first >> 4);

        if packet_type == LongPacketType::Retry {
            if cur.remaining() < 16 {
                return Err(PacketError::NeedMoreData);
            }
            let odcid_len_position = buf.len() - cur.remaining();
            let retry_token_len = cur.remaining() - 16;
            let retry_token = Bytes::copy_from_slice(&cur.chunk()[..retry_token_len]);
            cur.advance(retry_token_len);
            let mut integrity_tag = [0u8; 16];
            cur.copy_to_slice(&mut integrity_tag);
            let _ = odcid_len_position;
            let consumed = buf.len() - cur.remaining();
            return Ok(ParsedHeader {
                header: Header::Retry(RetryHeader { version, dcid, scid, retry_token, integrity_tag }),
                pn_offset: consumed,
            });
        }

        let token = if packet_type == LongPacketType::Initial {
            let token_len = VarInt::decode(&mut cur)?.as_usize();
            if cur.remaining() < token_len {
                return Err(PacketError::NeedMoreData);
            }
            let t = Bytes::copy_from_slice(&cur.chunk()[..token_len]);
            cur.advance(token_len);
            Some(t)
        } else {
            None
        };

        let remainder_len = VarInt::decode(&mut cur)?.as_usize();
        if cur.remaining() < remainder_len {
            return Err(PacketError::NeedMoreData);
        }
        let pn_offset = buf.len() - cur.remaining();

        let long = LongHeader { packet_type, version, dcid, scid, token, remainder_len };
        let header = match packet_type {
            LongPacketType::Initial => Header::Initial(long),
            LongPacketType::ZeroRtt => Header::ZeroRtt(long),
            LongPacketType::Handshake => Header::Handshake(long),
            LongPacketType::Retry => unreachable!("handled above"),
        };
        Ok(ParsedHeader { header, pn_offset })
    }

    fn parse_short(buf: &[u8], dcid_len: usize) -> Result<ParsedHeader, PacketError> {
        if buf[0] & FIXED_BIT == 0 {
            return Err(PacketError::FixedBitUnset);
        }
        if buf.len() < 1 + dcid_len {
            return Err(PacketError::NeedMoreData);
        }
        let dcid = ConnectionId::from_slice(&buf[1..1 + dcid_len]);
        Ok(ParsedHeader { header: Header::Short { dcid }, pn_offset: 1 + dcid_len })
    }

    /// Serializes the cleartext header. For long headers the truncated
    /// packet number is appended by the caller immediately after (it still
    /// needs header protection applied in-place afterward), and
    /// `remainder_len` must already equal `pn_len + ciphertext_len`.
    pub fn encode(&self, out: &mut impl BufMut) -> Result<(), PacketError> {
        match self {
            Header::Initial(h) => Self::encode_long(out, LongPacketType::Initial, h),
            Header::ZeroRtt(h) => Self::encode_long(out, LongPacketType::ZeroRtt, h),
            Header::Handshake(h) => Self::encode_long(out, LongPacketType::Handshake, h),
            Header::Retry(h) => {
                let first = LONG_HEADER_FORM | FIXED_BIT | (LongPacketType::Retry.to_bits() << 4);
                out.put_u8(first);
                out.put_u32(h.version);
                write_cid(out, &h.dcid);
                write_cid(out, &h.scid);
                out.put_slice(&h.retry_token);
                out.put_slice(&h.integrity_tag);
                Ok(())
            }
            Header::VersionNegotiation { dcid, scid, supported_versions } => {
                out.put_u8(LONG_HEADER_FORM);
                out.put_u32(VERSION_NEGOTIATION);
                write_cid(out, dcid);
                write_cid(out, scid);
                for v in supported_versions {
                    out.put_u32(*v);
                }
                Ok(())
            }
            Header::Short { dcid } => {
                out.put_u8(FIXED_BIT); // form bit clear, fixed bit set
                out.put_slice(dcid.as_slice());
                Ok(())
            }
        }
    }

    fn encode_long(out: &mut impl BufMut, packet_type: LongPacketType, h: &LongHeader) -> Result<(), PacketError> {
        let first = LONG_HEADER_FORM | FIXED_BIT | (packet_type.to_bits() << 4);
        out.put_u8(first);
        out.put_u32(h.version);
        write_cid(out, &h.dcid);
        write_cid(out, &h.scid);
        if packet_type == LongPacketType::Initial {
            let token = h.token.as_deref().unwrap_or(&[]);
            VarInt::try_from(token.len()).map_err(PacketError::from)?.encode(out)?;
            out.put_slice(token);
        }
        VarInt::try_from(h.remainder_len).map_err(PacketError::from)?.encode(out)?;
        Ok(())
    }
}

fn read_cid(buf: &mut impl Buf) -> Result<ConnectionId, PacketError> {
    if !buf.has_remaining() {
        return Err(PacketError::NeedMoreData);
    }
    let len = buf.get_u8() as usize;
    if len > super::types::MAX_CID_LEN {
        return Err(PacketError::CidTooLong);
    }
    if buf.remaining() < len {
        return Err(PacketError::NeedMoreData);
    }
    let cid = ConnectionId::from_slice(&buf.chunk()[..len]);
    buf.advance(len);
    Ok(cid)
}

fn write_cid(out: &mut impl BufMut, cid: &ConnectionId) {
    out.put_u8(cid.len() as u8);
    out.put_slice(cid.as_slice());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_header_round_trips_through_parse() {
        let dcid = ConnectionId::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let scid = ConnectionId::from_slice(&[9, 9]);
        let header = Header::Initial(LongHeader {
            packet_type: LongPacketType::Initial,
            version: VERSION_1,
            dcid: dcid.clone(),
            scid: scid.clone(),
            token: Some(Bytes::from_static(b"tok")),
            remainder_len: 20,
        });
        let mut out = Vec::new();
        header.encode(&mut out).unwrap();
        out.extend(std::iter::repeat(0u8).take(20)); // stand-in for pn+ciphertext

        let parsed = Header::parse(&out, 8).unwrap();
        match parsed.header {
            Header::Initial(h) => {
                assert_eq!(h.version, VERSION_1);
                assert_eq!(h.dcid, dcid);
                assert_eq!(h.scid, scid);
                assert_eq!(h.remainder_len, 20);
                assert_eq!(h.token.as_deref(), Some(&b"tok"[..]));
            }
            _ => panic!("expected Initial"),
        }
        assert_eq!(parsed.pn_offset, out.len() - 20);
    }

    #[test]
    fn short_header_uses_caller_supplied_dcid_len() {
        let mut out = vec![FIXED_BIT];
        out.extend_from_slice(&[1, 2, 3, 4]);
        out.extend_from_slice(&[0xAA]); // protected pn byte
        let parsed = Header::parse(&out, 4).unwrap();
        match parsed.header {
            Header::Short { dcid } => assert_eq!(dcid.as_slice(), &[1, 2, 3, 4]),
            _ => panic!("expected Short"),
        }
        assert_eq!(parsed.pn_offset, 5);
    }

    #[test]
    fn version_negotiation_has_no_fixed_bit_requirement() {
        let dcid = ConnectionId::from_slice(&[1]);
        let scid = ConnectionId::from_slice(&[2]);
        let header = Header::VersionNegotiation { dcid: dcid.clone(), scid: scid.clone(), supported_versions: vec![VERSION_1] };
        let mut out = Vec::new();
        header.encode(&mut out).unwrap();
        let parsed = Header::parse(&out, 8).unwrap();
        match parsed.header {
            Header::VersionNegotiation { supported_versions, .. } => assert_eq!(supported_versions, vec![VERSION_1]),
            _ => panic!("expected VersionNegotiation"),
        }
    }

    #[test]
    fn truncated_buffer_needs_more_data_not_panic() {
        let mut out = vec![LONG_HEADER_FORM | FIXED_BIT];
        out.extend_from_slice(&VERSION_1.to_be_bytes());
        assert_eq!(Header::parse(&out, 8).unwrap_err(), PacketError::NeedMoreData);
    }
}
