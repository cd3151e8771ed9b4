//! QUIC frame codec (RFC 9000 §19): a tagged union of every
//! frame type plus streaming encode/decode. Each variant carries only the
//! fields meaningful on the wire; bookkeeping (retransmission, ack state)
//! lives one layer up in the stream/recovery engines.

use bytes::{Buf, BufMut};

use crate::codec::VarInt;

use super::ack::AckRangeSet;
use super::error::FrameError;

/// RFC 9000 §19.3 ECN counts, present only on ACK_ECN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EcnCounts {
    pub ect0: u64,
    pub ect1: u64,
    pub ce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Padding {
        len: usize,
    },
    Ping,
    Ack {
        ranges: AckRangeSet,
        ack_delay: u64,
        ecn_counts: Option<EcnCounts>,
    },
    ResetStream {
        stream_id: u64,
        error_code: u64,
        final_size: u64,
    },
    StopSending {
        stream_id: u64,
        error_code: u64,
    },
    Crypto {
        offset: u64,
        data: bytes::Bytes,
    },
    NewToken {
        token: bytes::Bytes,
    },
    Stream {
        stream_id: u64,
        offset: u64,
        fin: bool,
        data: bytes::Bytes,
    },
    MaxData {
        max: u64,
    },
    MaxStreamData {
        stream_id: u64,
        max: u64,
    },
    MaxStreamsBidi {
        max: u64,
    },
    MaxStreamsUni {
        max: u64,
    },
    DataBlocked {
        limit: u64,
    },
    StreamDataBlocked {
        stream_id: u64,
        limit: u64,
    },
    StreamsBlockedBidi {
        limit: u64,
    },
    StreamsBlockedUni {
        limit: u64,
    },
    NewConnectionId {
        sequence_number: u64,
        retire_prior_to: u64,
        connection_id: crate::packet::ConnectionId,
        stateless_reset_token: [u8; 16],
    },
    RetireConnectionId {
        sequence_number: u64,
    },
    PathChallenge {
        data: [u8; 8],
    },
    PathResponse {
        data: [u8; 8],
    },
    ConnectionCloseTransport {
        error_code: u64,
        frame_type: u64,
        reason: bytes::Bytes,
    },
    ConnectionCloseApplication {
        error_code: u64,
        reason: bytes::Bytes,
    },
    HandshakeDone,
    Datagram {
        data: bytes::Bytes,
    },
}

mod ty {
    pub const PADDING: u64 = 0x00;
    pub const PING: u64 = 0x01;
    pub const ACK: u64 = 0x02;
    pub const ACK_ECN: u64 = 0x03;
    pub const RESET_STREAM: u64 = 0x04;
    pub const STOP_SENDING: u64 = 0x05;
    pub const CRYPTO: u64 = 0x06;
    pub const NEW_TOKEN: u64 = 0x07;
    pub const STREAM_BASE: u64 = 0x08; // 0x08..=0x0f, low 3 bits OFF/LEN/FIN
    pub const STREAM_OFF: u64 = 0x04;
    pub const STREAM_LEN: u64 = 0x02;
    pub const STREAM_FIN: u64 = 0x01;
    pub const MAX_DATA: u64 = 0x10;
    pub const MAX_STREAM_DATA: u64 = 0x11;
    pub const MAX_STREAMS_BIDI: u64 = 0x12;
    pub const MAX_STREAMS_UNI: u64 = 0x13;
    pub const DATA_BLOCKED: u64 = 0x14;
    pub const STREAM_DATA_BLOCKED: u64 = 0x15;
    pub const STREAMS_BLOCKED_BIDI: u64 = 0x16;
    pub const STREAMS_BLOCKED_UNI: u64 = 0x17;
    pub const NEW_CONNECTION_ID: u64 = 0x18;
    pub const RETIRE_CONNECTION_ID: u64 = 0x19;
    pub const PATH_CHALLENGE: u64 = 0x1a;
    pub const PATH_RESPONSE: u64 = 0x1b;
    pub const CONNECTION_CLOSE_TRANSPORT: u64 = 0x1c;
    pub const CONNECTION_CLOSE_APPLICATION: u64 = 0x1d;
    pub const HANDSHAKE_DONE: u64 = 0x1e;
    pub const DATAGRAM: u64 = 0x30; // RFC 9221; low bit selects explicit length
    pub const DATAGRAM_LEN: u64 = 0x31;
}

fn get_varint(buf: &mut impl Buf) -> Result<u64, FrameError> {
    VarInt::decode(buf).map(VarInt::into_inner).map_err(|_| FrameError::NeedMoreData)
}

fn need(buf: &impl Buf, n: usize) -> Result<(), FrameError> {
    if buf.remaining() < n {
        Err(FrameError::NeedMoreData)
    } else {
        Ok(())
    }
}

impl Frame {
    /// Decodes one frame from the front of `buf`, advancing past it.
    pub fn decode(buf: &mut impl Buf) -> Result<Frame, FrameError> {
        let frame_type = get_varint(buf)?;
        match frame_type {
            ty::PADDING => {
                let mut len = 1;
                while buf.has_remaining() && buf.chunk()[0] == 0 {
                    buf.advance(1);
                    len += 1;
                }
                Ok(Frame::Padding { len })
            }
            ty::PING => Ok(Frame::Ping),
            ty::ACK | ty::ACK_ECN => {
                let largest = get_varint(buf)?;
                let ack_delay = get_varint(buf)?;
                let range_count = get_varint(buf)?;
                let first_ack_range = get_varint(buf)?;
                let mut pairs = Vec::with_capacity(range_count as usize);
                for _ in 0..range_count {
                    let gap = get_varint(buf)?;
                    let len = get_varint(buf)?;
                    pairs.push((gap, len));
                }
                let ranges = AckRangeSet::from_wire(largest, first_ack_range, &pairs)?;
                let ecn_counts = if frame_type == ty::ACK_ECN {
                    let ect0 = get_varint(buf)?;
                    let ect1 = get_varint(buf)?;
                    let ce = get_varint(buf)?;
                    Some(EcnCounts { ect0, ect1, ce })
                } else {
                    None
                };
                Ok(Frame::Ack { ranges, ack_delay, ecn_counts })
            }
            ty::RESET_STREAM => Ok(Frame::ResetStream {
                stream_id: get_varint(buf)?,
                error_code: get_varint(buf)?,
                final_size: get_varint(buf)?,
            }),
            ty::STOP_SENDING => Ok(Frame::StopSending {
                stream_id: get_varint(buf)?,
                error_code: get_varint(buf)?,
            }),
            ty::CRYPTO => {
                let offset = get_varint(buf)?;
                let len = get_varint(buf)? as usize;
                need(buf, len)?;
                let data = buf.copy_to_bytes(len);
                Ok(Frame::Crypto { offset, data })
            }
            ty::NEW_TOKEN => {
                let len = get_varint(buf)? as usize;
                need(buf, len)?;
                Ok(Frame::NewToken { token: buf.copy_to_bytes(len) })
            }
            t if (ty::STREAM_BASE..=ty::STREAM_BASE + 0x07).contains(&t) => {
                let bits = t - ty::STREAM_BASE;
                let stream_id = get_varint(buf)?;
                let offset = if bits & ty::STREAM_OFF != 0 { get_varint(buf)? } else { 0 };
                let len = if bits & ty::STREAM_LEN != 0 {
                    get_varint(buf)? as usize
                } else {
                    buf.remaining()
                };
                need(buf, len)?;
                let data = buf.copy_to_bytes(len);
                Ok(Frame::Stream { stream_id, offset, fin: bits & ty::STREAM_FIN != 0, data })
            }
            ty::MAX_DATA => Ok(Frame::MaxData { max: get_varint(buf)? }),
            ty::MAX_STREAM_DATA => Ok(Frame::MaxStreamData {
                stream_id: get_varint(buf)?,
                max: get_varint(buf)?,
            }),
            ty::MAX_STREAMS_BIDI => Ok(Frame::MaxStreamsBidi { max: get_varint(buf)? }),
            ty::MAX_STREAMS_UNI => Ok(Frame::MaxStreamsUni { max: get_varint(buf)? }),
            ty::DATA_BLOCKED => Ok(Frame::DataBlocked { limit: get_varint(buf)? }),
            ty::STREAM_DATA_BLOCKED => Ok(Frame::StreamDataBlocked {
                stream_id: get_varint(buf)?,
                limit: get_varint(buf)?,
            }),
            ty::STREAMS_BLOCKED_BIDI => Ok(Frame::StreamsBlockedBidi { limit: get_varint(buf)? }),
            ty::STREAMS_BLOCKED_UNI => Ok(Frame::StreamsBlockedUni { limit: get_varint(buf)? }),
            ty::NEW_CONNECTION_ID => {
                let sequence_number = get_varint(buf)?;
                let retire_prior_to = get_varint(buf)?;
                need(buf, 1)?;
                let cid_len = buf.get_u8() as usize;
                need(buf, cid_len)?;
                let mut cid_bytes = vec![0u8; cid_len];
                buf.copy_to_slice(&mut cid_bytes);
                need(buf, 16)?;
                let mut token = [0u8; 16];
                buf.copy_to_slice(&mut token);
                Ok(Frame::NewConnectionId {
                    sequence_number,
                    retire_prior_to,
                    connection_id: crate::packet::ConnectionId::from_slice(&cid_bytes),
                    stateless_reset_token: token,
                })
            }
            ty::RETIRE_CONNECTION_ID => Ok(Frame::RetireConnectionId { sequence_number: get_varint(buf)? }),
            ty::PATH_CHALLENGE => {
                need(buf, 8)?;
                let mut data = [0u8; 8];
                buf.copy_to_slice(&mut data);
                Ok(Frame::PathChallenge { data })
            }
            ty::PATH_RESPONSE => {
                need(buf, 8)?;
                let mut data = [0u8; 8];
                buf.copy_to_slice(&mut data);
                Ok(Frame::PathResponse { data })
            }
            ty::CONNECTION_CLOSE_TRANSPORT => {
                let error_code = get_varint(buf)?;
                let frame_type = get_varint(buf)?;
                let len = get_varint(buf)? as usize;
                need(buf, len)?;
                Ok(Frame::ConnectionCloseTransport { error_code, frame_type, reason: buf.copy_to_bytes(len) })
            }
            ty::CONNECTION_CLOSE_APPLICATION => {
                let error_code = get_varint(buf)?;
                let len = get_varint(buf)? as usize;
                need(buf, len)?;
                Ok(Frame::ConnectionCloseApplication { error_code, reason: buf.copy_to_bytes(len) })
            }
            ty::HANDSHAKE_DONE => Ok(Frame::HandshakeDone),
            ty::DATAGRAM | ty::DATAGRAM_LEN => {
                let len = if frame_type == ty::DATAGRAM_LEN {
                    get_varint(buf)? as usize
                } else {
                    buf.remaining()
                };
                need(buf, len)?;
                Ok(Frame::Datagram { data: buf.copy_to_bytes(len) })
            }
            other => Err(FrameError::UnknownType(other)),
        }
    }

    /// Encodes this frame to `out`, including its type field.
    pub fn encode(&self, out: &mut impl BufMut) -> Result<(), FrameError> {
        match self {
            Frame::Padding { len } => {
                for _ in 0..*len {
                    out.put_u8(0);
                }
            }
            Frame::Ping => put_varint(out, ty::PING)?,
            Frame::Ack { ranges, ack_delay, ecn_counts } => {
                let (first_ack_range, pairs) = ranges.to_wire().ok_or(FrameError::Malformed)?;
                let frame_type = if ecn_counts.is_some() { ty::ACK_ECN } else { ty::ACK };
                put_varint(out, frame_type)?;
                put_varint(out, ranges.largest().ok_or(FrameError::Malformed)?)?;
                put_varint(out, *ack_delay)?;
                put_varint(out, pairs.len() as u64)?;
                put_varint(out, first_ack_range)?;
                for (gap, len) in pairs {
                    put_varint(out, gap)?;
                    put_varint(out, len)?;
                }
                if let Some(ecn) = ecn_counts {
                    put_varint(out, ecn.ect0)?;
                    put_varint(out, ecn.ect1)?;
                    put_varint(out, ecn.ce)?;
                }
            }
            Frame::ResetStream { stream_id, error_code, final_size } => {
                put_varint(out, ty::RESET_STREAM)?;
                put_varint(out, *stream_id)?;
                put_varint(out, *error_code)?;
                put_varint(out, *final_size)?;
            }
            Frame::StopSending { stream_id, error_code } => {
                put_varint(out, ty::STOP_SENDING)?;
                put_varint(out, *stream_id)?;
                put_varint(out, *error_code)?;
            }
            Frame::Crypto { offset, data } => {
                put_varint(out, ty::CRYPTO)?;
                put_varint(out, *offset)?;
                put_varint(out, data.len() as u64)?;
                out.put_slice(data);
            }
            Frame::NewToken { token } => {
                put_varint(out, ty::NEW_TOKEN)?;
                put_varint(out, token.len() as u64)?;
                out.put_slice(token);
            }
            Frame::Stream { stream_id, offset, fin, data } => {
                let mut bits = ty::STREAM_LEN;
                if *offset != 0 {
                    bits |= ty::STREAM_OFF;
                }
                if *fin {
                    bits |= ty::STREAM_FIN;
                }
                put_varint(out, ty::STREAM_BASE | bits)?;
                put_varint(out, *stream_id)?;
                if *offset != 0 {
                    put_varint(out, *offset)?;
                }
                put_varint(out, data.len() as u64)?;
                out.put_slice(data);
            }
            Frame::MaxData { max } => {
                put_varint(out, ty::MAX_DATA)?;
                put_varint(out, *max)?;
            }
            Frame::MaxStreamData { stream_id, max } => {
                put_varint(out, ty::MAX_STREAM_DATA)?;
                put_varint(out, *stream_id)?;
                put_varint(out, *max)?;
            }
            Frame::MaxStreamsBidi { max } => {
                put_varint(out, ty::MAX_STREAMS_BIDI)?;
                put_varint(out, *max)?;
            }
            Frame::MaxStreamsUni { max } => {
                put_varint(out, ty::MAX_STREAMS_UNI)?;
                put_varint(out, *max)?;
            }
            Frame::DataBlocked { limit } => {
                put_varint(out, ty::DATA_BLOCKED)?;
                put_varint(out, *limit)?;
            }
            Frame::StreamDataBlocked { stream_id, limit } => {
                put_varint(out, ty::STREAM_DATA_BLOCKED)?;
                put_varint(out, *stream_id)?;
                put_varint(out, *limit)?;
            }
            Frame::StreamsBlockedBidi { limit } => {
                put_varint(out, ty::STREAMS_BLOCKED_BIDI)?;
                put_varint(out, *limit)?;
            }
            Frame::StreamsBlockedUni { limit } => {
                put_varint(out, ty::STREAMS_BLOCKED_UNI)?;
                put_varint(out, *limit)?;
            }
            Frame::NewConnectionId { sequence_number, retire_prior_to, connection_id, stateless_reset_token } => {
                put_varint(out, ty::NEW_CONNECTION_ID)?;
                put_varint(out, *sequence_number)?;
                put_varint(out, *retire_prior_to)?;
                out.put_u8(connection_id.len() as u8);
                out.put_slice(connection_id.as_slice());
                out.put_slice(stateless_reset_token);
            }
            Frame::RetireConnectionId { sequence_number } => {
                put_varint(out, ty::RETIRE_CONNECTION_ID)?;
                put_varint(out, *sequence_number)?;
            }
            Frame::PathChallenge { data } => {
                put_varint(out, ty::PATH_CHALLENGE)?;
                out.put_slice(data);
            }
            Frame::PathResponse { data } => {
                put_varint(out, ty::PATH_RESPONSE)?;
                out.put_slice(data);
            }
            Frame::ConnectionCloseTransport { error_code, frame_type, reason } => {
                put_varint(out, ty::CONNECTION_CLOSE_TRANSPORT)?;
                put_varint(out, *error_code)?;
                put_varint(out, *frame_type)?;
                put_varint(out, reason.len() as u64)?;
                out.put_slice(reason);
            }
            Frame::ConnectionCloseApplication { error_code, reason } => {
                put_varint(out, ty::CONNECTION_CLOSE_APPLICATION)?;
                put_varint(out, *error_code)?;
                put_varint(out, reason.len() as u64)?;
                out.put_slice(reason);
            }
            Frame::HandshakeDone => put_varint(out, ty::HANDSHAKE_DONE)?,
            Frame::Datagram { data } => {
                put_varint(out, ty::DATAGRAM_LEN)?;
                put_varint(out, data.len() as u64)?;
                out.put_slice(data);
            }
        }
        Ok(())
    }

    /// Whether receiving this frame counts as ack-eliciting (RFC 9000 §13.2).
    pub fn is_ack_eliciting(&self) -> bool {
        !matches!(self, Frame::Ack { .. } | Frame::Padding { .. })
    }
}

fn put_varint(out: &mut impl BufMut, v: u64) -> Result<(), FrameError> {
    VarInt::from_u64(v)
        .map_err(|_| FrameError::Malformed)?
        .encode(out)
        .map_err(|_| FrameError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn round_trip(frame: Frame) {
        let mut buf = Vec::new();
        frame.encode(&mut buf).unwrap();
        let mut cursor = &buf[..];
        let decoded = Frame::decode(&mut cursor).unwrap();
        assert_eq!(decoded, frame);
        assert!(cursor.is_empty());
    }

    #[test]
    fn ping_and_handshake_done_round_trip() {
        round_trip(Frame::Ping);
        round_trip(Frame::HandshakeDone);
    }

    #[test]
    fn stream_frame_round_trips_with_and_without_offset() {
        round_trip(Frame::Stream { stream_id: 4, offset: 0, fin: true, data: Bytes::from_static(b"hi") });
        round_trip(Frame::Stream { stream_id: 4, offset: 200, fin: false, data: Bytes::from_static(b"bye") });
    }

    #[test]
    fn ack_frame_round_trips_multi_range() {
        let mut ranges = AckRangeSet::new();
        for pn in [0u64, 1, 2, 10, 11, 12] {
            ranges.insert(pn);
        }
        round_trip(Frame::Ack { ranges, ack_delay: 1000, ecn_counts: None });
    }

    #[test]
    fn connection_close_transport_round_trips() {
        round_trip(Frame::ConnectionCloseTransport {
            error_code: 0x0a,
            frame_type: 0x08,
            reason: Bytes::from_static(b"flow control"),
        });
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        let mut buf = Vec::new();
        VarInt::from_u32(0xff).encode(&mut buf);
        let mut cursor = &buf[..];
        assert_eq!(Frame::decode(&mut cursor), Err(FrameError::UnknownType(0xff)));
    }

    #[test]
    fn truncated_crypto_frame_needs_more_data() {
        let mut buf = Vec::new();
        VarInt::from_u32(ty::CRYPTO as u32).encode(&mut buf);
        VarInt::from_u32(0).encode(&mut buf);
        VarInt::from_u32(10).encode(&mut buf); // claims 10 bytes, supplies none
        let mut cursor = &buf[..];
        assert_eq!(Frame::decode(&mut cursor), Err(FrameError::NeedMoreData));
    }
}
