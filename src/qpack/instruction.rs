//! RFC 9204 §4.3/§4.4: the two unidirectional instruction streams. The
//! encoder stream carries dynamic-table mutations from encoder to decoder;
//! the decoder stream carries acknowledgements back the other way. Both are
//! simple tagged byte streams built on the same prefixed-integer codec as
//! the header-block representations in [`super::header_block`].

use bytes::{Buf, BufMut};

use crate::codec::{decode_prefixed_int, decode_prefixed_string, encode_prefixed_int, encode_prefixed_string};

use super::error::QpackError;

const INSERT_WITH_NAME_REF: u8 = 0x80;
const INSERT_WITHOUT_NAME_REF: u8 = 0x40;
const SET_CAPACITY: u8 = 0x20;
const NAME_IS_STATIC: u8 = 0x40;
const NAME_HUFFMAN: u8 = 0x20;
const VALUE_HUFFMAN: u8 = 0x80;

/// An instruction on the encoder stream (encoder → decoder).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderInstruction {
    SetDynamicTableCapacity { capacity: u64 },
    InsertWithNameRef { is_static: bool, name_index: u64, value: Vec<u8> },
    InsertWithoutNameRef { name: Vec<u8>, value: Vec<u8> },
    Duplicate { index: u64 },
}

impl EncoderInstruction {
    pub fn encode(&self, out: &mut impl BufMut) -> Result<(), QpackError> {
        match self {
            EncoderInstruction::SetDynamicTableCapacity { capacity } => {
                encode_prefixed_int(5, SET_CAPACITY, *capacity, out)?;
            }
            EncoderInstruction::InsertWithNameRef { is_static, name_index, value } => {
                let pattern = INSERT_WITH_NAME_REF | if *is_static { NAME_IS_STATIC } else { 0 };
                encode_prefixed_int(6, pattern, *name_index, out)?;
                encode_prefixed_string(7, 0, VALUE_HUFFMAN, value, out)?;
            }
            EncoderInstruction::InsertWithoutNameRef { name, value } => {
                encode_prefixed_string(5, INSERT_WITHOUT_NAME_REF, NAME_HUFFMAN, name, out)?;
                encode_prefixed_string(7, 0, VALUE_HUFFMAN, value, out)?;
            }
            EncoderInstruction::Duplicate { index } => {
                encode_prefixed_int(5, 0x00, *index, out)?;
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<EncoderInstruction, QpackError> {
        if !buf.has_remaining() {
            return Err(QpackError::NeedMoreData);
        }
        let first = buf.chunk()[0];
        if first & INSERT_WITH_NAME_REF != 0 {
            buf.advance(1);
            let is_static = first & NAME_IS_STATIC != 0;
            let name_index = decode_prefixed_int(6, first & 0x3F, buf)?;
            let value = decode_string_value(buf)?;
            Ok(EncoderInstruction::InsertWithNameRef { is_static, name_index, value })
        } else if first & INSERT_WITHOUT_NAME_REF != 0 {
            buf.advance(1);
            let name = decode_prefixed_string(5, NAME_HUFFMAN, first & 0x1F, buf)?;
            let value = decode_string_value(buf)?;
            Ok(EncoderInstruction::InsertWithoutNameRef { name, value })
        } else if first & SET_CAPACITY != 0 {
            buf.advance(1);
            let capacity = decode_prefixed_int(5, first & 0x1F, buf)?;
            Ok(EncoderInstruction::SetDynamicTableCapacity { capacity })
        } else {
            buf.advance(1);
            let index = decode_prefixed_int(5, first & 0x1F, buf)?;
            Ok(EncoderInstruction::Duplicate { index })
        }
    }
}

/// Mirrors [`decode_prefixed_string`]'s caller contract: the flag/length
/// byte is still unconsumed.
fn decode_string_value(buf: &mut impl Buf) -> Result<Vec<u8>, QpackError> {
    if !buf.has_remaining() {
        return Err(QpackError::NeedMoreData);
    }
    let first = buf.chunk()[0];
    buf.advance(1);
    Ok(decode_prefixed_string(7, VALUE_HUFFMAN, first, buf)?)
}

const SECTION_ACK: u8 = 0x80;
const STREAM_CANCELLATION: u8 = 0x40;

/// An instruction on the decoder stream (decoder → encoder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderInstruction {
    SectionAcknowledgement { stream_id: u64 },
    StreamCancellation { stream_id: u64 },
    InsertCountIncrement { increment: u64 },
}

impl DecoderInstruction {
    pub fn encode(&self, out: &mut impl BufMut) -> Result<(), QpackError> {
        match self {
            DecoderInstruction::SectionAcknowledgement { stream_id } => {
                encode_prefixed_int(7, SECTION_ACK, *stream_id, out)?;
            }
            DecoderInstruction::StreamCancellation { stream_id } => {
                encode_prefixed_int(6, STREAM_CANCELLATION, *stream_id, out)?;
            }
            DecoderInstruction::InsertCountIncrement { increment } => {
                encode_prefixed_int(6, 0x00, *increment, out)?;
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<DecoderInstruction, QpackError> {
        if !buf.has_remaining() {
            return Err(QpackError::NeedMoreData);
        }
        let first = buf.chunk()[0];
        if first & SECTION_ACK != 0 {
            buf.advance(1);
            let stream_id = decode_prefixed_int(7, first & 0x7F, buf)?;
            Ok(DecoderInstruction::SectionAcknowledgement { stream_id })
        } else if first & STREAM_CANCELLATION != 0 {
            buf.advance(1);
            let stream_id = decode_prefixed_int(6, first & 0x3F, buf)?;
            Ok(DecoderInstruction::StreamCancellation { stream_id })
        } else {
            buf.advance(1);
            let increment = decode_prefixed_int(6, first & 0x3F, buf)?;
            Ok(DecoderInstruction::InsertCountIncrement { increment })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_encoder(instr: EncoderInstruction) {
        let mut out = Vec::new();
        instr.encode(&mut out).unwrap();
        let mut buf = out.as_slice();
        let decoded = EncoderInstruction::decode(&mut buf).unwrap();
        assert_eq!(decoded, instr);
        assert!(buf.is_empty());
    }

    #[test]
    fn set_capacity_round_trips() {
        round_trip_encoder(EncoderInstruction::SetDynamicTableCapacity { capacity: 220 });
    }

    #[test]
    fn insert_with_name_ref_round_trips_static_and_dynamic() {
        round_trip_encoder(EncoderInstruction::InsertWithNameRef {
            is_static: true,
            name_index: 17,
            value: b"bench".to_vec(),
        });
        round_trip_encoder(EncoderInstruction::InsertWithNameRef {
            is_static: false,
            name_index: 0,
            value: b"v".to_vec(),
        });
    }

    #[test]
    fn insert_without_name_ref_round_trips() {
        round_trip_encoder(EncoderInstruction::InsertWithoutNameRef {
            name: b"x-bench".to_vec(),
            value: b"v".to_vec(),
        });
    }

    #[test]
    fn duplicate_round_trips() {
        round_trip_encoder(EncoderInstruction::Duplicate { index: 42 });
    }

    fn round_trip_decoder(instr: DecoderInstruction) {
        let mut out = Vec::new();
        instr.encode(&mut out).unwrap();
        let mut buf = out.as_slice();
        let decoded = DecoderInstruction::decode(&mut buf).unwrap();
        assert_eq!(decoded, instr);
        assert!(buf.is_empty());
    }

    #[test]
    fn decoder_instructions_round_trip() {
        round_trip_decoder(DecoderInstruction::SectionAcknowledgement { stream_id: 4 });
        round_trip_decoder(DecoderInstruction::StreamCancellation { stream_id: 8 });
        round_trip_decoder(DecoderInstruction::InsertCountIncrement { increment: 3 });
    }
}
