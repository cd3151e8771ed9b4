//! QPACK string literals: a 1-bit Huffman flag folded
//! into a 7-bit-prefixed length, followed by that many bytes, Huffman-coded
//! or not per the flag.

use bytes::{Buf, BufMut};

use super::{decode_prefixed_int, encode_prefixed_int, huffman, CodecError};

const HUFFMAN_FLAG: u8 = 0x80;

/// Encodes `value` as a QPACK string literal, using Huffman coding only
/// when it is strictly shorter than the raw encoding.
pub fn encode_string_literal(value: &[u8], out: &mut impl BufMut) -> Result<(), CodecError> {
    encode_prefixed_string(7, 0, HUFFMAN_FLAG, value, out)
}

/// Decodes a QPACK string literal. `buf` must start at the flag+length
/// byte (i.e. the caller has not pre-consumed it, unlike
/// [`super::decode_prefixed_int`]'s convention elsewhere).
pub fn decode_string_literal(buf: &mut impl Buf) -> Result<Vec<u8>, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::NeedMoreData);
    }
    let first = buf.chunk()[0];
    buf.advance(1);
    decode_prefixed_string(7, HUFFMAN_FLAG, first, buf)
}

/// Generalizes [`encode_string_literal`] to the narrower prefixes QPACK's
/// instruction streams use alongside the field-line representations: a
/// `base_pattern` of fixed high bits identifying the instruction/
/// representation (e.g. the `01` of "Insert Without Name Reference"'s name
/// field), ORed with the Huffman flag bit when Huffman coding wins.
pub(crate) fn encode_prefixed_string(
    prefix_bits: u8,
    base_pattern: u8,
    huffman_flag: u8,
    value: &[u8],
    out: &mut impl BufMut,
) -> Result<(), CodecError> {
    let huffman_len = huffman::encoded_bit_len(value).div_ceil(8);
    if huffman_len < value.len() {
        let encoded = huffman::encode(value);
        encode_prefixed_int(prefix_bits, base_pattern | huffman_flag, encoded.len() as u64, out)?;
        if out.remaining_mut() < encoded.len() {
            return Err(CodecError::NoCapacity);
        }
        out.put_slice(&encoded);
    } else {
        encode_prefixed_int(prefix_bits, base_pattern, value.len() as u64, out)?;
        if out.remaining_mut() < value.len() {
            return Err(CodecError::NoCapacity);
        }
        out.put_slice(value);
    }
    Ok(())
}

/// Generalizes [`decode_string_literal`] the same way; `first_byte` is the
/// still-unconsumed flag+length byte the caller peeked at.
pub(crate) fn decode_prefixed_string(
    prefix_bits: u8,
    huffman_flag: u8,
    first_byte: u8,
    buf: &mut impl Buf,
) -> Result<Vec<u8>, CodecError> {
    let is_huffman = first_byte & huffman_flag != 0;
    let prefix_mask = (1u8 << prefix_bits) - 1;
    let len = decode_prefixed_int(prefix_bits, first_byte & prefix_mask, buf)? as usize;
    if buf.remaining() < len {
        return Err(CodecError::NeedMoreData);
    }
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    if is_huffman {
        huffman::decode(&raw)
    } else {
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_and_huffman_candidates() {
        for s in ["", "x", "content-type", "a very unusual \u{1F600} literal"] {
            let mut out = Vec::new();
            encode_string_literal(s.as_bytes(), &mut out).unwrap();
            let mut buf = out.as_slice();
            let decoded = decode_string_literal(&mut buf).unwrap();
            assert_eq!(decoded, s.as_bytes());
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn truncated_length_byte_needs_more_data() {
        let mut buf: &[u8] = &[];
        assert_eq!(decode_string_literal(&mut buf), Err(CodecError::NeedMoreData));
    }

    #[test]
    fn truncated_payload_needs_more_data() {
        let mut out = Vec::new();
        encode_string_literal(b"content-type", &mut out).unwrap();
        out.truncate(out.len() - 1);
        let mut buf = out.as_slice();
        assert_eq!(decode_string_literal(&mut buf), Err(CodecError::NeedMoreData));
    }
}
