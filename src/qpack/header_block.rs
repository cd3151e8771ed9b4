//! RFC 9204 §4.5: field-line representations, and §4.5.1's Required Insert
//! Count / Base encoding that lets a header block be decoded without
//! blocking on dynamic-table state the encoder hasn't actually referenced.

use bytes::{Buf, BufMut};

use crate::codec::{decode_prefixed_int, decode_prefixed_string, encode_prefixed_int, encode_prefixed_string};

use super::error::QpackError;

const INDEXED: u8 = 0x80;
const INDEXED_STATIC: u8 = 0x40;
const INDEXED_POST_BASE: u8 = 0x10;
const LITERAL_NAME_REF: u8 = 0x40;
const LITERAL_NAME_REF_STATIC: u8 = 0x10;
const LITERAL_NAME_REF_NEVER_INDEXED: u8 = 0x20;
const LITERAL_POST_BASE_NAME_REF: u8 = 0x00;
const LITERAL_POST_BASE_NEVER_INDEXED: u8 = 0x08;
const LITERAL_LITERAL_NAME: u8 = 0x20;
const LITERAL_LITERAL_NAME_NEVER_INDEXED: u8 = 0x10;
const LITERAL_LITERAL_NAME_HUFFMAN: u8 = 0x08;
const VALUE_HUFFMAN: u8 = 0x80;

/// One field-line representation inside a header block, RFC 9204 §4.5.2
/// through §4.5.6. Indices are relative to the block's own `base` except for
/// `static_table: true`, which indexes the fixed table directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    /// Pre-base relative index: the referenced entry existed before the
    /// dynamic table reached `base`.
    Indexed { static_table: bool, index: u64 },
    /// Post-base index: the referenced entry was inserted by the *same*
    /// encoder flight that produced this header block, after `base`.
    IndexedPostBase { index: u64 },
    LiteralWithNameRef { static_table: bool, name_index: u64, never_indexed: bool, value: Vec<u8> },
    LiteralWithPostBaseNameRef { name_index: u64, never_indexed: bool, value: Vec<u8> },
    LiteralWithLiteralName { never_indexed: bool, name: Vec<u8>, value: Vec<u8> },
}

impl Representation {
    pub fn encode(&self, out: &mut impl BufMut) -> Result<(), QpackError> {
        match self {
            Representation::Indexed { static_table, index } => {
                let pattern = INDEXED | if *static_table { INDEXED_STATIC } else { 0 };
                encode_prefixed_int(6, pattern, *index, out)?;
            }
            Representation::IndexedPostBase { index } => {
                encode_prefixed_int(4, INDEXED_POST_BASE, *index, out)?;
            }
            Representation::LiteralWithNameRef { static_table, name_index, never_indexed, value } => {
                let pattern = LITERAL_NAME_REF
                    | if *static_table { LITERAL_NAME_REF_STATIC } else { 0 }
                    | if *never_indexed { LITERAL_NAME_REF_NEVER_INDEXED } else { 0 };
                encode_prefixed_int(4, pattern, *name_index, out)?;
                encode_prefixed_string(7, 0, VALUE_HUFFMAN, value, out)?;
            }
            Representation::LiteralWithPostBaseNameRef { name_index, never_indexed, value } => {
                let pattern = LITERAL_POST_BASE_NAME_REF | if *never_indexed { LITERAL_POST_BASE_NEVER_INDEXED } else { 0 };
                encode_prefixed_int(3, pattern, *name_index, out)?;
                encode_prefixed_string(7, 0, VALUE_HUFFMAN, value, out)?;
            }
            Representation::LiteralWithLiteralName { never_indexed, name, value } => {
                let pattern = LITERAL_LITERAL_NAME | if *never_indexed { LITERAL_LITERAL_NAME_NEVER_INDEXED } else { 0 };
                encode_prefixed_string(3, pattern, LITERAL_LITERAL_NAME_HUFFMAN, name, out)?;
                encode_prefixed_string(7, 0, VALUE_HUFFMAN, value, out)?;
            }
        }
        Ok(())
    }

    pub fn decode(buf: &mut impl Buf) -> Result<Representation, QpackError> {
        if !buf.has_remaining() {
            return Err(QpackError::NeedMoreData);
        }
        let first = buf.chunk()[0];
        if first & INDEXED != 0 {
            buf.advance(1);
            let static_table = first & INDEXED_STATIC != 0;
            let index = decode_prefixed_int(6, first & 0x3F, buf)?;
            Ok(Representation::Indexed { static_table, index })
        } else if first & LITERAL_NAME_REF != 0 {
            buf.advance(1);
            let static_table = first & LITERAL_NAME_REF_STATIC != 0;
            let never_indexed = first & LITERAL_NAME_REF_NEVER_INDEXED != 0;
            let name_index = decode_prefixed_int(4, first & 0x0F, buf)?;
            let value = decode_value(buf)?;
            Ok(Representation::LiteralWithNameRef { static_table, name_index, never_indexed, value })
        } else if first & LITERAL_LITERAL_NAME != 0 {
            buf.advance(1);
            let never_indexed = first & LITERAL_LITERAL_NAME_NEVER_INDEXED != 0;
            let name = decode_prefixed_string(3, LITERAL_LITERAL_NAME_HUFFMAN, first & 0x0F, buf)?;
            let value = decode_value(buf)?;
            Ok(Representation::LiteralWithLiteralName { never_indexed, name, value })
        } else if first & INDEXED_POST_BASE != 0 {
            buf.advance(1);
            let index = decode_prefixed_int(4, first & 0x0F, buf)?;
            Ok(Representation::IndexedPostBase { index })
        } else {
            buf.advance(1);
            let never_indexed = first & LITERAL_POST_BASE_NEVER_INDEXED != 0;
            let name_index = decode_prefixed_int(3, first & 0x07, buf)?;
            let value = decode_value(buf)?;
            Ok(Representation::LiteralWithPostBaseNameRef { name_index, never_indexed, value })
        }
    }
}

fn decode_value(buf: &mut impl Buf) -> Result<Vec<u8>, QpackError> {
    if !buf.has_remaining() {
        return Err(QpackError::NeedMoreData);
    }
    let first = buf.chunk()[0];
    buf.advance(1);
    Ok(decode_prefixed_string(7, VALUE_HUFFMAN, first, buf)?)
}

/// Converts an absolute `base` relative to a pre-base relative index (RFC
/// 9204 §4.5.1.2's "Base minus Relative Index minus 1").
pub fn abs_from_relative(base: u64, relative: u64) -> Result<u64, QpackError> {
    base.checked_sub(1).and_then(|b| b.checked_sub(relative)).ok_or(QpackError::InvalidDynamicIndex)
}

/// The inverse of [`abs_from_relative`], used when encoding a reference.
pub fn relative_from_abs(base: u64, absolute: u64) -> Result<u64, QpackError> {
    base.checked_sub(1).and_then(|b| b.checked_sub(absolute)).ok_or(QpackError::InvalidDynamicIndex)
}

pub fn abs_from_post_base(base: u64, post_base: u64) -> u64 {
    base + post_base
}

pub fn post_base_from_abs(base: u64, absolute: u64) -> Result<u64, QpackError> {
    absolute.checked_sub(base).ok_or(QpackError::InvalidDynamicIndex)
}

/// RFC 9204 §4.5.1.1: encodes the Required Insert Count field, wrapping it
/// modulo `2 * max_entries` so the field stays small regardless of how many
/// insertions the table has actually seen over its lifetime.
pub fn encode_required_insert_count(req_insert_count: u64, max_entries: u64, out: &mut impl BufMut) -> Result<(), QpackError> {
    let encoded = if req_insert_count == 0 {
        0
    } else if max_entries == 0 {
        return Err(QpackError::BadRequiredInsertCount);
    } else {
        (req_insert_count % (2 * max_entries)) + 1
    };
    encode_prefixed_int(8, 0, encoded, out)?;
    Ok(())
}

/// The matching decode, needing the decoder's own view of `total_inserts`
/// (its current dynamic table's insertion count) to resolve the wrap.
pub fn decode_required_insert_count(buf: &mut impl Buf, max_entries: u64, total_inserts: u64) -> Result<u64, QpackError> {
    let encoded = decode_prefixed_int(8, 0, buf)?;
    if encoded == 0 {
        return Ok(0);
    }
    if max_entries == 0 {
        return Err(QpackError::BadRequiredInsertCount);
    }
    let full_range = 2 * max_entries;
    if encoded > full_range {
        return Err(QpackError::BadRequiredInsertCount);
    }
    let max_value = total_inserts + max_entries;
    let max_wrapped = (max_value / full_range) * full_range;
    let mut req_insert_count = max_wrapped + encoded - 1;
    if req_insert_count > max_value {
        if req_insert_count <= full_range {
            return Err(QpackError::BadRequiredInsertCount);
        }
        req_insert_count -= full_range;
    }
    if req_insert_count == 0 {
        return Err(QpackError::BadRequiredInsertCount);
    }
    Ok(req_insert_count)
}

/// RFC 9204 §4.5.1.2: Base is encoded as Required Insert Count plus or
/// minus a signed Delta Base, whichever direction keeps the magnitude
/// smaller.
pub fn encode_base(req_insert_count: u64, base: u64, out: &mut impl BufMut) -> Result<(), QpackError> {
    if base >= req_insert_count {
        encode_prefixed_int(7, 0, base - req_insert_count, out)?;
    } else {
        encode_prefixed_int(7, 0x80, req_insert_count - base - 1, out)?;
    }
    Ok(())
}

pub fn decode_base(buf: &mut impl Buf, req_insert_count: u64) -> Result<u64, QpackError> {
    if !buf.has_remaining() {
        return Err(QpackError::NeedMoreData);
    }
    let first = buf.chunk()[0];
    let sign = first & 0x80 != 0;
    buf.advance(1);
    let delta = decode_prefixed_int(7, first & 0x7F, buf)?;
    if sign {
        req_insert_count.checked_sub(delta).and_then(|b| b.checked_sub(1)).ok_or(QpackError::BadRequiredInsertCount)
    } else {
        req_insert_count.checked_add(delta).ok_or(QpackError::BadRequiredInsertCount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_repr(r: Representation) {
        let mut out = Vec::new();
        r.encode(&mut out).unwrap();
        let mut buf = out.as_slice();
        let decoded = Representation::decode(&mut buf).unwrap();
        assert_eq!(decoded, r);
        assert!(buf.is_empty());
    }

    #[test]
    fn all_representation_kinds_round_trip() {
        round_trip_repr(Representation::Indexed { static_table: true, index: 17 });
        round_trip_repr(Representation::Indexed { static_table: false, index: 0 });
        round_trip_repr(Representation::IndexedPostBase { index: 2 });
        round_trip_repr(Representation::LiteralWithNameRef {
            static_table: true,
            name_index: 1,
            never_indexed: false,
            value: b"/index.html".to_vec(),
        });
        round_trip_repr(Representation::LiteralWithPostBaseNameRef {
            name_index: 0,
            never_indexed: true,
            value: b"v".to_vec(),
        });
        round_trip_repr(Representation::LiteralWithLiteralName {
            never_indexed: false,
            name: b"x-bench".to_vec(),
            value: b"v".to_vec(),
        });
    }

    #[test]
    fn required_insert_count_round_trips_through_wrap() {
        // RFC 9204 §4.5.1.1's wrap recovery only works within one window of
        // MaxEntries behind the decoder's current insert count — a
        // reference older than that could never have survived eviction
        // anyway, so it's outside the protocol's valid state space.
        let max_entries = 10;
        for total_inserts in [0u64, 5, 19, 20, 21, 100] {
            let lower = total_inserts.saturating_sub(max_entries - 1);
            for req in lower..=total_inserts {
                let mut out = Vec::new();
                encode_required_insert_count(req, max_entries, &mut out).unwrap();
                let mut buf = out.as_slice();
                let decoded = decode_required_insert_count(&mut buf, max_entries, total_inserts).unwrap();
                assert_eq!(decoded, req, "total_inserts={total_inserts} req={req}");
            }
        }
    }

    #[test]
    fn base_round_trips_both_signs() {
        for (req, base) in [(5u64, 5u64), (5, 10), (10, 5), (0, 0)] {
            let mut out = Vec::new();
            encode_base(req, base, &mut out).unwrap();
            let mut buf = out.as_slice();
            assert_eq!(decode_base(&mut buf, req).unwrap(), base);
        }
    }

    #[test]
    fn relative_and_post_base_indexing_invert() {
        assert_eq!(abs_from_relative(10, 3).unwrap(), 6);
        assert_eq!(relative_from_abs(10, 6).unwrap(), 3);
        assert_eq!(abs_from_post_base(10, 2), 12);
        assert_eq!(post_base_from_abs(10, 12).unwrap(), 2);
    }
}
