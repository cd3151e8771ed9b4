//! The QPACK encoder half: turns a field section (header list) into a
//! header block plus the encoder-stream instructions needed to prime the
//! dynamic table for it, and tracks which entries each stream's block
//! referenced so they can be released once the decoder acknowledges.

use std::collections::HashMap;

use bytes::Bytes;

use super::dynamic_table::DynamicTable;
use super::error::QpackError;
use super::header_block::{self, Representation};
use super::instruction::{DecoderInstruction, EncoderInstruction};
use super::static_table;

pub struct EncodedSection {
    /// Bytes to append to the encoder stream, possibly empty.
    pub instructions: Vec<u8>,
    /// Bytes to send as the HEADERS frame's field-section payload.
    pub header_block: Vec<u8>,
}

enum Pending {
    Static(u64),
    Dynamic(u64),
    StaticNameLiteral(u64, Vec<u8>),
    DynamicNameLiteral(u64, Vec<u8>),
    LiteralLiteral(Vec<u8>, Vec<u8>),
}

pub struct QpackEncoder {
    table: DynamicTable,
    refs_by_stream: HashMap<u64, Vec<u64>>,
}

impl QpackEncoder {
    pub fn new(capacity: usize) -> Self {
        Self { table: DynamicTable::new(capacity), refs_by_stream: HashMap::new() }
    }

    /// Grows or shrinks the table, per the peer's
    /// `SETTINGS_QPACK_MAX_TABLE_CAPACITY` (capped there by the caller)
    /// returning the instruction to announce it.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<Vec<u8>, QpackError> {
        self.table.set_capacity(capacity)?;
        let mut out = Vec::new();
        EncoderInstruction::SetDynamicTableCapacity { capacity: capacity as u64 }.encode(&mut out)?;
        Ok(out)
    }

    /// Encodes one field section for `stream_id`. Exact static matches are
    /// always preferred; exact dynamic matches are reused; anything else is
    /// inserted into the dynamic table when it fits, falling back to a name
    /// reference or a fully literal representation otherwise.
    pub fn encode_field_section(
        &mut self,
        stream_id: u64,
        headers: &[(String, String)],
    ) -> Result<EncodedSection, QpackError> {
        let mut instructions = Vec::new();
        let mut refs = Vec::new();
        let mut pending = Vec::with_capacity(headers.len());

        for (name, value) in headers {
            if let Some(idx) = static_table::find_full(name, value) {
                pending.push(Pending::Static(idx));
                continue;
            }
            if let Some(abs) = self.table.find_full(name.as_bytes(), value.as_bytes()) {
                self.table.acquire(abs)?;
                refs.push(abs);
                pending.push(Pending::Dynamic(abs));
                continue;
            }

            let name_ref = static_table::find_name(name)
                .map(|i| (true, i))
                .or_else(|| self.table.find_name(name.as_bytes()).map(|i| (false, i)));

            let entry_size = DynamicTable::entry_size(name.as_bytes(), value.as_bytes());
            if entry_size <= self.table.capacity() && self.try_insert(&mut instructions, name, value, name_ref)? {
                let abs = self.table.inserted_count() - 1;
                self.table.acquire(abs)?;
                refs.push(abs);
                pending.push(Pending::Dynamic(abs));
                continue;
            }

            match name_ref {
                Some((true, idx)) => pending.push(Pending::StaticNameLiteral(idx, value.clone().into_bytes())),
                Some((false, idx)) => {
                    self.table.acquire(idx)?;
                    refs.push(idx);
                    pending.push(Pending::DynamicNameLiteral(idx, value.clone().into_bytes()));
                }
                None => pending.push(Pending::LiteralLiteral(name.clone().into_bytes(), value.clone().into_bytes())),
            }
        }

        let base = self.table.inserted_count();
        let req_insert_count = refs.iter().copied().max().map_or(0, |m| m + 1);

        let mut header_block = Vec::new();
        header_block::encode_required_insert_count(req_insert_count, self.table.max_entries(), &mut header_block)?;
        header_block::encode_base(req_insert_count, base, &mut header_block)?;
        for p in pending {
            let repr = match p {
                Pending::Static(idx) => Representation::Indexed { static_table: true, index: idx },
                Pending::Dynamic(abs) => {
                    Representation::Indexed { static_table: false, index: header_block::relative_from_abs(base, abs)? }
                }
                Pending::StaticNameLiteral(idx, value) => {
                    Representation::LiteralWithNameRef { static_table: true, name_index: idx, never_indexed: false, value }
                }
                Pending::DynamicNameLiteral(abs, value) => Representation::LiteralWithNameRef {
                    static_table: false,
                    name_index: header_block::relative_from_abs(base, abs)?,
                    never_indexed: false,
                    value,
                },
                Pending::LiteralLiteral(name, value) => {
                    Representation::LiteralWithLiteralName { never_indexed: false, name, value }
                }
            };
            repr.encode(&mut header_block)?;
        }

        if !refs.is_empty() {
            self.refs_by_stream.entry(stream_id).or_default().extend(refs);
        }
        Ok(EncodedSection { instructions, header_block })
    }

    fn try_insert(
        &mut self,
        instructions: &mut Vec<u8>,
        name: &str,
        value: &str,
        name_ref: Option<(bool, u64)>,
    ) -> Result<bool, QpackError> {
        let instr = match name_ref {
            Some((is_static, idx)) => {
                EncoderInstruction::InsertWithNameRef { is_static, name_index: idx, value: value.as_bytes().to_vec() }
            }
            None => EncoderInstruction::InsertWithoutNameRef {
                name: name.as_bytes().to_vec(),
                value: value.as_bytes().to_vec(),
            },
        };
        match self.table.insert(Bytes::copy_from_slice(name.as_bytes()), Bytes::copy_from_slice(value.as_bytes())) {
            Ok(_) => {
                instr.encode(instructions)?;
                Ok(true)
            }
            Err(QpackError::EvictionOfReferencedEntry) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Applies a decoder-stream instruction: releases the references a
    /// now-acknowledged or cancelled stream was holding.
    pub fn on_decoder_instruction(&mut self, instr: DecoderInstruction) {
        let stream_id = match instr {
            DecoderInstruction::SectionAcknowledgement { stream_id } => Some(stream_id),
            DecoderInstruction::StreamCancellation { stream_id } => Some(stream_id),
            DecoderInstruction::InsertCountIncrement { .. } => None,
        };
        if let Some(stream_id) = stream_id {
            if let Some(refs) = self.refs_by_stream.remove(&stream_id) {
                for abs in refs {
                    self.table.release(abs);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qpack::decoder::{DecodeOutcome, QpackDecoder};

    #[test]
    fn insert_and_reference_round_trips_through_a_decoder() {
        let mut enc = QpackEncoder::new(4096);
        let mut dec = QpackDecoder::new(4096);

        let section = enc.encode_field_section(4, &[("x-bench".to_string(), "v".to_string())]).unwrap();
        let mut buf = section.instructions.as_slice();
        while !buf.is_empty() {
            let instr = EncoderInstruction::decode(&mut buf).unwrap();
            dec.apply_encoder_instruction(instr).unwrap();
        }

        match dec.decode_field_section(4, &section.header_block).unwrap() {
            DecodeOutcome::Done { headers, .. } => {
                assert_eq!(headers, vec![(b"x-bench".to_vec(), b"v".to_vec())]);
            }
            DecodeOutcome::Blocked => panic!("table was primed before decoding, must not block"),
        }
    }

    #[test]
    fn repeated_header_reuses_the_dynamic_entry_without_reinserting() {
        let mut enc = QpackEncoder::new(4096);
        let first = enc.encode_field_section(0, &[("x-req-id".to_string(), "1".to_string())]).unwrap();
        assert!(!first.instructions.is_empty());
        let second = enc.encode_field_section(4, &[("x-req-id".to_string(), "1".to_string())]).unwrap();
        assert!(second.instructions.is_empty(), "second reference should need no new insertion");
    }

    #[test]
    fn well_known_header_uses_the_static_table_with_no_instructions() {
        let mut enc = QpackEncoder::new(4096);
        let section = enc.encode_field_section(0, &[(":method".to_string(), "GET".to_string())]).unwrap();
        assert!(section.instructions.is_empty());
    }
}
