//! The QPACK decoder half: applies encoder-stream instructions to keep a
//! mirror of the encoder's dynamic table, and turns a header block back
//! into a field section — gating on the Required Insert Count so a block
//! referencing an insertion that hasn't arrived yet blocks that stream
//! instead of misinterpreting stale table state.

use super::dynamic_table::DynamicTable;
use super::error::QpackError;
use super::header_block::{self, Representation};
use super::instruction::{DecoderInstruction, EncoderInstruction};
use super::static_table;

pub enum DecodeOutcome {
    Done { headers: Vec<(Vec<u8>, Vec<u8>)>, ack: DecoderInstruction },
    /// The block names an insertion the decoder hasn't seen yet; the caller
    /// must hold `data` and retry once more encoder-stream instructions
    /// have arrived (RFC 9204 §2.1.2's blocked streams).
    Blocked,
}

pub struct QpackDecoder {
    table: DynamicTable,
}

impl QpackDecoder {
    pub fn new(capacity: usize) -> Self {
        Self { table: DynamicTable::new(capacity) }
    }

    pub fn apply_encoder_instruction(&mut self, instr: EncoderInstruction) -> Result<(), QpackError> {
        match instr {
            EncoderInstruction::SetDynamicTableCapacity { capacity } => {
                self.table.set_capacity(capacity as usize)?;
            }
            EncoderInstruction::InsertWithNameRef { is_static, name_index, value } => {
                let name = if is_static {
                    static_table::get(name_index).ok_or(QpackError::InvalidStaticIndex)?.0.as_bytes().to_vec()
                } else {
                    self.table.get(name_index)?.0.to_vec()
                };
                self.table.insert(name.into(), value.into())?;
            }
            EncoderInstruction::InsertWithoutNameRef { name, value } => {
                self.table.insert(name.into(), value.into())?;
            }
            EncoderInstruction::Duplicate { index } => {
                self.table.duplicate(index)?;
            }
        }
        Ok(())
    }

    /// The Insert Count Increment instruction the decoder stream sends
    /// after applying one or more encoder instructions, letting the
    /// encoder know it can stop counting on an acknowledgement to learn
    /// the table has grown (RFC 9204 §4.4.3).
    pub fn pending_insert_count_increment(&self, last_acknowledged: u64) -> Option<DecoderInstruction> {
        let increment = self.table.inserted_count() - last_acknowledged;
        (increment > 0).then_some(DecoderInstruction::InsertCountIncrement { increment })
    }

    pub fn decode_field_section(&mut self, stream_id: u64, data: &[u8]) -> Result<DecodeOutcome, QpackError> {
        let mut buf = data;
        let max_entries = self.table.max_entries();
        let total_inserts = self.table.inserted_count();
        let req_insert_count = header_block::decode_required_insert_count(&mut buf, max_entries, total_inserts)?;
        if req_insert_count > total_inserts {
            return Ok(DecodeOutcome::Blocked);
        }
        let base = header_block::decode_base(&mut buf, req_insert_count)?;

        let mut headers = Vec::new();
        while !buf.is_empty() {
            let repr = Representation::decode(&mut buf)?;
            headers.push(self.resolve(repr, base)?);
        }
        Ok(DecodeOutcome::Done { headers, ack: DecoderInstruction::SectionAcknowledgement { stream_id } })
    }

    fn resolve(&self, repr: Representation, base: u64) -> Result<(Vec<u8>, Vec<u8>), QpackError> {
        match repr {
            Representation::Indexed { static_table: true, index } => {
                let (n, v) = static_table::get(index).ok_or(QpackError::InvalidStaticIndex)?;
                Ok((n.as_bytes().to_vec(), v.as_bytes().to_vec()))
            }
            Representation::Indexed { static_table: false, index } => {
                let abs = header_block::abs_from_relative(base, index)?;
                let (n, v) = self.table.get(abs)?;
                Ok((n.to_vec(), v.to_vec()))
            }
            Representation::IndexedPostBase { index } => {
                let abs = header_block::abs_from_post_base(base, index);
                let (n, v) = self.table.get(abs)?;
                Ok((n.to_vec(), v.to_vec()))
            }
            Representation::LiteralWithNameRef { static_table: true, name_index, value, .. } => {
                let (n, _) = static_table::get(name_index).ok_or(QpackError::InvalidStaticIndex)?;
                Ok((n.as_bytes().to_vec(), value))
            }
            Representation::LiteralWithNameRef { static_table: false, name_index, value, .. } => {
                let abs = header_block::abs_from_relative(base, name_index)?;
                let (n, _) = self.table.get(abs)?;
                Ok((n.to_vec(), value))
            }
            Representation::LiteralWithPostBaseNameRef { name_index, value, .. } => {
                let abs = header_block::abs_from_post_base(base, name_index);
                let (n, _) = self.table.get(abs)?;
                Ok((n.to_vec(), value))
            }
            Representation::LiteralWithLiteralName { name, value, .. } => Ok((name, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qpack::encoder::QpackEncoder;

    #[test]
    fn blocked_stream_unblocks_once_instructions_are_applied() {
        let mut enc = QpackEncoder::new(4096);
        let mut dec = QpackDecoder::new(4096);

        let section = enc.encode_field_section(0, &[("x-new".to_string(), "v".to_string())]).unwrap();

        // Decoding before the encoder-stream instructions arrive must
        // report Blocked rather than mis-resolving a dynamic reference.
        match dec.decode_field_section(0, &section.header_block).unwrap() {
            DecodeOutcome::Blocked => {}
            DecodeOutcome::Done { .. } => panic!("must block without the matching insertion"),
        }

        let mut buf = section.instructions.as_slice();
        while !buf.is_empty() {
            let instr = EncoderInstruction::decode(&mut buf).unwrap();
            dec.apply_encoder_instruction(instr).unwrap();
        }

        match dec.decode_field_section(0, &section.header_block).unwrap() {
            DecodeOutcome::Done { headers, .. } => {
                assert_eq!(headers, vec![(b"x-new".to_vec(), b"v".to_vec())])
            }
            DecodeOutcome::Blocked => panic!("should decode now that the table is primed"),
        }
    }

    #[test]
    fn static_only_section_never_blocks() {
        let mut dec = QpackDecoder::new(4096);
        let mut enc = QpackEncoder::new(4096);
        let section = enc.encode_field_section(0, &[(":method".to_string(), "GET".to_string())]).unwrap();
        assert!(matches!(dec.decode_field_section(0, &section.header_block).unwrap(), DecodeOutcome::Done { .. }));
    }
}
