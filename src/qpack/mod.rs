//! L9 — QPACK (RFC 9204): HTTP/3's header compression scheme. Unlike
//! HPACK, the dynamic table is shared across streams via two dedicated
//! unidirectional instruction streams rather than being folded into the
//! header-carrying stream itself, which is what lets header blocks decode
//! out of order without serializing on one stream's delivery — at the cost
//! of a stream blocking when it outruns the instructions that prime the
//! table entries it references.

mod dynamic_table;
mod error;
mod header_block;
mod instruction;
mod static_table;

pub mod decoder;
pub mod encoder;

pub use decoder::{DecodeOutcome, QpackDecoder};
pub use encoder::{EncodedSection, QpackEncoder};
pub use error::QpackError;
pub use instruction::{DecoderInstruction, EncoderInstruction};
