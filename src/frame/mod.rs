//! L4 — frame codec: the tagged-union [`Frame`] type, its encode/decode,
//! and the [`AckRangeSet`] data model shared by ACK generation and
//! processing.

pub mod ack;
pub mod error;
pub mod frame;

pub use ack::{AckRangeSet, PnRange};
pub use error::FrameError;
pub use frame::{EcnCounts, Frame};
