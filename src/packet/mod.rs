//! L3 — packet codec: long/short header parse, version negotiation, retry
//! integrity, packet-number reconstruction.

pub mod error;
pub mod header;
pub mod packet;
pub mod types;

pub use error::PacketError;
pub use header::{Header, LongHeader, LongPacketType, RetryHeader, VERSION_1};
pub use packet::{decode_one, encode_one, DecodedPacket};
pub use types::*;
