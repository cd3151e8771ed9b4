//! L8 — HTTP/3 (RFC 9114): the mapping from request/response semantics onto
//! QUIC streams. This layer owns framing and stream roles; it hands
//! QPACK-encoded field sections to [`crate::qpack`] rather than
//! interpreting header bytes itself, and leaves stream and flow-control
//! bookkeeping to [`crate::stream`] and [`crate::recovery`] one layer down.

pub mod error;
pub mod frame;
pub mod settings;
pub mod stream;

pub use error::H3Error;
pub use frame::{decode_one, encode_data, encode_headers, encode_settings, DecodedFrame, H3Frame};
pub use settings::Settings;
pub use stream::{decode_preamble, ControlStreamPolicy, UniStreamType};
