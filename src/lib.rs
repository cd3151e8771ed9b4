//! `quiche_core`: a sans-io QUIC (RFC 9000/9001/9002) transport plus
//! HTTP/3 (RFC 9114) and QPACK (RFC 9204) core. Every layer exposes plain
//! synchronous functions over owned buffers — sockets, timers, and task
//! scheduling are an external event loop's job, not this crate's.
//!
//! Layout mirrors the dependency order bottom to top:
//!
//! - [`buffer`] — chunk pool, ring buffer, shared spans (L0)
//! - [`codec`] — varint, QPACK prefixed-integer and string-literal codecs (L1)
//! - [`crypto`] — per-level AEAD and header protection (L2)
//! - [`packet`] — header parse, version negotiation, retry integrity (L3)
//! - [`frame`] — the QUIC frame tagged union and `ACK` range set (L4)
//! - [`stream`] — send/recv stream state machines and the scheduler (L5)
//! - [`recovery`] — RTT, loss detection, congestion control, flow control (L6)
//! - [`connection`] — the orchestrator an event loop drives (L7)
//! - [`h3`] — HTTP/3 framing and stream roles (L8)
//! - [`qpack`] — header compression shared across streams (L9)

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod h3;
pub mod packet;
pub mod qpack;
pub mod recovery;
pub mod stream;

pub use error::{QuicheError, QuicheResult};
