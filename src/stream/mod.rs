//! L5 — stream engine: send/recv stream state machines, bidirectional
//! coupling, the stream-id layout, and the double-buffered scheduler.

pub mod bidi;
pub mod error;
pub mod id;
pub mod recv;
pub mod scheduler;
pub mod send;

pub use bidi::BidiStream;
pub use error::StreamError;
pub use id::{classify, compose, is_peer_initiated, Directionality};
pub use recv::{RecvStream, RecvState};
pub use scheduler::StreamScheduler;
pub use send::{SendStream, SendState};
