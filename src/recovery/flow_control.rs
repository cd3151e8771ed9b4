//! Connection- and stream-level flow control (RFC 9000 §4): a send side
//! tracks how much it is allowed to send before the peer raises a limit; a
//! receive side tracks how much it has consumed and decides when to raise
//! its own limit and send `MAX_DATA`/`MAX_STREAM_DATA`.

use std::collections::HashMap;

use crate::error::{require, QuicheResult, TransportErrorCode};
use crate::frame::Frame;

/// One direction of one scope (the connection, or a single stream)'s
/// outgoing flow control: bytes sent so far against a limit the peer
/// raises over time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SendLimit {
    pub sent: u64,
    pub max: u64,
}

impl SendLimit {
    pub fn new(initial_max: u64) -> Self {
        Self { sent: 0, max: initial_max }
    }

    pub fn available(&self) -> u64 {
        self.max.saturating_sub(self.sent)
    }

    pub fn is_blocked(&self) -> bool {
        self.available() == 0
    }

    /// Records `n` more bytes sent. Fails with a protocol violation if the
    /// caller ever tries to send past the advertised limit — callers should
    /// clamp writes to [`Self::available`] first, so this is a defensive
    /// double-check rather than the normal path.
    pub fn reserve(&mut self, n: u64) -> QuicheResult<()> {
        require(n <= self.available(), TransportErrorCode::FlowControlError, "send exceeds flow control limit")?;
        self.sent += n;
        Ok(())
    }

    /// Raises the limit if the peer's new value is higher; per RFC 9000
    /// §4.1, limits only ever move up.
    pub fn on_max_received(&mut self, new_max: u64) {
        self.max = self.max.max(new_max);
    }
}

/// The receive side: bytes received so far, current limit, and the
/// threshold at which the limit gets raised and a `MAX_DATA`/
/// `MAX_STREAM_DATA` frame queued.
#[derive(Debug, Clone, Copy)]
pub struct RecvLimit {
    pub received: u64,
    pub max: u64,
    window: u64,
}

impl RecvLimit {
    pub fn new(initial_max: u64) -> Self {
        Self { received: 0, max: initial_max, window: initial_max }
    }

    /// Accounts for `n` newly received bytes at absolute offset range end
    /// `highest_offset_seen`. Rejects data beyond the advertised limit.
    pub fn on_received(&mut self, highest_offset_seen: u64) -> QuicheResult<()> {
        require(
            highest_offset_seen <= self.max,
            TransportErrorCode::FlowControlError,
            "peer sent beyond advertised flow control limit",
        )?;
        self.received = self.received.max(highest_offset_seen);
        Ok(())
    }

    /// Once the consumed window crosses half the granted window, raise the
    /// limit by another full window and report the new value so the caller
    /// can queue the update frame. A common, conservative auto-tuning rule
    /// (matching e.g. quiche/quinn's default).
    pub fn maybe_raise(&mut self) -> Option<u64> {
        if self.received * 2 >= self.max {
            self.max += self.window;
            Some(self.max)
        } else {
            None
        }
    }
}

/// Connection-scoped flow control plus one [`SendLimit`]/[`RecvLimit`] pair
/// per stream, keyed by stream id.
#[derive(Debug)]
pub struct FlowController {
    pub conn_send: SendLimit,
    pub conn_recv: RecvLimit,
    stream_send: HashMap<u64, SendLimit>,
    stream_recv: HashMap<u64, RecvLimit>,
}

impl FlowController {
    pub fn new(initial_max_data_local: u64, initial_max_data_remote: u64) -> Self {
        Self {
            conn_send: SendLimit::new(initial_max_data_remote),
            conn_recv: RecvLimit::new(initial_max_data_local),
            stream_send: HashMap::new(),
            stream_recv: HashMap::new(),
        }
    }

    pub fn register_send_stream(&mut self, stream_id: u64, initial_max: u64) {
        self.stream_send.insert(stream_id, SendLimit::new(initial_max));
    }

    pub fn register_recv_stream(&mut self, stream_id: u64, initial_max: u64) {
        self.stream_recv.insert(stream_id, RecvLimit::new(initial_max));
    }

    /// Bytes this stream may send right now, bounded by both the
    /// per-stream and connection-wide limits.
    pub fn send_available(&self, stream_id: u64) -> u64 {
        let stream = self.stream_send.get(&stream_id).map_or(0, SendLimit::available);
        stream.min(self.conn_send.available())
    }

    pub fn on_stream_bytes_sent(&mut self, stream_id: u64, n: u64) -> QuicheResult<()> {
        if let Some(limit) = self.stream_send.get_mut(&stream_id) {
            limit.reserve(n)?;
        }
        self.conn_send.reserve(n)
    }

    pub fn on_stream_bytes_received(&mut self, stream_id: u64, highest_offset_seen: u64) -> QuicheResult<()> {
        if let Some(limit) = self.stream_recv.get_mut(&stream_id) {
            let delta = highest_offset_seen.saturating_sub(limit.received);
            limit.on_received(highest_offset_seen)?;
            self.conn_recv.on_received(self.conn_recv.received + delta)?;
        }
        Ok(())
    }

    /// Drains any `MAX_STREAM_DATA`/`MAX_DATA` frames now due, and any
    /// `STREAM_DATA_BLOCKED`/`DATA_BLOCKED` a blocked send side should emit.
    pub fn drain_updates(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        if let Some(new_max) = self.conn_recv.maybe_raise() {
            out.push(Frame::MaxData { max: new_max });
        }
        for (&stream_id, limit) in self.stream_recv.iter_mut() {
            if let Some(new_max) = limit.maybe_raise() {
                out.push(Frame::MaxStreamData { stream_id, max: new_max });
            }
        }
        out
    }

    pub fn on_max_data(&mut self, max: u64) {
        self.conn_send.on_max_received(max);
    }

    pub fn on_max_stream_data(&mut self, stream_id: u64, max: u64) {
        if let Some(limit) = self.stream_send.get_mut(&stream_id) {
            limit.on_max_received(max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_is_capped_by_the_tighter_of_stream_and_connection_limits() {
        let mut fc = FlowController::new(1000, 1000);
        fc.register_send_stream(4, 100);
        assert_eq!(fc.send_available(4), 100);
        fc.conn_send.reserve(950).unwrap();
        assert_eq!(fc.send_available(4), 50);
    }

    #[test]
    fn reserving_past_the_limit_is_a_flow_control_error() {
        let mut limit = SendLimit::new(10);
        assert!(limit.reserve(11).is_err());
        assert!(limit.reserve(10).is_ok());
    }

    #[test]
    fn recv_limit_raises_once_half_consumed() {
        let mut limit = RecvLimit::new(100);
        assert!(limit.on_received(40).is_ok());
        assert!(limit.maybe_raise().is_none());
        assert!(limit.on_received(60).is_ok());
        assert_eq!(limit.maybe_raise(), Some(200));
    }

    #[test]
    fn receiving_past_advertised_limit_is_an_error() {
        let mut limit = RecvLimit::new(100);
        assert!(limit.on_received(101).is_err());
    }
}
