//! Bidirectional stream coupling: one [`SendStream`] and one
//! [`RecvStream`] glued together. The pair closes only once *both*
//! sub-state-machines reach a terminal state; a reset on either side is
//! independent of the other.

use bytes::Bytes;

use super::error::StreamError;
use super::recv::{RecvState, RecvStream};
use super::send::{SendState, SendStream};

/// Either half of a stream may be send-only, recv-only, or both, depending
/// on directionality (uni-directional streams only ever populate one
/// side). `BidiStream` always carries both halves; a uni-directional
/// stream is modeled one layer up by simply never using the absent half.
pub struct BidiStream {
    pub send: SendStream,
    pub recv: RecvStream,
    close_notified: bool,
}

impl BidiStream {
    pub fn new(initial_max_send: u64, initial_max_recv: u64) -> Self {
        Self {
            send: SendStream::new(initial_max_send),
            recv: RecvStream::new(initial_max_recv),
            close_notified: false,
        }
    }

    /// A send-only (unidirectional, locally-initiated) stream: the recv
    /// half starts already in its terminal `DataRead` state so
    /// [`is_closed`](Self::is_closed) only waits on the send half.
    pub fn send_only(initial_max_send: u64) -> Self {
        let mut s = Self::new(initial_max_send, 0);
        s.recv.on_data(0, Bytes::new(), true).expect("empty FIN always accepted");
        let _ = s.recv.read();
        s
    }

    /// A recv-only (unidirectional, peer-initiated) stream: the send half
    /// starts already terminal.
    pub fn recv_only(initial_max_recv: u64) -> Self {
        let mut s = Self::new(0, initial_max_recv);
        s.send.write(Bytes::new(), true).expect("empty FIN always accepted");
        let (offset, data, _fin) = s.send.emit(0).expect("fin-only emit always succeeds once");
        s.send.on_ack(offset, data.len() as u64);
        s
    }

    /// True once both halves have reached a terminal state. The caller
    /// (Connection) should invoke its close-callback exactly once on the
    /// transition into this state — tracked here via `close_notified` so a
    /// caller polling repeatedly doesn't double-fire.
    pub fn is_closed(&self) -> bool {
        self.send.is_terminal() && self.recv.is_terminal()
    }

    /// Returns `true` the first time both halves become terminal; `false`
    /// on every subsequent call, so the connection can drive a one-shot
    /// close-callback even though this method may be polled every tick.
    pub fn poll_close_event(&mut self) -> bool {
        if !self.close_notified && self.is_closed() {
            self.close_notified = true;
            return true;
        }
        false
    }

    /// Abandons the send half locally. Returns the `final_size` the caller
    /// must put on the outgoing RESET_STREAM frame, or `None` if the send
    /// half was already reset (so no duplicate frame gets scheduled).
    pub fn reset_send(&mut self) -> Option<u64> {
        self.send.reset()
    }

    /// The peer asked us to stop sending; reset our own send half in
    /// response and return the `final_size` for the RESET_STREAM that
    /// notifies it, same as [`reset_send`](Self::reset_send).
    pub fn on_stop_sending(&mut self) -> Result<Option<u64>, StreamError> {
        Ok(self.send.reset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_only_once_both_halves_terminal() {
        let mut s = BidiStream::new(100, 100);
        s.send.write(Bytes::from_static(b"hi"), true).unwrap();
        let (offset, data, _) = s.send.emit(100).unwrap();
        s.send.on_ack(offset, data.len() as u64);
        assert!(!s.is_closed(), "recv half still open");

        s.recv.on_data(0, Bytes::from_static(b"bye"), true).unwrap();
        s.recv.read();
        assert!(s.is_closed());
        assert!(s.poll_close_event(), "first poll after closing fires once");
        assert!(!s.poll_close_event(), "second poll does not re-fire");
    }

    #[test]
    fn reset_of_one_side_does_not_affect_the_other() {
        let mut s = BidiStream::new(100, 100);
        s.reset_send();
        assert_eq!(s.send.state(), SendState::ResetSent);
        assert_eq!(s.recv.state(), RecvState::Recv);
    }
}
