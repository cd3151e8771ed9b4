//! Send-side stream state machine:
//! `Ready -> Send -> DataSent -> DataRecvd`, or `-> ResetSent -> ResetRecvd`
//! at any point before the peer has acknowledged everything.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::frame::AckRangeSet;

use super::error::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Ready,
    Send,
    DataSent,
    DataRecvd,
    ResetSent,
    ResetRecvd,
}

struct Chunk {
    offset: u64,
    data: Bytes,
}

pub struct SendStream {
    state: SendState,
    /// Data handed to us by the application, retained until acknowledged
    /// so it can be resent on loss.
    chunks: VecDeque<Chunk>,
    /// Offset of the first byte not yet written by the application.
    write_offset: u64,
    /// Offset of the first byte not yet handed to the packetizer.
    send_offset: u64,
    final_size: Option<u64>,
    acked: AckRangeSet,
    /// Byte ranges the loss detector reported lost and that must be resent
    /// ahead of fresh data.
    lost: AckRangeSet,
    max_stream_data: u64,
}

impl SendStream {
    pub fn new(initial_max_stream_data: u64) -> Self {
        Self {
            state: SendState::Ready,
            chunks: VecDeque::new(),
            write_offset: 0,
            send_offset: 0,
            final_size: None,
            acked: AckRangeSet::new(),
            lost: AckRangeSet::new(),
            max_stream_data: initial_max_stream_data,
        }
    }

    pub fn state(&self) -> SendState {
        self.state
    }

    pub fn set_max_stream_data(&mut self, max: u64) {
        self.max_stream_data = self.max_stream_data.max(max);
    }

    /// Buffers application data for sending. `fin` marks the final offset.
    pub fn write(&mut self, data: Bytes, fin: bool) -> Result<(), StreamError> {
        if matches!(self.state, SendState::ResetSent | SendState::ResetRecvd) {
            return Err(StreamError::AlreadyClosed);
        }
        if let Some(final_size) = self.final_size {
            if !data.is_empty() || fin {
                return Err(StreamError::FinalSizeMismatch);
            }
            let _ = final_size;
        }
        if self.state == SendState::Ready && (!data.is_empty() || fin) {
            self.state = SendState::Send;
        }
        if !data.is_empty() {
            let offset = self.write_offset;
            self.write_offset += data.len() as u64;
            self.chunks.push_back(Chunk { offset, data });
        }
        if fin {
            self.final_size = Some(self.write_offset);
        }
        Ok(())
    }

    /// Bytes that may be sent right now without exceeding the peer's flow
    /// control limit: loss-retransmits first, then fresh data.
    pub fn blocked_by_flow_control(&self) -> bool {
        self.send_offset >= self.max_stream_data && self.has_pending()
    }

    fn has_pending(&self) -> bool {
        !self.lost.is_empty() || self.send_offset < self.write_offset || self.final_size.is_some() && self.send_offset == self.write_offset && self.state == SendState::Send
    }

    /// Emits the next piece of data to put in a `STREAM` frame, up to
    /// `max_len` bytes, honoring the peer's stream data limit. Returns
    /// `(offset, data, fin)`.
    pub fn emit(&mut self, max_len: usize) -> Option<(u64, Bytes, bool)> {
        if matches!(self.state, SendState::ResetSent | SendState::ResetRecvd) {
            return None;
        }
        let budget = self.max_stream_data.saturating_sub(self.send_offset);
        if budget == 0 && self.send_offset < self.write_offset {
            return None; // flow-control blocked
        }

        // A FIN with no trailing bytes (including the empty-stream case)
        // never has a chunk to find below; emit it directly, once.
        if self.send_offset == self.write_offset
            && self.final_size == Some(self.send_offset)
            && self.state == SendState::Send
        {
            self.state = SendState::DataSent;
            return Some((self.send_offset, Bytes::new(), true));
        }

        // Find the chunk covering `send_offset`.
        let offset = self.send_offset;
        let chunk = self.chunks.iter().find(|c| c.offset <= offset && offset < c.offset + c.data.len() as u64)?;
        let within = (offset - chunk.offset) as usize;
        let available = (chunk.data.len() - within).min(max_len).min(budget as usize);
        if available == 0 {
            return None;
        }
        let data = chunk.data.slice(within..within + available);
        self.send_offset += available as u64;

        let fin = self.final_size == Some(self.send_offset);
        if self.send_offset == self.write_offset && self.final_size.is_some() {
            self.state = SendState::DataSent;
        }
        Some((offset, data, fin))
    }

    /// Marks `[offset, offset+len)` acknowledged, releasing buffered data
    /// once the whole stream is acked.
    pub fn on_ack(&mut self, offset: u64, len: u64) {
        if len == 0 && self.final_size != Some(0) {
            return;
        }
        for pn in offset..offset + len {
            self.acked.insert(pn);
        }
        self.lost.prune_below(offset + len);
        self.chunks.retain(|c| {
            let end = c.offset + c.data.len() as u64;
            !(self.acked.contains(c.offset) && self.acked.contains(end.saturating_sub(1)))
        });
        if self.state == SendState::DataSent {
            if let Some(final_size) = self.final_size {
                if final_size == 0 || self.acked.largest() == Some(final_size - 1) {
                    self.state = SendState::DataRecvd;
                }
            }
        }
    }

    /// Marks `[offset, offset+len)` lost, queuing it ahead of fresh data.
    pub fn on_loss(&mut self, offset: u64, len: u64) {
        for pn in offset..offset + len {
            if !self.acked.contains(pn) {
                self.lost.insert(pn);
            }
        }
    }

    /// Abandons the stream, returning the `final_size` a RESET_STREAM frame
    /// must carry (RFC 9000 §19.4: the number of bytes already handed to the
    /// packetizer). Returns `None` if the stream was already reset, so a
    /// caller never schedules a duplicate frame.
    pub fn reset(&mut self) -> Option<u64> {
        if matches!(self.state, SendState::ResetSent | SendState::ResetRecvd) {
            return None;
        }
        self.state = SendState::ResetSent;
        self.chunks.clear();
        Some(self.send_offset)
    }

    pub fn on_reset_acked(&mut self) {
        if self.state == SendState::ResetSent {
            self.state = SendState::ResetRecvd;
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SendState::DataRecvd | SendState::ResetRecvd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_respects_flow_control_limit() {
        let mut s = SendStream::new(4);
        s.write(Bytes::from_static(b"hello"), true).unwrap();
        let (offset, data, fin) = s.emit(100).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(&data[..], b"hell");
        assert!(!fin);
        assert!(s.emit(100).is_none());
    }

    #[test]
    fn full_ack_transitions_to_data_recvd() {
        let mut s = SendStream::new(100);
        s.write(Bytes::from_static(b"hi"), true).unwrap();
        let (offset, data, fin) = s.emit(100).unwrap();
        assert!(fin);
        assert_eq!(s.state(), SendState::DataSent);
        s.on_ack(offset, data.len() as u64);
        assert_eq!(s.state(), SendState::DataRecvd);
    }

    #[test]
    fn zero_length_fin_emits_and_acks_without_a_chunk() {
        let mut s = SendStream::new(100);
        s.write(Bytes::new(), true).unwrap();
        let (offset, data, fin) = s.emit(100).unwrap();
        assert_eq!(offset, 0);
        assert!(data.is_empty());
        assert!(fin);
        assert_eq!(s.state(), SendState::DataSent);
        s.on_ack(offset, data.len() as u64);
        assert_eq!(s.state(), SendState::DataRecvd);
    }

    #[test]
    fn reset_short_circuits_further_writes() {
        let mut s = SendStream::new(100);
        s.reset();
        assert_eq!(s.write(Bytes::from_static(b"x"), false), Err(StreamError::AlreadyClosed));
        s.on_reset_acked();
        assert_eq!(s.state(), SendState::ResetRecvd);
        assert!(s.is_terminal());
    }
}
