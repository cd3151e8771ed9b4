//! Receive-side stream state machine:
//! `Recv -> SizeKnown -> DataRecvd -> DataRead`, or
//! `Recv -> ResetRecvd -> ResetRead` once the peer resets the stream.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::frame::AckRangeSet;

use super::error::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvState {
    Recv,
    SizeKnown,
    DataRecvd,
    DataRead,
    ResetRecvd,
    ResetRead,
}

pub struct RecvStream {
    state: RecvState,
    /// Out-of-order chunks keyed by their stream offset, merged into
    /// `readable` as gaps close.
    pending: BTreeMap<u64, Bytes>,
    received: AckRangeSet,
    /// Contiguous bytes from offset 0 up to `read_offset`, ready for the
    /// application to consume.
    readable: BytesMut,
    read_offset: u64,
    final_size: Option<u64>,
    max_stream_data: u64,
    reset_error_code: Option<u64>,
}

impl RecvStream {
    pub fn new(initial_max_stream_data: u64) -> Self {
        Self {
            state: RecvState::Recv,
            pending: BTreeMap::new(),
            received: AckRangeSet::new(),
            readable: BytesMut::new(),
            read_offset: 0,
            final_size: None,
            max_stream_data: initial_max_stream_data,
            reset_error_code: None,
        }
    }

    pub fn state(&self) -> RecvState {
        self.state
    }

    pub fn max_stream_data(&self) -> u64 {
        self.max_stream_data
    }

    pub fn set_max_stream_data(&mut self, max: u64) {
        self.max_stream_data = self.max_stream_data.max(max);
    }

    /// Feeds a received `STREAM` frame's payload into the reassembly
    /// buffer, checking flow control and final-size consistency.
    pub fn on_data(&mut self, offset: u64, data: Bytes, fin: bool) -> Result<(), StreamError> {
        if matches!(self.state, RecvState::ResetRecvd | RecvState::ResetRead) {
            return Ok(()); // late frame after reset; nothing to do
        }
        let end = offset + data.len() as u64;
        if end > self.max_stream_data {
            return Err(StreamError::FlowControlViolation);
        }
        if let Some(final_size) = self.final_size {
            if end > final_size || (fin && end != final_size) {
                return Err(StreamError::FinalSizeMismatch);
            }
        }
        if fin {
            self.final_size = Some(end);
            if self.state == RecvState::Recv {
                self.state = RecvState::SizeKnown;
            }
        }

        if !data.is_empty() {
            for pn in offset..end {
                self.received.insert(pn);
            }
            self.pending.insert(offset, data);
            self.drain_contiguous()?;
        }

        if let Some(final_size) = self.final_size {
            if self.read_offset + self.readable.len() as u64 == final_size && self.pending.is_empty() {
                if self.state != RecvState::DataRead {
                    self.state = RecvState::DataRecvd;
                }
            }
        }
        Ok(())
    }

    fn drain_contiguous(&mut self) -> Result<(), StreamError> {
        loop {
            let next_contig = self.read_offset + self.readable.len() as u64;
            let Some((&offset, _)) = self.pending.iter().next() else { break };
            if offset > next_contig {
                break;
            }
            let (_, data) = self.pending.pop_first().expect("checked non-empty above");
            if offset == next_contig {
                self.readable.extend_from_slice(&data);
            } else {
                // overlaps already-buffered data; the part still held in
                // `readable` (i.e. not yet handed to the application) must
                // match, or the retransmission is inconsistent with what
                // this endpoint already reassembled.
                let overlap_start = offset.max(self.read_offset);
                let overlap_end = (offset + data.len() as u64).min(next_contig);
                if overlap_start < overlap_end {
                    let data_range = (overlap_start - offset) as usize..(overlap_end - offset) as usize;
                    let readable_range = (overlap_start - self.read_offset) as usize..(overlap_end - self.read_offset) as usize;
                    if data[data_range] != self.readable[readable_range] {
                        return Err(StreamError::FinalSizeMismatch);
                    }
                }
                let skip = (next_contig - offset) as usize;
                if skip < data.len() {
                    self.readable.extend_from_slice(&data[skip..]);
                }
            }
        }
        Ok(())
    }

    /// Takes whatever contiguous bytes are ready, advancing `read_offset`.
    pub fn read(&mut self) -> Option<Bytes> {
        if self.readable.is_empty() {
            if self.state == RecvState::DataRecvd {
                self.state = RecvState::DataRead;
            }
            return None;
        }
        let out = self.readable.split().freeze();
        self.read_offset += out.len() as u64;
        if self.final_size == Some(self.read_offset) {
            self.state = RecvState::DataRead;
        }
        Some(out)
    }

    pub fn on_reset(&mut self, error_code: u64, final_size: u64) -> Result<(), StreamError> {
        if let Some(existing) = self.final_size {
            if existing != final_size {
                return Err(StreamError::FinalSizeMismatch);
            }
        }
        // no FIN seen yet: the reset's final_size still must not contradict
        // the highest offset already observed from STREAM frames, whether
        // read out already or still sitting in the reassembly buffer.
        let highest_observed = self.read_offset + self.readable.len() as u64;
        let highest_pending = self.pending.iter().next_back().map(|(&offset, data)| offset + data.len() as u64).unwrap_or(0);
        if final_size < highest_observed.max(highest_pending) {
            return Err(StreamError::FinalSizeMismatch);
        }
        self.reset_error_code = Some(error_code);
        self.final_size = Some(final_size);
        self.state = RecvState::ResetRecvd;
        self.pending.clear();
        self.readable.clear();
        Ok(())
    }

    pub fn take_reset(&mut self) -> Option<u64> {
        if self.state == RecvState::ResetRecvd {
            self.state = RecvState::ResetRead;
            return self.reset_error_code;
        }
        None
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RecvState::DataRead | RecvState::ResetRead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_chunks_reassemble_in_offset_order() {
        let mut r = RecvStream::new(100);
        r.on_data(5, Bytes::from_static(b"world"), true).unwrap();
        assert!(r.read().is_none());
        r.on_data(0, Bytes::from_static(b"hello"), false).unwrap();
        assert_eq!(r.read().unwrap(), Bytes::from_static(b"helloworld"));
        assert_eq!(r.state(), RecvState::DataRead);
    }

    #[test]
    fn overlapping_retransmission_is_deduplicated() {
        let mut r = RecvStream::new(100);
        r.on_data(0, Bytes::from_static(b"hello"), false).unwrap();
        r.on_data(3, Bytes::from_static(b"lo world"), true).unwrap();
        assert_eq!(r.read().unwrap(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn final_size_mismatch_is_rejected() {
        let mut r = RecvStream::new(100);
        r.on_data(0, Bytes::from_static(b"hi"), true).unwrap();
        assert_eq!(r.on_data(5, Bytes::from_static(b"x"), false), Err(StreamError::FinalSizeMismatch));
    }

    #[test]
    fn flow_control_violation_is_rejected() {
        let mut r = RecvStream::new(4);
        assert_eq!(r.on_data(0, Bytes::from_static(b"hello"), false), Err(StreamError::FlowControlViolation));
    }
}
