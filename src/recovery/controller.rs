//! Send controller: owns the three packet-number spaces, the congestion
//! and pacing state, and connection-level flow control, and decides what
//! goes into the next outgoing packet.

use std::time::{Duration, Instant};

use crate::frame::{AckRangeSet, Frame};
use crate::packet::PacketNumberSpace;
use crate::stream::StreamScheduler;

use super::congestion::NewRenoController;
use super::flow_control::FlowController;
use super::loss::{detect_lost_packets, is_persistent_congestion};
use super::pacer::Pacer;
use super::pn_space::{PnSpaceState, SentPacket};
use super::rtt::RttEstimator;

/// Typical minimum datagram size a path is assumed to support (RFC 9000
/// §14.1) until path MTU discovery (out of scope) raises it.
pub const MIN_DATAGRAM_SIZE: usize = 1200;

#[derive(Debug, Default)]
struct Space {
    pn: PnSpaceState,
    ack_elicited_since_ack: bool,
    largest_ack_sent: Option<u64>,
}

pub struct SendController {
    initial: Space,
    handshake: Space,
    application: Space,
    rtt: RttEstimator,
    congestion: NewRenoController,
    pacer: Pacer,
    pub flow: FlowController,
    pto_count: u32,
    handshake_confirmed: bool,
}

pub struct Outgoing {
    pub frames: Vec<Frame>,
    pub ack_eliciting: bool,
}

impl SendController {
    pub fn new(now: Instant, max_ack_delay: Duration, initial_max_data_local: u64, initial_max_data_remote: u64) -> Self {
        Self {
            initial: Space::default(),
            handshake: Space::default(),
            application: Space::default(),
            rtt: RttEstimator::new(max_ack_delay),
            congestion: NewRenoController::new(MIN_DATAGRAM_SIZE),
            pacer: Pacer::new(now, MIN_DATAGRAM_SIZE * 10),
            flow: FlowController::new(initial_max_data_local, initial_max_data_remote),
            pto_count: 0,
            handshake_confirmed: false,
        }
    }

    fn space(&mut self, which: PacketNumberSpace) -> &mut Space {
        match which {
            PacketNumberSpace::Initial => &mut self.initial,
            PacketNumberSpace::Handshake => &mut self.handshake,
            PacketNumberSpace::Application => &mut self.application,
        }
    }

    pub fn on_handshake_confirmed(&mut self) {
        self.handshake_confirmed = true;
    }

    /// Allocates the next packet number in `which` without recording
    /// anything sent yet — used when the caller needs the number before
    /// the packet is fully encoded (its length feeds the AEAD nonce and
    /// the wire packet-number length).
    pub fn next_pn(&mut self, which: PacketNumberSpace) -> u64 {
        self.space(which).pn.next_packet_number()
    }

    /// The largest packet number the peer has acknowledged in `which`, used
    /// to pick the wire packet-number encoding length (RFC 9000 §17.1).
    pub fn largest_acked(&self, which: PacketNumberSpace) -> Option<u64> {
        match which {
            PacketNumberSpace::Initial => self.initial.pn.largest_acked,
            PacketNumberSpace::Handshake => self.handshake.pn.largest_acked,
            PacketNumberSpace::Application => self.application.pn.largest_acked,
        }
    }

    pub fn largest_received_signed(&self, which: PacketNumberSpace) -> i64 {
        match which {
            PacketNumberSpace::Initial => self.initial.pn.largest_received_signed(),
            PacketNumberSpace::Handshake => self.handshake.pn.largest_received_signed(),
            PacketNumberSpace::Application => self.application.pn.largest_received_signed(),
        }
    }

    pub fn bytes_in_flight(&self) -> usize {
        self.initial.pn.bytes_in_flight + self.handshake.pn.bytes_in_flight + self.application.pn.bytes_in_flight
    }

    pub fn congestion_window(&self) -> usize {
        self.congestion.cwnd()
    }

    pub fn can_send(&mut self, now: Instant, bytes: usize) -> bool {
        self.congestion.can_send(self.bytes_in_flight(), bytes)
            && self.pacer.can_send(now, self.congestion.cwnd(), self.rtt.smoothed_rtt(), bytes)
    }

    /// Records that `pn` in `which` was just received, for later ACK
    /// generation.
    pub fn on_packet_received(&mut self, which: PacketNumberSpace, pn: u64, ack_eliciting: bool) {
        let space = self.space(which);
        space.pn.on_packet_received(pn, ack_eliciting);
        if ack_eliciting {
            space.ack_elicited_since_ack = true;
        }
    }

    /// An `ACK` frame due for `which`, if there is unacknowledged
    /// ack-eliciting data to acknowledge (RFC 9000 §13.2.1).
    pub fn pending_ack(&mut self, which: PacketNumberSpace, ack_delay: u64) -> Option<Frame> {
        let space = self.space(which);
        if !space.ack_elicited_since_ack || space.pn.received.is_empty() {
            return None;
        }
        space.ack_elicited_since_ack = false;
        space.largest_ack_sent = space.pn.received.largest();
        Some(Frame::Ack { ranges: space.pn.received.clone(), ack_delay, ecn_counts: None })
    }

    /// Allocates the next packet number in `which` and records the packet
    /// as sent and in flight.
    pub fn record_sent(
        &mut self,
        which: PacketNumberSpace,
        now: Instant,
        bytes: usize,
        ack_eliciting: bool,
        frames: Vec<Frame>,
    ) -> u64 {
        let pn = self.next_pn(which);
        self.record_sent_at(which, pn, now, bytes, ack_eliciting, frames);
        pn
    }

    /// Records a packet already allocated via [`Self::next_pn`] as sent and
    /// in flight, once its encoded size is known.
    pub fn record_sent_at(
        &mut self,
        which: PacketNumberSpace,
        pn: u64,
        now: Instant,
        bytes: usize,
        ack_eliciting: bool,
        frames: Vec<Frame>,
    ) {
        self.space(which).pn.record_sent(
            pn,
            SentPacket { send_time: now, bytes, ack_eliciting, in_flight: ack_eliciting || bytes > 0, frames },
        );
        self.pacer.on_sent(bytes);
    }

    /// Processes an incoming `ACK` frame: feeds the RTT sample from the
    /// newly-acked largest packet, retires acked packets from the in-flight
    /// table, grows the congestion window, and runs loss detection.
    pub fn on_ack_received(
        &mut self,
        which: PacketNumberSpace,
        ranges: &AckRangeSet,
        ack_delay: Duration,
        now: Instant,
    ) -> Vec<(u64, SentPacket)> {
        let Some(largest) = ranges.largest() else { return vec![] };
        let space = self.space(which);
        let newly_largest = space.pn.largest_acked.map_or(true, |prev| largest > prev);
        space.pn.largest_acked = Some(space.pn.largest_acked.map_or(largest, |p| p.max(largest)));

        let mut acked = Vec::new();
        for range in ranges.iter_descending() {
            for pn in range.start..=range.end {
                if let Some(packet) = space.pn.retire(pn) {
                    acked.push((pn, packet));
                }
            }
        }

        if newly_largest {
            if let Some((_, packet)) = acked.iter().find(|(pn, _)| *pn == largest) {
                if packet.ack_eliciting {
                    let sample = now.saturating_duration_since(packet.send_time);
                    self.rtt.update(sample, ack_delay, self.handshake_confirmed);
                }
            }
        }

        for (_, packet) in &acked {
            if packet.in_flight {
                self.congestion.on_packet_acked(packet.bytes);
            }
        }
        self.pto_count = 0;

        let loss = detect_lost_packets(&mut self.space(which).pn, &self.rtt, now);
        if let Some(max_lost_pn) = loss.lost.iter().map(|(pn, _)| *pn).max() {
            self.congestion.on_packet_lost(max_lost_pn, largest);
        }
        let lost_send_times: Vec<Instant> = loss.lost.iter().map(|(_, p)| p.send_time).collect();
        if is_persistent_congestion(&lost_send_times, self.pto(3)) {
            self.congestion.on_persistent_congestion();
        }

        acked.extend(loss.lost);
        acked
    }

    pub fn pto(&self, pto_count: u32) -> Duration {
        self.rtt.pto(pto_count)
    }

    pub fn on_pto_expired(&mut self) {
        self.pto_count += 1;
    }

    pub fn discard_space(&mut self, which: PacketNumberSpace) -> Vec<(u64, SentPacket)> {
        self.space(which).pn.discard_all().into_iter().collect()
    }

    pub fn has_in_flight(&self, which: PacketNumberSpace) -> bool {
        match which {
            PacketNumberSpace::Initial => self.initial.pn.has_in_flight(),
            PacketNumberSpace::Handshake => self.handshake.pn.has_in_flight(),
            PacketNumberSpace::Application => self.application.pn.has_in_flight(),
        }
    }
}

/// Builds the datagram-filling frame set for one outgoing packet, in
/// priority order: ACKs first (cheap, time-sensitive), then connection
/// control frames (flow control updates), then stream data via the
/// scheduler, until either the budget or the active set is exhausted.
pub fn assemble(
    controller: &mut SendController,
    which: PacketNumberSpace,
    ack_delay_us: u64,
    scheduler: &mut StreamScheduler,
    mut stream_emit: impl FnMut(u64, usize) -> Option<Frame>,
    budget: usize,
) -> Outgoing {
    let mut frames = Vec::new();
    let mut used = 0usize;
    let mut ack_eliciting = false;

    scheduler.swap();

    if let Some(ack) = controller.pending_ack(which, ack_delay_us) {
        used += estimate_frame_size(&ack);
        frames.push(ack);
    }

    for update in controller.flow.drain_updates() {
        if used + estimate_frame_size(&update) > budget {
            break;
        }
        used += estimate_frame_size(&update);
        ack_eliciting = true;
        frames.push(update);
    }

    while used < budget {
        let Some(stream_id) = scheduler.next() else { break };
        let remaining = budget - used;
        match stream_emit(stream_id, remaining) {
            Some(frame) => {
                used += estimate_frame_size(&frame);
                ack_eliciting = true;
                frames.push(frame);
            }
            None => {
                scheduler.remove(stream_id);
            }
        }
    }

    Outgoing { frames, ack_eliciting }
}

pub fn estimate_frame_size(frame: &Frame) -> usize {
    match frame {
        Frame::Stream { data, .. } => data.len() + 16,
        Frame::Crypto { data, .. } => data.len() + 16,
        Frame::Ack { ranges, .. } => 16 + ranges.iter_descending().count() * 8,
        _ => 16,
    }
}
