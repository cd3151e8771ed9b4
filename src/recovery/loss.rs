//! Loss detection (RFC 9002 §6): a sent packet is declared lost
//! once a later packet in the same space is acked and either the
//! packet-number distance or the time since it was sent exceeds a
//! threshold.

use std::time::{Duration, Instant};

use super::pn_space::{PnSpaceState, SentPacket};
use super::rtt::RttEstimator;

/// RFC 9002 §6.1.1.
pub const PACKET_THRESHOLD: u64 = 3;

pub struct LossDetectionResult {
    pub lost: Vec<(u64, SentPacket)>,
    /// Earliest time (relative to `now`) a not-yet-lost packet would
    /// become lost by the time threshold alone — the loss-detection timer
    /// deadline (RFC 9002 §6.1.2).
    pub loss_time: Option<Instant>,
}

/// Walks `space`'s in-flight table and declares packets lost per RFC 9002
/// §6.1: either `packet_threshold` newer packets have been acked, or the
/// packet was sent `time_threshold` before `now` and a newer packet in the
/// same space has been acked. Declares, but does not itself remove the
/// in-flight entries — callers should route every candidate through
/// [`PnSpaceState::retire`] and hand `frames` to `on_loss` upstream.
pub fn detect_lost_packets(space: &mut PnSpaceState, rtt: &RttEstimator, now: Instant) -> LossDetectionResult {
    let Some(largest_acked) = space.largest_acked else {
        return LossDetectionResult { lost: vec![], loss_time: None };
    };
    let time_threshold = rtt.loss_time_threshold();

    let mut lost_pns = Vec::new();
    let mut loss_time = None;
    for (&pn, packet) in space.in_flight.range(..=largest_acked) {
        if pn == largest_acked {
            continue;
        }
        let by_count = largest_acked.saturating_sub(pn) >= PACKET_THRESHOLD;
        let lost_by_time_at = packet.send_time + time_threshold;
        let by_time = lost_by_time_at <= now;
        if by_count || by_time {
            lost_pns.push(pn);
        } else if packet.ack_eliciting {
            loss_time = Some(loss_time.map_or(lost_by_time_at, |t: Instant| t.min(lost_by_time_at)));
        }
    }

    let lost = lost_pns.into_iter().filter_map(|pn| space.retire(pn).map(|p| (pn, p))).collect();
    LossDetectionResult { lost, loss_time }
}

/// RFC 9002 §7.6.1: persistent congestion is a loss spanning a full PTO
/// window (using the period-`duration`, computed by the caller from the
/// RTT estimator and `pto_count`) in which nothing was acked.
pub fn is_persistent_congestion(lost_send_times: &[Instant], duration: Duration) -> bool {
    let (Some(&first), Some(&last)) = (lost_send_times.iter().min(), lost_send_times.iter().max()) else {
        return false;
    };
    last.duration_since(first) >= duration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::pn_space::SentPacket;

    fn sent(at: Instant) -> SentPacket {
        SentPacket { send_time: at, bytes: 100, ack_eliciting: true, in_flight: true, frames: vec![] }
    }

    #[test]
    fn packet_threshold_declares_earlier_packets_lost() {
        let mut space = PnSpaceState::new();
        let base = Instant::now();
        for pn in 1..=10u64 {
            space.record_sent(pn, sent(base));
        }
        space.largest_acked = Some(10);
        // PN 10 acks imply PN 1..=7 are >= 3 behind (since 10-7=3).
        let rtt = RttEstimator::new(Duration::from_millis(25));
        let result = detect_lost_packets(&mut space, &rtt, base + Duration::from_millis(1));
        let lost_pns: Vec<_> = result.lost.iter().map(|(pn, _)| *pn).collect();
        assert_eq!(lost_pns, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn time_threshold_declares_stale_packets_lost() {
        let mut space = PnSpaceState::new();
        let base = Instant::now();
        space.record_sent(1, sent(base));
        space.record_sent(2, sent(base + Duration::from_millis(500)));
        space.largest_acked = Some(2);
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update(Duration::from_millis(100), Duration::ZERO, true);
        // time_threshold ~= 112.5ms; pn 1 was sent 500ms before pn 2.
        let result = detect_lost_packets(&mut space, &rtt, base + Duration::from_millis(500));
        assert_eq!(result.lost.len(), 1);
        assert_eq!(result.lost[0].0, 1);
    }
}
