//! RTT estimation and PTO (RFC 9002 §5): smoothed RTT via an EWMA, min RTT
//! monotonically refined, PTO derived from both plus the peer's
//! `max_ack_delay`.

use std::time::Duration;

/// RFC 9002 §5.3's timer granularity floor.
pub const K_GRANULARITY: Duration = Duration::from_millis(1);
/// RFC 9000 §18.2 default, used until the peer's transport parameter
/// arrives.
pub const DEFAULT_INITIAL_RTT: Duration = Duration::from_millis(333);

#[derive(Debug, Clone)]
pub struct RttEstimator {
    latest_rtt: Duration,
    min_rtt: Duration,
    smoothed_rtt: Duration,
    rttvar: Duration,
    max_ack_delay: Duration,
    first_sample_taken: bool,
}

impl RttEstimator {
    pub fn new(max_ack_delay: Duration) -> Self {
        Self {
            latest_rtt: DEFAULT_INITIAL_RTT,
            min_rtt: DEFAULT_INITIAL_RTT,
            smoothed_rtt: DEFAULT_INITIAL_RTT,
            rttvar: DEFAULT_INITIAL_RTT / 2,
            max_ack_delay,
            first_sample_taken: false,
        }
    }

    pub fn set_max_ack_delay(&mut self, d: Duration) {
        self.max_ack_delay = d;
    }

    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    /// Feeds a new RTT sample (RFC 9002 §5.3), from the largest newly-acked
    /// ack-eliciting packet in an ACK frame whose delay is `ack_delay`
    /// (already capped at `max_ack_delay` by the caller for non-handshake
    /// packets, per RFC 9000 §13.2.5).
    pub fn update(&mut self, rtt_sample: Duration, ack_delay: Duration, is_handshake_confirmed: bool) {
        self.latest_rtt = rtt_sample;
        if !self.first_sample_taken {
            self.first_sample_taken = true;
            self.min_rtt = rtt_sample;
            self.smoothed_rtt = rtt_sample;
            self.rttvar = rtt_sample / 2;
            return;
        }
        self.min_rtt = self.min_rtt.min(rtt_sample);
        let ack_delay = if is_handshake_confirmed { ack_delay.min(self.max_ack_delay) } else { ack_delay };
        let adjusted = if rtt_sample >= self.min_rtt + ack_delay { rtt_sample - ack_delay } else { rtt_sample };

        let rttvar_sample = abs_diff(self.smoothed_rtt, adjusted);
        self.rttvar = (self.rttvar * 3 + rttvar_sample) / 4;
        self.smoothed_rtt = (self.smoothed_rtt * 7 + adjusted) / 8;
    }

    /// RFC 9002 §6.2.1: `smoothed_rtt + max(4*rttvar, kGranularity) + max_ack_delay`,
    /// doubled once per consecutive expiration by the caller.
    pub fn pto_base(&self) -> Duration {
        self.smoothed_rtt + (self.rttvar * 4).max(K_GRANULARITY) + self.max_ack_delay
    }

    pub fn pto(&self, pto_count: u32) -> Duration {
        self.pto_base() * 2u32.saturating_pow(pto_count.min(31))
    }

    /// RFC 9002 §6.1.2: the loss-detection time threshold.
    pub fn loss_time_threshold(&self) -> Duration {
        (self.latest_rtt.max(self.smoothed_rtt) * 9 / 8).max(K_GRANULARITY)
    }
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_seeds_smoothed_and_min_rtt() {
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update(Duration::from_millis(100), Duration::ZERO, true);
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(100));
        assert_eq!(rtt.min_rtt(), Duration::from_millis(100));
    }

    #[test]
    fn subsequent_samples_move_smoothed_rtt_toward_the_sample() {
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update(Duration::from_millis(100), Duration::ZERO, true);
        rtt.update(Duration::from_millis(140), Duration::ZERO, true);
        assert!(rtt.smoothed_rtt() > Duration::from_millis(100));
        assert!(rtt.smoothed_rtt() < Duration::from_millis(140));
    }

    #[test]
    fn pto_grows_with_consecutive_count() {
        let mut rtt = RttEstimator::new(Duration::from_millis(25));
        rtt.update(Duration::from_millis(100), Duration::ZERO, true);
        assert!(rtt.pto(1) > rtt.pto(0));
        assert!(rtt.pto(2) > rtt.pto(1));
    }
}
