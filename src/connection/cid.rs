//! Local connection-ID pool and stateless-reset token derivation
//! (RFC 9000 §5.1, §10.3).

use rand::RngCore;

use crate::packet::ConnectionId;

/// 16-byte token carried in NEW_CONNECTION_ID and compared against the
/// last 16 bytes of an otherwise-undecryptable short-header datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatelessResetToken(pub [u8; 16]);

impl StatelessResetToken {
    /// Derives a token for `cid` via `HMAC-SHA256(static_key, cid)`,
    /// truncated to 16 bytes — deterministic so a stateless reset can be
    /// recognized after this endpoint's connection state is gone, as long
    /// as `static_key` survives (matching reset-token schemes used by real
    /// QUIC stacks).
    pub fn derive(static_key: &[u8], cid: &ConnectionId) -> Self {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, static_key);
        let tag = ring::hmac::sign(&key, cid.as_slice());
        let mut token = [0u8; 16];
        token.copy_from_slice(&tag.as_ref()[..16]);
        Self(token)
    }

    /// Constant-time comparison against the trailing bytes of a candidate
    /// stateless-reset datagram.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        candidate.len() >= 16 && ring::constant_time::verify_slices_are_equal(&self.0, &candidate[candidate.len() - 16..]).is_ok()
    }
}

struct LocalCid {
    sequence_number: u64,
    cid: ConnectionId,
    reset_token: StatelessResetToken,
    retired: bool,
}

/// Local CIDs this endpoint has issued to the peer via NEW_CONNECTION_ID,
/// up to the peer's `active_connection_id_limit`.
pub struct CidManager {
    static_key: Vec<u8>,
    cid_len: usize,
    next_sequence: u64,
    peer_limit: u64,
    issued: Vec<LocalCid>,
}

impl CidManager {
    pub fn new(static_key: Vec<u8>, cid_len: usize, peer_limit: u64) -> Self {
        Self { static_key, cid_len, next_sequence: 0, peer_limit: peer_limit.max(2), issued: Vec::new() }
    }

    /// Issues as many new CIDs as needed to fill up to the peer's limit,
    /// returning `(sequence_number, cid, reset_token)` for each new
    /// NEW_CONNECTION_ID frame that must be sent.
    pub fn refill(&mut self, rng: &mut dyn RngCore) -> Vec<(u64, ConnectionId, StatelessResetToken)> {
        let active = self.issued.iter().filter(|c| !c.retired).count() as u64;
        let mut out = Vec::new();
        for _ in active..self.peer_limit {
            let cid = ConnectionId::random(rng, self.cid_len);
            let reset_token = StatelessResetToken::derive(&self.static_key, &cid);
            let sequence_number = self.next_sequence;
            self.next_sequence += 1;
            self.issued.push(LocalCid { sequence_number, cid: cid.clone(), retired: false, reset_token });
            out.push((sequence_number, cid, reset_token));
        }
        out
    }

    pub fn set_peer_limit(&mut self, limit: u64) {
        self.peer_limit = limit.max(2);
    }

    /// Marks `sequence_number` retired on receipt of RETIRE_CONNECTION_ID.
    pub fn retire(&mut self, sequence_number: u64) {
        if let Some(entry) = self.issued.iter_mut().find(|c| c.sequence_number == sequence_number) {
            entry.retired = true;
        }
    }

    pub fn reset_token_for(&self, sequence_number: u64) -> Option<StatelessResetToken> {
        self.issued.iter().find(|c| c.sequence_number == sequence_number).map(|c| c.reset_token)
    }

    /// Checks `candidate`'s trailing 16 bytes against every reset token this
    /// endpoint has ever handed the peer via NEW_CONNECTION_ID — a peer may
    /// stateless-reset against any CID it was issued, not just the current
    /// one.
    pub fn matches_any_reset_token(&self, candidate: &[u8]) -> bool {
        self.issued.iter().any(|c| c.reset_token.matches(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    #[test]
    fn derived_tokens_are_deterministic_per_cid() {
        let cid = ConnectionId::from_slice(&[1, 2, 3, 4]);
        let a = StatelessResetToken::derive(b"static-key", &cid);
        let b = StatelessResetToken::derive(b"static-key", &cid);
        assert_eq!(a, b);
    }

    #[test]
    fn token_matches_only_the_trailing_bytes_of_a_candidate() {
        let cid = ConnectionId::from_slice(&[9, 9, 9]);
        let token = StatelessResetToken::derive(b"static-key", &cid);
        let mut datagram = vec![0u8; 21];
        datagram[5..21].copy_from_slice(&token.0);
        assert!(token.matches(&datagram));
        datagram[20] ^= 0xff;
        assert!(!token.matches(&datagram));
    }

    #[test]
    fn refill_issues_up_to_the_peer_limit_and_skips_retired_slots() {
        let mut rng = StepRng::new(1, 1);
        let mut mgr = CidManager::new(b"k".to_vec(), 8, 2);
        let first = mgr.refill(&mut rng);
        assert_eq!(first.len(), 2);
        assert!(mgr.refill(&mut rng).is_empty());
        mgr.retire(0);
        let replenished = mgr.refill(&mut rng);
        assert_eq!(replenished.len(), 1);
    }
}
