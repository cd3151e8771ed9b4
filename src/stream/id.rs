//! Stream ID layout (RFC 9000 §2.1): the low two bits of a stream ID encode
//! who initiated it and whether it is bidirectional or unidirectional.

use crate::crypto::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directionality {
    Bidi,
    Uni,
}

/// Splits a stream ID into its initiator role and directionality, and
/// the sequence number within that (role, directionality) class.
pub fn classify(stream_id: u64) -> (Role, Directionality, u64) {
    let role = if stream_id & 0x1 == 0 { Role::Client } else { Role::Server };
    let dir = if stream_id & 0x2 == 0 { Directionality::Bidi } else { Directionality::Uni };
    (role, dir, stream_id >> 2)
}

/// Builds the Nth stream ID a peer in `role` opens with directionality `dir`.
pub fn compose(role: Role, dir: Directionality, sequence: u64) -> u64 {
    let role_bit = if role == Role::Client { 0 } else { 1 };
    let dir_bit = if dir == Directionality::Bidi { 0 } else { 2 };
    (sequence << 2) | dir_bit | role_bit
}

/// Whether `stream_id` was initiated by `local_role`'s peer — i.e. this
/// endpoint did not open it and must accept or reject it on first mention.
pub fn is_peer_initiated(stream_id: u64, local_role: Role) -> bool {
    let (initiator, ..) = classify(stream_id);
    initiator != local_role
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_rfc_bit_layout() {
        assert_eq!(classify(0), (Role::Client, Directionality::Bidi, 0));
        assert_eq!(classify(1), (Role::Server, Directionality::Bidi, 0));
        assert_eq!(classify(2), (Role::Client, Directionality::Uni, 0));
        assert_eq!(classify(3), (Role::Server, Directionality::Uni, 0));
        assert_eq!(classify(4), (Role::Client, Directionality::Bidi, 1));
    }

    #[test]
    fn compose_is_inverse_of_classify() {
        for (role, dir, seq) in [
            (Role::Client, Directionality::Bidi, 7u64),
            (Role::Server, Directionality::Uni, 3),
        ] {
            let id = compose(role, dir, seq);
            assert_eq!(classify(id), (role, dir, seq));
        }
    }

    #[test]
    fn peer_initiated_checks_the_role_bit_only() {
        assert!(is_peer_initiated(1, Role::Client)); // server-initiated
        assert!(!is_peer_initiated(0, Role::Client)); // client-initiated
    }
}
