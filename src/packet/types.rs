//! Connection ID and packet-number-space identifiers.

use rand::RngCore;
use smallvec::SmallVec;

pub const MAX_CID_LEN: usize = 20;

/// Opaque routing identifier, 0..=20 bytes. Stored inline via `SmallVec` —
/// the common case (8 or 20 bytes) never allocates.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(SmallVec<[u8; MAX_CID_LEN]>);

impl ConnectionId {
    pub fn from_slice(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= MAX_CID_LEN);
        Self(SmallVec::from_slice(bytes))
    }

    pub fn random(rng: &mut dyn RngCore, len: usize) -> Self {
        let len = len.min(MAX_CID_LEN);
        let mut buf = [0u8; MAX_CID_LEN];
        rng.fill_bytes(&mut buf[..len]);
        Self::from_slice(&buf[..len])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cid:")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for ConnectionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The three independent packet-number spaces this crate models (0-RTT
/// shares the Application space's numbering per RFC 9000 §12.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketNumberSpace {
    Initial,
    Handshake,
    Application,
}

impl PacketNumberSpace {
    pub const ALL: [PacketNumberSpace; 3] =
        [PacketNumberSpace::Initial, PacketNumberSpace::Handshake, PacketNumberSpace::Application];
}

/// Encryption level, one-to-one with [`PacketNumberSpace`] except that
/// 0-RTT and 1-RTT both map to `Application`'s packet-number space while
/// using distinct keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Initial,
    Handshake,
    ZeroRtt,
    Application,
}

impl Level {
    pub fn space(self) -> PacketNumberSpace {
        match self {
            Level::Initial => PacketNumberSpace::Initial,
            Level::Handshake => PacketNumberSpace::Handshake,
            Level::ZeroRtt | Level::Application => PacketNumberSpace::Application,
        }
    }
}

/// RFC 9000 Appendix A.3: reconstructs the full packet number from the
/// truncated wire value given the largest packet number received so far in
/// this space and the truncated field's bit width.
pub fn decode_packet_number(largest_pn: i64, truncated: u64, pn_len: usize) -> u64 {
    let pn_nbits = pn_len as u32 * 8;
    let expected_pn = largest_pn + 1;
    let pn_win = 1i64 << pn_nbits;
    let pn_hwin = pn_win / 2;
    let pn_mask = pn_win - 1;
    let candidate = (expected_pn & !pn_mask) | (truncated as i64);
    let candidate = if candidate <= expected_pn - pn_hwin && candidate < (1i64 << 62) - pn_win {
        candidate + pn_win
    } else if candidate > expected_pn + pn_hwin && candidate >= pn_win {
        candidate - pn_win
    } else {
        candidate
    };
    candidate as u64
}

/// Smallest number of bytes (1-4) needed to truncate `pn` on the wire given
/// the largest packet number already acknowledged by the peer (RFC 9000
/// §17.1).
pub fn encode_packet_number_len(pn: u64, largest_acked: Option<u64>) -> usize {
    let num_unacked = match largest_acked {
        Some(la) => pn.saturating_sub(la),
        None => pn + 1,
    };
    if num_unacked < (1 << 7) {
        1
    } else if num_unacked < (1 << 15) {
        2
    } else if num_unacked < (1 << 23) {
        3
    } else {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pn_reconstruction_round_trips_near_window_edges() {
        for (largest, full) in [(0u64, 0u64), (100, 101), (100, 99), ((1 << 20), (1 << 20) + 5)] {
            let len = encode_packet_number_len(full, Some(largest));
            let truncated = full & ((1u64 << (len as u32 * 8)) - 1);
            let reconstructed = decode_packet_number(largest as i64, truncated, len);
            assert_eq!(reconstructed, full, "largest={largest} full={full} len={len}");
        }
    }
}
