//! Full packet codec: wires header parsing (this module's sibling
//! [`super::header`]) to header-protection removal and AEAD, and drives
//! packet-number reconstruction. A single UDP datagram may
//! coalesce several long-header packets; [`decode_one`] consumes exactly
//! one and tells the caller how many bytes it used so the rest of the
//! datagram can be fed back in.

use bytes::{Buf, BufMut, Bytes};
use ring::aead;

use crate::crypto::{CryptoError, LevelCryptographer};

use super::error::PacketError;
use super::header::{Header, LongHeader, LongPacketType, RetryHeader};
use super::types::{decode_packet_number, encode_packet_number_len, ConnectionId, Level, PacketNumberSpace};

const SAMPLE_LEN: usize = 16;
const MAX_PN_LEN: usize = 4;

/// RFC 9001 §5.8: the fixed key/nonce used to compute and verify the Retry
/// Integrity Tag. Not secret — it authenticates against off-path
/// injection, not confidentiality.
const RETRY_INTEGRITY_KEY: [u8; 16] = [
    0xbe, 0x0c, 0x69, 0x0b, 0x9f, 0x66, 0x57, 0x5a, 0x1d, 0x76, 0x6b, 0x54, 0xe3, 0x68, 0xc8, 0x4e,
];
const RETRY_INTEGRITY_NONCE: [u8; 12] =
    [0x46, 0x15, 0x99, 0xd3, 0x5d, 0x63, 0x2b, 0xf2, 0x23, 0x98, 0x25, 0xbb];

/// A successfully decrypted packet: the cleartext header plus its
/// reconstructed full packet number and decrypted payload.
pub struct DecodedPacket {
    pub header: Header,
    pub level: Level,
    pub packet_number: u64,
    pub payload: Bytes,
    /// Total bytes of the datagram this packet consumed — the caller
    /// advances past this to parse the next coalesced packet, if any.
    pub consumed: usize,
}

fn header_level(header: &Header) -> Option<Level> {
    match header {
        Header::Initial(_) => Some(Level::Initial),
        Header::Handshake(_) => Some(Level::Handshake),
        Header::ZeroRtt(_) => Some(Level::ZeroRtt),
        Header::Short { .. } => Some(Level::Application),
        Header::Retry(_) | Header::VersionNegotiation { .. } => None,
    }
}

/// Decodes and decrypts exactly one packet from the front of `datagram`.
/// `datagram` is mutated in place (header protection removal and AEAD
/// decryption both work over the original bytes). `largest_pn` supplies the
/// largest packet number received so far in the relevant space, for
/// reconstruction (RFC 9000 Appendix A.3); pass `-1` if none yet.
///
/// A failure here means "drop this packet" — it never panics
/// and never reads past `datagram`'s bounds.
pub fn decode_one<'c>(
    datagram: &mut [u8],
    local_short_dcid_len: usize,
    crypto_for_level: impl Fn(Level) -> Option<&'c LevelCryptographer>,
    largest_pn_for_space: impl Fn(PacketNumberSpace) -> i64,
) -> Result<DecodedPacket, PacketError> {
    let parsed = Header::parse(datagram, local_short_dcid_len)?;
    let Some(level) = header_level(&parsed.header) else {
        // Retry / VersionNegotiation carry no packet number or payload.
        return Err(PacketError::UnsupportedVersion);
    };

    let remainder_len = match &parsed.header {
        Header::Initial(h) | Header::Handshake(h) | Header::ZeroRtt(h) => h.remainder_len,
        Header::Short { .. } => datagram.len() - parsed.pn_offset,
        _ => unreachable!(),
    };
    let packet_end = parsed.pn_offset + remainder_len;
    if packet_end > datagram.len() {
        return Err(PacketError::InconsistentLength);
    }

    let crypto = crypto_for_level(level).ok_or(PacketError::NoKeysForLevel)?;

    let is_short = matches!(parsed.header, Header::Short { .. });
    let sample_offset = parsed.pn_offset + MAX_PN_LEN;
    if sample_offset + SAMPLE_LEN > datagram.len() {
        return Err(PacketError::NeedMoreData);
    }
    let sample = {
        let mut s = [0u8; SAMPLE_LEN];
        s.copy_from_slice(&datagram[sample_offset..sample_offset + SAMPLE_LEN]);
        s
    };

    let pn_len = crypto
        .decrypt_header(datagram, &sample, parsed.pn_offset, is_short)
        .map_err(|_| PacketError::AeadFailure)?;

    let mut truncated = 0u64;
    for i in 0..pn_len {
        truncated = (truncated << 8) | datagram[parsed.pn_offset + i] as u64;
    }
    let largest_pn = largest_pn_for_space(level.space());
    let packet_number = decode_packet_number(largest_pn, truncated, pn_len);

    let aad_end = parsed.pn_offset + pn_len;
    let aad = datagram[..aad_end].to_vec();
    let mut ciphertext = datagram[aad_end..packet_end].to_vec();

    let plain_len = crypto
        .decrypt_packet(packet_number, &aad, &mut ciphertext)
        .map_err(|_: CryptoError| PacketError::AeadFailure)?;
    ciphertext.truncate(plain_len);

    Ok(DecodedPacket {
        header: parsed.header,
        level,
        packet_number,
        payload: Bytes::from(ciphertext),
        consumed: packet_end,
    })
}

/// Encrypts and serializes one packet into `out`, applying header
/// protection in place afterward. Returns the number of bytes written.
pub fn encode_one(
    out: &mut Vec<u8>,
    mut header: Header,
    packet_number: u64,
    largest_acked: Option<u64>,
    plaintext: &[u8],
    crypto: &LevelCryptographer,
) -> Result<usize, PacketError> {
    let pn_len = encode_packet_number_len(packet_number, largest_acked);
    let is_short = matches!(header, Header::Short { .. });

    let ciphertext_len = plaintext.len() + crate::crypto::TAG_LEN;
    if let Header::Initial(h) | Header::Handshake(h) | Header::ZeroRtt(h) = &mut header {
        h.remainder_len = pn_len + ciphertext_len;
    }

    let start = out.len();
    header.encode(out)?;
    let pn_offset = out.len() - start;
    let pn_bytes = packet_number.to_be_bytes();
    out.put_slice(&pn_bytes[8 - pn_len..]);

    let aad = out[start..].to_vec();
    let mut ciphertext = Vec::new();
    crypto
        .encrypt_packet(packet_number, &aad, plaintext, &mut ciphertext)
        .map_err(|_| PacketError::AeadFailure)?;
    out.extend_from_slice(&ciphertext);

    // header protection is applied over the now-fully-assembled packet.
    let abs_pn_offset = start + pn_offset;
    let sample_offset = abs_pn_offset + MAX_PN_LEN;
    if sample_offset + SAMPLE_LEN <= out.len() {
        let sample: [u8; SAMPLE_LEN] = out[sample_offset..sample_offset + SAMPLE_LEN].try_into().unwrap();
        crypto
            .encrypt_header(&mut out[start..], &sample, pn_offset, pn_len, is_short)
            .map_err(|_| PacketError::AeadFailure)?;
    }

    Ok(out.len() - start)
}

/// RFC 9001 §5.8: recomputes the Retry Integrity Tag over the pseudo-packet
/// `odcid_len || odcid || retry_header_without_tag` and compares it
/// constant-time against the tag carried on the wire.
pub fn verify_retry_integrity(original_dcid: &ConnectionId, header: &RetryHeader) -> Result<(), PacketError> {
    let expected = compute_retry_integrity_tag(original_dcid, header);
    if ring::constant_time::verify_slices_are_equal(&expected, &header.integrity_tag).is_err() {
        return Err(PacketError::BadRetryIntegrityTag);
    }
    Ok(())
}

pub fn compute_retry_integrity_tag(original_dcid: &ConnectionId, header: &RetryHeader) -> [u8; 16] {
    let mut pseudo = Vec::with_capacity(1 + original_dcid.len() + 32 + header.retry_token.len());
    pseudo.put_u8(original_dcid.len() as u8);
    pseudo.put_slice(original_dcid.as_slice());

    let unsigned = Header::Retry(RetryHeader {
        version: header.version,
        dcid: header.dcid.clone(),
        scid: header.scid.clone(),
        retry_token: header.retry_token.clone(),
        integrity_tag: [0u8; 16],
    });
    let mut header_bytes = Vec::new();
    // encode the header shape but drop the trailing (zeroed) tag we just
    // wrote, so pseudo carries exactly the RFC's pseudo-packet.
    unsigned.encode(&mut header_bytes).expect("retry header always encodes");
    header_bytes.truncate(header_bytes.len() - 16);
    pseudo.extend_from_slice(&header_bytes);

    let unbound = aead::UnboundKey::new(&aead::AES_128_GCM, &RETRY_INTEGRITY_KEY).expect("fixed-length key");
    let key = aead::LessSafeKey::new(unbound);
    let nonce = aead::Nonce::assume_unique_for_key(RETRY_INTEGRITY_NONCE);
    let mut tag_input = Vec::new(); // empty plaintext, tag-only output
    let tag = key
        .seal_in_place_separate_tag(nonce, aead::Aad::from(&pseudo), &mut tag_input)
        .expect("fixed-length key/nonce never fail");
    let mut out = [0u8; 16];
    out.copy_from_slice(tag.as_ref());
    out
}

/// Builds a stateless Version Negotiation packet echoing the client's CIDs.
pub fn build_version_negotiation(dcid: &ConnectionId, scid: &ConnectionId, supported: &[u32]) -> Vec<u8> {
    let header = Header::VersionNegotiation {
        dcid: dcid.clone(),
        scid: scid.clone(),
        supported_versions: supported.to_vec(),
    };
    let mut out = Vec::new();
    header.encode(&mut out).expect("version negotiation always encodes");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Role;

    #[test]
    fn retry_integrity_tag_is_reproducible() {
        let odcid = ConnectionId::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let header = RetryHeader {
            version: super::super::header::VERSION_1,
            dcid: ConnectionId::from_slice(&[9, 9]),
            scid: ConnectionId::from_slice(&[8, 8]),
            retry_token: Bytes::from_static(b"retry-token"),
            integrity_tag: [0u8; 16],
        };
        let tag1 = compute_retry_integrity_tag(&odcid, &header);
        let tag2 = compute_retry_integrity_tag(&odcid, &header);
        assert_eq!(tag1, tag2);

        let verifying = RetryHeader { integrity_tag: tag1, ..header };
        assert!(verify_retry_integrity(&odcid, &verifying).is_ok());
    }

    #[test]
    fn encode_then_decode_one_initial_packet_round_trips() {
        let dcid = ConnectionId::from_slice(&[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]);
        let client = LevelCryptographer::install_initial(dcid.as_slice(), Role::Client).unwrap();
        let server = LevelCryptographer::install_initial(dcid.as_slice(), Role::Server).unwrap();

        let header = Header::Initial(LongHeader {
            packet_type: LongPacketType::Initial,
            version: super::super::header::VERSION_1,
            dcid: dcid.clone(),
            scid: ConnectionId::from_slice(&[1, 2, 3, 4]),
            token: None,
            remainder_len: 0,
        });

        let plaintext = vec![0x01u8; 40]; // a PING + PADDING-shaped payload
        let mut out = Vec::new();
        encode_one(&mut out, header, 1, None, &plaintext, &client).unwrap();

        let decoded = decode_one(&mut out, 8, |level| (level == Level::Initial).then_some(&server), |_| -1).unwrap();
        assert_eq!(decoded.packet_number, 1);
        assert_eq!(&decoded.payload[..], plaintext.as_slice());
        assert_eq!(decoded.consumed, out.len());
    }
}
