//! HKDF-Extract/Expand-Label per RFC 9001 §5.1, and initial-secret
//! derivation per RFC 9001 §5.2.

use ring::hkdf::{Prk, Salt, HKDF_SHA256};

use super::{CipherSuite, CryptoError};

/// RFC 9001 §5.2, the QUIC v1 initial salt.
pub const INITIAL_SALT: [u8; 20] = [
    0x38, 0x76, 0x2c, 0xf7, 0xf5, 0x59, 0x34, 0xb3, 0x4d, 0x17, 0x9a, 0xe6, 0xa4, 0xc8, 0x0c, 0xad, 0xcc, 0xbb,
    0x7f, 0x0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// TLS 1.3 `HKDF-Expand-Label(Secret, Label, "", Length)`, with an empty
/// context, which is all the packet/header-protection key schedule needs.
pub(super) fn expand_label(prk: &Prk, label: &[u8], out_len: usize) -> Result<Vec<u8>, ring::error::Unspecified> {
    let mut full_label = Vec::with_capacity(2 + 1 + 6 + label.len() + 1);
    full_label.extend_from_slice(&(out_len as u16).to_be_bytes());
    full_label.push((6 + label.len()) as u8);
    full_label.extend_from_slice(b"tls13 ");
    full_label.extend_from_slice(label);
    full_label.push(0); // empty context

    struct Len(usize);
    impl ring::hkdf::KeyType for Len {
        fn len(&self) -> usize {
            self.0
        }
    }

    let okm = prk.expand(&[&full_label], Len(out_len))?;
    let mut out = vec![0u8; out_len];
    okm.fill(&mut out)?;
    Ok(out)
}

/// HKDF-Extract(initial_salt, dcid) -> initial secret, then
/// Expand-Label with `client in` / `server in` for each direction (RFC
/// 9001 §5.2).
pub fn derive_initial_secrets(dcid: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let salt = Salt::new(HKDF_SHA256, &INITIAL_SALT);
    let initial_secret = salt.extract(dcid);
    let client = expand_label(&initial_secret, b"client in", 32).expect("HKDF_SHA256 output fits");
    let server = expand_label(&initial_secret, b"server in", 32).expect("HKDF_SHA256 output fits");
    (client, server)
}

/// RFC 9001 §6 `quic ku` label: derives the next-generation secret from
/// the current one, same hash as the cipher suite's HKDF.
pub(super) fn next_generation(suite: CipherSuite, current_secret: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let prk = Prk::new_less_safe(suite.hkdf_algorithm(), current_secret);
    let len = current_secret.len();
    expand_label(&prk, b"quic ku", len).map_err(|_| CryptoError::BadSecretLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_secrets_differ_by_direction() {
        let (client, server) = derive_initial_secrets(&[0x83, 0x94, 0xc8, 0xf0, 0x3e, 0x51, 0x57, 0x08]);
        assert_ne!(client, server);
        assert_eq!(client.len(), 32);
    }

    #[test]
    fn key_update_is_deterministic_and_moves_forward() {
        let (client, _) = derive_initial_secrets(&[1, 2, 3, 4]);
        let next = next_generation(CipherSuite::Aes128Gcm, &client).unwrap();
        let next_again = next_generation(CipherSuite::Aes128Gcm, &client).unwrap();
        assert_eq!(next, next_again);
        assert_ne!(next, client);
    }
}
