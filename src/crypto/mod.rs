//! L2 — AEAD cryptographer: per-level packet and header protection,
//! built on `ring` the way real `quiche`/`quinn` do.

mod hp;
mod secret;

use ring::aead::{self, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey};
use thiserror::Error;

pub use secret::{derive_initial_secrets, Role, INITIAL_SALT};

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum CryptoError {
    #[error("AEAD authentication failed")]
    AuthenticationFailed,
    #[error("packet number too large for a 96-bit nonce")]
    PacketNumberOverflow,
    #[error("unsupported cipher suite")]
    UnsupportedCipher,
    #[error("secret material is the wrong length for this cipher")]
    BadSecretLength,
    #[error("header sample shorter than required")]
    ShortSample,
}

/// The three cipher suites negotiable by the TLS handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    Aes128Gcm,
    Aes256Gcm,
    Chacha20Poly1305,
}

impl CipherSuite {
    fn aead_algorithm(self) -> &'static aead::Algorithm {
        match self {
            CipherSuite::Aes128Gcm => &aead::AES_128_GCM,
            CipherSuite::Aes256Gcm => &aead::AES_256_GCM,
            CipherSuite::Chacha20Poly1305 => &aead::CHACHA20_POLY1305,
        }
    }

    pub fn key_len(self) -> usize {
        self.aead_algorithm().key_len()
    }

    pub fn hkdf_algorithm(self) -> ring::hkdf::Algorithm {
        match self {
            CipherSuite::Aes128Gcm | CipherSuite::Chacha20Poly1305 => ring::hkdf::HKDF_SHA256,
            CipherSuite::Aes256Gcm => ring::hkdf::HKDF_SHA384,
        }
    }
}

pub const TAG_LEN: usize = 16;
const IV_LEN: usize = 12;

struct FixedNonce {
    iv: [u8; IV_LEN],
    pn: u64,
}

impl NonceSequence for FixedNonce {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        let mut bytes = self.iv;
        let pn_bytes = self.pn.to_be_bytes();
        for (i, b) in pn_bytes.iter().enumerate() {
            bytes[IV_LEN - pn_bytes.len() + i] ^= b;
        }
        Ok(Nonce::assume_unique_for_key(bytes))
    }
}

/// One direction's AEAD state: packet-protection key/iv plus the header
/// protection key, all derived from a single traffic secret. Read and
/// write directions each get an independent instance of this type.
pub struct DirectionalKeys {
    suite: CipherSuite,
    key_bytes: Vec<u8>,
    iv: [u8; IV_LEN],
    hp: hp::HeaderProtectionKey,
}

impl DirectionalKeys {
    pub fn from_secret(suite: CipherSuite, secret: &[u8]) -> Result<Self, CryptoError> {
        let prk = ring::hkdf::Prk::new_less_safe(suite.hkdf_algorithm(), secret);
        let key_bytes = secret::expand_label(&prk, b"quic key", suite.key_len())
            .map_err(|_| CryptoError::BadSecretLength)?;
        let iv_bytes = secret::expand_label(&prk, b"quic iv", IV_LEN).map_err(|_| CryptoError::BadSecretLength)?;
        let hp_bytes = secret::expand_label(&prk, b"quic hp", suite.key_len())
            .map_err(|_| CryptoError::BadSecretLength)?;
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&iv_bytes);
        Ok(Self { suite, key_bytes, iv, hp: hp::HeaderProtectionKey::new(suite, &hp_bytes)? })
    }

    fn unbound_key(&self) -> Result<UnboundKey, CryptoError> {
        UnboundKey::new(self.suite.aead_algorithm(), &self.key_bytes).map_err(|_| CryptoError::BadSecretLength)
    }
}

/// Per-level AEAD cryptographer: owns independent read and write
/// [`DirectionalKeys`], plus the next-generation secrets for key update
/// (RFC 9001 §6), derived lazily on first rotation.
pub struct LevelCryptographer {
    suite: CipherSuite,
    read: DirectionalKeys,
    write: DirectionalKeys,
    read_secret: Vec<u8>,
    write_secret: Vec<u8>,
}

impl LevelCryptographer {
    pub fn install_initial(dcid: &[u8], role: Role) -> Result<Self, CryptoError> {
        let (client_secret, server_secret) = derive_initial_secrets(dcid);
        let (read_secret, write_secret) = match role {
            Role::Client => (server_secret, client_secret),
            Role::Server => (client_secret, server_secret),
        };
        Self::install_secret(CipherSuite::Aes128Gcm, &read_secret, &write_secret)
    }

    pub fn install_secret(
        suite: CipherSuite,
        read_secret: &[u8],
        write_secret: &[u8],
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            suite,
            read: DirectionalKeys::from_secret(suite, read_secret)?,
            write: DirectionalKeys::from_secret(suite, write_secret)?,
            read_secret: read_secret.to_vec(),
            write_secret: write_secret.to_vec(),
        })
    }

    pub fn encrypt_packet(
        &self,
        pn: u64,
        aad: &[u8],
        plaintext: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), CryptoError> {
        let unbound = self.write.unbound_key()?;
        let nonce_seq = FixedNonce { iv: self.write.iv, pn };
        let mut key = SealingKey::new(unbound, nonce_seq);
        out.clear();
        out.extend_from_slice(plaintext);
        key.seal_in_place_append_tag(aead::Aad::from(aad), out)
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        Ok(())
    }

    /// Decrypts in place; returns the plaintext length on success.
    pub fn decrypt_packet(&self, pn: u64, aad: &[u8], ciphertext: &mut Vec<u8>) -> Result<usize, CryptoError> {
        let unbound = self.read.unbound_key()?;
        let nonce_seq = FixedNonce { iv: self.read.iv, pn };
        let mut key = OpeningKey::new(unbound, nonce_seq);
        let plain = key
            .open_in_place(aead::Aad::from(aad), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        Ok(plain.len())
    }

    pub fn encrypt_header(
        &self,
        packet: &mut [u8],
        sample: &[u8],
        pn_offset: usize,
        pn_len: usize,
        is_short: bool,
    ) -> Result<(), CryptoError> {
        self.write.hp.apply(packet, sample, pn_offset, pn_len, is_short)
    }

    pub fn decrypt_header(
        &self,
        packet: &mut [u8],
        sample: &[u8],
        pn_offset: usize,
        is_short: bool,
    ) -> Result<usize, CryptoError> {
        self.read.hp.remove(packet, sample, pn_offset, is_short)
    }

    /// RFC 9001 §6 key update: derives the next generation of read/write
    /// secrets via the `quic ku` label (or installs externally supplied
    /// ones), leaving the header-protection keys untouched.
    pub fn key_update(&mut self, new_read_secret: Option<&[u8]>, new_write_secret: Option<&[u8]>) -> Result<(), CryptoError> {
        let next_read = match new_read_secret {
            Some(s) => s.to_vec(),
            None => secret::next_generation(self.suite, &self.read_secret)?,
        };
        let next_write = match new_write_secret {
            Some(s) => s.to_vec(),
            None => secret::next_generation(self.suite, &self.write_secret)?,
        };
        self.read = DirectionalKeys::from_secret(self.suite, &next_read)?;
        self.write = DirectionalKeys::from_secret(self.suite, &next_write)?;
        self.read_secret = next_read;
        self.write_secret = next_write;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_round_trip_matches_spec_scenario() {
        let dcid = hex(b"8394c8f03e515708");
        let client = LevelCryptographer::install_initial(&dcid, Role::Client).unwrap();
        let server = LevelCryptographer::install_initial(&dcid, Role::Server).unwrap();

        let plaintext = vec![0x42u8; 64];
        let aad = [0x01, 0x02, 0x03, 0x04];
        let mut ciphertext = Vec::new();
        client.encrypt_packet(1, &aad, &plaintext, &mut ciphertext).unwrap();

        let mut buf = ciphertext.clone();
        let len = server.decrypt_packet(1, &aad, &mut buf).unwrap();
        assert_eq!(len, 64);
        assert_eq!(&buf[..len], plaintext.as_slice());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let dcid = hex(b"8394c8f03e515708");
        let client = LevelCryptographer::install_initial(&dcid, Role::Client).unwrap();
        let server = LevelCryptographer::install_initial(&dcid, Role::Server).unwrap();

        let mut ciphertext = Vec::new();
        client.encrypt_packet(1, &[], b"hello world", &mut ciphertext).unwrap();
        ciphertext[0] ^= 0xFF;

        assert_eq!(server.decrypt_packet(1, &[], &mut ciphertext), Err(CryptoError::AuthenticationFailed));
    }

    #[test]
    fn header_protection_round_trips_pn_bytes() {
        let dcid = hex(b"8394c8f03e515708");
        let client = LevelCryptographer::install_initial(&dcid, Role::Client).unwrap();

        let mut packet = vec![0xC3u8, 0, 0, 0, 1, 0xAA, 0xBB, 0xCC, 0xDD];
        let sample = [1u8; 16];
        let pn_offset = 5;
        client.encrypt_header(&mut packet, &sample, pn_offset, 4, false).unwrap();
        let recovered_len = client.decrypt_header(&mut packet, &sample, pn_offset, false).unwrap();
        assert_eq!(recovered_len, 4);
        assert_eq!(&packet[5..9], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    fn hex(bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }
}
