//! Header protection mask derivation and application, RFC 9001 §5.4.
//! Built on `ring::aead::quic`, the same purpose-built module real
//! `quiche`/`quinn` use instead of hand-rolling AES-ECB/ChaCha20 blocks.

use ring::aead::quic::{HeaderProtectionKey as RingHpKey, AES_128, AES_256, CHACHA20};

use super::{CipherSuite, CryptoError};

const SAMPLE_LEN: usize = 16;
const LONG_HEADER_MASK: u8 = 0x0F;
const SHORT_HEADER_MASK: u8 = 0x1F;

pub struct HeaderProtectionKey(RingHpKey);

impl HeaderProtectionKey {
    pub fn new(suite: CipherSuite, hp_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let alg = match suite {
            CipherSuite::Aes128Gcm => &AES_128,
            CipherSuite::Aes256Gcm => &AES_256,
            CipherSuite::Chacha20Poly1305 => &CHACHA20,
        };
        let key = RingHpKey::new(alg, hp_key_bytes).map_err(|_| CryptoError::UnsupportedCipher)?;
        Ok(Self(key))
    }

    fn mask(&self, sample: &[u8]) -> Result<[u8; 5], CryptoError> {
        if sample.len() < SAMPLE_LEN {
            return Err(CryptoError::ShortSample);
        }
        self.0.new_mask(&sample[..SAMPLE_LEN]).map_err(|_| CryptoError::ShortSample)
    }

    /// Applies the mask (encrypt direction: caller has already written the
    /// truncated PN and first byte in cleartext).
    pub fn apply(
        &self,
        packet: &mut [u8],
        sample: &[u8],
        pn_offset: usize,
        pn_len: usize,
        is_short: bool,
    ) -> Result<(), CryptoError> {
        let mask = self.mask(sample)?;
        let flag_mask = if is_short { SHORT_HEADER_MASK } else { LONG_HEADER_MASK };
        packet[0] ^= mask[0] & flag_mask;
        for i in 0..pn_len {
            packet[pn_offset + i] ^= mask[1 + i];
        }
        Ok(())
    }

    /// Removes the mask (decrypt direction): byte 0 is unmasked first so
    /// `pn_len` can be recovered from the low bits before the PN bytes are
    /// unmasked.
    pub fn remove(
        &self,
        packet: &mut [u8],
        sample: &[u8],
        pn_offset: usize,
        is_short: bool,
    ) -> Result<usize, CryptoError> {
        let mask = self.mask(sample)?;
        let flag_mask = if is_short { SHORT_HEADER_MASK } else { LONG_HEADER_MASK };
        packet[0] ^= mask[0] & flag_mask;
        let pn_len = (packet[0] & 0x03) as usize + 1;
        for i in 0..pn_len {
            packet[pn_offset + i] ^= mask[1 + i];
        }
        Ok(pn_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_header_mask_uses_four_bits() {
        let key = HeaderProtectionKey::new(CipherSuite::Aes128Gcm, &[0u8; 16]).unwrap();
        let sample = [7u8; 16];
        let mut packet = vec![0xC3u8, 0, 0, 0, 1, 0xAA, 0xBB, 0xCC, 0xDD];
        key.apply(&mut packet, &sample, 5, 4, false).unwrap();
        let pn_len = key.remove(&mut packet, &sample, 5, false).unwrap();
        assert_eq!(pn_len, 4);
        assert_eq!(&packet[5..9], &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(packet[0], 0xC3);
    }
}
