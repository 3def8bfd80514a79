//! RustCrypto implementations of the packet protection primitives.
//!
//! - AEAD: `aes-gcm` (AES-128/256-GCM) and `chacha20poly1305`
//! - Header protection: single-block AES-ECB (`aes`) and the raw `chacha20`
//!   keystream with the counter and nonce taken from the sample

#![forbid(unsafe_code)]

use super::backend::{
    AeadAlgorithm, AeadProvider, HeaderProtectionAlgorithm, HeaderProtectionProvider, NONCE_LEN,
    SAMPLE_LEN,
};
use crate::error::{CryptoError, Result};
use aes::cipher::{BlockEncrypt, KeyInit};
use aes_gcm::aead::{Aead, Nonce, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::ChaCha20;
use chacha20poly1305::ChaCha20Poly1305;

/// Create a keyed AEAD for `algorithm`.
pub fn new_aead(algorithm: AeadAlgorithm, key: &[u8]) -> Result<Box<dyn AeadProvider>> {
    if key.len() != algorithm.key_len() {
        return Err(CryptoError::InvalidKeyLength("AEAD").into());
    }
    let invalid = |_| CryptoError::InvalidKeyLength("AEAD");
    let provider: Box<dyn AeadProvider> = match algorithm {
        AeadAlgorithm::Aes128Gcm => Box::new(RustCryptoAead {
            cipher: Aes128Gcm::new_from_slice(key).map_err(invalid)?,
            algorithm,
        }),
        AeadAlgorithm::Aes256Gcm => Box::new(RustCryptoAead {
            cipher: Aes256Gcm::new_from_slice(key).map_err(invalid)?,
            algorithm,
        }),
        AeadAlgorithm::ChaCha20Poly1305 => Box::new(RustCryptoAead {
            cipher: ChaCha20Poly1305::new_from_slice(key).map_err(invalid)?,
            algorithm,
        }),
    };
    Ok(provider)
}

/// Create a keyed header protection cipher for `algorithm`.
pub fn new_header_protection(
    algorithm: HeaderProtectionAlgorithm,
    key: &[u8],
) -> Result<Box<dyn HeaderProtectionProvider>> {
    if key.len() != algorithm.key_len() {
        return Err(CryptoError::InvalidKeyLength("header protection").into());
    }
    let invalid = |_| CryptoError::InvalidKeyLength("header protection");
    let provider: Box<dyn HeaderProtectionProvider> = match algorithm {
        HeaderProtectionAlgorithm::Aes128 => Box::new(AesHeaderProtection::Aes128(
            aes::Aes128::new_from_slice(key).map_err(invalid)?,
        )),
        HeaderProtectionAlgorithm::Aes256 => Box::new(AesHeaderProtection::Aes256(
            aes::Aes256::new_from_slice(key).map_err(invalid)?,
        )),
        HeaderProtectionAlgorithm::ChaCha20 => {
            let mut hp_key = [0u8; 32];
            hp_key.copy_from_slice(key);
            Box::new(ChaChaHeaderProtection { key: hp_key })
        }
    };
    Ok(provider)
}

// ============================================================================
// AEAD
// ============================================================================

struct RustCryptoAead<A> {
    cipher: A,
    algorithm: AeadAlgorithm,
}

impl<A> AeadProvider for RustCryptoAead<A>
where
    A: Aead + Send + Sync,
{
    fn algorithm(&self) -> AeadAlgorithm {
        self.algorithm
    }

    fn seal(&self, nonce: &[u8; NONCE_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(
                Nonce::<A>::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            // Sealing only fails for plaintexts beyond the cipher's limit
            .map_err(|_| CryptoError::KeyDerivation("AEAD seal").into())
    }

    fn open(&self, nonce: &[u8; NONCE_LEN], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(
                Nonce::<A>::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed.into())
    }
}

// ============================================================================
// Header protection
// ============================================================================

/// AES-based header protection (RFC 9001 Section 5.4.3)
enum AesHeaderProtection {
    Aes128(aes::Aes128),
    Aes256(aes::Aes256),
}

impl HeaderProtectionProvider for AesHeaderProtection {
    fn algorithm(&self) -> HeaderProtectionAlgorithm {
        match self {
            AesHeaderProtection::Aes128(_) => HeaderProtectionAlgorithm::Aes128,
            AesHeaderProtection::Aes256(_) => HeaderProtectionAlgorithm::Aes256,
        }
    }

    fn mask(&self, sample: &[u8; SAMPLE_LEN]) -> Result<[u8; 5]> {
        let mut block = aes::Block::clone_from_slice(sample);
        match self {
            AesHeaderProtection::Aes128(cipher) => cipher.encrypt_block(&mut block),
            AesHeaderProtection::Aes256(cipher) => cipher.encrypt_block(&mut block),
        }
        let mut mask = [0u8; 5];
        mask.copy_from_slice(&block[..5]);
        Ok(mask)
    }
}

/// ChaCha20-based header protection (RFC 9001 Section 5.4.4)
struct ChaChaHeaderProtection {
    key: [u8; 32],
}

impl HeaderProtectionProvider for ChaChaHeaderProtection {
    fn algorithm(&self) -> HeaderProtectionAlgorithm {
        HeaderProtectionAlgorithm::ChaCha20
    }

    fn mask(&self, sample: &[u8; SAMPLE_LEN]) -> Result<[u8; 5]> {
        // counter = sample[0..4] little-endian, nonce = sample[4..16]
        let counter = u32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
        let mut cipher = ChaCha20::new_from_slices(&self.key, &sample[4..])
            .map_err(|_| CryptoError::InvalidKeyLength("header protection"))?;
        cipher.seek(counter as u64 * 64);

        let mut mask = [0u8; 5];
        cipher.apply_keystream(&mut mask);
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample(hex_str: &str) -> [u8; 16] {
        hex::decode(hex_str).unwrap().try_into().unwrap()
    }

    #[test]
    fn test_aes128_mask_rfc9001_client() {
        // RFC 9001 Appendix A.2
        let hp = new_header_protection(
            HeaderProtectionAlgorithm::Aes128,
            &hex::decode("9f50449e04a0e810283a1e9933adedd2").unwrap(),
        )
        .unwrap();
        let mask = hp.mask(&sample("d1b1c98dd7689fb8ec11d242b123dc9b")).unwrap();
        assert_eq!(hex::encode(mask), "437b9aec36");
    }

    #[test]
    fn test_aes128_mask_rfc9001_server() {
        // RFC 9001 Appendix A.3
        let hp = new_header_protection(
            HeaderProtectionAlgorithm::Aes128,
            &hex::decode("c206b8d9b9f0f37644430b490eeaa314").unwrap(),
        )
        .unwrap();
        let mask = hp.mask(&sample("2cd0991cd25b0aac406a5816b6394100")).unwrap();
        assert_eq!(hex::encode(mask), "2ec0d8356a");
    }

    #[test]
    fn test_chacha20_mask_rfc9001() {
        // RFC 9001 Appendix A.5
        let hp = new_header_protection(
            HeaderProtectionAlgorithm::ChaCha20,
            &hex::decode("25a282b9e82f06f21f488917a4fc8f1b73573685608597d0efcb076b0ab7a7a4")
                .unwrap(),
        )
        .unwrap();
        let mask = hp.mask(&sample("5e5cd55c41f69080575d7999c25a5bfb")).unwrap();
        assert_eq!(hex::encode(mask), "aefefe7d03");
    }

    #[test]
    fn test_wrong_key_length() {
        assert!(matches!(
            new_aead(AeadAlgorithm::Aes128Gcm, &[0u8; 32]),
            Err(Error::Crypto(CryptoError::InvalidKeyLength(_)))
        ));
        assert!(new_header_protection(HeaderProtectionAlgorithm::ChaCha20, &[0u8; 16]).is_err());
    }

    mod aead {
        use super::*;

        fn all() -> Vec<Box<dyn AeadProvider>> {
            vec![
                new_aead(AeadAlgorithm::Aes128Gcm, &[7u8; 16]).unwrap(),
                new_aead(AeadAlgorithm::Aes256Gcm, &[7u8; 32]).unwrap(),
                new_aead(AeadAlgorithm::ChaCha20Poly1305, &[7u8; 32]).unwrap(),
            ]
        }

        #[test]
        fn test_seal_open() {
            let nonce = [3u8; 12];
            for aead in all() {
                let sealed = aead.seal(&nonce, b"header", b"payload").unwrap();
                assert_eq!(sealed.len(), b"payload".len() + 16);
                assert_eq!(aead.open(&nonce, b"header", &sealed).unwrap(), b"payload");
            }
        }

        #[test]
        fn test_tampering_fails() {
            let nonce = [3u8; 12];
            for aead in all() {
                let sealed = aead.seal(&nonce, b"header", b"payload").unwrap();

                for i in 0..sealed.len() {
                    let mut tampered = sealed.clone();
                    tampered[i] ^= 0x01;
                    assert_eq!(
                        aead.open(&nonce, b"header", &tampered),
                        Err(Error::Crypto(CryptoError::AuthenticationFailed))
                    );
                }

                assert!(aead.open(&nonce, b"headeR", &sealed).is_err());
                assert!(aead.open(&[4u8; 12], b"header", &sealed).is_err());
            }
        }
    }
}
