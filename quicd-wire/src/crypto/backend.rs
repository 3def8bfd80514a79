//! # Cryptographic Backend Traits (RFC 9001)
//!
//! The packet protection engine talks to cipher implementations only through
//! the two traits in this module, so the AEAD and header protection
//! primitives can be swapped without touching sealing or opening logic.
//!
//! ## RFC 9001: Using TLS to Secure QUIC
//!
//! - AEAD encryption of payloads (AES-GCM, ChaCha20-Poly1305), Section 5.3
//! - Header protection (AES-ECB or ChaCha20), Section 5.4

#![forbid(unsafe_code)]

use crate::error::Result;
use crate::types::PacketNumber;

/// Length of the AEAD authentication tag for every QUIC cipher suite
pub const TAG_LEN: usize = 16;

/// Length of the ciphertext sample fed to header protection
pub const SAMPLE_LEN: usize = 16;

/// Length of the AEAD nonce and packet IV
pub const NONCE_LEN: usize = 12;

/// AEAD Algorithm Identifier (RFC 9001 Section 5.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadAlgorithm {
    /// AES-128-GCM
    Aes128Gcm,

    /// AES-256-GCM
    Aes256Gcm,

    /// ChaCha20-Poly1305
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    /// Returns the key length in bytes for this algorithm
    pub fn key_len(&self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm => 16,
            AeadAlgorithm::Aes256Gcm => 32,
            AeadAlgorithm::ChaCha20Poly1305 => 32,
        }
    }

    /// Returns the IV length in bytes for this algorithm
    pub fn iv_len(&self) -> usize {
        NONCE_LEN
    }

    /// Returns the authentication tag length in bytes
    pub fn tag_len(&self) -> usize {
        TAG_LEN
    }

    /// Header protection cipher paired with this AEAD (RFC 9001 Section 5.4.3, 5.4.4)
    pub fn header_protection(&self) -> HeaderProtectionAlgorithm {
        match self {
            AeadAlgorithm::Aes128Gcm => HeaderProtectionAlgorithm::Aes128,
            AeadAlgorithm::Aes256Gcm => HeaderProtectionAlgorithm::Aes256,
            AeadAlgorithm::ChaCha20Poly1305 => HeaderProtectionAlgorithm::ChaCha20,
        }
    }
}

/// Header Protection Algorithm (RFC 9001 Section 5.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderProtectionAlgorithm {
    /// AES-128-ECB (for AES-128-GCM)
    Aes128,

    /// AES-256-ECB (for AES-256-GCM)
    Aes256,

    /// ChaCha20 (for ChaCha20-Poly1305)
    ChaCha20,
}

impl HeaderProtectionAlgorithm {
    pub fn key_len(&self) -> usize {
        match self {
            HeaderProtectionAlgorithm::Aes128 => 16,
            HeaderProtectionAlgorithm::Aes256 | HeaderProtectionAlgorithm::ChaCha20 => 32,
        }
    }
}

/// Keyed AEAD instance (RFC 9001 Section 5.3)
///
/// One instance protects one direction of one epoch. The packet IV is not
/// part of the provider: callers build the nonce with [`packet_nonce`].
pub trait AeadProvider: Send + Sync {
    /// Algorithm this instance was keyed for
    fn algorithm(&self) -> AeadAlgorithm;

    /// Encrypt `plaintext`, returning ciphertext followed by the 16-byte tag.
    fn seal(&self, nonce: &[u8; NONCE_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Authenticate and decrypt `ciphertext` (tag included).
    ///
    /// # Errors
    /// `CryptoError::AuthenticationFailed` if the tag does not verify.
    fn open(&self, nonce: &[u8; NONCE_LEN], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Keyed header protection instance (RFC 9001 Section 5.4)
pub trait HeaderProtectionProvider: Send + Sync {
    /// Algorithm this instance was keyed for
    fn algorithm(&self) -> HeaderProtectionAlgorithm;

    /// Derive the 5-byte mask from a 16-byte ciphertext sample.
    fn mask(&self, sample: &[u8; SAMPLE_LEN]) -> Result<[u8; 5]>;
}

/// Build the AEAD nonce: the packet IV XORed with the packet number,
/// left-padded to the IV length (RFC 9001 Section 5.3).
pub fn packet_nonce(iv: &[u8; NONCE_LEN], packet_number: PacketNumber) -> [u8; NONCE_LEN] {
    let mut nonce = *iv;
    let pn_bytes = packet_number.to_be_bytes();
    for (n, p) in nonce[NONCE_LEN - 8..].iter_mut().zip(pn_bytes.iter()) {
        *n ^= p;
    }
    nonce
}
