//! # Header Protection (RFC 9001 Section 5.4)
//!
//! Header protection hides the packet number and the low bits of the first
//! byte from on-path observers. A 5-byte mask is derived from a sample of the
//! ciphertext; mask byte 0 covers the first byte (low 4 bits for long
//! headers, low 5 for short headers) and mask bytes 1..=4 cover the packet
//! number.
//!
//! Applying uses the packet number length from the unprotected first byte;
//! removing reads it from the first byte once it has been unmasked. Removing
//! a mask that was just applied with the same sample restores the header bit
//! for bit.

#![forbid(unsafe_code)]

use super::backend::{HeaderProtectionAlgorithm, HeaderProtectionProvider, SAMPLE_LEN};
use super::rustcrypto;
use crate::error::{CryptoError, Error, Result};
use crate::packet::header::HeaderForm;
use crate::packet::number::PacketNumberLength;

/// Keyed header protection for one direction of one epoch.
pub struct HeaderProtector {
    provider: Box<dyn HeaderProtectionProvider>,
}

impl HeaderProtector {
    pub fn new(provider: Box<dyn HeaderProtectionProvider>) -> Self {
        Self { provider }
    }

    /// Build a protector from a raw header protection key.
    pub fn from_key(algorithm: HeaderProtectionAlgorithm, key: &[u8]) -> Result<Self> {
        Ok(Self::new(rustcrypto::new_header_protection(algorithm, key)?))
    }

    pub fn algorithm(&self) -> HeaderProtectionAlgorithm {
        self.provider.algorithm()
    }

    /// Derive the mask from the first 16 bytes of `sample`.
    pub fn mask(&self, sample: &[u8]) -> Result<[u8; 5]> {
        let sample: &[u8; SAMPLE_LEN] = sample
            .get(..SAMPLE_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or(CryptoError::SampleTooShort {
                needed: SAMPLE_LEN,
                available: sample.len(),
            })?;
        self.provider.mask(sample)
    }

    /// Protect an unprotected header in place.
    ///
    /// `header` must hold at least `pn_offset` plus the packet number length
    /// encoded in its first byte.
    pub fn apply_mask(&self, header: &mut [u8], pn_offset: usize, sample: &[u8]) -> Result<()> {
        let first = *header
            .first()
            .ok_or(Error::MalformedPacket("empty header"))?;
        let pn_len = PacketNumberLength::from_first_byte(first);
        let mask = self.mask(sample)?;

        xor_packet_number(header, pn_offset, pn_len, &mask)?;
        header[0] ^= mask[0] & HeaderForm::from_first_byte(first).protected_bits();
        Ok(())
    }

    /// Remove protection in place, returning the packet number length read
    /// from the unmasked first byte.
    ///
    /// Only the first `pn_offset + pn_len` bytes of `header` are meaningful
    /// afterwards; any bytes past the packet number are left untouched.
    pub fn remove_mask(
        &self,
        header: &mut [u8],
        pn_offset: usize,
        sample: &[u8],
    ) -> Result<PacketNumberLength> {
        let first = *header
            .first()
            .ok_or(Error::MalformedPacket("empty header"))?;
        let mask = self.mask(sample)?;

        let unmasked = first ^ (mask[0] & HeaderForm::from_first_byte(first).protected_bits());
        let pn_len = PacketNumberLength::from_first_byte(unmasked);

        xor_packet_number(header, pn_offset, pn_len, &mask)?;
        header[0] = unmasked;
        Ok(pn_len)
    }
}

impl std::fmt::Debug for HeaderProtector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderProtector")
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

fn xor_packet_number(
    header: &mut [u8],
    pn_offset: usize,
    pn_len: PacketNumberLength,
    mask: &[u8; 5],
) -> Result<()> {
    let field = header
        .get_mut(pn_offset..pn_offset + pn_len.len())
        .ok_or(Error::MalformedPacket("header shorter than packet number"))?;
    for (byte, m) in field.iter_mut().zip(&mask[1..]) {
        *byte ^= m;
    }
    Ok(())
}
