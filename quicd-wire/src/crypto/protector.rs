//! # Packet Protection (RFC 9001 Section 5)
//!
//! A [`PacketProtector`] holds the keys of one epoch: at most one [`Sealer`]
//! for packets we write and one [`Opener`] for packets the peer writes.
//!
//! ## Key lifecycle
//!
//! ```text
//! empty ──install_key_set──► sealer and/or opener ──drop_keys──► empty
//! ```
//!
//! Installing into an occupied slot fails with `KeyAlreadyInstalled` and
//! leaves the existing key in place. Dropping is idempotent.

#![forbid(unsafe_code)]

use super::backend::{packet_nonce, AeadProvider, NONCE_LEN, SAMPLE_LEN, TAG_LEN};
use super::keys::{initial_secrets, CipherSuite};
use super::protection::HeaderProtector;
use super::rustcrypto;
use crate::error::{CryptoError, Error, Result};
use crate::packet::number::{self, PacketNumberLength};
use crate::types::{ConnectionId, Epoch, PacketNumber, Side};
use crate::version::Version;
use tracing::debug;

/// Offset of the header protection sample past the start of the packet
/// number field (RFC 9001 Section 5.4.2)
pub const SAMPLE_OFFSET: usize = 4;

// ============================================================================
// Sealer / Opener
// ============================================================================

/// Keys shared by both halves: keyed AEAD, packet IV, header protection.
struct DirectionalKeys {
    aead: Box<dyn AeadProvider>,
    iv: [u8; NONCE_LEN],
    header_protector: HeaderProtector,
}

impl DirectionalKeys {
    fn derive(suite: CipherSuite, secret: &[u8], version: Version) -> Result<Self> {
        let packet_key = suite.compute_key_and_iv(secret, version)?;
        Ok(Self {
            aead: rustcrypto::new_aead(suite.aead(), &packet_key.key)?,
            iv: packet_key.iv,
            header_protector: suite.new_header_protector(secret, version)?,
        })
    }
}

/// Encrypting half of a protector.
pub struct Sealer {
    keys: DirectionalKeys,
}

impl Sealer {
    pub fn new(suite: CipherSuite, secret: &[u8], version: Version) -> Result<Self> {
        Ok(Self {
            keys: DirectionalKeys::derive(suite, secret, version)?,
        })
    }

    /// AEAD-seal `payload` with the unprotected `header` as associated data.
    ///
    /// Returns ciphertext followed by the 16-byte tag.
    pub fn encrypt_payload(
        &self,
        packet_number: PacketNumber,
        header: &[u8],
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let nonce = packet_nonce(&self.keys.iv, packet_number);
        self.keys.aead.seal(&nonce, header, payload)
    }

    /// Apply header protection to `header` using `sample`.
    pub fn protect_header(&self, header: &mut [u8], pn_offset: usize, sample: &[u8]) -> Result<()> {
        self.keys.header_protector.apply_mask(header, pn_offset, sample)
    }

    /// Encrypt the payload, then mask `header` in place with the sample taken
    /// 4 bytes past the packet number offset.
    ///
    /// `header` holds the unprotected header ending with the packet number.
    pub fn seal_packet(
        &self,
        header: &mut [u8],
        pn_offset: usize,
        packet_number: PacketNumber,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let ciphertext = self.encrypt_payload(packet_number, header, payload)?;

        // Sample position relative to the start of the ciphertext
        let sample_start = (pn_offset + SAMPLE_OFFSET)
            .checked_sub(header.len())
            .ok_or(Error::MalformedPacket("header extends past the sample"))?;
        let sample = ciphertext
            .get(sample_start..sample_start + SAMPLE_LEN)
            .ok_or(CryptoError::SampleTooShort {
                needed: sample_start + SAMPLE_LEN,
                available: ciphertext.len(),
            })?;

        self.protect_header(header, pn_offset, sample)?;
        Ok(ciphertext)
    }
}

/// Decrypting half of a protector.
pub struct Opener {
    keys: DirectionalKeys,
}

impl Opener {
    pub fn new(suite: CipherSuite, secret: &[u8], version: Version) -> Result<Self> {
        Ok(Self {
            keys: DirectionalKeys::derive(suite, secret, version)?,
        })
    }

    /// Authenticate and decrypt `ciphertext` (tag included) against the
    /// unprotected `header`.
    pub fn decrypt_payload(
        &self,
        packet_number: PacketNumber,
        header: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::AuthenticationFailed.into());
        }
        let nonce = packet_nonce(&self.keys.iv, packet_number);
        self.keys.aead.open(&nonce, header, ciphertext)
    }

    /// Remove header protection in place, returning the packet number length.
    pub fn unprotect_header(
        &self,
        header: &mut [u8],
        pn_offset: usize,
        sample: &[u8],
    ) -> Result<PacketNumberLength> {
        self.keys.header_protector.remove_mask(header, pn_offset, sample)
    }
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer")
            .field("aead", &self.keys.aead.algorithm())
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for Opener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Opener")
            .field("aead", &self.keys.aead.algorithm())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PacketProtector
// ============================================================================

/// Result of opening one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedPacket {
    /// Unprotected header, ending with the packet number
    pub header: Vec<u8>,
    /// Decrypted payload
    pub payload: Vec<u8>,
    /// Full packet number
    pub packet_number: PacketNumber,
    /// Encoded packet number width
    pub pn_len: PacketNumberLength,
}

/// Keys of one epoch.
#[derive(Debug)]
pub struct PacketProtector {
    epoch: Epoch,
    version: Version,
    sealer: Option<Sealer>,
    opener: Option<Opener>,
}

impl PacketProtector {
    /// Empty protector for `epoch`.
    pub fn new(epoch: Epoch, version: Version) -> Self {
        Self {
            epoch,
            version,
            sealer: None,
            opener: None,
        }
    }

    /// Initial-epoch protector with both keys derived from the client's
    /// first Destination Connection ID.
    pub fn initial(dcid: &ConnectionId, version: Version, ours: Side) -> Result<Self> {
        let secrets = initial_secrets(dcid, version)?;
        let mut protector = Self::new(Epoch::Initial, version);
        for side in [Side::Client, Side::Server] {
            protector.install_key_set(
                CipherSuite::Aes128GcmSha256,
                secrets.for_side(side),
                side,
                ours,
            )?;
        }
        Ok(protector)
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn has_sealer(&self) -> bool {
        self.sealer.is_some()
    }

    pub fn has_opener(&self) -> bool {
        self.opener.is_some()
    }

    /// Install the keys for the traffic secret written by `direction`.
    ///
    /// When `direction` is our own side the secret protects what we send and
    /// becomes the sealer; otherwise it becomes the opener.
    pub fn install_key_set(
        &mut self,
        suite: CipherSuite,
        secret: &[u8],
        direction: Side,
        ours: Side,
    ) -> Result<()> {
        if direction == ours {
            if self.sealer.is_some() {
                return Err(CryptoError::KeyAlreadyInstalled("sealer").into());
            }
            self.sealer = Some(Sealer::new(suite, secret, self.version)?);
        } else {
            if self.opener.is_some() {
                return Err(CryptoError::KeyAlreadyInstalled("opener").into());
            }
            self.opener = Some(Opener::new(suite, secret, self.version)?);
        }

        debug!(
            epoch = %self.epoch,
            direction = %direction,
            suite = suite.as_u16(),
            "installed packet protection keys"
        );
        Ok(())
    }

    /// Discard both keys. Calling it again is a no-op.
    pub fn drop_keys(&mut self) {
        if self.sealer.is_some() || self.opener.is_some() {
            debug!(epoch = %self.epoch, "dropped packet protection keys");
        }
        self.sealer = None;
        self.opener = None;
    }

    pub fn sealer(&self) -> Result<&Sealer> {
        self.sealer
            .as_ref()
            .ok_or(CryptoError::MissingKeys("sealer").into())
    }

    pub fn opener(&self) -> Result<&Opener> {
        self.opener
            .as_ref()
            .ok_or(CryptoError::MissingKeys("opener").into())
    }

    /// Remove protection from one packet.
    ///
    /// `packet` spans exactly one packet, `pn_offset` is the offset of its
    /// packet number and `largest_pn` the largest packet number processed so
    /// far in this epoch's space.
    pub fn open(
        &self,
        packet: &[u8],
        pn_offset: usize,
        largest_pn: Option<PacketNumber>,
    ) -> Result<OpenedPacket> {
        let opener = self.opener()?;

        let sample_start = pn_offset + SAMPLE_OFFSET;
        let sample = packet
            .get(sample_start..sample_start + SAMPLE_LEN)
            .ok_or(CryptoError::SampleTooShort {
                needed: sample_start + SAMPLE_LEN,
                available: packet.len(),
            })?;

        // Copy through the longest possible packet number, then truncate
        let mut header = packet[..sample_start].to_vec();
        let pn_len = opener.unprotect_header(&mut header, pn_offset, sample)?;
        header.truncate(pn_offset + pn_len.len());

        let truncated = number::read_truncated(&header[pn_offset..], pn_len)
            .ok_or(Error::MalformedPacket("truncated packet number"))?;
        let packet_number = number::decode(largest_pn, truncated, pn_len.bits())?;

        let payload = opener.decrypt_payload(packet_number, &header, &packet[header.len()..])?;

        Ok(OpenedPacket {
            header,
            payload,
            packet_number,
            pn_len,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rfc_dcid() -> ConnectionId {
        ConnectionId::from_slice(&hex::decode("8394c8f03e515708").unwrap()).unwrap()
    }

    mod key_installation {
        use super::*;

        #[test]
        fn test_direction_selects_slot() {
            let mut protector = PacketProtector::new(Epoch::Handshake, Version::V1);
            let suite = CipherSuite::Aes128GcmSha256;

            protector
                .install_key_set(suite, &[1; 32], Side::Server, Side::Client)
                .unwrap();
            assert!(protector.has_opener());
            assert!(!protector.has_sealer());

            protector
                .install_key_set(suite, &[2; 32], Side::Client, Side::Client)
                .unwrap();
            assert!(protector.has_sealer());
        }

        #[test]
        fn test_reinstall_rejected_without_mutation() {
            let mut protector = PacketProtector::new(Epoch::Handshake, Version::V1);
            let suite = CipherSuite::Aes128GcmSha256;
            protector
                .install_key_set(suite, &[1; 32], Side::Server, Side::Server)
                .unwrap();
            let before = protector
                .sealer()
                .unwrap()
                .encrypt_payload(1, b"hdr", b"data")
                .unwrap();

            let err = protector
                .install_key_set(suite, &[9; 32], Side::Server, Side::Server)
                .unwrap_err();
            assert_eq!(err, Error::Crypto(CryptoError::KeyAlreadyInstalled("sealer")));
            assert!(err.is_fatal());

            let after = protector
                .sealer()
                .unwrap()
                .encrypt_payload(1, b"hdr", b"data")
                .unwrap();
            assert_eq!(before, after);
        }

        #[test]
        fn test_drop_keys_idempotent() {
            let mut protector = PacketProtector::initial(&rfc_dcid(), Version::V1, Side::Client).unwrap();
            assert!(protector.has_sealer() && protector.has_opener());

            protector.drop_keys();
            protector.drop_keys();
            assert!(!protector.has_sealer());
            assert_eq!(
                protector.sealer().unwrap_err(),
                Error::Crypto(CryptoError::MissingKeys("sealer"))
            );
            assert!(protector.open(&[0u8; 64], 10, None).is_err());
        }
    }

    mod seal_and_open {
        use super::*;

        fn short_header(pn: u8) -> Vec<u8> {
            // 0x41: short header, pn_len 2; DCID 0xaabb
            vec![0x41, 0xaa, 0xbb, 0x00, pn]
        }

        #[test]
        fn test_client_to_server() {
            let client = PacketProtector::initial(&rfc_dcid(), Version::V1, Side::Client).unwrap();
            let server = PacketProtector::initial(&rfc_dcid(), Version::V1, Side::Server).unwrap();

            let mut header = short_header(7);
            let plain_header = header.clone();
            let ciphertext = client
                .sealer()
                .unwrap()
                .seal_packet(&mut header, 3, 7, b"hello, quic")
                .unwrap();
            assert_ne!(header, plain_header);

            let mut packet = header.clone();
            packet.extend_from_slice(&ciphertext);

            let opened = server.open(&packet, 3, Some(5)).unwrap();
            assert_eq!(opened.header, plain_header);
            assert_eq!(opened.payload, b"hello, quic");
            assert_eq!(opened.packet_number, 7);
            assert_eq!(opened.pn_len, PacketNumberLength::TWO);
        }

        #[test]
        fn test_own_packets_do_not_open() {
            let client = PacketProtector::initial(&rfc_dcid(), Version::V1, Side::Client).unwrap();

            let mut header = short_header(1);
            let ciphertext = client
                .sealer()
                .unwrap()
                .seal_packet(&mut header, 3, 1, b"payload bytes")
                .unwrap();
            let mut packet = header;
            packet.extend_from_slice(&ciphertext);

            // The client opener holds the server's keys
            assert!(client.open(&packet, 3, None).is_err());
        }

        #[test]
        fn test_tampered_packet_fails() {
            let client = PacketProtector::initial(&rfc_dcid(), Version::V1, Side::Client).unwrap();
            let server = PacketProtector::initial(&rfc_dcid(), Version::V1, Side::Server).unwrap();

            let mut header = short_header(3);
            let ciphertext = client
                .sealer()
                .unwrap()
                .seal_packet(&mut header, 3, 3, b"payload bytes")
                .unwrap();
            let mut packet = header;
            packet.extend_from_slice(&ciphertext);
            let last = packet.len() - 1;
            packet[last] ^= 0x80;

            assert_eq!(
                server.open(&packet, 3, None).unwrap_err(),
                Error::Crypto(CryptoError::AuthenticationFailed)
            );
        }

        #[test]
        fn test_sample_unavailable() {
            let server = PacketProtector::initial(&rfc_dcid(), Version::V1, Side::Server).unwrap();
            let packet = [0x41u8, 0xaa, 0xbb, 0x00, 0x01, 0x02, 0x03];
            assert!(matches!(
                server.open(&packet, 3, None),
                Err(Error::Crypto(CryptoError::SampleTooShort { .. }))
            ));
        }

        #[test]
        fn test_seal_requires_enough_ciphertext_for_sample() {
            let client = PacketProtector::initial(&rfc_dcid(), Version::V1, Side::Client).unwrap();
            let mut header = short_header(1);
            // 2-byte packet number: payload must be at least 2 bytes
            assert!(client
                .sealer()
                .unwrap()
                .seal_packet(&mut header, 3, 1, b"x")
                .is_err());
        }
    }
}
