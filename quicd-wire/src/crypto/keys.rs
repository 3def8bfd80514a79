//! # Key Derivation (RFC 9001 Section 5)
//!
//! Packet keys are expanded from TLS traffic secrets with HKDF-Expand-Label
//! (RFC 8446 Section 7.1), using the labels of the negotiated QUIC version.
//! Initial secrets are the exception: both endpoints derive them from the
//! client's first Destination Connection ID, so they are computed here
//! rather than handed over by TLS.
//!
//! ```text
//! initial_secret = HKDF-Extract(initial_salt, client_dst_connection_id)
//! client_initial_secret = HKDF-Expand-Label(initial_secret, "client in", "", 32)
//! server_initial_secret = HKDF-Expand-Label(initial_secret, "server in", "", 32)
//! ```

#![forbid(unsafe_code)]

use super::backend::{AeadAlgorithm, NONCE_LEN};
use super::protection::HeaderProtector;
use crate::error::{CryptoError, Result};
use crate::types::{ConnectionId, Side};
use crate::version::Version;
use hkdf::Hkdf;
use sha2::{Sha256, Sha384};

/// Prefix prepended to every HKDF-Expand-Label label (RFC 8446 Section 7.1)
const LABEL_PREFIX: &[u8] = b"tls13 ";

/// Length of Initial secrets, the SHA-256 output size
pub const INITIAL_SECRET_LEN: usize = 32;

/// TLS 1.3 cipher suites usable with QUIC (RFC 9001 Section 5.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherSuite {
    /// TLS_AES_128_GCM_SHA256 (0x1301)
    Aes128GcmSha256,
    /// TLS_AES_256_GCM_SHA384 (0x1302)
    Aes256GcmSha384,
    /// TLS_CHACHA20_POLY1305_SHA256 (0x1303)
    ChaCha20Poly1305Sha256,
}

/// AEAD key and IV for one direction of one epoch.
#[derive(Clone, PartialEq, Eq)]
pub struct PacketKey {
    pub key: Vec<u8>,
    pub iv: [u8; NONCE_LEN],
}

impl std::fmt::Debug for PacketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketKey")
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}

impl CipherSuite {
    /// Look up a suite by its TLS identifier.
    pub fn from_u16(id: u16) -> Result<Self> {
        match id {
            0x1301 => Ok(CipherSuite::Aes128GcmSha256),
            0x1302 => Ok(CipherSuite::Aes256GcmSha384),
            0x1303 => Ok(CipherSuite::ChaCha20Poly1305Sha256),
            other => Err(CryptoError::UnsupportedCipherSuite(other).into()),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            CipherSuite::Aes128GcmSha256 => 0x1301,
            CipherSuite::Aes256GcmSha384 => 0x1302,
            CipherSuite::ChaCha20Poly1305Sha256 => 0x1303,
        }
    }

    pub fn aead(self) -> AeadAlgorithm {
        match self {
            CipherSuite::Aes128GcmSha256 => AeadAlgorithm::Aes128Gcm,
            CipherSuite::Aes256GcmSha384 => AeadAlgorithm::Aes256Gcm,
            CipherSuite::ChaCha20Poly1305Sha256 => AeadAlgorithm::ChaCha20Poly1305,
        }
    }

    /// Output length of the suite's hash, which is also the length of its
    /// traffic secrets.
    pub fn secret_len(self) -> usize {
        match self {
            CipherSuite::Aes256GcmSha384 => 48,
            _ => 32,
        }
    }

    /// HKDF-Expand-Label(secret, label, context, len) with this suite's hash.
    pub fn hkdf_expand_label(
        self,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        len: usize,
    ) -> Result<Vec<u8>> {
        let info = hkdf_label(label, context, len)?;
        let mut out = vec![0u8; len];
        let expanded = match self {
            CipherSuite::Aes256GcmSha384 => Hkdf::<Sha384>::from_prk(secret)
                .map_err(|_| CryptoError::KeyDerivation("secret shorter than hash output"))?
                .expand(&info, &mut out),
            _ => Hkdf::<Sha256>::from_prk(secret)
                .map_err(|_| CryptoError::KeyDerivation("secret shorter than hash output"))?
                .expand(&info, &mut out),
        };
        expanded.map_err(|_| CryptoError::KeyDerivation("HKDF output too long"))?;
        Ok(out)
    }

    /// Expand a traffic secret into the AEAD key and IV (RFC 9001 Section 5.1).
    pub fn compute_key_and_iv(self, secret: &[u8], version: Version) -> Result<PacketKey> {
        let labels = version.key_labels()?;
        let key = self.hkdf_expand_label(secret, labels.key, &[], self.aead().key_len())?;
        let iv_bytes = self.hkdf_expand_label(secret, labels.iv, &[], NONCE_LEN)?;

        let mut iv = [0u8; NONCE_LEN];
        iv.copy_from_slice(&iv_bytes);
        Ok(PacketKey { key, iv })
    }

    /// Header protection key for `secret` (RFC 9001 Section 5.4).
    pub fn header_protection_key(self, secret: &[u8], version: Version) -> Result<Vec<u8>> {
        let labels = version.key_labels()?;
        let hp = self.aead().header_protection();
        self.hkdf_expand_label(secret, labels.hp, &[], hp.key_len())
    }

    /// Build the header protector keyed from `secret`.
    pub fn new_header_protector(self, secret: &[u8], version: Version) -> Result<HeaderProtector> {
        let key = self.header_protection_key(secret, version)?;
        HeaderProtector::from_key(self.aead().header_protection(), &key)
    }
}

/// Serialized HkdfLabel structure (RFC 8446 Section 7.1)
fn hkdf_label(label: &[u8], context: &[u8], len: usize) -> Result<Vec<u8>> {
    let full_label_len = LABEL_PREFIX.len() + label.len();
    let too_long = CryptoError::KeyDerivation("HKDF label field too long");
    let out_len = u16::try_from(len).map_err(|_| too_long.clone())?;
    let label_len = u8::try_from(full_label_len).map_err(|_| too_long.clone())?;
    let context_len = u8::try_from(context.len()).map_err(|_| too_long)?;

    let mut info = Vec::with_capacity(2 + 1 + full_label_len + 1 + context.len());
    info.extend_from_slice(&out_len.to_be_bytes());
    info.push(label_len);
    info.extend_from_slice(LABEL_PREFIX);
    info.extend_from_slice(label);
    info.push(context_len);
    info.extend_from_slice(context);
    Ok(info)
}

/// Client and server Initial secrets for one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct InitialSecrets {
    pub client: Vec<u8>,
    pub server: Vec<u8>,
}

impl InitialSecrets {
    /// Secret used by the endpoint writing as `side`.
    pub fn for_side(&self, side: Side) -> &[u8] {
        match side {
            Side::Client => &self.client,
            Side::Server => &self.server,
        }
    }
}

impl std::fmt::Debug for InitialSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("InitialSecrets(..)")
    }
}

/// HKDF-Extract of the Destination Connection ID with the version's salt.
pub fn initial_secret(dcid: &ConnectionId, version: Version) -> Result<[u8; INITIAL_SECRET_LEN]> {
    let salt = version.initial_salt()?;
    let (prk, _) = Hkdf::<Sha256>::extract(Some(&salt[..]), dcid.as_bytes());
    let mut secret = [0u8; INITIAL_SECRET_LEN];
    secret.copy_from_slice(&prk);
    Ok(secret)
}

/// Derive both Initial secrets from the client's first DCID.
///
/// Initial packets are always protected with AES-128-GCM and SHA-256,
/// whatever suite the handshake later negotiates.
pub fn initial_secrets(dcid: &ConnectionId, version: Version) -> Result<InitialSecrets> {
    let initial = initial_secret(dcid, version)?;
    let suite = CipherSuite::Aes128GcmSha256;
    Ok(InitialSecrets {
        client: suite.hkdf_expand_label(&initial, b"client in", &[], INITIAL_SECRET_LEN)?,
        server: suite.hkdf_expand_label(&initial, b"server in", &[], INITIAL_SECRET_LEN)?,
    })
}
