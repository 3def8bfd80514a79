//! # Packet Protection Engine (RFC 9001)
//!
//! - [`backend`]: provider traits for AEAD and header protection
//! - [`rustcrypto`]: the RustCrypto implementations of those traits
//! - [`keys`]: cipher suites, HKDF-Expand-Label and Initial secrets
//! - [`protection`]: header protection mask application
//! - [`protector`]: per-epoch sealer/opener pairs

pub mod backend;
pub mod keys;
pub mod protection;
pub mod protector;
pub mod rustcrypto;

pub use backend::{AeadAlgorithm, HeaderProtectionAlgorithm, SAMPLE_LEN, TAG_LEN};
pub use keys::{initial_secrets, CipherSuite, InitialSecrets, PacketKey};
pub use protection::HeaderProtector;
pub use protector::{OpenedPacket, Opener, PacketProtector, Sealer};
