//! Engine configuration.
//!
//! One immutable [`EngineConfig`] is shared by every connection an endpoint
//! drives. It can be loaded from any serde format; missing fields take
//! their defaults.

use crate::error::Error;
use crate::types::MAX_CID_LENGTH;
use crate::version::{Version, VERSION_1, VERSION_2};
use serde::{Deserialize, Serialize};

/// Configuration for the wire protocol engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Versions offered in Version Negotiation, most preferred first.
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<u32>,

    /// Longest connection ID accepted from a peer.
    #[serde(default = "default_max_connection_id_length")]
    pub max_connection_id_length: usize,

    /// Length of the NEW_TOKEN a server issues when the handshake completes.
    #[serde(default = "default_new_token_length")]
    pub new_token_length: usize,

    /// Inbound packets held while a connection cannot process them yet.
    #[serde(default = "default_max_buffered_packets")]
    pub max_buffered_packets: usize,

    /// Unprocessed CRYPTO bytes held per direction.
    #[serde(default = "default_max_crypto_buffer")]
    pub max_crypto_buffer: usize,

    /// Length of locally issued connection IDs, needed to parse short headers.
    #[serde(default = "default_short_header_dcid_length")]
    pub short_header_dcid_length: usize,

    /// Congestion controller name. Not interpreted by the engine.
    #[serde(default = "default_congestion_control")]
    pub congestion_control: String,

    /// Connection-level flow control limit. Not enforced by the engine.
    #[serde(default = "default_initial_max_data")]
    pub initial_max_data: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supported_versions: default_supported_versions(),
            max_connection_id_length: default_max_connection_id_length(),
            new_token_length: default_new_token_length(),
            max_buffered_packets: default_max_buffered_packets(),
            max_crypto_buffer: default_max_crypto_buffer(),
            short_header_dcid_length: default_short_header_dcid_length(),
            congestion_control: default_congestion_control(),
            initial_max_data: default_initial_max_data(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration, collecting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.supported_versions.is_empty() {
            errors.push("supported_versions must not be empty".to_string());
        }
        for &v in &self.supported_versions {
            let version = Version::from_u32(v);
            if version.is_negotiation() {
                errors.push("supported_versions must not contain 0".to_string());
            } else if version.is_reserved() {
                errors.push(format!(
                    "supported_versions contains reserved version {:#010x}",
                    v
                ));
            }
        }

        if self.max_connection_id_length > MAX_CID_LENGTH {
            errors.push(format!(
                "max_connection_id_length {} exceeds {}",
                self.max_connection_id_length, MAX_CID_LENGTH
            ));
        }
        if self.short_header_dcid_length > self.max_connection_id_length {
            errors.push(format!(
                "short_header_dcid_length {} exceeds max_connection_id_length {}",
                self.short_header_dcid_length, self.max_connection_id_length
            ));
        }
        if self.new_token_length == 0 {
            errors.push("new_token_length must be greater than 0".to_string());
        }
        if self.max_buffered_packets == 0 {
            errors.push("max_buffered_packets must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and convert the collected problems into an [`Error`].
    pub fn check(&self) -> crate::error::Result<()> {
        self.validate().map_err(|errors| Error::InvalidConfig(errors.join("; ")))
    }

    /// Supported versions as [`Version`] values, preference order kept.
    pub fn versions(&self) -> impl Iterator<Item = Version> + '_ {
        self.supported_versions.iter().copied().map(Version::from_u32)
    }
}

fn default_supported_versions() -> Vec<u32> {
    vec![VERSION_1, VERSION_2]
}

fn default_max_connection_id_length() -> usize {
    MAX_CID_LENGTH
}

fn default_new_token_length() -> usize {
    32
}

fn default_max_buffered_packets() -> usize {
    256
}

fn default_max_crypto_buffer() -> usize {
    64 * 1024
}

fn default_short_header_dcid_length() -> usize {
    8
}

fn default_congestion_control() -> String {
    "none".to_string()
}

fn default_initial_max_data() -> u64 {
    1 << 20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.supported_versions, vec![0x00000001, 0x6b3343cf]);
        assert_eq!(
            config.versions().collect::<Vec<_>>(),
            vec![Version::V1, Version::V2]
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            supported_versions = [1]
            max_buffered_packets = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.supported_versions, vec![1]);
        assert_eq!(config.max_buffered_packets, 16);
        assert_eq!(config.max_crypto_buffer, 65536);
        assert_eq!(config.congestion_control, "none");
    }

    #[test]
    fn test_validation_collects_errors() {
        let config = EngineConfig {
            supported_versions: vec![0, 0x1a2a3a4a],
            max_connection_id_length: 21,
            new_token_length: 0,
            max_buffered_packets: 0,
            ..EngineConfig::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("reserved")));
    }

    #[test]
    fn test_check_reports_every_problem() {
        let config = EngineConfig {
            supported_versions: Vec::new(),
            max_buffered_packets: 0,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.check().unwrap_err(),
            Error::InvalidConfig(
                "supported_versions must not be empty; \
                 max_buffered_packets must be greater than 0"
                    .to_string()
            )
        );
        assert_eq!(EngineConfig::default().check(), Ok(()));
    }

    #[test]
    fn test_empty_versions_rejected() {
        let config = EngineConfig {
            supported_versions: Vec::new(),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_dcid_bounded_by_max() {
        let config = EngineConfig {
            max_connection_id_length: 4,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate().unwrap_err().len(), 1);
    }
}
