use serde::{Deserialize, Serialize};
use vault_archive::SignerPolicy;
use vault_cache::CacheLimits;
use vault_types::DigestAlgorithm;

use crate::error::{AttachmentError, AttachmentResult};

/// Configuration for the attachment service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// When `true`, signed contract version uniqueness is not enforced and
    /// version index anomalies are only warned about. Meant for local
    /// development networks.
    pub dev_mode: bool,
    /// Verify the digest of attachment content as it is read.
    pub verify_on_load: bool,
    /// Digest used to compute ids of newly stored attachments. Content
    /// already stored under another digest keeps its original id.
    pub digest: DigestAlgorithm,
    /// Byte budget of the attachment content cache.
    pub content_cache_max_bytes: u64,
    /// Entry budget of the attachment handle cache.
    pub presence_cache_max_entries: u64,
    /// Entry budget of the per-contract version index cache.
    pub version_cache_max_entries: u64,
    /// How to treat inconsistently signed archives.
    pub signer_policy: SignerPolicy,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            verify_on_load: true,
            digest: DigestAlgorithm::Sha256,
            content_cache_max_bytes: 64 * 1024 * 1024,
            presence_cache_max_entries: 10_000,
            version_cache_max_entries: 1_024,
            signer_policy: SignerPolicy::FailClosed,
        }
    }
}

impl VaultConfig {
    /// A development configuration: no version uniqueness enforcement.
    pub fn permissive() -> Self {
        Self {
            dev_mode: true,
            ..Default::default()
        }
    }

    /// Parse a TOML document. Missing keys take their default values.
    pub fn from_toml_str(text: &str) -> AttachmentResult<Self> {
        toml::from_str(text).map_err(|e| AttachmentError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> AttachmentResult<String> {
        toml::to_string(self).map_err(|e| AttachmentError::Config(e.to_string()))
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            content_max_bytes: self.content_cache_max_bytes,
            presence_max_entries: self.presence_cache_max_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_only_relaxes_uniqueness() {
        let config = VaultConfig::permissive();
        assert!(config.dev_mode);
        assert!(config.verify_on_load);
        assert_eq!(config.signer_policy, SignerPolicy::FailClosed);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = VaultConfig::from_toml_str(
            "dev_mode = true\ndigest = \"blake3\"\nsigner_policy = \"require_consistent\"\n",
        )
        .unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.digest, DigestAlgorithm::Blake3);
        assert_eq!(config.signer_policy, SignerPolicy::RequireConsistent);
        assert_eq!(config.content_cache_max_bytes, VaultConfig::default().content_cache_max_bytes);
    }

    #[test]
    fn toml_round_trip() {
        let config = VaultConfig {
            content_cache_max_bytes: 1024,
            ..VaultConfig::permissive()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(VaultConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn unknown_digest_is_a_config_error() {
        let err = VaultConfig::from_toml_str("digest = \"md5\"").unwrap_err();
        assert!(matches!(err, AttachmentError::Config(_)));
    }
}
