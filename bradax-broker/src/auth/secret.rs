use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use bradax_core::types::ProjectId;

type HmacSha256 = Hmac<Sha256>;

/// Context string mixed into every per-project derivation. Versioned so a
/// future `v2` can change the scheme without breaking `v1` validation.
const DERIVATION_CONTEXT: &str = "bradax-jwt-v1::";

/// The key-derivation version issued by this broker.
pub const CURRENT_KEY_VERSION: u32 = 1;

/// Derive the per-project HS256 signing key:
/// `HMAC-SHA256(master_secret, "bradax-jwt-v1::" + lower(project_id))`.
///
/// Derived secrets are computed on demand and never persisted.
#[must_use]
pub fn derive_project_secret(master_secret: &[u8], project_id: &ProjectId) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(master_secret).expect("HMAC accepts any key size");
    mac.update(DERIVATION_CONTEXT.as_bytes());
    mac.update(project_id.as_str().to_lowercase().as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// The versioned key-id carried in a token header: `p:<project_id>:v<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyId {
    pub project_id: ProjectId,
    pub version: u32,
}

impl KeyId {
    /// The current-version key-id for a project.
    #[must_use]
    pub fn current(project_id: ProjectId) -> Self {
        Self {
            project_id,
            version: CURRENT_KEY_VERSION,
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p:{}:v{}", self.project_id, self.version)
    }
}

/// Error parsing a key-id string.
#[derive(Debug, thiserror::Error)]
#[error("malformed key-id")]
pub struct KeyIdParseError;

impl FromStr for KeyId {
    type Err = KeyIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some("p"), Some(project), Some(version), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(KeyIdParseError);
        };
        if project.is_empty() {
            return Err(KeyIdParseError);
        }
        let version = version
            .strip_prefix('v')
            .and_then(|v| v.parse().ok())
            .ok_or(KeyIdParseError)?;
        Ok(Self {
            project_id: ProjectId::new(project),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_project_secret(MASTER, &ProjectId::new("proj_real_001"));
        let b = derive_project_secret(MASTER, &ProjectId::new("proj_real_001"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn derivation_segregates_projects() {
        let a = derive_project_secret(MASTER, &ProjectId::new("proj_real_001"));
        let b = derive_project_secret(MASTER, &ProjectId::new("proj_real_002"));
        assert_ne!(a, b);
    }

    #[test]
    fn derivation_lowercases_the_project_id() {
        let lower = derive_project_secret(MASTER, &ProjectId::new("proj_real_001"));
        let upper = derive_project_secret(MASTER, &ProjectId::new("PROJ_REAL_001"));
        assert_eq!(lower, upper);
    }

    #[test]
    fn key_id_round_trip() {
        let kid = KeyId::current(ProjectId::new("proj_real_001"));
        assert_eq!(kid.to_string(), "p:proj_real_001:v1");
        let back: KeyId = "p:proj_real_001:v1".parse().unwrap();
        assert_eq!(back, kid);
    }

    #[test]
    fn key_id_rejects_malformed_strings() {
        assert!("proj_real_001".parse::<KeyId>().is_err());
        assert!("p:proj_real_001".parse::<KeyId>().is_err());
        assert!("p::v1".parse::<KeyId>().is_err());
        assert!("p:proj:v".parse::<KeyId>().is_err());
        assert!("p:proj:1".parse::<KeyId>().is_err());
        assert!("q:proj:v1".parse::<KeyId>().is_err());
        assert!("p:proj:v1:extra".parse::<KeyId>().is_err());
    }

    #[test]
    fn key_id_parses_future_versions() {
        let kid: KeyId = "p:proj_real_001:v2".parse().unwrap();
        assert_eq!(kid.version, 2);
    }
}
