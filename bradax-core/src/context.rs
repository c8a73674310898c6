use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::types::{ModelId, ProjectId, RequestId};

/// Telemetry headers forwarded by the SDK with every protected request.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub sdk_version: Option<String>,
    pub platform: Option<String>,
    pub fingerprint: Option<String>,
    pub session_id: Option<String>,
}

/// Per-request ephemeral state, owned by the handling task for the
/// request's lifetime.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub project_id: ProjectId,
    pub model_id: ModelId,
    /// SHA-256 hex digest of the inbound payload.
    pub payload_hash: String,
    pub received_at: DateTime<Utc>,
    pub client: ClientInfo,
}

impl RequestContext {
    #[must_use]
    pub fn new(request_id: RequestId, project_id: ProjectId, model_id: ModelId, payload: &[u8]) -> Self {
        Self {
            request_id,
            project_id,
            model_id,
            payload_hash: hash_payload(payload),
            received_at: Utc::now(),
            client: ClientInfo::default(),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }
}

/// SHA-256 hex digest of an inbound payload.
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_hash_is_stable() {
        let a = hash_payload(b"hello");
        let b = hash_payload(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, hash_payload(b"hello!"));
    }

    #[test]
    fn context_carries_hash() {
        let ctx = RequestContext::new(
            RequestId::new("r-1"),
            ProjectId::new("proj_real_001"),
            ModelId::new("gpt-4.1-nano"),
            b"{}",
        );
        assert_eq!(ctx.payload_hash, hash_payload(b"{}"));
    }
}
