pub mod api_key;
pub mod secret;
pub mod token;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use bradax_core::principal::Principal;
use bradax_core::types::ProjectId;
use bradax_store::ProjectStore;
use bradax_telemetry::{TelemetryEvent, TelemetryKind, TelemetryWriter};

use crate::config::MasterSecret;

use self::api_key::{parse_api_key, secret_matches_hash};
use self::secret::{derive_project_secret, KeyId};
use self::token::{encode_token, decode_token, token_key_id, Claims, TokenError};

/// Scopes granted to every issued project token.
const DEFAULT_SCOPES: &[&str] = &["llm:invoke", "llm:models", "project:read"];

/// A freshly issued token.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in_secs: u64,
    pub project_id: ProjectId,
}

/// An authentication rejection: a stable reason code plus a message that
/// never carries token or secret material.
#[derive(Debug)]
pub struct AuthFailure {
    pub code: &'static str,
    pub message: String,
}

impl AuthFailure {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Issues and verifies per-project signed tokens.
///
/// Signing keys are derived on demand from the master secret and the
/// project id; nothing key-like is ever persisted or logged. Every
/// issuance and rejection is recorded as an `authentication` event.
pub struct AuthService {
    master_secret: MasterSecret,
    projects: Arc<ProjectStore>,
    writer: Arc<TelemetryWriter>,
    expiry_minutes: u64,
}

impl AuthService {
    pub fn new(
        master_secret: MasterSecret,
        projects: Arc<ProjectStore>,
        writer: Arc<TelemetryWriter>,
        expiry_minutes: u64,
    ) -> Self {
        Self {
            master_secret,
            projects,
            writer,
            expiry_minutes,
        }
    }

    /// Issue a token for a project after verifying its api-key against the
    /// stored fingerprint under the strict prefix rule.
    pub async fn issue_token(
        &self,
        project_id: &ProjectId,
        api_key: &str,
    ) -> Result<IssuedToken, AuthFailure> {
        let project = match self.projects.get(project_id) {
            Ok(project) if project.is_active() => project,
            _ => {
                return Err(self
                    .reject(project_id, "auth_unknown_project", "project not found or not active")
                    .await);
            }
        };

        let parsed = match parse_api_key(api_key, project_id) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(project_id = %project_id, reason = %e, "api-key rejected");
                return Err(self
                    .reject(project_id, "auth_invalid", "api-key is malformed")
                    .await);
            }
        };

        if !secret_matches_hash(&parsed.secret, &project.api_key_hash) {
            return Err(self
                .reject(project_id, "auth_invalid", "api-key does not match the stored fingerprint")
                .await);
        }

        let kid = KeyId::current(project_id.clone());
        let signing_key = derive_project_secret(self.master_secret.as_bytes(), project_id);

        let now = Utc::now().timestamp();
        let expires_in_secs = self.expiry_minutes * 60;
        let claims = Claims {
            sub: project_id.to_string(),
            project_id: project_id.clone(),
            organization: project.organization.clone().or(Some(parsed.organization)),
            scopes: DEFAULT_SCOPES.iter().map(|s| (*s).to_owned()).collect(),
            iat: now,
            exp: now + expires_in_secs as i64,
        };

        let token = encode_token(&claims, &kid, &signing_key)
            .map_err(|_| AuthFailure::new("auth_invalid", "token could not be issued"))?;

        self.record(project_id, true, None).await;
        info!(project_id = %project_id, "token issued");

        Ok(IssuedToken {
            token,
            expires_in_secs,
            project_id: project_id.clone(),
        })
    }

    /// Verify a bearer token and return the principal it carries.
    pub async fn verify_token(&self, token: &str) -> Result<Principal, AuthFailure> {
        let kid = match token_key_id(token) {
            Ok(kid) => kid,
            Err(e) => {
                return Err(self
                    .reject(&ProjectId::new("unknown"), "auth_invalid", e.to_string())
                    .await);
            }
        };

        let signing_key = derive_project_secret(self.master_secret.as_bytes(), &kid.project_id);
        let project_id = kid.project_id.clone();
        match decode_token(token, &kid, &signing_key) {
            Ok(principal) => Ok(principal),
            Err(TokenError::Expired) => {
                Err(self.reject(&project_id, "auth_expired", "token expired").await)
            }
            Err(e) => Err(self.reject(&project_id, "auth_invalid", e.to_string()).await),
        }
    }

    async fn reject(
        &self,
        project_id: &ProjectId,
        code: &'static str,
        message: impl Into<String>,
    ) -> AuthFailure {
        self.record(project_id, false, Some(code)).await;
        AuthFailure::new(code, message)
    }

    async fn record(&self, project_id: &ProjectId, success: bool, reason: Option<&str>) {
        let event = TelemetryEvent::new(TelemetryKind::Authentication {
            project_id: project_id.clone(),
            success,
            reason: reason.map(str::to_owned),
        });
        if let Err(e) = self.writer.record_event(&event).await {
            warn!(error = %e, "failed to record authentication event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bradax_core::project::{ProjectRecord, ProjectStatus};
    use bradax_core::types::ModelId;
    use bradax_store::write_atomic;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";
    const API_KEY: &str = "bradax_proj_real_001_acme_a1b2c3d4e5f60718ff_12345678";

    fn project(id: &str, status: ProjectStatus) -> ProjectRecord {
        ProjectRecord {
            project_id: ProjectId::new(id),
            name: id.to_uppercase(),
            description: None,
            organization: Some("acme".to_owned()),
            api_key_hash: "a1b2c3d4e5f60718".to_owned(),
            allowed_models: vec![ModelId::new("gpt-4.1-nano")],
            status,
            budget_remaining: 100.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(dir: &tempfile::TempDir) -> (AuthService, Arc<TelemetryWriter>) {
        let projects = vec![
            project("proj_real_001", ProjectStatus::Active),
            project("proj_real_002", ProjectStatus::Active),
            project("proj_off", ProjectStatus::Suspended),
        ];
        let path = dir.path().join("projects.json");
        write_atomic(&path, &serde_json::to_vec_pretty(&projects).unwrap()).unwrap();

        let writer = Arc::new(TelemetryWriter::new(dir.path()).unwrap());
        let master = crate::config::BrokerConfig::from_lookup(|name| match name {
            "MASTER_JWT_SECRET" => Some(SECRET.to_owned()),
            "PROVIDER_API_KEY" => Some("sk-x".to_owned()),
            _ => None,
        })
        .unwrap()
        .master_secret;

        let auth = AuthService::new(
            master,
            Arc::new(ProjectStore::load(path).unwrap()),
            Arc::clone(&writer),
            15,
        );
        (auth, writer)
    }

    #[tokio::test]
    async fn issue_and_verify() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, writer) = service(&dir);

        let issued = auth
            .issue_token(&ProjectId::new("proj_real_001"), API_KEY)
            .await
            .unwrap();
        assert_eq!(issued.expires_in_secs, 15 * 60);

        let principal = auth.verify_token(&issued.token).await.unwrap();
        assert_eq!(principal.project_id, ProjectId::new("proj_real_001"));
        assert_eq!(principal.organization.as_deref(), Some("acme"));
        assert!(principal.has_scope("llm:invoke"));

        // Issuance is logged as a successful authentication event.
        let events = writer.read_events().await.unwrap();
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            TelemetryKind::Authentication { success: true, .. }
        )));
    }

    #[tokio::test]
    async fn unknown_project_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, _) = service(&dir);
        let err = auth
            .issue_token(&ProjectId::new("proj_ghost"), API_KEY)
            .await
            .unwrap_err();
        assert_eq!(err.code, "auth_unknown_project");
    }

    #[tokio::test]
    async fn suspended_project_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, _) = service(&dir);
        let key = "bradax_proj_off_acme_a1b2c3d4e5f60718ff_12345678";
        let err = auth
            .issue_token(&ProjectId::new("proj_off"), key)
            .await
            .unwrap_err();
        assert_eq!(err.code, "auth_unknown_project");
    }

    #[tokio::test]
    async fn wrong_fingerprint_is_rejected_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, writer) = service(&dir);
        let key = "bradax_proj_real_001_acme_ffffffffffffffffff_12345678";
        let err = auth
            .issue_token(&ProjectId::new("proj_real_001"), key)
            .await
            .unwrap_err();
        assert_eq!(err.code, "auth_invalid");

        let events = writer.read_events().await.unwrap();
        assert!(events.iter().any(|e| matches!(
            &e.kind,
            TelemetryKind::Authentication { success: false, reason: Some(reason), .. }
                if reason == "auth_invalid"
        )));
    }

    #[tokio::test]
    async fn token_for_project_a_fails_verification_as_garbage_elsewhere() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, _) = service(&dir);

        let issued = auth
            .issue_token(&ProjectId::new("proj_real_001"), API_KEY)
            .await
            .unwrap();

        // Tamper the kid to point at another project; the signature was
        // made with project A's derived secret, so verification fails.
        let mut parts: Vec<String> = issued.token.split('.').map(str::to_owned).collect();
        let header = serde_json::json!({"alg": "HS256", "typ": "JWT", "kid": "p:proj_real_002:v1"});
        parts[0] = base64url(&serde_json::to_vec(&header).unwrap());
        let forged = parts.join(".");

        let err = auth.verify_token(&forged).await.unwrap_err();
        assert_eq!(err.code, "auth_invalid");
    }

    #[tokio::test]
    async fn garbage_token_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, _) = service(&dir);
        let err = auth.verify_token("not.a.token").await.unwrap_err();
        assert_eq!(err.code, "auth_invalid");
    }

    fn base64url(bytes: &[u8]) -> String {
        // Minimal unpadded base64url for the header-forgery test.
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        let mut out = String::new();
        for chunk in bytes.chunks(3) {
            let b = [chunk[0], *chunk.get(1).unwrap_or(&0), *chunk.get(2).unwrap_or(&0)];
            let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
            out.push(ALPHABET[(n >> 18) as usize & 63] as char);
            out.push(ALPHABET[(n >> 12) as usize & 63] as char);
            if chunk.len() > 1 {
                out.push(ALPHABET[(n >> 6) as usize & 63] as char);
            }
            if chunk.len() > 2 {
                out.push(ALPHABET[n as usize & 63] as char);
            }
        }
        out
    }
}
