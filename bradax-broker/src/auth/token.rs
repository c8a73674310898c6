use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{
    decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use bradax_core::principal::Principal;
use bradax_core::types::ProjectId;

use super::secret::{KeyId, CURRENT_KEY_VERSION};

/// JWT claims embedded in issued tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject, equal to the project id.
    pub sub: String,
    pub project_id: ProjectId,
    #[serde(default)]
    pub organization: Option<String>,
    pub scopes: Vec<String>,
    /// Issued-at (seconds since epoch).
    pub iat: i64,
    /// Expiry (seconds since epoch).
    pub exp: i64,
}

/// Token rejections, mapped to the `auth_expired` / `auth_invalid` reason
/// categories. Never carries token or secret material.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(&'static str),
}

/// Sign a token with the project-derived secret and a `p:<pid>:v1` key-id.
pub fn encode_token(claims: &Claims, kid: &KeyId, secret: &[u8]) -> Result<String, TokenError> {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(&header, claims, &EncodingKey::from_secret(secret))
        .map_err(|_| TokenError::Invalid("token could not be signed"))
}

/// Extract the key-id from a token header without verifying the signature.
///
/// This is the first step of verification: the `kid` names the project
/// whose derived secret the signature must be checked against.
pub fn token_key_id(token: &str) -> Result<KeyId, TokenError> {
    let header = decode_header(token).map_err(|_| TokenError::Invalid("header does not parse"))?;
    let kid = header.kid.ok_or(TokenError::Invalid("key-id is missing"))?;
    let kid: KeyId = kid.parse().map_err(|_| TokenError::Invalid("key-id is malformed"))?;
    if kid.version != CURRENT_KEY_VERSION {
        return Err(TokenError::Invalid("unsupported key-id version"));
    }
    Ok(kid)
}

/// Verify signature and expiry with the derived secret, and cross-check the
/// payload project against the key-id project.
pub fn decode_token(token: &str, kid: &KeyId, secret: &[u8]) -> Result<Principal, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp"]);

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation).map_err(
        |e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid("signature or claims rejected"),
        },
    )?;

    let claims = data.claims;
    if claims.project_id != kid.project_id {
        return Err(TokenError::Invalid("payload project does not match key-id"));
    }

    let expires_at: DateTime<Utc> = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .ok_or(TokenError::Invalid("expiry is out of range"))?;

    Ok(Principal {
        project_id: claims.project_id,
        organization: claims.organization,
        scopes: claims.scopes,
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::secret::derive_project_secret;

    const MASTER: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn claims(project: &str, exp_offset_secs: i64) -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            sub: project.to_owned(),
            project_id: ProjectId::new(project),
            organization: Some("acme".to_owned()),
            scopes: vec!["llm:invoke".to_owned()],
            iat: now,
            exp: now + exp_offset_secs,
        }
    }

    fn issue(project: &str, exp_offset_secs: i64) -> String {
        let kid = KeyId::current(ProjectId::new(project));
        let secret = derive_project_secret(MASTER, &kid.project_id);
        encode_token(&claims(project, exp_offset_secs), &kid, &secret).unwrap()
    }

    #[test]
    fn issue_and_verify_round_trip() {
        let token = issue("proj_real_001", 900);
        let kid = token_key_id(&token).unwrap();
        assert_eq!(kid.project_id, ProjectId::new("proj_real_001"));

        let secret = derive_project_secret(MASTER, &kid.project_id);
        let principal = decode_token(&token, &kid, &secret).unwrap();
        assert_eq!(principal.project_id, ProjectId::new("proj_real_001"));
        assert_eq!(principal.scopes, vec!["llm:invoke".to_owned()]);
    }

    #[test]
    fn expired_token_never_verifies() {
        let token = issue("proj_real_001", -60);
        let kid = token_key_id(&token).unwrap();
        let secret = derive_project_secret(MASTER, &kid.project_id);
        assert!(matches!(
            decode_token(&token, &kid, &secret),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn cross_project_token_never_verifies() {
        // A token issued for project A fails against project B's derived
        // secret: different kid, different key.
        let token = issue("proj_real_001", 900);
        let kid_b = KeyId::current(ProjectId::new("proj_real_002"));
        let secret_b = derive_project_secret(MASTER, &kid_b.project_id);
        assert!(decode_token(&token, &kid_b, &secret_b).is_err());
    }

    #[test]
    fn kid_payload_mismatch_is_rejected() {
        // Sign claims for project B with project A's kid and secret: the
        // signature verifies but the payload cross-check must fail.
        let kid_a = KeyId::current(ProjectId::new("proj_real_001"));
        let secret_a = derive_project_secret(MASTER, &kid_a.project_id);
        let token = encode_token(&claims("proj_real_002", 900), &kid_a, &secret_a).unwrap();
        assert!(matches!(
            decode_token(&token, &kid_a, &secret_a),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn missing_kid_is_rejected() {
        let secret = derive_project_secret(MASTER, &ProjectId::new("proj_real_001"));
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims("proj_real_001", 900),
            &EncodingKey::from_secret(&secret),
        )
        .unwrap();
        assert!(matches!(
            token_key_id(&token),
            Err(TokenError::Invalid("key-id is missing"))
        ));
    }

    #[test]
    fn unknown_kid_version_is_rejected() {
        let project = ProjectId::new("proj_real_001");
        let kid_v2 = KeyId {
            project_id: project.clone(),
            version: 2,
        };
        let secret = derive_project_secret(MASTER, &project);
        let token = encode_token(&claims("proj_real_001", 900), &kid_v2, &secret).unwrap();
        assert!(matches!(
            token_key_id(&token),
            Err(TokenError::Invalid("unsupported key-id version"))
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let token = issue("proj_real_001", 900);
        let kid = token_key_id(&token).unwrap();
        let secret = derive_project_secret(MASTER, &kid.project_id);
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert!(decode_token(&tampered, &kid, &secret).is_err());
    }
}
