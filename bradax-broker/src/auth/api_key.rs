use bradax_core::types::ProjectId;

/// Prefix every project api-key carries.
pub const API_KEY_PREFIX: &str = "bradax_";

/// Minimum key body length after the prefix.
const MIN_BODY_LEN: usize = 20;

/// Components of a structured api-key:
/// `bradax_<project_id>_<org>_<secret>_<timestamp>`.
///
/// The project id may itself contain underscores, so parsing is guided by
/// the expected project id. The organization token carries no underscores
/// and may not be `default`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedApiKey {
    pub project_id: ProjectId,
    pub organization: String,
    pub secret: String,
    pub timestamp: String,
}

/// Structural api-key rejections. Messages are reason categories, never
/// key material.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ApiKeyError {
    #[error("api-key does not carry the expected prefix")]
    BadPrefix,

    #[error("api-key is shorter than the minimum length")]
    TooShort,

    #[error("api-key structure is invalid: {0}")]
    Malformed(&'static str),

    #[error("api-key project does not match the requested project")]
    ProjectMismatch,
}

/// Parse and structurally validate a presented api-key against the project
/// it claims to belong to.
pub fn parse_api_key(
    api_key: &str,
    expected_project: &ProjectId,
) -> Result<ParsedApiKey, ApiKeyError> {
    let body = api_key
        .strip_prefix(API_KEY_PREFIX)
        .ok_or(ApiKeyError::BadPrefix)?;
    if body.len() < MIN_BODY_LEN {
        return Err(ApiKeyError::TooShort);
    }

    let tokens: Vec<&str> = body.split('_').collect();
    if tokens.len() < 4 {
        return Err(ApiKeyError::Malformed("expected four underscore-separated components"));
    }

    // The project id guides the split, since it may contain underscores.
    let project_tokens: Vec<&str> = expected_project.as_str().split('_').collect();
    if tokens.len() < project_tokens.len() + 3 {
        return Err(ApiKeyError::ProjectMismatch);
    }
    if tokens[..project_tokens.len()] != project_tokens[..] {
        return Err(ApiKeyError::ProjectMismatch);
    }

    let organization = tokens[project_tokens.len()];
    if organization.is_empty() || organization == "default" {
        return Err(ApiKeyError::Malformed("organization token is missing or reserved"));
    }

    let timestamp = tokens[tokens.len() - 1];
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ApiKeyError::Malformed("trailing timestamp is not numeric"));
    }

    let secret_tokens = &tokens[project_tokens.len() + 1..tokens.len() - 1];
    if secret_tokens.is_empty() || secret_tokens.iter().any(|t| t.is_empty()) {
        return Err(ApiKeyError::Malformed("secret component is missing"));
    }

    Ok(ParsedApiKey {
        project_id: expected_project.clone(),
        organization: organization.to_owned(),
        secret: secret_tokens.join("_"),
        timestamp: timestamp.to_owned(),
    })
}

/// The strict hash rule: the stored fingerprint must be a prefix of the
/// key's secret component. No substring fallback.
#[must_use]
pub fn secret_matches_hash(secret: &str, stored_hash: &str) -> bool {
    !stored_hash.is_empty() && secret.starts_with(stored_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "bradax_proj_real_001_acme_a1b2c3d4e5f60718ff_12345678";

    fn project() -> ProjectId {
        ProjectId::new("proj_real_001")
    }

    #[test]
    fn parses_structured_key() {
        let parsed = parse_api_key(KEY, &project()).unwrap();
        assert_eq!(parsed.project_id, project());
        assert_eq!(parsed.organization, "acme");
        assert_eq!(parsed.secret, "a1b2c3d4e5f60718ff");
        assert_eq!(parsed.timestamp, "12345678");
    }

    #[test]
    fn secret_may_contain_underscores() {
        let key = "bradax_proj_real_001_acme_a1b2_c3d4_12345678";
        let parsed = parse_api_key(key, &project()).unwrap();
        assert_eq!(parsed.secret, "a1b2_c3d4");
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert_eq!(
            parse_api_key("brdx_proj_real_001_acme_aaaa_12345678", &project()),
            Err(ApiKeyError::BadPrefix)
        );
    }

    #[test]
    fn rejects_short_keys() {
        assert_eq!(parse_api_key("bradax_a_b_c_1", &project()), Err(ApiKeyError::TooShort));
    }

    #[test]
    fn rejects_project_mismatch() {
        assert_eq!(
            parse_api_key(KEY, &ProjectId::new("proj_real_002")),
            Err(ApiKeyError::ProjectMismatch)
        );
    }

    #[test]
    fn rejects_reserved_organization() {
        let key = "bradax_proj_real_001_default_a1b2c3d4e5f60718_12345678";
        assert!(matches!(
            parse_api_key(key, &project()),
            Err(ApiKeyError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_timestamp() {
        let key = "bradax_proj_real_001_acme_a1b2c3d4e5f60718_notatime";
        assert!(matches!(
            parse_api_key(key, &project()),
            Err(ApiKeyError::Malformed(_))
        ));
    }

    #[test]
    fn hash_rule_is_strict_prefix() {
        assert!(secret_matches_hash("a1b2c3d4e5f60718ff", "a1b2c3d4e5f60718"));
        // Containment elsewhere in the secret is not acceptable.
        assert!(!secret_matches_hash("ffa1b2c3d4e5f60718", "a1b2c3d4e5f60718"));
        // An empty stored hash never matches.
        assert!(!secret_matches_hash("anything", ""));
    }
}
