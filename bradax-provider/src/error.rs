use std::time::Duration;

/// Structured errors from the upstream provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned status {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("provider response does not parse: {0}")]
    Serialization(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether the orchestrator should report this as a timeout rather than
    /// a generic provider failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_flagged() {
        assert!(ProviderError::Timeout(Duration::from_secs(180)).is_timeout());
        assert!(!ProviderError::Connection("refused".into()).is_timeout());
    }
}
