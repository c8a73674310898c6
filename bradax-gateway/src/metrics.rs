use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters tracking invocation outcomes.
///
/// All counters use relaxed ordering; call [`snapshot`](Self::snapshot) for
/// a point-in-time view.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Total invocations entering the pipeline.
    pub invoked: AtomicU64,
    /// Invocations that completed successfully.
    pub completed: AtomicU64,
    /// Invocations blocked by a guardrail (either phase).
    pub guardrail_blocked: AtomicU64,
    /// Invocations whose content was sanitized.
    pub sanitized: AtomicU64,
    /// Invocations rejected by the model allow-list.
    pub policy_blocked: AtomicU64,
    /// Upstream provider failures, timeouts included.
    pub provider_errors: AtomicU64,
    /// Malformed requests and invalid custom rules.
    pub validation_errors: AtomicU64,
}

impl DispatchMetrics {
    pub fn increment_invoked(&self) {
        self.invoked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_guardrail_blocked(&self) {
        self.guardrail_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sanitized(&self) {
        self.sanitized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_policy_blocked(&self) {
        self.policy_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_provider_errors(&self) {
        self.provider_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_validation_errors(&self) {
        self.validation_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            invoked: self.invoked.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            guardrail_blocked: self.guardrail_blocked.load(Ordering::Relaxed),
            sanitized: self.sanitized.load(Ordering::Relaxed),
            policy_blocked: self.policy_blocked.load(Ordering::Relaxed),
            provider_errors: self.provider_errors.load(Ordering::Relaxed),
            validation_errors: self.validation_errors.load(Ordering::Relaxed),
        }
    }
}

/// A plain data snapshot of [`DispatchMetrics`] at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub invoked: u64,
    pub completed: u64,
    pub guardrail_blocked: u64,
    pub sanitized: u64,
    pub policy_blocked: u64,
    pub provider_errors: u64,
    pub validation_errors: u64,
}
