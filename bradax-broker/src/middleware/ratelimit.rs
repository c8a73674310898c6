use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use tower::{Layer, Service};
use tracing::warn;

use bradax_core::error::ErrorCategory;
use bradax_telemetry::{TelemetryEvent, TelemetryKind, TelemetryWriter};

use crate::config::RateLimitSettings;

const MINUTE: u64 = 60;
const HOUR: u64 = 3_600;
/// Idle clients older than this are evicted during periodic sweeps.
const IDLE_EVICT_SECS: u64 = 2 * HOUR;
/// Sweep the client map every this many checks.
const EVICT_EVERY: u64 = 1_024;

/// Result of an allowed rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub limit: u64,
    pub remaining: u64,
    pub reset_after: u64,
}

/// Returned when a caller is over one of its limits.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitExceeded {
    pub retry_after: u64,
    pub limit: u64,
}

/// Two adjacent fixed windows, combined into a sliding-window
/// approximation: `effective = previous * weight + current` where the
/// weight is the unexpired fraction of the previous window.
#[derive(Debug, Default, Clone, Copy)]
struct Window {
    start: u64,
    current: u64,
    previous: u64,
}

impl Window {
    fn roll(&mut self, now: u64, size: u64) {
        let aligned = (now / size) * size;
        if aligned == self.start {
            return;
        }
        self.previous = if aligned == self.start + size {
            self.current
        } else {
            0
        };
        self.current = 0;
        self.start = aligned;
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn effective(&self, now: u64, size: u64) -> u64 {
        let elapsed = now.saturating_sub(self.start);
        let weight = size.saturating_sub(elapsed) as f64 / size as f64;
        (self.previous as f64 * weight) as u64 + self.current
    }
}

#[derive(Debug, Default)]
struct ClientWindows {
    minute: Window,
    hour: Window,
    last_seen: u64,
}

/// In-process per-client-IP rate limiter: sliding-window counters for
/// requests-per-minute and per-hour, plus a process-wide in-flight cap.
pub struct RateLimiter {
    settings: RateLimitSettings,
    clients: DashMap<String, ClientWindows>,
    in_flight: Arc<AtomicUsize>,
    checks: AtomicU64,
}

/// Holds one slot of the concurrent in-flight cap; the slot is returned
/// when the guard drops.
pub struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Release);
    }
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            clients: DashMap::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            checks: AtomicU64::new(0),
        }
    }

    /// Check and record a request for the given client key.
    pub fn check(&self, client: &str) -> Result<RateLimitDecision, RateLimitExceeded> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.check_at(client, now)
    }

    /// Clock-injected variant of [`check`](Self::check).
    pub fn check_at(&self, client: &str, now: u64) -> Result<RateLimitDecision, RateLimitExceeded> {
        if self.checks.fetch_add(1, Ordering::Relaxed) % EVICT_EVERY == EVICT_EVERY - 1 {
            self.evict_idle(now);
        }

        let mut entry = self.clients.entry(client.to_owned()).or_default();
        entry.minute.roll(now, MINUTE);
        entry.hour.roll(now, HOUR);

        let minute_used = entry.minute.effective(now, MINUTE);
        if minute_used >= self.settings.requests_per_minute {
            let reset = MINUTE.saturating_sub(now - entry.minute.start).max(1);
            return Err(RateLimitExceeded {
                retry_after: reset,
                limit: self.settings.requests_per_minute,
            });
        }

        let hour_used = entry.hour.effective(now, HOUR);
        if hour_used >= self.settings.requests_per_hour {
            let reset = HOUR.saturating_sub(now - entry.hour.start).max(1);
            return Err(RateLimitExceeded {
                retry_after: reset,
                limit: self.settings.requests_per_hour,
            });
        }

        entry.minute.current += 1;
        entry.hour.current += 1;
        entry.last_seen = now;

        Ok(RateLimitDecision {
            limit: self.settings.requests_per_minute,
            remaining: self.settings.requests_per_minute.saturating_sub(minute_used + 1),
            reset_after: MINUTE.saturating_sub(now - entry.minute.start),
        })
    }

    /// Try to take one slot of the in-flight cap.
    pub fn try_begin_request(&self) -> Option<InFlightGuard> {
        let acquired = self
            .in_flight
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |current| {
                (current < self.settings.max_concurrent).then_some(current + 1)
            })
            .is_ok();
        acquired.then(|| InFlightGuard {
            counter: Arc::clone(&self.in_flight),
        })
    }

    fn evict_idle(&self, now: u64) {
        self.clients
            .retain(|_, entry| entry.last_seen + IDLE_EVICT_SECS > now);
    }
}

/// Tower layer applying the rate limiter before any handler code runs.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    writer: Arc<TelemetryWriter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>, writer: Arc<TelemetryWriter>) -> Self {
        Self { limiter, writer }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: Arc::clone(&self.limiter),
            writer: Arc::clone(&self.writer),
        }
    }
}

/// Tower service enforcing per-IP windows and the in-flight cap.
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    writer: Arc<TelemetryWriter>,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let writer = Arc::clone(&self.writer);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let client = client_key(&req);

            let decision = match limiter.check(&client) {
                Ok(decision) => decision,
                Err(exceeded) => {
                    warn!(client = %client, "rate limit exceeded");
                    record_rate_limited(&writer, "rate_limited").await;
                    return Ok(rate_limited_response(exceeded.retry_after, exceeded.limit));
                }
            };

            let Some(_guard) = limiter.try_begin_request() else {
                warn!(client = %client, "concurrent request cap exceeded");
                record_rate_limited(&writer, "concurrency_exceeded").await;
                return Ok(rate_limited_response(1, decision.limit));
            };

            let response = inner.call(req).await?;
            Ok(add_rate_limit_headers(response, decision))
        })
    }
}

/// Resolve the client key: forwarded headers first, then the socket peer.
fn client_key(req: &Request<Body>) -> String {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded.to_str() {
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_owned();
                }
            }
        }
    }
    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return value.to_owned();
        }
    }
    req.extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map_or_else(|| "unknown".to_owned(), |info| info.0.ip().to_string())
}

async fn record_rate_limited(writer: &TelemetryWriter, code: &str) {
    let event = TelemetryEvent::new(TelemetryKind::Error {
        request_id: None,
        project_id: None,
        category: ErrorCategory::RateLimited,
        code: code.to_owned(),
        message: "request rejected by the rate limiter".to_owned(),
    });
    if let Err(e) = writer.record_event(&event).await {
        warn!(error = %e, "failed to record rate-limit event");
    }
}

fn add_rate_limit_headers(response: Response, decision: RateLimitDecision) -> Response {
    let (mut parts, body) = response.into_parts();
    parts.headers.insert("x-ratelimit-limit", decision.limit.into());
    parts
        .headers
        .insert("x-ratelimit-remaining", decision.remaining.into());
    parts
        .headers
        .insert("x-ratelimit-reset", decision.reset_after.into());
    Response::from_parts(parts, body)
}

fn rate_limited_response(retry_after: u64, limit: u64) -> Response {
    let body = serde_json::json!({
        "error": "rate limit exceeded",
        "category": ErrorCategory::RateLimited,
        "code": "rate_limited",
        "retry_after": retry_after,
    });
    let mut response = (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::RETRY_AFTER, retry_after.into());
    response.headers_mut().insert("x-ratelimit-limit", limit.into());
    response
        .headers_mut()
        .insert("x-ratelimit-remaining", 0u64.into());
    response
}
