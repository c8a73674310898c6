use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use tracing::warn;

/// Tower layer rejecting requests whose `Host` header is not on the
/// configured allow-list. With no list configured, every host passes
/// (development behavior).
#[derive(Clone)]
pub struct TrustedHostLayer {
    allowed: Option<Arc<Vec<String>>>,
}

impl TrustedHostLayer {
    pub fn new(allowed: Option<Vec<String>>) -> Self {
        Self {
            allowed: allowed.map(Arc::new),
        }
    }
}

impl<S> Layer<S> for TrustedHostLayer {
    type Service = TrustedHostMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TrustedHostMiddleware {
            inner,
            allowed: self.allowed.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TrustedHostMiddleware<S> {
    inner: S,
    allowed: Option<Arc<Vec<String>>>,
}

impl<S> Service<Request<Body>> for TrustedHostMiddleware<S>
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
        let allowed = self.allowed.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            if let Some(allowed) = allowed {
                let host = req
                    .headers()
                    .get("host")
                    .and_then(|v| v.to_str().ok())
                    .map(|h| h.split(':').next().unwrap_or(h).to_lowercase());

                let trusted = host
                    .as_deref()
                    .is_some_and(|h| allowed.iter().any(|a| a == h));
                if !trusted {
                    warn!(host = host.as_deref().unwrap_or("<missing>"), "untrusted host rejected");
                    let body = serde_json::json!({
                        "error": "untrusted host",
                        "category": "validation",
                        "code": "untrusted_host",
                    });
                    return Ok((StatusCode::BAD_REQUEST, axum::Json(body)).into_response());
                }
            }
            inner.call(req).await
        })
    }
}
