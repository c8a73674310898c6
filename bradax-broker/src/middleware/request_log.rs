use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Request;
use axum::response::Response;
use tower::{Layer, Service};
use tracing::info;
use uuid::Uuid;

/// The request id assigned (or propagated) by the logging middleware,
/// available to handlers through request extensions.
#[derive(Debug, Clone)]
pub struct RequestIdent(pub String);

/// Tower layer producing one structured log line per request and tagging
/// responses with `x-request-id` / `x-process-time`. Payload bodies are
/// never logged.
#[derive(Clone, Default)]
pub struct RequestLogLayer;

impl<S> Layer<S> for RequestLogLayer {
    type Service = RequestLogMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogMiddleware { inner }
    }
}

#[derive(Clone)]
pub struct RequestLogMiddleware<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RequestLogMiddleware<S>
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

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();

        // Propagate a caller-supplied id, otherwise assign one.
        let request_id = req
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);
        req.extensions_mut().insert(RequestIdent(request_id.clone()));

        let method = req.method().clone();
        let path = req.uri().path().to_owned();

        Box::pin(async move {
            let started = Instant::now();
            let mut response = inner.call(req).await?;
            let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;

            info!(
                request_id = %request_id,
                method = %method,
                path = %path,
                status = response.status().as_u16(),
                duration_ms = format!("{duration_ms:.2}"),
                "request completed"
            );

            let headers = response.headers_mut();
            if let Ok(value) = HeaderValue::from_str(&request_id) {
                headers.insert(HeaderName::from_static("x-request-id"), value);
            }
            if let Ok(value) = HeaderValue::from_str(&format!("{duration_ms:.2}")) {
                headers.insert(HeaderName::from_static("x-process-time"), value);
            }
            Ok(response)
        })
    }
}
