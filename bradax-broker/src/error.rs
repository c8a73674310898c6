use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use bradax_core::error::ErrorCategory;

use crate::auth::AuthFailure;

/// The structured error envelope returned on 4xx/5xx responses.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message; never carries payload or secret material.
    pub error: String,
    pub category: ErrorCategory,
    /// Stable machine-readable code (e.g. `auth_expired`).
    pub code: String,
}

/// An HTTP-mapped error: taxonomy category plus status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn unauthorized(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorBody {
                error: message.into(),
                category: ErrorCategory::Authentication,
                code: code.to_owned(),
            },
        }
    }

    pub fn forbidden(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: ErrorBody {
                error: message.into(),
                category: ErrorCategory::Authorization,
                code: code.to_owned(),
            },
        }
    }

    pub fn not_found(code: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                error: message.into(),
                category: ErrorCategory::Validation,
                code: code.to_owned(),
            },
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorBody {
                error: message.into(),
                category: ErrorCategory::Internal,
                code: "internal_error".to_owned(),
            },
        }
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        Self::unauthorized(failure.code, failure.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
