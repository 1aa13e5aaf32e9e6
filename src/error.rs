use std::{future::Future, time::Duration};

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::RepositoryError;

/// ErrorKind
///
/// The closed set of failure categories the API can report. Every `AppError`
/// resolves to exactly one kind, and the kind alone decides the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    PayloadTooLarge,
    BadRequest,
    ValidationError,
    UniqueConstraintViolation,
    TooManyRequests,
    InternalServerError,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::BadRequest | ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::UniqueConstraintViolation => StatusCode::CONFLICT,
            ErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wire code placed in `error.code`.
    ///
    /// Explicit application errors share the `AppError` code and are told apart
    /// by status and message; the remaining kinds use their own name.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized
            | ErrorKind::Forbidden
            | ErrorKind::NotFound
            | ErrorKind::MethodNotAllowed
            | ErrorKind::PayloadTooLarge
            | ErrorKind::BadRequest => "AppError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::UniqueConstraintViolation => "UniqueConstraintViolation",
            ErrorKind::TooManyRequests => "TooManyRequests",
            ErrorKind::InternalServerError => "InternalServerError",
        }
    }
}

/// FieldViolation
///
/// A single field-level validation failure, returned in `error.details`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// AppError
///
/// The typed failure raised by every stage of the request pipeline (rate limiter,
/// authentication, authorization, handlers, repository). Nothing below the HTTP
/// boundary formats an error body: failures travel up as `AppError` and are
/// classified exactly once, in `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An intentional failure with a caller-facing message.
    #[error("{message}")]
    Application { kind: ErrorKind, message: String },

    #[error("invalid request data ({} violations)", .0.len())]
    Validation(Vec<FieldViolation>),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("rate limit exceeded")]
    TooManyRequests { retry_after: Option<Duration> },

    #[error("operation did not complete within {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::application(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::application(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::application(ErrorKind::NotFound, message)
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        Self::application(ErrorKind::MethodNotAllowed, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::application(ErrorKind::PayloadTooLarge, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::application(ErrorKind::BadRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    fn application(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Application {
            kind,
            message: message.into(),
        }
    }

    /// classify
    ///
    /// Maps any failure onto its caller-safe representation. Matching order:
    /// explicit application errors pass through, then validation failures,
    /// then uniqueness conflicts, then rate limiting. Anything else becomes a
    /// generic 500 whose message never carries the underlying error text.
    pub fn classify(&self) -> ClassifiedError {
        match self {
            AppError::Application { kind, message } => ClassifiedError::new(*kind, message.clone()),
            AppError::Validation(violations) => {
                ClassifiedError::new(ErrorKind::ValidationError, "Invalid request data")
                    .with_details(serde_json::to_value(violations).unwrap_or(Value::Null))
            }
            AppError::Repository(RepositoryError::UniqueViolation { .. }) => ClassifiedError::new(
                ErrorKind::UniqueConstraintViolation,
                "A record with this value already exists",
            ),
            AppError::TooManyRequests { retry_after } => ClassifiedError {
                retry_after: *retry_after,
                ..ClassifiedError::new(
                    ErrorKind::TooManyRequests,
                    "Too many requests, please try again later",
                )
            },
            AppError::Repository(RepositoryError::Database(_))
            | AppError::Timeout(_)
            | AppError::Internal(_) => ClassifiedError::new(
                ErrorKind::InternalServerError,
                "An unexpected error occurred",
            ),
        }
    }
}

/// ClassifiedError
///
/// The sanitized form of a failure: what the caller is allowed to see.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub message: String,
    pub details: Option<Value>,
    pub retry_after: Option<Duration>,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: kind.status(),
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: ErrorBody {
                code: self.kind.code().to_string(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

/// ErrorResponse
///
/// Uniform error envelope: `{ "success": false, "error": { code, message, details? } }`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    #[schema(example = "AppError")]
    pub code: String,
    #[schema(example = "No token provided")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    pub details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let classified = self.classify();

        // Developer-facing detail stays in the logs; the body only carries the
        // sanitized message.
        if classified.status.is_server_error() {
            tracing::error!(error = %self, debug = ?self, "request failed");
        } else {
            tracing::warn!(
                status = classified.status.as_u16(),
                code = classified.kind.code(),
                error = %self,
                "request rejected"
            );
        }

        let mut response = (classified.status, Json(classified.body())).into_response();
        if let Some(retry_after) = classified.retry_after {
            // Round up so clients never retry before the window actually resets.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// within
///
/// Bounds a suspending collaborator call (directory lookup, persistence) so a
/// stalled dependency fails the request as an internal error instead of
/// hanging the pipeline.
pub async fn within<T, F>(limit: Duration, operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| AppError::Timeout(limit))?
}
