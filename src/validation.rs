use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
};
use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, FieldViolation},
    models::{LoginRequest, RegisterRequest, UpdateUserRequest},
};

/// Validate
///
/// Schema checks for request payloads. Returns every violation found, not just
/// the first, so clients can fix a form in one round trip.
pub trait Validate {
    fn validate(&self) -> Result<(), Vec<FieldViolation>>;
}

/// Collects field violations while a payload is checked.
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.0.push(FieldViolation::new(field, message));
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), Vec<FieldViolation>> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.0))
        }
    }
}

/// is_valid_email
///
/// Structural check only: one `@`, a non-empty local part, and a dotted domain
/// without empty labels or whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}

const MIN_NAME_CHARS: usize = 2;
const MIN_PASSWORD_CHARS: usize = 6;

fn name_ok(name: &str) -> bool {
    name.trim().chars().count() >= MIN_NAME_CHARS
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        Violations::default()
            .check(name_ok(&self.name), "name", "Name must contain at least 2 characters")
            .check(is_valid_email(&self.email), "email", "Invalid email")
            .check(
                self.password.chars().count() >= MIN_PASSWORD_CHARS,
                "password",
                "Password must contain at least 6 characters",
            )
            .finish()
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        Violations::default()
            .check(is_valid_email(&self.email), "email", "Invalid email")
            .finish()
    }
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), Vec<FieldViolation>> {
        Violations::default()
            .check(
                self.name.as_deref().is_none_or(name_ok),
                "name",
                "Name must contain at least 2 characters",
            )
            .check(
                self.email.as_deref().is_none_or(is_valid_email),
                "email",
                "Invalid email",
            )
            .finish()
    }
}

/// ValidatedJson
///
/// `Json<T>` followed by `Validate`. Malformed bodies and schema violations are
/// both reported as `AppError::Validation` (400) instead of axum's plain-text
/// rejections, so every failure keeps the uniform error envelope. A body over
/// the router's `DefaultBodyLimit` is a 413.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(payload) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::payload_too_large("Request body too large")
            } else {
                AppError::Validation(vec![FieldViolation::new("body", rejection.body_text())])
            }
        })?;

        payload.validate().map_err(AppError::Validation)?;
        Ok(ValidatedJson(payload))
    }
}
