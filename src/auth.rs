use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, within},
    models::{Identity, Role},
    repository::{Repository, RepositoryState},
    token::TokenService,
};

/// authenticate
///
/// The authentication gate. Turns the raw `Authorization` header value into an
/// `Identity` or an `Unauthorized` failure:
///
/// 1. Header absent (or blank): "No token provided".
/// 2. Token = second whitespace segment of `"<scheme> <token>"`. Missing segment or any
///    verification failure: "Invalid token". Expired and tampered tokens are
///    indistinguishable here.
/// 3. The subject must still exist in the directory: "User not found" otherwise.
///
/// The returned role is the one stored in the directory *now*, not the claim
/// embedded in the token, so demotions and deletions take effect on the next
/// request. The directory lookup is bounded by `lookup_timeout`; a stalled
/// lookup fails as an internal error.
pub async fn authenticate(
    header_value: Option<&str>,
    tokens: &TokenService,
    directory: &dyn Repository,
    lookup_timeout: Duration,
) -> Result<Identity, AppError> {
    let header_value = header_value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::unauthorized("No token provided"))?;

    let token = header_value
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| AppError::unauthorized("Invalid token"))?;

    let claimed = tokens
        .verify(token)
        .map_err(|_| AppError::unauthorized("Invalid token"))?;

    let user = within(lookup_timeout, async {
        directory.find_by_id(claimed.id).await.map_err(AppError::from)
    })
    .await?
    .ok_or_else(|| AppError::unauthorized("User not found"))?;

    if user.role != claimed.role {
        tracing::info!(
            user_id = %user.id,
            token_role = ?claimed.role,
            current_role = ?user.role,
            "role changed since token issuance; using directory role"
        );
    }

    Ok(user.identity())
}

/// Reads the `Authorization` header. A value that is not visible ASCII cannot
/// hold a valid token and is rejected as such.
fn authorization_header(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::unauthorized("Invalid token"))
        })
        .transpose()
}

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request, usable as a handler
/// argument. Handlers use `id` for ownership checks and `role` for RBAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            role: self.role,
        }
    }
}

impl From<Identity> for AuthUser {
    fn from(identity: Identity) -> Self {
        Self {
            id: identity.id,
            role: identity.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// If `auth_middleware` already attached an `Identity` to this request it is
/// reused, so the gate (and its directory lookup) runs once per request.
/// Otherwise the gate runs here.
///
/// Rejection: `AppError` (401), rendered by the error taxonomy.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(AuthUser::from(*identity));
        }

        let tokens = TokenService::from_ref(state);
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        let header_value = authorization_header(&parts.headers)?;
        let identity =
            authenticate(header_value, &tokens, repo.as_ref(), config.request_timeout).await?;

        tracing::Span::current().record("user_id", tracing::field::display(identity.id));
        parts.extensions.insert(identity);

        Ok(AuthUser::from(identity))
    }
}

/// auth_middleware
///
/// Enforces authentication for a route group. Extracting `AuthUser` runs the
/// gate; a failure short-circuits with the extractor's rejection before the
/// handler is reached. On success the `Identity` is attached to the request
/// extensions for the authorization gate and the handler.
pub async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user.identity());
    next.run(request).await
}
