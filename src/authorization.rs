use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Identity, Role},
};

/// authorize_with
///
/// The authorization primitive: admits `identity` when `allowed` holds for it.
/// A missing identity is `Unauthorized` (never authenticated), a failed
/// predicate is `Forbidden` (authenticated, not permitted).
pub fn authorize_with<P>(identity: Option<&Identity>, allowed: P) -> Result<Identity, AppError>
where
    P: FnOnce(&Identity) -> bool,
{
    let identity = identity.ok_or_else(|| AppError::unauthorized("User not authenticated"))?;

    if allowed(identity) {
        Ok(*identity)
    } else {
        Err(AppError::forbidden("Insufficient permissions"))
    }
}

/// authorize
///
/// Role-set check. An empty set admits any authenticated identity.
pub fn authorize(identity: Option<&Identity>, allowed_roles: &[Role]) -> Result<Identity, AppError> {
    authorize_with(identity, |identity| {
        allowed_roles.is_empty() || allowed_roles.contains(&identity.role)
    })
}

/// Ownership check: the owner may act on its own resource, admins on any.
pub fn authorize_owner_or_admin(
    identity: Option<&Identity>,
    owner_id: Uuid,
) -> Result<Identity, AppError> {
    authorize_with(identity, |identity| {
        identity.id == owner_id || identity.role == Role::Admin
    })
}

/// RoleGuard
///
/// The allowed-role set declared for a route group. Used as the state of
/// `require_roles`.
#[derive(Debug, Clone, Copy)]
pub struct RoleGuard {
    allowed: &'static [Role],
}

impl RoleGuard {
    pub const fn new(allowed: &'static [Role]) -> Self {
        Self { allowed }
    }

    pub fn allowed(&self) -> &'static [Role] {
        self.allowed
    }
}

/// require_roles
///
/// Route-layer middleware applying a `RoleGuard` to the identity attached by
/// `auth_middleware`. Must sit inside the authentication layer.
pub async fn require_roles(
    State(guard): State<RoleGuard>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(request.extensions().get::<Identity>(), guard.allowed())?;
    Ok(next.run(request).await)
}
