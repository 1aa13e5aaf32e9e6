use crate::{
    AppState,
    authorization::RoleGuard,
    handlers,
    models::Role,
};
use axum::{
    Router,
    routing::{delete, get},
};

/// The allowed-role set applied to the whole admin group.
pub const ADMIN_ONLY: RoleGuard = RoleGuard::new(&[Role::Admin]);

/// Admin Router Module
///
/// Routes exclusively for the `ADMIN` role. The group is wrapped in the
/// authentication layer and then `require_roles(ADMIN_ONLY)`, so a handler here
/// never runs for a non-admin: students and teachers get 403, anonymous
/// callers 401.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/users
        // Every account in the system.
        .route("/api/users", get(handlers::list_users))
        // DELETE /api/users/{id}
        // Removes an account; its outstanding tokens stop working immediately.
        .route("/api/users/{id}", delete(handlers::delete_user))
}
