use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes available to any role once the authentication gate has admitted the
/// request. Every handler here receives the resolved `AuthUser`; finer checks
/// (e.g. owner-or-admin on profile updates) are composed in the handler.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/users/me
        // The caller's own profile, read fresh from the directory.
        .route("/api/users/me", get(handlers::get_me))
        // GET/PUT /api/users/{id}
        // Read any profile; update only your own unless you are an admin.
        .route(
            "/api/users/{id}",
            get(handlers::get_user).put(handlers::update_user),
        )
}
