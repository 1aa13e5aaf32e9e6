use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that are **unauthenticated**. They still pass through the rate
/// limiter like every other route, which is what protects the login endpoint
/// from credential stuffing.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for monitoring and load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /api/auth/register
        // Creates an account (role defaults to STUDENT) and returns a token.
        .route("/api/auth/register", post(handlers::register_user))
        // POST /api/auth/login
        // Exchanges email + password for a token.
        .route("/api/auth/login", post(handlers::login))
}
