/// Router Module Index
///
/// Organizes the routes into security-segregated groups. Access control is
/// attached per group (via Axum route layers in `create_router`), never
/// re-implemented inside individual handlers.

/// Routes accessible to any client: health and the account gateway.
pub mod public;

/// Routes behind the authentication gate. Requires a valid bearer token whose
/// subject still exists.
pub mod authenticated;

/// Routes behind the authentication gate *and* the `ADMIN` role guard.
pub mod admin;
