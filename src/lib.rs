use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::{HeaderName, HeaderValue, header},
    middleware,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Pipeline stages, leaf-first.
pub mod error;
pub mod token;
pub mod rate_limit;
pub mod auth;
pub mod authorization;

// Collaborators and the account surface built on the pipeline.
pub mod config;
pub mod handlers;
pub mod models;
pub mod password;
pub mod repository;
pub mod validation;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use rate_limit::{InMemoryRateLimiter, RateLimiterState};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use token::TokenService;

/// ApiDoc
///
/// OpenAPI document for every handler decorated with `#[utoipa::path]`,
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::get_me, handlers::get_user,
        handlers::update_user, handlers::list_users, handlers::delete_user
    ),
    components(
        schemas(
            models::Role, models::RegisterRequest, models::LoginRequest,
            models::UpdateUserRequest, models::UserProfile, models::AuthResponse,
            error::ErrorResponse, error::ErrorBody, error::FieldViolation,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "ideaboard", description = "Ideaboard account & access API")
    )
)]
struct ApiDoc;

/// Registers the `bearer` security scheme referenced by protected paths.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

/// AppState
///
/// The single, immutable container shared by every request: the user
/// directory, the token service, the rate limiter, and the configuration they
/// were built from.
#[derive(Clone)]
pub struct AppState {
    /// User directory (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    pub tokens: TokenService,
    /// Per-client windows; the only cross-request mutable state.
    pub limiter: RateLimiterState,
    pub config: AppConfig,
}

impl AppState {
    /// Builds the token service from `config`, so the secret is read exactly once.
    pub fn new(config: AppConfig, repo: RepositoryState, limiter: RateLimiterState) -> Self {
        Self {
            repo,
            tokens: TokenService::new(&config.jwt_secret, config.jwt_ttl),
            limiter,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for RateLimiterState {
    fn from_ref(app_state: &AppState) -> RateLimiterState {
        app_state.limiter.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// Largest request body accepted by any JSON extractor.
pub const MAX_BODY_BYTES: usize = 10 * 1024;

/// create_router
///
/// Composes the request pipeline. Per request, stages run strictly in order:
///
/// 1. Rate limiter (every route; a rejection answers 429 immediately).
/// 2. Authentication gate (authenticated and admin groups).
/// 3. Authorization gate (admin group: `ADMIN` only).
/// 4. Handler.
///
/// Any stage may fail with `AppError`; the failure short-circuits the rest and
/// is rendered once by the error taxonomy. That includes unknown paths (404),
/// known paths with the wrong method (405) and oversized bodies (413).
///
/// Every response also carries hardening headers and is gzip-compressed when
/// the client accepts it.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::auth_middleware,
            )),
        )
        // route_layer wraps outside-in: authentication runs before the role check.
        .merge(
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(
                    admin::ADMIN_ONLY,
                    authorization::require_roles,
                ))
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::auth_middleware,
                )),
        )
        .fallback(|| async { AppError::not_found("Route not found") })
        // Must follow every merge: it only reaches routes registered so far.
        .method_not_allowed_fallback(|| async {
            AppError::method_not_allowed("Method not allowed")
        })
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id))
                .layer(CompressionLayer::new()),
        )
        // Hardening headers, set only when a handler has not chosen its own.
        .layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("SAMEORIGIN"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::REFERRER_POLICY,
                    HeaderValue::from_static("no-referrer"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::STRICT_TRANSPORT_SECURITY,
                    HeaderValue::from_static("max-age=15552000; includeSubDomains"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    HeaderName::from_static("cross-origin-opener-policy"),
                    HeaderValue::from_static("same-origin"),
                )),
        )
        .layer(cors)
}

/// `*` allows any origin; anything else is an exact origin, for which
/// credentials are allowed too.
fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origin.trim() == "*" {
        return base.allow_origin(Any);
    }

    match HeaderValue::from_str(origin.trim()) {
        Ok(value) => CorsLayer::new()
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_origin(AllowOrigin::exact(value))
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!(origin, "CORS_ORIGIN is not a valid header value; allowing any origin");
            base.allow_origin(Any)
        }
    }
}

/// trace_span_logger
///
/// Span for every request, correlated by `x-request-id`. `user_id` is filled in
/// by the authentication gate once the caller is known.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
        user_id = tracing::field::Empty,
    )
}
