use std::future::Future;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    authorization::authorize_owner_or_admin,
    error::{AppError, ErrorResponse, within},
    models::{
        ApiResponse, AuthResponse, LoginRequest, NewUser, RegisterRequest, UpdateUserRequest,
        UserChanges, UserProfile,
    },
    password,
    repository::RepositoryError,
    validation::ValidatedJson,
};

/// Runs a repository call under the configured request timeout.
async fn persist<T, F>(state: &AppState, operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    within(state.config.request_timeout, async {
        operation.await.map_err(AppError::from)
    })
    .await
}

/// Path ids that are not UUIDs cannot name an existing user.
fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("User not found"))
}

// --- Public: Account Gateway ---

/// register_user
///
/// [Public Route] Creates an account and returns it with a freshly issued token.
///
/// The explicit email check gives a friendly 400; a concurrent duplicate that
/// slips past it is still caught by the unique index and reported as 409.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid data or email taken", body = ErrorResponse),
        (status = 409, description = "Concurrent duplicate", body = ErrorResponse)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AuthResponse>>), AppError> {
    let email = payload.email.trim().to_lowercase();

    if persist(&state, state.repo.find_by_email(&email)).await?.is_some() {
        return Err(AppError::bad_request("Email already registered"));
    }

    let password_hash = password::hash_password_blocking(payload.password).await?;
    let user = persist(
        &state,
        state.repo.create_user(NewUser {
            name: payload.name.trim().to_string(),
            email,
            password_hash,
            role: payload.role,
        }),
    )
    .await?;

    let token = state.tokens.issue(&user.identity())?;
    tracing::info!(user_id = %user.id, role = ?user.role, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::data(AuthResponse {
            user: user.profile(),
            token,
        })),
    ))
}

/// login
///
/// [Public Route] Exchanges credentials for a token. Unknown email and wrong
/// password produce the same response.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<ApiResponse<AuthResponse>>, AppError> {
    let email = payload.email.trim().to_lowercase();

    let user = persist(&state, state.repo.find_by_email(&email))
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    if !password::verify_password_blocking(payload.password, user.password_hash.clone()).await? {
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let token = state.tokens.issue(&user.identity())?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(ApiResponse::data(AuthResponse {
        user: user.profile(),
        token,
    })))
}

// --- Authenticated: Profiles ---

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Profile", body = ApiResponse<UserProfile>),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_me(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let user = persist(&state, state.repo.find_by_id(id))
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(ApiResponse::data(user.profile())))
}

/// get_user
///
/// [Authenticated Route] Any user's public profile.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = ApiResponse<UserProfile>),
        (status = 404, description = "Not Found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_user(
    _auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let id = parse_user_id(&id)?;
    let user = persist(&state, state.repo.find_by_id(id))
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(ApiResponse::data(user.profile())))
}

/// update_user
///
/// [Authenticated Route] Partial profile update.
///
/// *Authorization*: owner or admin, checked before any lookup so a forbidden
/// caller learns nothing about the target.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = ApiResponse<UserProfile>),
        (status = 400, description = "Invalid data or email in use", body = ErrorResponse),
        (status = 403, description = "Not owner", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn update_user(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, AppError> {
    let id = parse_user_id(&id)?;
    authorize_owner_or_admin(Some(&auth_user.identity()), id)?;

    let email = payload.email.map(|email| email.trim().to_lowercase());
    if let Some(email) = &email {
        let holder = persist(&state, state.repo.find_by_email(email)).await?;
        if holder.is_some_and(|existing| existing.id != id) {
            return Err(AppError::bad_request("Email already in use"));
        }
    }

    let changes = UserChanges {
        name: payload.name.map(|name| name.trim().to_string()),
        email,
    };
    let user = persist(&state, state.repo.update_user(id, changes))
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(ApiResponse::data(user.profile())))
}

// --- Admin ---

/// list_users
///
/// [Admin Route] Every account, newest first.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = ApiResponse<Vec<UserProfile>>),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<UserProfile>>>, AppError> {
    let users = persist(&state, state.repo.list_users()).await?;
    Ok(Json(ApiResponse::data(
        users.iter().map(|user| user.profile()).collect(),
    )))
}

/// delete_user
///
/// [Admin Route] Removes an account. Tokens already issued to it stop working
/// on the next request, because the authentication gate requires the subject
/// to still exist.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (
            status = 200,
            description = "Deleted",
            example = json!({ "success": true, "message": "User deleted successfully" })
        ),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Not Found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn delete_user(
    AuthUser { id: admin_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let id = parse_user_id(&id)?;
    if !persist(&state, state.repo.delete_user(id)).await? {
        return Err(AppError::not_found("User not found"));
    }

    tracing::info!(%admin_id, deleted_user_id = %id, "user deleted");
    Ok(Json(ApiResponse::message("User deleted successfully")))
}
