use std::{sync::Arc, time::Duration};

use axum::{
    extract::FromRequestParts,
    http::{HeaderValue, Request, StatusCode, header, request::Parts},
};
use chrono::Utc;
use ideaboard_api::{
    AppError, AppState, InMemoryRateLimiter, InMemoryRepository, TokenService,
    auth::{AuthUser, authenticate},
    error::ErrorKind,
    models::{Identity, Role},
    repository::{Repository, RepositoryState},
};

mod common;
use common::{TEST_JWT_SECRET, test_config, user_with_role};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(1);

fn tokens() -> TokenService {
    TokenService::new(TEST_JWT_SECRET, Duration::from_secs(3600))
}

fn assert_unauthorized(err: AppError, message: &str) {
    let classified = err.classify();
    assert_eq!(classified.kind, ErrorKind::Unauthorized);
    assert_eq!(classified.status, StatusCode::UNAUTHORIZED);
    assert_eq!(classified.message, message);
}

// --- Authentication Gate ---

#[tokio::test]
async fn test_valid_token_resolves_identity() {
    let repo = InMemoryRepository::new();
    let user = user_with_role(Role::Teacher);
    repo.insert(user.clone());
    let token = tokens().issue(&user.identity()).unwrap();
    let header = format!("Bearer {token}");

    let identity = authenticate(Some(&header), &tokens(), &repo, LOOKUP_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(identity, user.identity());
}

#[tokio::test]
async fn test_missing_or_blank_header_reports_no_token() {
    let repo = InMemoryRepository::new();

    for header in [None, Some(""), Some("   ")] {
        let err = authenticate(header, &tokens(), &repo, LOOKUP_TIMEOUT)
            .await
            .unwrap_err();
        assert_unauthorized(err, "No token provided");
    }
}

#[tokio::test]
async fn test_header_without_token_segment_is_invalid() {
    let repo = InMemoryRepository::new();

    let err = authenticate(Some("Bearer"), &tokens(), &repo, LOOKUP_TIMEOUT)
        .await
        .unwrap_err();

    assert_unauthorized(err, "Invalid token");
}

#[tokio::test]
async fn test_garbage_and_expired_tokens_are_indistinguishable() {
    let repo = InMemoryRepository::new();
    let user = user_with_role(Role::Student);
    repo.insert(user.clone());
    let expired = tokens()
        .issue_at(&user.identity(), Utc::now() - chrono::Duration::hours(2))
        .unwrap();

    let garbage_err = authenticate(Some("Bearer not.a.jwt"), &tokens(), &repo, LOOKUP_TIMEOUT)
        .await
        .unwrap_err();
    let expired_header = format!("Bearer {expired}");
    let expired_err = authenticate(Some(&expired_header), &tokens(), &repo, LOOKUP_TIMEOUT)
        .await
        .unwrap_err();

    assert_eq!(garbage_err.classify(), expired_err.classify());
    assert_unauthorized(expired_err, "Invalid token");
}

#[tokio::test]
async fn test_deleted_subject_is_rejected() {
    let repo = InMemoryRepository::new();
    let user = user_with_role(Role::Admin);
    repo.insert(user.clone());
    let token = tokens().issue(&user.identity()).unwrap();
    assert!(repo.delete_user(user.id).await.unwrap());

    let header = format!("Bearer {token}");
    let err = authenticate(Some(&header), &tokens(), &repo, LOOKUP_TIMEOUT)
        .await
        .unwrap_err();

    assert_unauthorized(err, "User not found");
}

#[tokio::test]
async fn test_role_comes_from_directory_not_token() {
    let repo = InMemoryRepository::new();
    let mut user = user_with_role(Role::Admin);
    repo.insert(user.clone());
    let token = tokens().issue(&user.identity()).unwrap();

    // Demote after issuance.
    user.role = Role::Student;
    repo.insert(user.clone());

    let header = format!("Bearer {token}");
    let identity = authenticate(Some(&header), &tokens(), &repo, LOOKUP_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(identity.role, Role::Student);
}

#[tokio::test]
async fn test_any_scheme_word_is_accepted() {
    let repo = InMemoryRepository::new();
    let user = user_with_role(Role::Student);
    repo.insert(user.clone());
    let token = tokens().issue(&user.identity()).unwrap();

    let header = format!("Token {token}");
    let identity = authenticate(Some(&header), &tokens(), &repo, LOOKUP_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(identity.id, user.id);
}

#[tokio::test]
async fn test_stalled_lookup_fails_as_internal_error() {
    let repo = InMemoryRepository::new().with_lookup_latency(Duration::from_millis(500));
    let user = user_with_role(Role::Student);
    repo.insert(user.clone());
    let token = tokens().issue(&user.identity()).unwrap();

    let header = format!("Bearer {token}");
    let err = authenticate(Some(&header), &tokens(), &repo, Duration::from_millis(20))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Timeout(_)));
    let classified = err.classify();
    assert_eq!(classified.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(classified.message, "An unexpected error occurred");
}

// --- AuthUser Extractor ---

fn state_with(repo: InMemoryRepository) -> AppState {
    let config = test_config();
    let limiter = Arc::new(InMemoryRateLimiter::new(
        config.rate_limit_max,
        config.rate_limit_window,
    ));
    AppState::new(config, Arc::new(repo) as RepositoryState, limiter)
}

fn parts_with_header(value: Option<HeaderValue>) -> Parts {
    let mut builder = Request::builder().uri("/api/users/me");
    if let Some(value) = value {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(()).unwrap().into_parts().0
}

#[tokio::test]
async fn test_extractor_attaches_identity() {
    let repo = InMemoryRepository::new();
    let user = user_with_role(Role::Teacher);
    repo.insert(user.clone());
    let state = state_with(repo);
    let token = state.tokens.issue(&user.identity()).unwrap();

    let mut parts = parts_with_header(Some(
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    ));
    let auth_user = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();

    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.role, Role::Teacher);
    assert_eq!(parts.extensions.get::<Identity>(), Some(&user.identity()));
}

#[tokio::test]
async fn test_extractor_rejects_missing_header() {
    let state = state_with(InMemoryRepository::new());
    let mut parts = parts_with_header(None);

    let err = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();

    assert_unauthorized(err, "No token provided");
}

#[tokio::test]
async fn test_extractor_rejects_non_ascii_header() {
    let state = state_with(InMemoryRepository::new());
    let mut parts = parts_with_header(Some(HeaderValue::from_bytes(b"Bearer \xffabc").unwrap()));

    let err = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();

    assert_unauthorized(err, "Invalid token");
}

#[tokio::test]
async fn test_extractor_reuses_identity_from_earlier_stage() {
    let state = state_with(InMemoryRepository::new());
    let identity = Identity {
        id: uuid::Uuid::new_v4(),
        role: Role::Admin,
    };
    let mut parts = parts_with_header(None);
    parts.extensions.insert(identity);

    let auth_user = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();

    assert_eq!(auth_user.identity(), identity);
}
