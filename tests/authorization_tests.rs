use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use ideaboard_api::{
    authorization::{RoleGuard, authorize, authorize_owner_or_admin, authorize_with, require_roles},
    error::ErrorKind,
    models::{Identity, Role},
};
use tower::ServiceExt;
use uuid::Uuid;

const ALL_ROLES: [Role; 3] = [Role::Student, Role::Teacher, Role::Admin];

fn identity(role: Role) -> Identity {
    Identity {
        id: Uuid::new_v4(),
        role,
    }
}

// --- Role Sets ---

#[test]
fn test_missing_identity_is_unauthorized() {
    let err = authorize(None, &[Role::Admin]).unwrap_err();
    let classified = err.classify();

    assert_eq!(classified.kind, ErrorKind::Unauthorized);
    assert_eq!(classified.message, "User not authenticated");
}

#[test]
fn test_missing_identity_is_unauthorized_even_for_empty_set() {
    let err = authorize(None, &[]).unwrap_err();
    assert_eq!(err.classify().status, StatusCode::UNAUTHORIZED);
}

#[test]
fn test_empty_role_set_admits_every_role() {
    for role in ALL_ROLES {
        let who = identity(role);
        assert_eq!(authorize(Some(&who), &[]).unwrap(), who);
    }
}

#[test]
fn test_role_membership_decides_admission() {
    let sets: [&[Role]; 4] = [
        &[Role::Admin],
        &[Role::Teacher, Role::Admin],
        &[Role::Student],
        &[Role::Student, Role::Teacher, Role::Admin],
    ];

    for allowed in sets {
        for role in ALL_ROLES {
            let who = identity(role);
            let result = authorize(Some(&who), allowed);

            if allowed.contains(&role) {
                assert_eq!(result.unwrap(), who);
            } else {
                let classified = result.unwrap_err().classify();
                assert_eq!(classified.kind, ErrorKind::Forbidden, "{role:?} vs {allowed:?}");
                assert_eq!(classified.status, StatusCode::FORBIDDEN);
                assert_eq!(classified.message, "Insufficient permissions");
            }
        }
    }
}

// --- Predicates ---

#[test]
fn test_owner_or_admin() {
    let owner = identity(Role::Student);
    let stranger = identity(Role::Teacher);
    let admin = identity(Role::Admin);

    assert!(authorize_owner_or_admin(Some(&owner), owner.id).is_ok());
    assert!(authorize_owner_or_admin(Some(&admin), owner.id).is_ok());

    let err = authorize_owner_or_admin(Some(&stranger), owner.id).unwrap_err();
    assert_eq!(err.classify().kind, ErrorKind::Forbidden);
}

#[test]
fn test_custom_predicate() {
    let teacher = identity(Role::Teacher);
    let not_student = |who: &Identity| who.role != Role::Student;

    assert!(authorize_with(Some(&teacher), not_student).is_ok());
    assert!(authorize_with(Some(&identity(Role::Student)), not_student).is_err());
    assert!(authorize_with(None, |_| true).is_err());
}

// --- Route Guard ---

fn guarded(allowed: &'static [Role]) -> Router {
    Router::new()
        .route("/guarded", get(|| async { "in" }))
        .route_layer(middleware::from_fn_with_state(
            RoleGuard::new(allowed),
            require_roles,
        ))
}

fn request_as(who: Option<Identity>) -> Request<Body> {
    let mut request = Request::builder().uri("/guarded").body(Body::empty()).unwrap();
    if let Some(who) = who {
        request.extensions_mut().insert(who);
    }
    request
}

#[tokio::test]
async fn test_guard_admits_allowed_role() {
    let response = guarded(&[Role::Teacher, Role::Admin])
        .oneshot(request_as(Some(identity(Role::Teacher))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_guard_forbids_other_roles() {
    let response = guarded(&[Role::Admin])
        .oneshot(request_as(Some(identity(Role::Student))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_guard_without_identity_is_unauthorized() {
    let response = guarded(&[Role::Admin])
        .oneshot(request_as(None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
