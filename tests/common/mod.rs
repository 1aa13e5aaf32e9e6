#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, HeaderName, Method, Request, StatusCode, header},
};
use chrono::Utc;
use ideaboard_api::{
    AppConfig, AppState, InMemoryRateLimiter, InMemoryRepository, TokenService, create_router,
    models::{Role, User},
    rate_limit::RateLimiterState,
    repository::RepositoryState,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

/// A user row with a placeholder hash. Fine for anything except login.
pub fn user_with_role(role: Role) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        name: format!("user {}", &id.simple().to_string()[..6]),
        email: format!("{}@example.com", id.simple()),
        password_hash: "not-a-real-hash".to_string(),
        role,
        created_at: Utc::now(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub tokens: TokenService,
}

impl TestApp {
    pub fn new(config: AppConfig) -> Self {
        Self::with_repo(config, InMemoryRepository::new())
    }

    pub fn with_repo(config: AppConfig, repo: InMemoryRepository) -> Self {
        let repo = Arc::new(repo);
        let limiter = Arc::new(InMemoryRateLimiter::new(
            config.rate_limit_max,
            config.rate_limit_window,
        ));
        let state = AppState::new(
            config,
            Arc::clone(&repo) as RepositoryState,
            limiter as RateLimiterState,
        );
        let tokens = state.tokens.clone();

        Self {
            router: create_router(state),
            repo,
            tokens,
        }
    }

    /// Inserts a user and returns it with a valid bearer token.
    pub fn seed(&self, role: Role) -> (User, String) {
        let user = user_with_role(role);
        self.repo.insert(user.clone());
        let token = self.tokens.issue(&user.identity()).unwrap();
        (user, token)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct RequestBuilder {
    method: Method,
    uri: String,
    token: Option<String>,
    peer: Option<SocketAddr>,
    body: Option<Value>,
    headers: Vec<(HeaderName, String)>,
}

pub fn request(method: Method, uri: &str) -> RequestBuilder {
    RequestBuilder {
        method,
        uri: uri.to_string(),
        token: None,
        peer: None,
        body: None,
        headers: Vec::new(),
    }
}

impl RequestBuilder {
    pub fn bearer(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn from_peer(mut self, peer: &str) -> Self {
        self.peer = Some(peer.parse().unwrap());
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    pub fn build(self) -> Request<Body> {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }
        if let Some(token) = self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match self.body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let mut request = builder.body(body).unwrap();
        if let Some(peer) = self.peer {
            request.extensions_mut().insert(ConnectInfo(peer));
        }
        request
    }
}
