use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::{DashMap, mapref::entry::Entry};

use crate::error::AppError;

/// RateLimitDecision
///
/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Admitted { remaining: u32 },
    Rejected { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateLimitDecision::Admitted { .. })
    }
}

/// RateLimitStore Contract
///
/// A key-value counter with a fixed window. The in-process implementation below
/// serves a single instance; a multi-replica deployment swaps in a shared
/// counter store behind this same trait.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn consume(&self, key: &str) -> RateLimitDecision;
}

/// RateLimiterState
///
/// The concrete type used to share the limiter across the application state.
pub type RateLimiterState = Arc<dyn RateLimitStore>;

/// RateLimitWindow
///
/// Per-client record. `count` only grows inside a window and is reset to 1 when
/// a request arrives after the window has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub count: u32,
    pub window_start: Instant,
}

impl RateLimitWindow {
    fn open(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }
}

/// InMemoryRateLimiter
///
/// Fixed-window limiter keyed by client address. Each `consume` runs under the
/// owning shard's write lock (`DashMap::entry`), so the read-modify-write of a
/// window is serialized per key and a record never mixes fields from two
/// windows.
pub struct InMemoryRateLimiter {
    windows: DashMap<String, RateLimitWindow>,
    max_points: u32,
    window: Duration,
}

impl InMemoryRateLimiter {
    pub fn new(max_points: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_points,
            window,
        }
    }

    pub fn consume_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        match self.windows.entry(key.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(RateLimitWindow::open(now));
                self.admitted(1)
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                let elapsed = now.saturating_duration_since(record.window_start);

                if elapsed >= self.window {
                    *record = RateLimitWindow::open(now);
                    return self.admitted(1);
                }

                // Stop counting one past the ceiling; further requests in this
                // window are rejected without moving the record.
                if record.count <= self.max_points {
                    record.count = record.count.saturating_add(1);
                }

                if record.count <= self.max_points {
                    self.admitted(record.count)
                } else {
                    RateLimitDecision::Rejected {
                        retry_after: self.window - elapsed,
                    }
                }
            }
        }
    }

    /// Current record for `key`, if any.
    pub fn window(&self, key: &str) -> Option<RateLimitWindow> {
        self.windows.get(key).map(|entry| *entry.value())
    }

    /// prune_expired
    ///
    /// Drops every window that has fully elapsed at `now`. Returns how many
    /// records were removed.
    pub fn prune_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, record| now.saturating_duration_since(record.window_start) < self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn admitted(&self, count: u32) -> RateLimitDecision {
        RateLimitDecision::Admitted {
            remaining: self.max_points.saturating_sub(count),
        }
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimiter {
    async fn consume(&self, key: &str) -> RateLimitDecision {
        self.consume_at(key, Instant::now())
    }
}

/// rate_limit_middleware
///
/// First stage of the pipeline. Runs before any authentication work so that
/// unauthenticated floods never reach token verification or the directory.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiterState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let key = client_key(&request);

    match limiter.consume(&key).await {
        RateLimitDecision::Admitted { .. } => Ok(next.run(request).await),
        RateLimitDecision::Rejected { retry_after } => {
            tracing::warn!(client = %key, ?retry_after, "rate limit exceeded");
            Err(AppError::TooManyRequests {
                retry_after: Some(retry_after),
            })
        }
    }
}

/// Network origin of the request. Requests served without connection info
/// (e.g. in-process tests) share the `unknown` bucket.
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
