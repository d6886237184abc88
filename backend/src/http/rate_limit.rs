use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::warn;

use super::{error::AppError, AppState};

const PRUNE_THRESHOLD: usize = 10_000;
const WINDOW_SECS: f64 = 15.0 * 60.0;

/// Token bucket parameters: `capacity` requests, refilled evenly.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

impl RateLimitConfig {
    /// `requests` per fifteen minutes.
    pub fn per_fifteen_minutes(requests: u32) -> Self {
        Self {
            capacity: f64::from(requests),
            refill_per_sec: f64::from(requests) / WINDOW_SECS,
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let cfg = self.config;
        let mut lock = self.buckets.lock().await;

        if lock.len() > PRUNE_THRESHOLD {
            // A full bucket behaves exactly like a missing one.
            lock.retain(|_, b| {
                b.tokens + now.duration_since(b.last_refill).as_secs_f64() * cfg.refill_per_sec
                    < cfg.capacity
            });
        }

        let bucket = lock.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: cfg.capacity,
            last_refill: now,
        });
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + (elapsed * cfg.refill_per_sec)).min(cfg.capacity);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Client address as seen by the server, or the first `X-Forwarded-For` hop
/// when the deployment trusts its proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl FromRequestParts<Arc<AppState>> for ClientIp {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.trust_proxy {
            let forwarded = parts
                .headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(ip) = forwarded {
                return Ok(ClientIp(ip.to_string()));
            }
        }

        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientIp(ip))
    }
}

pub async fn limit_contact(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Response {
    if !state.contact_limiter.allow(&ip).await {
        warn!("contact form rate limit hit");
        return AppError::RateLimited.into_response();
    }
    next.run(req).await
}

pub async fn limit_login(
    State(state): State<Arc<AppState>>,
    ClientIp(ip): ClientIp,
    req: Request,
    next: Next,
) -> Response {
    if !state.login_limiter.allow(&ip).await {
        warn!("admin login rate limit hit");
        return AppError::RateLimited.into_response();
    }
    next.run(req).await
}
