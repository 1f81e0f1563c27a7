// Fixed-window per-IP rate limiting for the /api scope.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures::future::LocalBoxFuture;
use std::collections::HashMap;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::api::error::ApiError;
use crate::util::env::env_parse;

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Shared counter table. Clone it into every worker so all of them see the
/// same windows. Each limiter only counts requests under its own prefixes.
#[derive(Clone)]
pub struct RateLimit {
    max_requests: u32,
    window: Duration,
    prefixes: Vec<&'static str>,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

/// Read-only routes that serve whole-catalog downloads; they get the stricter tier.
pub const PUBLIC_PREFIXES: &[&str] = &["/api/matrix/export", "/api/analytics"];

impl RateLimit {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            prefixes: vec!["/api"],
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn scoped(mut self, prefixes: &[&'static str]) -> Self {
        self.prefixes = prefixes.to_vec();
        self
    }

    /// General `/api` limit: `RATE_LIMIT_API` per `RATE_LIMIT_WINDOW_SECS` (100 per 15 minutes).
    pub fn general_from_env() -> Self {
        Self::new(
            env_parse("RATE_LIMIT_API", 100u32),
            Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECS", 900u64)),
        )
    }

    /// Stricter tier over [`PUBLIC_PREFIXES`]: `RATE_LIMIT_PUBLIC` (50 per 15 minutes).
    pub fn public_from_env() -> Self {
        Self::new(
            env_parse("RATE_LIMIT_PUBLIC", 50u32),
            Duration::from_secs(env_parse("RATE_LIMIT_WINDOW_SECS", 900u64)),
        )
        .scoped(PUBLIC_PREFIXES)
    }

    fn applies_to(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Records a hit for `client`. Returns the seconds to wait when over the limit.
    fn check(&self, client: &str, now: Instant) -> Result<(), u64> {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = windows.entry(client.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }
        if entry.hits >= self.max_requests {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(remaining.as_secs().max(1));
        }
        entry.hits += 1;
        Ok(())
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service,
            limit: self.clone(),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: S,
    limit: RateLimit,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if self.limit.applies_to(req.path()) {
            let client = req
                .peer_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string());

            if let Err(retry_after) = self.limit.check(&client, Instant::now()) {
                tracing::warn!(client = %client, path = %req.path(), retry_after, "rate limit exceeded");
                return Box::pin(async move {
                    let response = ApiError::RateLimited { retry_after }
                        .error_response()
                        .map_into_right_body();
                    Ok(req.into_response(response))
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_left_body())
        })
    }
}
