use std::{num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::metrics::Metrics;
use crate::middleware::auth::AuthError;
use crate::middleware::{EndpointRateLimiter, RateLimiter, TokenValidator};

const APPT_TYPE_CACHE_SIZE: usize = 64;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<AppConfig>,
    pub metrics: Metrics,
    /// Bearer-token validator built from `[auth]`.
    pub auth: Arc<TokenValidator>,
    /// Global per-IP limiter.
    pub rate_limiter: RateLimiter,
    /// Per-endpoint limits for expensive routes.
    pub endpoint_limiter: EndpointRateLimiter,
    /// Appointment type code -> description, used for constraint error messages.
    pub appt_type_names: Arc<Mutex<LruCache<String, String>>>,
}

impl AppState {
    pub fn new(db: sqlx::PgPool, config: AppConfig) -> Result<Self, AuthError> {
        let auth = TokenValidator::from_config(&config.auth)?;
        let rl = &config.rate_limit;
        let rate_limiter = RateLimiter::new(rl.max_requests, rl.window_seconds);
        let endpoint_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("/search", rl.search_max_requests, rl.window_seconds),
            ("/search/simple", rl.search_max_requests, rl.window_seconds),
        ]);
        let cache_size = NonZeroUsize::new(APPT_TYPE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            db,
            config: Arc::new(config),
            metrics: Metrics::new(),
            auth: Arc::new(auth),
            rate_limiter,
            endpoint_limiter,
            appt_type_names: Arc::new(Mutex::new(LruCache::new(cache_size))),
        })
    }
}
