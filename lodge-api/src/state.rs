use lodge_booking::BookingEngine;
use lodge_store::RedisClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn BookingEngine>,
    /// Rate limiting is skipped when unset.
    pub redis: Option<Arc<RedisClient>>,
    pub rate_limit_per_minute: i64,
    pub auth: AuthConfig,
    /// Cancelled on shutdown; every request works under a child token.
    pub shutdown: CancellationToken,
}
