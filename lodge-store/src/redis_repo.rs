use redis::RedisResult;
use tracing::info;

/// Shared counter store for per-client request throttling.
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured");
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns `true` while the caller is under `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = rate_limit_pipeline(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// `INCR` plus `EXPIRE ... NX` (Redis 7+): the TTL is set by the first hit
/// of a window only, so retries inside the window never push it back.
fn rate_limit_pipeline(key: &str, window_seconds: i64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .incr(key, 1)
        .cmd("EXPIRE")
        .arg(key)
        .arg(window_seconds)
        .arg("NX")
        .ignore();
    pipe
}

pub fn rate_limit_key(client: &str) -> String {
    format!("rate_limit:bookings:{}", client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_keys_are_namespaced_per_client() {
        assert_eq!(rate_limit_key("10.0.0.1"), "rate_limit:bookings:10.0.0.1");
        assert_ne!(rate_limit_key("10.0.0.1"), rate_limit_key("10.0.0.2"));
    }

    #[test]
    fn window_expiry_is_only_set_once() {
        let packed = rate_limit_pipeline("rate_limit:bookings:10.0.0.1", 60).get_packed_pipeline();
        let packed = String::from_utf8_lossy(&packed);

        let expire = packed.find("$6\r\nEXPIRE\r\n").unwrap();
        assert!(packed[expire..].contains("$2\r\n60\r\n$2\r\nNX\r\n"));
        assert!(packed[..expire].contains("INCR"));
    }
}
