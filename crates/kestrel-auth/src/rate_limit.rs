use kestrel_storage::Facade;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const RATE_LIMITS_NAMESPACE: &str = "auth_rate_limits";

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("storage error: {0}")]
    Storage(#[from] kestrel_storage::StorageError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Bucket {
    tokens: f64,
    last_refill_secs: f64,
}

/// Token-bucket sliding window rate limiter, persisted through the
/// Storage Façade under `auth_rate_limits` so limits survive a kernel
/// restart instead of resetting.
pub struct RateLimiter {
    facade: std::sync::Arc<Facade>,
}

impl RateLimiter {
    pub fn new(facade: std::sync::Arc<Facade>) -> Self {
        Self { facade }
    }

    /// Attempts to consume one token from `key`'s bucket, which refills
    /// at `max_events / window_secs` tokens per second up to a ceiling
    /// of `max_events`. Returns `true` if the request is allowed.
    pub async fn try_acquire(
        &self,
        key: &str,
        max_events: u32,
        window_secs: u64,
    ) -> Result<bool, RateLimitError> {
        let now = now_secs();
        let rate = max_events as f64 / window_secs as f64;

        let mut bucket = match self.facade.get(RATE_LIMITS_NAMESPACE, key).await? {
            Some(value) => serde_json::from_value::<Bucket>(value).unwrap_or(Bucket {
                tokens: max_events as f64,
                last_refill_secs: now,
            }),
            None => Bucket {
                tokens: max_events as f64,
                last_refill_secs: now,
            },
        };

        let elapsed = (now - bucket.last_refill_secs).max(0.0);
        bucket.tokens = (bucket.tokens + elapsed * rate).min(max_events as f64);
        bucket.last_refill_secs = now;

        let allowed = bucket.tokens >= 1.0;
        if allowed {
            bucket.tokens -= 1.0;
        }

        self.facade
            .set(RATE_LIMITS_NAMESPACE, key, bucket)
            .await?;

        Ok(allowed)
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
