/// Request throttling
///
/// Fixed-window counters keyed by `rl:{scope}:{client}`. The first hit opens a
/// window; once it elapses the count starts over. Exceeding the limit yields a
/// `RateLimited` error carrying the seconds until the window resets.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::configuration::RateLimitSettings;
use crate::error::{AppError, ConfigError};

pub const LOGIN_SCOPE: &str = "auth_login";

/// Longest accepted counting window
pub const MAX_WINDOW_SECONDS: u64 = 86_400;

/// Atomic increment-and-expire counter
#[async_trait]
pub trait RateCounter: Send + Sync {
    /// Count this hit and return `(count_in_window, seconds_until_reset)`.
    async fn hit(&self, key: &str, window_seconds: u64) -> Result<(u64, u64), AppError>;
}

struct Window {
    count: u64,
    reset_at: Instant,
}

#[derive(Default)]
struct Windows {
    entries: HashMap<String, Window>,
    next_sweep: Option<Instant>,
}

/// Process-local counter
///
/// Expired windows are dropped at most once per window length, so idle clients
/// do not accumulate.
#[derive(Default)]
pub struct InMemoryRateCounter {
    windows: Mutex<Windows>,
}

impl InMemoryRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn hit_at(&self, key: &str, window_seconds: u64, now: Instant) -> Result<(u64, u64), AppError> {
        let fresh_reset = now
            .checked_add(Duration::from_secs(window_seconds))
            .ok_or_else(|| AppError::Internal("rate limit window out of range".to_string()))?;

        let mut windows = self
            .windows
            .lock()
            .map_err(|_| AppError::Internal("rate counter lock poisoned".to_string()))?;

        if windows.next_sweep.map_or(true, |at| now >= at) {
            windows.entries.retain(|_, w| w.reset_at > now);
            windows.next_sweep = Some(fresh_reset);
        }

        let window = windows.entries.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            reset_at: fresh_reset,
        });

        if now >= window.reset_at {
            window.count = 0;
            window.reset_at = fresh_reset;
        }
        window.count += 1;

        let retry_after = window.reset_at.saturating_duration_since(now).as_secs().max(1);
        Ok((window.count, retry_after))
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.lock().map(|w| w.entries.len()).unwrap_or(0)
    }
}

#[async_trait]
impl RateCounter for InMemoryRateCounter {
    async fn hit(&self, key: &str, window_seconds: u64) -> Result<(u64, u64), AppError> {
        self.hit_at(key, window_seconds, Instant::now())
    }
}

/// Counter shared between processes through Redis
#[cfg(feature = "redis")]
pub struct RedisRateCounter {
    client: redis::Client,
}

#[cfg(feature = "redis")]
impl RedisRateCounter {
    pub fn new(redis_url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url).map_err(|e| {
            AppError::Config(ConfigError::InvalidValue(format!(
                "rate_limit.redis_url: {}",
                e
            )))
        })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl RateCounter for RedisRateCounter {
    async fn hit(&self, key: &str, window_seconds: u64) -> Result<(u64, u64), AppError> {
        let client = self.client.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> redis::RedisResult<(u64, u64)> {
            use redis::Commands;

            let mut conn = client.get_connection()?;
            let count: u64 = conn.incr(&key, 1u64)?;
            if count == 1 {
                let _: () = conn.expire(&key, window_seconds as i64)?;
            }
            let ttl: i64 = conn.ttl(&key)?;
            let retry_after = if ttl > 0 { ttl as u64 } else { window_seconds };
            Ok((count, retry_after))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Rate counter task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Redis error: {}", e)))
    }
}

/// Limit for one scope, shared by every worker
#[derive(Clone)]
pub struct RateLimiter {
    counter: Arc<dyn RateCounter>,
    scope: &'static str,
    max_requests: u64,
    window_seconds: u64,
}

impl RateLimiter {
    pub fn new(
        counter: Arc<dyn RateCounter>,
        scope: &'static str,
        max_requests: u64,
        window_seconds: u64,
    ) -> Self {
        Self {
            counter,
            scope,
            max_requests,
            window_seconds,
        }
    }

    pub fn login(counter: Arc<dyn RateCounter>, settings: &RateLimitSettings) -> Self {
        Self::new(
            counter,
            LOGIN_SCOPE,
            settings.login_requests,
            settings.login_window_seconds,
        )
    }

    /// Count a request from `client` and reject it once the window is exhausted.
    pub async fn check(&self, client: &str) -> Result<(), AppError> {
        let key = format!("rl:{}:{}", self.scope, client);
        let (count, retry_after) = self.counter.hit(&key, self.window_seconds).await?;

        if count > self.max_requests {
            return Err(AppError::RateLimited {
                scope: self.scope.to_string(),
                retry_after,
            });
        }
        Ok(())
    }
}

/// Pick the counter backend from configuration.
///
/// # Errors
/// A config error when the window is zero or longer than `MAX_WINDOW_SECONDS`.
pub fn counter_from_settings(settings: &RateLimitSettings) -> Result<Arc<dyn RateCounter>, AppError> {
    if !(1..=MAX_WINDOW_SECONDS).contains(&settings.login_window_seconds) {
        return Err(ConfigError::InvalidValue(format!(
            "rate_limit.login_window_seconds must be between 1 and {}",
            MAX_WINDOW_SECONDS
        ))
        .into());
    }

    match settings.redis_url.as_deref() {
        Some(url) => redis_counter(url),
        None => Ok(Arc::new(InMemoryRateCounter::new())),
    }
}

#[cfg(feature = "redis")]
fn redis_counter(url: &str) -> Result<Arc<dyn RateCounter>, AppError> {
    tracing::info!("Using Redis rate counter");
    Ok(Arc::new(RedisRateCounter::new(url)?))
}

#[cfg(not(feature = "redis"))]
fn redis_counter(_url: &str) -> Result<Arc<dyn RateCounter>, AppError> {
    tracing::warn!("rate_limit.redis_url is set but the redis feature is disabled; counting in memory");
    Ok(Arc::new(InMemoryRateCounter::new()))
}
