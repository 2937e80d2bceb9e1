//! Fixed-window rate limiting over a [`Cache`] counter
//!
//! Each key gets a counter that expires one window after its first hit. A
//! request is allowed while the counter stays within `max_requests`.

use tracing::warn;

use crate::cache::Cache;
use crate::config::RateLimitConfig;
use crate::error::{Error, Result};

/// Outcome of one counted request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request is within the limit
    pub allowed: bool,
    /// Requests counted in the current window, this one included
    pub count: u64,
    /// Requests allowed per window
    pub limit: u64,
}

impl RateLimitDecision {
    /// Requests left in the current window
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// Fixed-window limiter keyed by caller identity (client address, email)
///
/// # Example
///
/// ```rust
/// use user_store::cache::MemoryCache;
/// use user_store::config::RateLimitConfig;
/// use user_store::rate_limit::RateLimiter;
///
/// # async fn example() -> user_store::error::Result<()> {
/// let config = RateLimitConfig { max_requests: 2, ..Default::default() };
/// let limiter = RateLimiter::new(MemoryCache::new(), config);
///
/// limiter.enforce("10.0.0.1").await?;
/// limiter.enforce("10.0.0.1").await?;
/// assert!(limiter.enforce("10.0.0.1").await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RateLimiter<C> {
    cache: C,
    config: RateLimitConfig,
}

impl<C: Cache> RateLimiter<C> {
    /// Limiter storing counters in `cache`
    pub fn new(cache: C, config: RateLimitConfig) -> Self {
        Self { cache, config }
    }

    fn key(&self, identity: &str) -> String {
        format!("{}{}", self.config.key_prefix, identity)
    }

    /// Count a request for `identity` and report whether it is allowed
    ///
    /// Cache failures are returned as errors rather than treated as allowed.
    pub async fn check(&self, identity: &str) -> Result<RateLimitDecision> {
        let count = self
            .cache
            .increment(&self.key(identity), self.config.window())
            .await?;
        let limit = u64::from(self.config.max_requests);

        Ok(RateLimitDecision {
            allowed: count <= limit,
            count,
            limit,
        })
    }

    /// Count a request and fail with [`Error::RateLimitExceeded`] over the limit
    pub async fn enforce(&self, identity: &str) -> Result<RateLimitDecision> {
        let decision = self.check(identity).await?;
        if !decision.allowed {
            warn!(
                identity,
                count = decision.count,
                limit = decision.limit,
                "Rate limit exceeded"
            );
            return Err(Error::RateLimitExceeded);
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn limiter(max_requests: u32) -> RateLimiter<MemoryCache> {
        RateLimiter::new(
            MemoryCache::new(),
            RateLimitConfig {
                max_requests,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = limiter(3);
        for expected in 1..=3 {
            let decision = limiter.check("ip").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.count, expected);
        }
        let decision = limiter.check("ip").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining(), 0);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(1);
        limiter.enforce("a").await.unwrap();
        limiter.enforce("b").await.unwrap();
        assert!(matches!(
            limiter.enforce("a").await,
            Err(Error::RateLimitExceeded)
        ));
    }

    #[tokio::test]
    async fn test_counter_key_uses_prefix() {
        let cache = MemoryCache::new();
        let limiter = RateLimiter::new(cache.clone(), RateLimitConfig::default());
        limiter.check("10.0.0.9").await.unwrap();
        assert_eq!(
            cache.get("rate_limit_10.0.0.9").await.unwrap().as_deref(),
            Some("1")
        );
    }
}
