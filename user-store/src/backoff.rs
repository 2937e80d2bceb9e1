//! Connection retries with exponential backoff

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
pub(crate) fn delay_for(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Run `connect` until it succeeds or `max_retries` retries have failed
///
/// `what` names the backend in log lines ("Database", "Redis").
pub(crate) async fn connect_with_retries<T, F, Fut>(
    what: &str,
    max_retries: u32,
    base_delay: Duration,
    mut connect: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match connect().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("{} connection established after {} attempt(s)", what, attempt + 1);
                }
                return Ok(value);
            }
            Err(e) => {
                attempt += 1;

                if attempt > max_retries {
                    tracing::error!(
                        "Failed to connect to {} after {} attempts: {}",
                        what,
                        max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = delay_for(base_delay, attempt);
                tracing::warn!(
                    "{} connection attempt {} failed: {}. Retrying in {:?}...",
                    what,
                    attempt,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
