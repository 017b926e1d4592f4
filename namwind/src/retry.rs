use crate::config::HttpSettings;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Distinguishes failures worth another attempt from final ones.
#[derive(Debug)]
pub enum RetryError {
    /// Network issues, server errors, mid-stream failures
    Retryable(anyhow::Error),
    /// Client errors and anything a new attempt cannot fix
    NonRetryable(anyhow::Error),
}

impl RetryError {
    pub fn into_inner(self) -> anyhow::Error {
        match self {
            RetryError::Retryable(err) | RetryError::NonRetryable(err) => err,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Jitter as a fraction of the delay, e.g. 0.25 = ±25%.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 2000,
            jitter_factor: 0.25,
        }
    }
}

impl From<&HttpSettings> for RetryConfig {
    fn from(settings: &HttpSettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts.max(1),
            base_delay_ms: settings.retry_delay_ms,
            ..Default::default()
        }
    }
}

pub async fn with_retry<F, Fut, T>(func: F, config: &RetryConfig) -> Result<T, RetryError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts {
        match func().await {
            Ok(result) => return Ok(result),
            Err(RetryError::Retryable(err)) => {
                log::warn!("Retryable error: {:#}", err);
                last_err = Some(err);
                if attempt + 1 < config.max_attempts {
                    let delay = backoff_with_jitter(attempt, config);
                    log::warn!(
                        "Retry attempt {}/{} after {:?}",
                        attempt + 1,
                        config.max_attempts,
                        delay
                    );
                    sleep(delay).await;
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(RetryError::Retryable(
        last_err.unwrap_or_else(|| anyhow::anyhow!("Max retries exceeded")),
    ))
}

/// Exponential backoff: base_delay * 2^attempt, plus random jitter of ±jitter_factor.
fn backoff_with_jitter(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = config.base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = (base_delay as f64 * config.jitter_factor) as u64;
    if jitter_range == 0 {
        return Duration::from_millis(base_delay);
    }
    let jitter = rand::rng().random_range(0..=jitter_range * 2) as i64 - jitter_range as i64;
    let delay_ms = (base_delay as i64 + jitter).max(0) as u64;
    Duration::from_millis(delay_ms)
}
