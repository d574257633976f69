use reqwest::Method;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::{ApiClient, RequestOptions};
use crate::config::PipelineConfig;
use crate::error::Result;

/// Exponential backoff: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub base: Duration,
  pub max: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      base: Duration::from_millis(1_000),
      max: Duration::from_millis(10_000),
    }
  }
}

impl RetryPolicy {
  pub fn from_config(pipeline: &PipelineConfig) -> Self {
    Self {
      base: Duration::from_millis(pipeline.backoff_base_ms),
      max: Duration::from_millis(pipeline.backoff_max_ms),
    }
  }

  /// Wait after the failed attempt numbered `attempt` (0-based).
  pub fn delay(&self, attempt: u32) -> Duration {
    2u32
      .checked_pow(attempt)
      .and_then(|factor| self.base.checked_mul(factor))
      .map_or(self.max, |d| d.min(self.max))
  }

  /// [`delay`](Self::delay) in whole milliseconds, saturating at `u64::MAX`.
  pub fn delay_ms(&self, attempt: u32) -> u64 {
    u64::try_from(self.delay(attempt).as_millis()).unwrap_or(u64::MAX)
  }

  /// Every wait a call with `max_retries` retries could incur.
  pub fn delays(&self, max_retries: u32) -> Vec<Duration> {
    (0..max_retries).map(|attempt| self.delay(attempt)).collect()
  }
}

impl ApiClient {
  /// [`request`](Self::request) with up to `max_retries` retries.
  ///
  /// Client errors (400-499) are returned immediately. Other failures are
  /// retried after an exponential backoff; the last error is returned.
  pub async fn request_with_retry(
    &self,
    method: Method,
    path: &str,
    options: &RequestOptions,
    max_retries: u32,
  ) -> Result<Option<Value>> {
    let mut attempt = 0;
    loop {
      match self.request(method.clone(), path, options).await {
        Ok(body) => return Ok(body),
        Err(e) if !e.is_retriable() || attempt >= max_retries => return Err(e),
        Err(e) => {
          let delay = self.inner.retry.delay(attempt);
          warn!(
            %method,
            path,
            attempt = attempt + 1,
            max_retries,
            delay_ms = self.inner.retry.delay_ms(attempt),
            error = %e,
            "Request failed, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
      }
    }
  }

  /// [`request_with_retry`](Self::request_with_retry) with the configured retry count.
  pub async fn request_with_default_retry(
    &self,
    method: Method,
    path: &str,
    options: &RequestOptions,
  ) -> Result<Option<Value>> {
    let max_retries = self.inner.pipeline.max_retries;
    self
      .request_with_retry(method, path, options, max_retries)
      .await
  }
}
