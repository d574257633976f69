//! The authenticated request pipeline.
//!
//! Every backend call goes through [`ApiClient::request`]: credentials are
//! attached, the call is bounded by a timeout, a 401 triggers one refresh and
//! one retry, and a metric is recorded whatever the outcome.

mod options;
mod retry;

pub use options::{Body, RequestOptions};
pub use retry::RetryPolicy;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{CredentialStore, TokenManager, TokenManagerSettings};
use crate::cache::{CacheKey, CacheResult, ResponseCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, PipelineConfig};
use crate::connection::{ConnectionMonitor, ConnectionStatus, HealthProbe, HttpHealthProbe};
use crate::error::{ApiError, HttpError, Result};
use crate::metrics::{MetricsBuffer, MetricsSummary, RequestMetric};
use crate::queue::RequestQueue;

/// Backend client with transparent auth, caching and offline queueing.
///
/// Cheap to clone; clones share credentials, cache, metrics and queue.
#[derive(Clone)]
pub struct ApiClient {
  pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
  pub(crate) http: Client,
  pub(crate) rest_url: String,
  pub(crate) storage_url: String,
  pub(crate) api_key: String,
  pub(crate) pipeline: PipelineConfig,
  pub(crate) retry: RetryPolicy,
  pub(crate) tokens: TokenManager,
  pub(crate) clock: Arc<dyn Clock>,
  pub(crate) metrics: MetricsBuffer,
  pub(crate) cache: ResponseCache,
  pub(crate) connection: Arc<ConnectionMonitor>,
  pub(crate) queue: RequestQueue,
}

/// Background tasks started by [`ApiClient::start`]. Aborted on drop.
pub struct PipelineTasks {
  handles: Vec<JoinHandle<()>>,
}

impl Drop for PipelineTasks {
  fn drop(&mut self) {
    for handle in &self.handles {
      handle.abort();
    }
  }
}

impl ApiClient {
  pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
    Self::with_clock(config, store, Arc::new(SystemClock))
  }

  pub fn with_clock(
    config: &Config,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
  ) -> Result<Self> {
    let api_key = config.api_key()?;
    let pipeline = config.pipeline.clone();
    let http = Client::builder().build()?;

    let tokens = TokenManager::new(
      http.clone(),
      TokenManagerSettings {
        auth_url: config.backend.auth_url(),
        api_key: api_key.clone(),
        timeout: pipeline.timeout(),
        expiry_margin_secs: pipeline.expiry_margin_secs,
        refresh_failure: pipeline.refresh_failure,
      },
      store,
      Arc::clone(&clock),
    );

    Ok(Self {
      inner: Arc::new(ClientInner {
        http,
        rest_url: config.backend.rest_url(),
        storage_url: config.backend.storage_url(),
        api_key,
        retry: RetryPolicy::from_config(&pipeline),
        metrics: MetricsBuffer::new(pipeline.metrics_capacity),
        cache: ResponseCache::new(Arc::clone(&clock)),
        connection: Arc::new(ConnectionMonitor::new(ConnectionStatus::Online)),
        queue: RequestQueue::default(),
        pipeline,
        tokens,
        clock,
      }),
    })
  }

  /// Start health polling and queue replay using the HTTP health probe.
  pub fn start(&self) -> PipelineTasks {
    self.start_with_probe(Arc::new(self.health_probe()))
  }

  /// Probe against this client's REST endpoint.
  pub fn health_probe(&self) -> HttpHealthProbe {
    HttpHealthProbe::new(
      self.inner.http.clone(),
      &self.inner.rest_url,
      &self.inner.api_key,
      self.inner.pipeline.health_timeout(),
    )
  }

  /// Start background work with a caller-supplied probe.
  ///
  /// In development mode the probe is never called and status stays online.
  pub fn start_with_probe(&self, probe: Arc<dyn HealthProbe>) -> PipelineTasks {
    let mut handles = vec![self.spawn_queue_resumer()];

    if self.inner.pipeline.development {
      self.inner.connection.set_online(true);
      info!("Development mode, connection probe disabled");
    } else {
      handles.push(
        self
          .inner
          .connection
          .spawn_polling(probe, self.inner.pipeline.health_interval()),
      );
    }

    PipelineTasks { handles }
  }

  pub fn auth(&self) -> &TokenManager {
    &self.inner.tokens
  }

  pub fn connection(&self) -> &Arc<ConnectionMonitor> {
    &self.inner.connection
  }

  pub fn pipeline(&self) -> &PipelineConfig {
    &self.inner.pipeline
  }

  /// Perform one call against the REST endpoint.
  ///
  /// Returns `None` when the response body is empty or not JSON.
  pub async fn request(
    &self,
    method: Method,
    path: &str,
    options: &RequestOptions,
  ) -> Result<Option<Value>> {
    self
      .execute(&self.inner.rest_url, method, path, options)
      .await
  }

  /// [`request`](Self::request) decoded into `T`. An empty body decodes from `null`.
  pub async fn fetch<T: DeserializeOwned>(
    &self,
    method: Method,
    path: &str,
    options: &RequestOptions,
  ) -> Result<T> {
    decode(self.request(method, path, options).await?)
  }

  /// Perform one call against the Storage endpoint.
  pub async fn storage_request(
    &self,
    method: Method,
    path: &str,
    options: &RequestOptions,
  ) -> Result<Option<Value>> {
    self
      .execute(&self.inner.storage_url, method, path, options)
      .await
  }

  /// Cache-first request with the configured ttl.
  pub async fn request_with_cache(
    &self,
    method: Method,
    path: &str,
    options: &RequestOptions,
  ) -> Result<CacheResult<Option<Value>>> {
    let ttl = Duration::from_millis(self.inner.pipeline.cache_ttl_ms);
    self.request_with_cache_ttl(method, path, options, ttl).await
  }

  /// Cache-first request.
  ///
  /// A fresh entry is returned without a network call; on failure a cached
  /// entry of any age is preferred over the error.
  pub async fn request_with_cache_ttl(
    &self,
    method: Method,
    path: &str,
    options: &RequestOptions,
    ttl: Duration,
  ) -> Result<CacheResult<Option<Value>>> {
    let key = CacheKey::new(&method, path, &options.params);
    self
      .inner
      .cache
      .fetch(&key, ttl, || self.request(method.clone(), path, options))
      .await
  }

  pub fn clear_cache(&self) {
    self.inner.cache.clear();
  }

  /// Drop cached responses under `path_prefix`.
  pub fn invalidate_cache(&self, path_prefix: &str) -> usize {
    self.inner.cache.invalidate(path_prefix)
  }

  /// Recorded calls, oldest first.
  pub fn metrics(&self) -> Vec<RequestMetric> {
    self.inner.metrics.snapshot()
  }

  pub fn metrics_summary(&self) -> MetricsSummary {
    self.inner.metrics.summary()
  }

  pub fn clear_metrics(&self) {
    self.inner.metrics.clear();
  }

  async fn execute(
    &self,
    base: &str,
    method: Method,
    path: &str,
    options: &RequestOptions,
  ) -> Result<Option<Value>> {
    let started = Instant::now();
    let result = self.execute_once(base, &method, path, options).await;
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let status = match &result {
      Ok((status, _)) => Some(*status),
      Err(e) => e.status(),
    };

    self.inner.metrics.record(RequestMetric {
      path: path.to_string(),
      method: method.to_string(),
      duration_ms,
      status,
      timestamp: self.inner.clock.now_ms(),
    });

    match &result {
      Ok(_) => debug!(%method, path, status = ?status, duration_ms, "Request completed"),
      Err(e) => warn!(%method, path, status = ?status, duration_ms, error = %e, "Request failed"),
    }

    result.map(|(_, body)| body)
  }

  async fn execute_once(
    &self,
    base: &str,
    method: &Method,
    path: &str,
    options: &RequestOptions,
  ) -> Result<(u16, Option<Value>)> {
    let url = build_url(base, path, &options.params)?;
    let timeout = options
      .timeout
      .unwrap_or_else(|| self.inner.pipeline.timeout());

    let token = self.inner.tokens.valid_token().await?;
    let (mut status, mut text) = self
      .send(method, &url, options, token.as_deref(), timeout)
      .await?;

    if status == StatusCode::UNAUTHORIZED && options.retry_on_auth {
      debug!(path, "Received 401, refreshing token and retrying once");
      if let Some(fresh) = self.inner.tokens.refresh().await {
        (status, text) = self
          .send(method, &url, options, Some(&fresh), timeout)
          .await?;
      }
    }

    if !status.is_success() {
      return Err(HttpError::from_body(status.as_u16(), &text).into_api_error());
    }

    Ok((status.as_u16(), parse_body(&text)))
  }

  async fn send(
    &self,
    method: &Method,
    url: &Url,
    options: &RequestOptions,
    token: Option<&str>,
    timeout: Duration,
  ) -> Result<(StatusCode, String)> {
    let mut builder = self
      .inner
      .http
      .request(method.clone(), url.clone())
      .headers(self.headers(options, token)?);

    match &options.body {
      Some(Body::Json(value)) => {
        let bytes = serde_json::to_vec(value).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        builder = builder.body(bytes);
      }
      Some(Body::Binary { bytes, .. }) => builder = builder.body(bytes.clone()),
      None => {}
    }

    let exchange = async {
      let response = builder.send().await?;
      let status = response.status();
      let text = response.text().await?;
      Ok::<_, ApiError>((status, text))
    };

    match tokio::time::timeout(timeout, exchange).await {
      Ok(result) => result,
      Err(_) => Err(ApiError::Timeout { after: timeout }),
    }
  }

  fn headers(&self, options: &RequestOptions, token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
      HeaderName::from_static("apikey"),
      header_value(&self.inner.api_key)?,
    );

    let content_type = match &options.body {
      Some(Body::Binary { content_type, .. }) => content_type.as_str(),
      _ => "application/json",
    };
    headers.insert(CONTENT_TYPE, header_value(content_type)?);

    if let Some(token) = token {
      headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
    }

    for (name, value) in &options.headers {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ApiError::InvalidRequest(format!("header {}: {}", name, e)))?;
      headers.insert(name, header_value(value)?);
    }

    Ok(headers)
  }
}

fn header_value(value: &str) -> Result<HeaderValue> {
  HeaderValue::from_str(value).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

/// Base + path, with `params` appended to any query already in `path`.
pub(crate) fn build_url(base: &str, path: &str, params: &[(String, String)]) -> Result<Url> {
  let raw = format!("{}{}", base, path);
  let mut url =
    Url::parse(&raw).map_err(|e| ApiError::InvalidRequest(format!("invalid URL {}: {}", raw, e)))?;
  if !params.is_empty() {
    url.query_pairs_mut().extend_pairs(params);
  }
  Ok(url)
}

fn parse_body(text: &str) -> Option<Value> {
  if text.trim().is_empty() {
    return None;
  }
  serde_json::from_str(text).ok()
}

/// Decode an optional JSON body into `T`, treating absence as `null`.
pub fn decode<T: DeserializeOwned>(value: Option<Value>) -> Result<T> {
  serde_json::from_value(value.unwrap_or(Value::Null)).map_err(|e| ApiError::Decode(e.to_string()))
}
