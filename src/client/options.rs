use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::{ApiError, Result};

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
  /// Serialized as JSON with `Content-Type: application/json`.
  Json(Value),
  /// Sent as-is.
  Binary { bytes: Vec<u8>, content_type: String },
}

/// Per-call knobs for [`ApiClient::request`](super::ApiClient::request).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
  /// Query string pairs, appended in order.
  pub params: Vec<(String, String)>,
  pub body: Option<Body>,
  /// Extra headers; these replace the pipeline defaults on name clash.
  pub headers: Vec<(String, String)>,
  /// Overrides the configured timeout.
  pub timeout: Option<Duration>,
  /// Refresh and retry once on 401.
  pub retry_on_auth: bool,
}

impl Default for RequestOptions {
  fn default() -> Self {
    Self {
      params: Vec::new(),
      body: None,
      headers: Vec::new(),
      timeout: None,
      retry_on_auth: true,
    }
  }
}

impl RequestOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
    self.params.push((key.into(), value.to_string()));
    self
  }

  /// Add a parameter only when `value` is present.
  pub fn param_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
    match value {
      Some(v) => self.param(key, v),
      None => self,
    }
  }

  /// Flatten a serializable struct into query parameters, skipping nulls.
  pub fn params_from<T: Serialize>(mut self, params: &T) -> Result<Self> {
    let value =
      serde_json::to_value(params).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    let Value::Object(map) = value else {
      return Err(ApiError::InvalidRequest(
        "query parameters must serialize to an object".to_string(),
      ));
    };

    for (key, value) in map {
      match value {
        Value::Null => {}
        Value::String(s) => self.params.push((key, s)),
        other => self.params.push((key, other.to_string())),
      }
    }
    Ok(self)
  }

  pub fn json(mut self, body: Value) -> Self {
    self.body = Some(Body::Json(body));
    self
  }

  /// Serialize `body` as the JSON payload.
  pub fn json_from<T: Serialize>(self, body: &T) -> Result<Self> {
    let value = serde_json::to_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    Ok(self.json(value))
  }

  pub fn binary(mut self, bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
    self.body = Some(Body::Binary {
      bytes,
      content_type: content_type.into(),
    });
    self
  }

  pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn no_auth_retry(mut self) -> Self {
    self.retry_on_auth = false;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[derive(Serialize)]
  struct FeedQuery {
    select: &'static str,
    limit: u32,
    community_id: Option<String>,
  }

  #[test]
  fn optional_params_are_skipped() {
    let options = RequestOptions::new()
      .param("select", "*")
      .param_opt("limit", Some(20))
      .param_opt::<String>("offset", None);

    assert_eq!(
      options.params,
      vec![
        ("select".to_string(), "*".to_string()),
        ("limit".to_string(), "20".to_string())
      ]
    );
  }

  #[test]
  fn params_from_struct() {
    let options = RequestOptions::new()
      .params_from(&FeedQuery {
        select: "*",
        limit: 10,
        community_id: None,
      })
      .unwrap();

    assert!(options.params.contains(&("select".to_string(), "*".to_string())));
    assert!(options.params.contains(&("limit".to_string(), "10".to_string())));
    assert_eq!(options.params.len(), 2);
  }

  #[test]
  fn params_from_rejects_non_objects() {
    assert!(RequestOptions::new().params_from(&vec![1, 2]).is_err());
  }

  #[test]
  fn defaults() {
    let options = RequestOptions::new().json(json!({"a": 1})).header("Prefer", "return=minimal");
    assert!(options.retry_on_auth);
    assert!(options.timeout.is_none());
    assert_eq!(options.body, Some(Body::Json(json!({"a": 1}))));
    assert!(!options.no_auth_retry().retry_on_auth);
  }
}
