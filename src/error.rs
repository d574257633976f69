//! Error types for the request pipeline.
//!
//! Backend failures are classified into tagged variants so call sites can
//! match on `Conflict` or `NotFound` instead of inspecting raw Postgres codes.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Postgres unique-violation code surfaced by PostgREST.
pub const PG_UNIQUE_VIOLATION: &str = "23505";
/// Postgres undefined-table code.
pub const PG_UNDEFINED_TABLE: &str = "42P01";
/// PostgREST "no rows" code for single-object requests.
pub const PGRST_NO_ROWS: &str = "PGRST116";

/// A non-2xx response from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
  pub status: u16,
  /// Server-provided code, or the HTTP status when the body has none.
  pub code: String,
  pub message: String,
  pub details: Option<Value>,
}

/// Error body shape shared by PostgREST, GoTrue and Storage.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
  code: Option<Value>,
  message: Option<String>,
  msg: Option<String>,
  error: Option<String>,
  error_description: Option<String>,
  details: Option<Value>,
  hint: Option<Value>,
}

impl HttpError {
  /// Build an error from a status code and the raw response body.
  pub fn from_body(status: u16, body: &str) -> Self {
    let parsed: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();

    let code = match parsed.code {
      Some(Value::String(s)) => s,
      Some(Value::Number(n)) => n.to_string(),
      _ => status.to_string(),
    };

    let message = parsed
      .message
      .or(parsed.msg)
      .or(parsed.error_description)
      .or(parsed.error)
      .unwrap_or_else(|| format!("HTTP {}", status));

    let details = match (parsed.details, parsed.hint) {
      (Some(d), _) if !d.is_null() => Some(d),
      (_, Some(h)) if !h.is_null() => Some(h),
      _ => None,
    };

    Self {
      status,
      code,
      message,
      details,
    }
  }

  /// Classify into the matching [`ApiError`] variant.
  pub fn into_api_error(self) -> ApiError {
    match (self.status, self.code.as_str()) {
      (409, _) | (_, PG_UNIQUE_VIOLATION) => ApiError::Conflict(self),
      (404, _) | (_, PGRST_NO_ROWS) | (_, PG_UNDEFINED_TABLE) => ApiError::NotFound(self),
      (401, _) => ApiError::Unauthorized(self),
      _ => ApiError::Http(self),
    }
  }
}

impl std::fmt::Display for HttpError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({}): {}", self.status, self.code, self.message)
  }
}

/// Top-level error type for all pipeline operations.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("request timed out after {}ms", .after.as_millis())]
  Timeout { after: Duration },

  #[error("unauthorized: {0}")]
  Unauthorized(HttpError),

  #[error("not found: {0}")]
  NotFound(HttpError),

  #[error("conflict: {0}")]
  Conflict(HttpError),

  #[error("HTTP error: {0}")]
  Http(HttpError),

  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("decode error: {0}")]
  Decode(String),

  #[error("credential store error: {0}")]
  Credentials(String),

  #[error("configuration error: {0}")]
  Config(String),

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("authentication error: {0}")]
  Auth(String),
}

impl ApiError {
  /// Machine-readable code, `TIMEOUT` for timeouts.
  pub fn code(&self) -> Option<&str> {
    match self {
      Self::Timeout { .. } => Some("TIMEOUT"),
      _ => self.http().map(|e| e.code.as_str()),
    }
  }

  /// HTTP status of the final response, if one was received.
  pub fn status(&self) -> Option<u16> {
    self.http().map(|e| e.status)
  }

  pub fn http(&self) -> Option<&HttpError> {
    match self {
      Self::Unauthorized(e) | Self::NotFound(e) | Self::Conflict(e) | Self::Http(e) => Some(e),
      _ => None,
    }
  }

  /// Client errors are permanent; everything else may succeed on retry.
  pub fn is_retriable(&self) -> bool {
    !matches!(self.status(), Some(400..=499))
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, Self::Conflict(_))
  }
}

impl From<rusqlite::Error> for ApiError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Credentials(e.to_string())
  }
}

/// A convenience Result alias that defaults to [`ApiError`].
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn postgrest_body_is_parsed() {
    let body = r#"{"code":"23505","message":"duplicate key value","details":"Key (id)=(1) already exists.","hint":null}"#;
    let err = HttpError::from_body(409, body);
    assert_eq!(err.code, "23505");
    assert_eq!(err.message, "duplicate key value");
    assert_eq!(err.details, Some(Value::String("Key (id)=(1) already exists.".into())));
  }

  #[test]
  fn empty_body_falls_back_to_status() {
    let err = HttpError::from_body(502, "");
    assert_eq!(err.code, "502");
    assert_eq!(err.message, "HTTP 502");
    assert!(err.details.is_none());
  }

  #[test]
  fn gotrue_body_uses_error_description() {
    let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
    let err = HttpError::from_body(400, body);
    assert_eq!(err.message, "Invalid login credentials");
    assert_eq!(err.code, "400");
  }

  #[test]
  fn classification() {
    let conflict = HttpError::from_body(400, r#"{"code":"23505","message":"dup"}"#).into_api_error();
    assert!(conflict.is_conflict());

    let missing = HttpError::from_body(406, r#"{"code":"PGRST116","message":"no rows"}"#).into_api_error();
    assert!(matches!(missing, ApiError::NotFound(_)));

    let unauthorized = HttpError::from_body(401, "").into_api_error();
    assert!(matches!(unauthorized, ApiError::Unauthorized(_)));

    let server = HttpError::from_body(500, "").into_api_error();
    assert!(matches!(server, ApiError::Http(_)));
  }

  #[test]
  fn retriable_by_status() {
    assert!(!HttpError::from_body(400, "").into_api_error().is_retriable());
    assert!(!HttpError::from_body(499, "").into_api_error().is_retriable());
    assert!(HttpError::from_body(500, "").into_api_error().is_retriable());
    assert!(ApiError::Timeout {
      after: Duration::from_secs(1)
    }
    .is_retriable());
  }

  #[test]
  fn timeout_display_and_code() {
    let err = ApiError::Timeout {
      after: Duration::from_millis(30000),
    };
    assert_eq!(err.to_string(), "request timed out after 30000ms");
    assert_eq!(err.code(), Some("TIMEOUT"));
    assert_eq!(err.status(), None);
  }
}
