//! Session lifecycle: sign-in, sign-up, sign-out and access-token refresh.

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::{CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY};
use super::token::{decode_claims, is_token_expired};
use crate::clock::Clock;
use crate::config::RefreshFailurePolicy;
use crate::error::{ApiError, HttpError, Result};

/// Token payload returned by the auth server's token and signup endpoints.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
  access_token: String,
  #[serde(default)]
  refresh_token: Option<String>,
  #[serde(default)]
  expires_in: Option<i64>,
  #[serde(default)]
  user: Option<AuthUser>,
}

/// The user object embedded in auth responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthUser {
  pub id: String,
  #[serde(default)]
  pub email: Option<String>,
}

/// An established session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
  pub access_token: String,
  pub refresh_token: String,
  /// Expiry in unix seconds.
  pub expires_at: i64,
  pub user_id: String,
}

/// Result of a sign-up: either a live session, or a user awaiting email confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
  Session(Session),
  ConfirmationRequired(AuthUser),
}

type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

/// Settings for a [`TokenManager`].
#[derive(Clone)]
pub struct TokenManagerSettings {
  pub auth_url: String,
  pub api_key: String,
  pub timeout: Duration,
  pub expiry_margin_secs: i64,
  pub refresh_failure: RefreshFailurePolicy,
}

/// Owns stored credentials and keeps the access token fresh.
///
/// Cheap to clone; clones share the store and the in-flight refresh.
#[derive(Clone)]
pub struct TokenManager {
  inner: Arc<Inner>,
}

struct Inner {
  http: Client,
  settings: TokenManagerSettings,
  store: Arc<dyn CredentialStore>,
  clock: Arc<dyn Clock>,
  in_flight: Mutex<Option<RefreshFuture>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TokenManager {
  pub fn new(
    http: Client,
    settings: TokenManagerSettings,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        http,
        settings,
        store,
        clock,
        in_flight: Mutex::new(None),
      }),
    }
  }

  /// The stored access token, fresh or not.
  pub fn access_token(&self) -> Result<Option<String>> {
    self.inner.store.get(ACCESS_TOKEN_KEY)
  }

  /// Whether the stored access token is inside the expiry margin.
  pub fn is_token_expired(&self, token: &str) -> bool {
    is_token_expired(
      token,
      self.inner.clock.now_secs(),
      self.inner.settings.expiry_margin_secs,
    )
  }

  /// A usable access token, refreshing first if the stored one is about to expire.
  ///
  /// Returns `None` when the caller should proceed anonymously.
  pub async fn valid_token(&self) -> Result<Option<String>> {
    let Some(token) = self.access_token()? else {
      return Ok(None);
    };

    if !self.is_token_expired(&token) {
      return Ok(Some(token));
    }

    debug!("Access token expired or expiring, refreshing");
    Ok(self.refresh().await)
  }

  /// Refresh the access token.
  ///
  /// Concurrent callers share a single refresh request and all receive its result.
  /// The refresh runs on its own task, so it completes and stores its tokens
  /// even if every caller is dropped while it is in flight.
  pub async fn refresh(&self) -> Option<String> {
    let fut = {
      let mut slot = lock(&self.inner.in_flight);
      match slot.as_ref() {
        Some(existing) => existing.clone(),
        None => {
          let inner = Arc::clone(&self.inner);
          let task = tokio::spawn(async move {
            let token = inner.refresh_access_token().await;
            *lock(&inner.in_flight) = None;
            token
          });
          let fut = async move {
            task.await.unwrap_or_else(|e| {
              warn!(error = %e, "Token refresh task failed");
              None
            })
          }
          .boxed()
          .shared();
          *slot = Some(fut.clone());
          fut
        }
      }
    };

    fut.await
  }

  /// Sign in with the password grant and store the resulting session.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
    let url = format!("{}/token?grant_type=password", self.inner.settings.auth_url);
    let body = json!({ "email": email, "password": password });

    let value = self.inner.post_auth(&url, &body).await?;
    let tokens: TokenResponse =
      serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;

    let session = self.inner.store_tokens(&tokens, None)?;
    info!(user_id = %session.user_id, "Signed in");
    Ok(session)
  }

  /// Create an account. Stores the session when the server issues one immediately.
  pub async fn sign_up(
    &self,
    email: &str,
    password: &str,
    metadata: Option<Value>,
  ) -> Result<SignUpOutcome> {
    let url = format!("{}/signup", self.inner.settings.auth_url);
    let mut body = json!({ "email": email, "password": password });
    if let Some(data) = metadata {
      body["data"] = data;
    }

    let value = self.inner.post_auth(&url, &body).await?;

    if value.get("access_token").is_some() {
      let tokens: TokenResponse =
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))?;
      let session = self.inner.store_tokens(&tokens, None)?;
      info!(user_id = %session.user_id, "Signed up");
      return Ok(SignUpOutcome::Session(session));
    }

    let user_value = value.get("user").cloned().unwrap_or(value);
    let user: AuthUser =
      serde_json::from_value(user_value).map_err(|e| ApiError::Decode(e.to_string()))?;
    info!(user_id = %user.id, "Signed up, confirmation required");
    Ok(SignUpOutcome::ConfirmationRequired(user))
  }

  /// Revoke the session server-side (best effort) and clear every stored key.
  pub async fn sign_out(&self) -> Result<()> {
    if let Some(token) = self.access_token()? {
      let url = format!("{}/logout", self.inner.settings.auth_url);
      let result = self
        .inner
        .http
        .post(&url)
        .header("apikey", &self.inner.settings.api_key)
        .bearer_auth(&token)
        .timeout(self.inner.settings.timeout)
        .send()
        .await;

      match result {
        Ok(resp) if !resp.status().is_success() => {
          warn!(status = %resp.status(), "Remote logout failed");
        }
        Err(e) => warn!(error = %e, "Remote logout failed"),
        Ok(_) => {}
      }
    }

    self.inner.store.clear()?;
    info!("Signed out");
    Ok(())
  }

  /// The `sub` claim of the stored access token.
  pub fn current_user_id(&self) -> Result<Option<String>> {
    Ok(
      self
        .access_token()?
        .and_then(|t| decode_claims(&t))
        .map(|c| c.sub),
    )
  }

  pub fn is_authenticated(&self) -> Result<bool> {
    Ok(
      self.inner.store.get(ACCESS_TOKEN_KEY)?.is_some()
        || self.inner.store.get(REFRESH_TOKEN_KEY)?.is_some(),
    )
  }

  /// Stored expiry in unix seconds.
  pub fn expires_at(&self) -> Result<Option<i64>> {
    Ok(
      self
        .inner
        .store
        .get(TOKEN_EXPIRY_KEY)?
        .and_then(|v| v.parse().ok()),
    )
  }
}

impl Inner {
  async fn post_auth(&self, url: &str, body: &Value) -> Result<Value> {
    let response = self
      .http
      .post(url)
      .header("apikey", &self.settings.api_key)
      .timeout(self.settings.timeout)
      .json(body)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          ApiError::Timeout {
            after: self.settings.timeout,
          }
        } else {
          ApiError::Network(e)
        }
      })?;

    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
      let err = HttpError::from_body(status.as_u16(), &text);
      warn!(status = %status, message = %err.message, "Auth request failed");
      return Err(ApiError::Auth(err.message));
    }

    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
  }

  /// Persist a token response, keeping `prior_refresh` when the server did not rotate it.
  fn store_tokens(&self, tokens: &TokenResponse, prior_refresh: Option<&str>) -> Result<Session> {
    let refresh_token = tokens
      .refresh_token
      .as_deref()
      .or(prior_refresh)
      .ok_or_else(|| ApiError::Auth("Auth response carried no refresh token".to_string()))?
      .to_string();

    let claims = decode_claims(&tokens.access_token);
    let expires_at = claims
      .as_ref()
      .map(|c| c.exp)
      .or_else(|| tokens.expires_in.map(|s| self.clock.now_secs() + s))
      .unwrap_or_else(|| self.clock.now_secs());
    let user_id = claims
      .map(|c| c.sub)
      .or_else(|| tokens.user.as_ref().map(|u| u.id.clone()))
      .unwrap_or_default();

    self.store.set(ACCESS_TOKEN_KEY, &tokens.access_token)?;
    self.store.set(REFRESH_TOKEN_KEY, &refresh_token)?;
    self.store.set(TOKEN_EXPIRY_KEY, &expires_at.to_string())?;

    Ok(Session {
      access_token: tokens.access_token.clone(),
      refresh_token,
      expires_at,
      user_id,
    })
  }

  async fn refresh_access_token(&self) -> Option<String> {
    let refresh_token = match self.store.get(REFRESH_TOKEN_KEY) {
      Ok(Some(t)) => t,
      Ok(None) => {
        debug!("No refresh token stored");
        return None;
      }
      Err(e) => {
        warn!(error = %e, "Failed to read refresh token");
        return None;
      }
    };

    let url = format!("{}/token?grant_type=refresh_token", self.settings.auth_url);
    let result = self
      .http
      .post(&url)
      .header("apikey", &self.settings.api_key)
      .timeout(self.settings.timeout)
      .json(&json!({ "refresh_token": refresh_token }))
      .send()
      .await;

    let response = match result {
      Ok(r) => r,
      Err(e) => {
        warn!(error = %e, "Token refresh request failed");
        self.on_refresh_failure(None);
        return None;
      }
    };

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(status = %status, body = %body, "Token refresh rejected");
      self.on_refresh_failure(Some(status.as_u16()));
      return None;
    }

    let tokens: TokenResponse = match response.json().await {
      Ok(t) => t,
      Err(e) => {
        warn!(error = %e, "Failed to parse token refresh response");
        self.on_refresh_failure(None);
        return None;
      }
    };

    match self.store_tokens(&tokens, Some(&refresh_token)) {
      Ok(_) => debug!("Access token refreshed"),
      Err(e) => warn!(error = %e, "Failed to store refreshed tokens"),
    }
    Some(tokens.access_token)
  }

  fn on_refresh_failure(&self, status: Option<u16>) {
    let clear = match self.settings.refresh_failure {
      RefreshFailurePolicy::ClearOnAnyFailure => true,
      RefreshFailurePolicy::ClearOnRejection => matches!(status, Some(400 | 401 | 403)),
    };

    if clear {
      warn!("Clearing stored credentials after failed refresh");
      if let Err(e) = self.store.clear() {
        warn!(error = %e, "Failed to clear credentials");
      }
    }
  }
}
