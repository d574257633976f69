use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ApiError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub backend: BackendConfig,
  #[serde(default)]
  pub pipeline: PipelineConfig,
  #[serde(default)]
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
  /// Project URL, e.g. https://abc.supabase.co
  pub url: String,
  #[serde(default = "default_rest_path")]
  pub rest_path: String,
  #[serde(default = "default_auth_path")]
  pub auth_path: String,
  #[serde(default = "default_storage_path")]
  pub storage_path: String,
  /// Static API key. Normally left unset and read from the environment.
  #[serde(default)]
  pub api_key: Option<String>,
}

fn default_rest_path() -> String {
  "/rest/v1".to_string()
}

fn default_auth_path() -> String {
  "/auth/v1".to_string()
}

fn default_storage_path() -> String {
  "/storage/v1".to_string()
}

impl BackendConfig {
  /// Minimal backend config pointing at `url`, used by tests and embedders.
  pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      rest_path: default_rest_path(),
      auth_path: default_auth_path(),
      storage_path: default_storage_path(),
      api_key: Some(api_key.into()),
    }
  }

  fn base(&self) -> &str {
    self.url.trim_end_matches('/')
  }

  pub fn rest_url(&self) -> String {
    format!("{}{}", self.base(), self.rest_path)
  }

  pub fn auth_url(&self) -> String {
    format!("{}{}", self.base(), self.auth_path)
  }

  pub fn storage_url(&self) -> String {
    format!("{}{}", self.base(), self.storage_path)
  }
}

/// What to do with stored credentials when a token refresh fails.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailurePolicy {
  /// Any non-OK refresh (including transport failures) signs the user out.
  #[default]
  ClearOnAnyFailure,
  /// Only an explicit rejection (400/401/403) from the auth server signs the user out.
  ClearOnRejection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub timeout_ms: u64,
  pub cache_ttl_ms: u64,
  pub max_retries: u32,
  pub backoff_base_ms: u64,
  pub backoff_max_ms: u64,
  pub queue_pause_ms: u64,
  pub queue_max_age_ms: u64,
  pub queue_max_retries: u32,
  pub metrics_capacity: usize,
  pub health_interval_ms: u64,
  pub health_timeout_ms: u64,
  /// Tokens expiring within this many seconds are refreshed before use.
  pub expiry_margin_secs: i64,
  /// Development builds skip the health probe and stay online.
  pub development: bool,
  pub refresh_failure: RefreshFailurePolicy,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      timeout_ms: 30_000,
      cache_ttl_ms: 300_000,
      max_retries: 3,
      backoff_base_ms: 1_000,
      backoff_max_ms: 10_000,
      queue_pause_ms: 1_000,
      queue_max_age_ms: 3_600_000,
      queue_max_retries: 3,
      metrics_capacity: 100,
      health_interval_ms: 30_000,
      health_timeout_ms: 5_000,
      expiry_margin_secs: 300,
      development: false,
      refresh_failure: RefreshFailurePolicy::default(),
    }
  }
}

impl PipelineConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn health_interval(&self) -> Duration {
    Duration::from_millis(self.health_interval_ms)
  }

  pub fn health_timeout(&self) -> Duration {
    Duration::from_millis(self.health_timeout_ms)
  }

  pub fn queue_pause(&self) -> Duration {
    Duration::from_millis(self.queue_pause_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter when RUST_LOG is unset
  pub level: String,
  /// Write logs to this file (daily rotation) instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./investi.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/investi/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(ApiError::Config(format!(
          "Config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(ApiError::Config(
        "No configuration file found. Create one at ~/.config/investi/config.yaml".to_string(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("investi.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("investi").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      ApiError::Config(format!(
        "Failed to read config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_yaml(&contents)
      .map_err(|e| ApiError::Config(format!("{} ({})", e, path.display())))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents)
      .map_err(|e| ApiError::Config(format!("Failed to parse config: {}", e)))
  }

  /// Resolve the static API key.
  ///
  /// Uses `backend.api_key` when set, otherwise INVESTI_API_KEY, then SUPABASE_ANON_KEY.
  pub fn api_key(&self) -> Result<String> {
    self
      .backend
      .api_key
      .clone()
      .or_else(|| std::env::var("INVESTI_API_KEY").ok())
      .or_else(|| std::env::var("SUPABASE_ANON_KEY").ok())
      .ok_or_else(|| {
        ApiError::Config(
          "API key not found. Set INVESTI_API_KEY or SUPABASE_ANON_KEY environment variable."
            .to_string(),
        )
      })
  }

  /// Default location of the credential database.
  pub fn credentials_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| ApiError::Config("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("investi").join("credentials.db"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn minimal_yaml_uses_defaults() {
    let config = Config::from_yaml("backend:\n  url: https://abc.supabase.co/\n").unwrap();
    assert_eq!(config.backend.rest_url(), "https://abc.supabase.co/rest/v1");
    assert_eq!(config.backend.auth_url(), "https://abc.supabase.co/auth/v1");
    assert_eq!(config.pipeline.timeout_ms, 30_000);
    assert_eq!(config.pipeline.metrics_capacity, 100);
    assert_eq!(config.pipeline.health_timeout(), Duration::from_secs(5));
    assert_eq!(
      config.pipeline.refresh_failure,
      RefreshFailurePolicy::ClearOnAnyFailure
    );
    assert_eq!(config.log.level, "info");
  }

  #[test]
  fn pipeline_overrides() {
    let yaml = r#"
backend:
  url: http://localhost:54321
pipeline:
  timeout_ms: 500
  development: true
  refresh_failure: clear_on_rejection
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.pipeline.timeout(), Duration::from_millis(500));
    assert!(config.pipeline.development);
    assert_eq!(
      config.pipeline.refresh_failure,
      RefreshFailurePolicy::ClearOnRejection
    );
    assert_eq!(config.pipeline.cache_ttl_ms, 300_000);
  }

  #[test]
  fn missing_explicit_path_is_error() {
    let err = Config::load(Some(Path::new("/nonexistent/investi.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("investi.yaml");
    std::fs::write(&path, "backend:\n  url: http://localhost\n  api_key: anon\n").unwrap();
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.backend.api_key.as_deref(), Some("anon"));
  }
}
