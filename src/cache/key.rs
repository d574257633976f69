use reqwest::Method;
use sha2::{Digest, Sha256};

/// Identity of a cacheable request: `method:path:serializedParams`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
  method: Method,
  path: String,
  params: String,
}

impl CacheKey {
  pub fn new(method: &Method, path: &str, params: &[(String, String)]) -> Self {
    let params = serde_json::to_string(params).unwrap_or_default();
    Self {
      method: method.clone(),
      path: path.to_string(),
      params,
    }
  }

  pub fn method(&self) -> &Method {
    &self.method
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  /// Human-readable form, used in logs.
  pub fn description(&self) -> String {
    format!("{}:{}:{}", self.method, self.path, self.params)
  }

  /// SHA256 of the description for stable, fixed-length map keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }
}
