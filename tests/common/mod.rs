#![allow(dead_code)]

use investi::auth::MemoryCredentialStore;
use investi::clock::ManualClock;
use investi::config::{BackendConfig, LogConfig, PipelineConfig};
use investi::{ApiClient, Config};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use std::sync::Arc;
use wiremock::MockServer;

pub const NOW_MS: i64 = 1_700_000_000_000;
pub const NOW: i64 = NOW_MS / 1000;

#[derive(Serialize)]
struct Claims<'a> {
  sub: &'a str,
  exp: i64,
}

pub fn mint(sub: &str, exp: i64) -> String {
  encode(
    &Header::default(),
    &Claims { sub, exp },
    &EncodingKey::from_secret(b"integration"),
  )
  .unwrap()
}

pub struct TestClient {
  pub client: ApiClient,
  pub store: Arc<MemoryCredentialStore>,
  pub clock: ManualClock,
}

/// Client against `server` with millisecond delays and the probe disabled.
pub fn client(server: &MockServer) -> TestClient {
  let config = Config {
    backend: BackendConfig::new(server.uri(), "anon-key"),
    pipeline: PipelineConfig {
      backoff_base_ms: 1,
      backoff_max_ms: 5,
      queue_pause_ms: 20,
      development: true,
      ..PipelineConfig::default()
    },
    log: LogConfig::default(),
  };

  let store = Arc::new(MemoryCredentialStore::new());
  let clock = ManualClock::new(NOW_MS);
  let client = ApiClient::with_clock(&config, store.clone(), Arc::new(clock.clone())).unwrap();
  TestClient {
    client,
    store,
    clock,
  }
}
