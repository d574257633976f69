//! Process-wide connectivity status.
//!
//! Status is refreshed by polling a lightweight health probe. Subscribers
//! are woken only when the status actually flips.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
  Online,
  Offline,
}

impl ConnectionStatus {
  pub fn is_online(self) -> bool {
    self == Self::Online
  }

  fn from_online(online: bool) -> Self {
    if online {
      Self::Online
    } else {
      Self::Offline
    }
  }
}

/// Something that can tell whether the backend is reachable.
#[async_trait]
pub trait HealthProbe: Send + Sync {
  async fn is_reachable(&self) -> bool;
}

/// Probes the REST root with a HEAD request.
///
/// Any response below 500 counts as reachable; a probe slower than `timeout`
/// counts as unreachable.
pub struct HttpHealthProbe {
  http: Client,
  url: String,
  api_key: String,
  timeout: Duration,
}

impl HttpHealthProbe {
  pub fn new(http: Client, rest_url: &str, api_key: &str, timeout: Duration) -> Self {
    Self {
      http,
      url: format!("{}/", rest_url.trim_end_matches('/')),
      api_key: api_key.to_string(),
      timeout,
    }
  }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
  async fn is_reachable(&self) -> bool {
    let result = self
      .http
      .head(&self.url)
      .header("apikey", &self.api_key)
      .timeout(self.timeout)
      .send()
      .await;

    match result {
      Ok(resp) => resp.status().as_u16() < 500,
      Err(e) => {
        debug!(error = %e, "Health probe failed");
        false
      }
    }
  }
}

/// Holds the current status and notifies subscribers on transitions.
#[derive(Debug)]
pub struct ConnectionMonitor {
  tx: watch::Sender<ConnectionStatus>,
}

impl ConnectionMonitor {
  pub fn new(initial: ConnectionStatus) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx }
  }

  pub fn status(&self) -> ConnectionStatus {
    *self.tx.borrow()
  }

  pub fn is_online(&self) -> bool {
    self.status().is_online()
  }

  /// Update the status. Returns true if this was a transition.
  pub fn set_online(&self, online: bool) -> bool {
    let next = ConnectionStatus::from_online(online);
    let changed = self.tx.send_if_modified(|current| {
      if *current == next {
        false
      } else {
        *current = next;
        true
      }
    });

    if changed {
      info!(status = ?next, "Connection status changed");
    }
    changed
  }

  /// Receiver that wakes only when the status flips.
  pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
    self.tx.subscribe()
  }

  /// Probe once and record the result.
  pub async fn check_now(&self, probe: &dyn HealthProbe) -> ConnectionStatus {
    let online = probe.is_reachable().await;
    self.set_online(online);
    self.status()
  }

  /// Poll `probe` every `interval` until the returned handle is aborted.
  pub fn spawn_polling(
    self: &Arc<Self>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
  ) -> JoinHandle<()> {
    let monitor = Arc::clone(self);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        monitor.check_now(probe.as_ref()).await;
      }
    })
  }
}

impl Default for ConnectionMonitor {
  fn default() -> Self {
    Self::new(ConnectionStatus::Online)
  }
}


#[cfg(test)]
mod tests {
  use super::testing::FlagProbe;
  use super::*;
  use wiremock::matchers::{header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[test]
  fn set_online_reports_transitions_only() {
    let monitor = ConnectionMonitor::default();
    assert!(monitor.is_online());
    assert!(!monitor.set_online(true));
    assert!(monitor.set_online(false));
    assert!(!monitor.set_online(false));
    assert_eq!(monitor.status(), ConnectionStatus::Offline);
  }

  #[tokio::test]
  async fn subscribers_wake_on_edges_only() {
    let monitor = ConnectionMonitor::default();
    let mut rx = monitor.subscribe();

    monitor.set_online(true);
    assert!(!rx.has_changed().unwrap());

    monitor.set_online(false);
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), ConnectionStatus::Offline);

    monitor.set_online(false);
    assert!(!rx.has_changed().unwrap());
  }

  #[tokio::test]
  async fn polling_updates_status() {
    let monitor = Arc::new(ConnectionMonitor::default());
    let probe = Arc::new(FlagProbe::new(false));

    let mut rx = monitor.subscribe();
    let handle = monitor.spawn_polling(probe.clone(), Duration::from_millis(10));

    tokio::time::timeout(Duration::from_secs(2), rx.changed())
      .await
      .unwrap()
      .unwrap();
    assert_eq!(monitor.status(), ConnectionStatus::Offline);

    probe.set_reachable(true);
    tokio::time::timeout(Duration::from_secs(2), rx.changed())
      .await
      .unwrap()
      .unwrap();
    assert!(monitor.is_online());
    assert!(probe.calls() >= 2);

    handle.abort();
  }

  #[tokio::test]
  async fn http_probe() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
      .and(path("/rest/v1/"))
      .and(header("apikey", "anon"))
      .respond_with(ResponseTemplate::new(200))
      .up_to_n_times(1)
      .mount(&server)
      .await;
    Mock::given(method("HEAD"))
      .respond_with(ResponseTemplate::new(503))
      .mount(&server)
      .await;

    let probe = HttpHealthProbe::new(
      Client::new(),
      &format!("{}/rest/v1", server.uri()),
      "anon",
      Duration::from_secs(5),
    );
    assert!(probe.is_reachable().await);
    assert!(!probe.is_reachable().await);
  }

  #[tokio::test]
  async fn slow_health_check_counts_as_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
      .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
      .mount(&server)
      .await;

    let probe = HttpHealthProbe::new(
      Client::new(),
      &format!("{}/rest/v1", server.uri()),
      "anon",
      Duration::from_millis(30),
    );
    assert!(!probe.is_reachable().await);
  }
}
