//! Offline request queue.
//!
//! Writes issued while offline are held in FIFO order and replayed when the
//! connection comes back. Each entry is retried a bounded number of times and
//! is dropped once it is older than the configured maximum age.

use reqwest::Method;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{ApiClient, RequestOptions};

/// A request waiting for connectivity.
#[derive(Debug, Clone)]
pub struct QueuedRequest {
  pub id: Uuid,
  pub method: Method,
  pub path: String,
  pub options: RequestOptions,
  /// Unix milliseconds when first queued.
  pub timestamp: i64,
  pub retries: u32,
}

impl QueuedRequest {
  /// A failed entry goes back on the queue only while young enough and under the retry cap.
  pub fn should_requeue(&self, now_ms: i64, max_age_ms: u64, max_retries: u32) -> bool {
    let max_age_ms = i64::try_from(max_age_ms).unwrap_or(i64::MAX);
    now_ms - self.timestamp < max_age_ms && self.retries < max_retries
  }
}

#[derive(Debug, Default)]
pub(crate) struct RequestQueue {
  entries: Mutex<VecDeque<QueuedRequest>>,
  processing: AtomicBool,
}

impl RequestQueue {
  fn entries(&self) -> MutexGuard<'_, VecDeque<QueuedRequest>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn push(&self, entry: QueuedRequest) {
    self.entries().push_back(entry);
  }

  fn pop(&self) -> Option<QueuedRequest> {
    self.entries().pop_front()
  }

  fn len(&self) -> usize {
    self.entries().len()
  }

  fn is_empty(&self) -> bool {
    self.entries().is_empty()
  }

  /// Claim the processor slot. False if another processor holds it.
  fn try_begin(&self) -> bool {
    !self.processing.swap(true, Ordering::AcqRel)
  }

  fn finish(&self) {
    self.processing.store(false, Ordering::Release);
  }

  fn is_processing(&self) -> bool {
    self.processing.load(Ordering::Acquire)
  }
}

impl ApiClient {
  /// Hold a request for later delivery. Processing starts right away when online.
  pub fn queue_request(&self, method: Method, path: &str, options: RequestOptions) -> Uuid {
    let entry = QueuedRequest {
      id: Uuid::new_v4(),
      method,
      path: path.to_string(),
      options,
      timestamp: self.inner.clock.now_ms(),
      retries: 0,
    };
    let id = entry.id;

    info!(queue_id = %id, method = %entry.method, path, "Request queued");
    self.inner.queue.push(entry);

    if self.inner.connection.is_online() {
      self.process_queue_in_background();
    }
    id
  }

  pub fn queue_len(&self) -> usize {
    self.inner.queue.len()
  }

  /// Snapshot of waiting requests in delivery order.
  pub fn pending_requests(&self) -> Vec<QueuedRequest> {
    self.inner.queue.entries().iter().cloned().collect()
  }

  /// Drop every waiting request. Returns how many were removed.
  pub fn clear_queue(&self) -> usize {
    let mut entries = self.inner.queue.entries();
    let removed = entries.len();
    entries.clear();
    removed
  }

  /// True when nothing is waiting and no replay is running.
  pub fn queue_idle(&self) -> bool {
    self.queue_len() == 0 && !self.inner.queue.is_processing()
  }

  /// Spawn a replay pass unless one is already running.
  pub(crate) fn process_queue_in_background(&self) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      debug!("No async runtime, queue replay deferred");
      return;
    };
    if self.inner.queue.is_processing() {
      return;
    }
    let client = self.clone();
    runtime.spawn(async move { client.process_queue().await });
  }

  /// Deliver queued requests in order, pausing between entries.
  ///
  /// Stops early if the connection drops. At most one pass runs at a time.
  pub async fn process_queue(&self) {
    loop {
      if !self.inner.queue.try_begin() {
        return;
      }

      self.drain_queue().await;
      self.inner.queue.finish();

      // An entry queued between the last pop and finish() would otherwise wait
      // for the next connectivity edge.
      if self.inner.queue.is_empty() || !self.inner.connection.is_online() {
        return;
      }
    }
  }

  async fn drain_queue(&self) {
    let pipeline = &self.inner.pipeline;

    while self.inner.connection.is_online() {
      let Some(mut entry) = self.inner.queue.pop() else {
        break;
      };

      let result = self
        .request_with_default_retry(entry.method.clone(), &entry.path, &entry.options)
        .await;

      match result {
        Ok(_) => info!(queue_id = %entry.id, path = %entry.path, "Queued request delivered"),
        Err(e) => {
          let now = self.inner.clock.now_ms();
          if entry.should_requeue(now, pipeline.queue_max_age_ms, pipeline.queue_max_retries) {
            entry.retries += 1;
            warn!(
              queue_id = %entry.id,
              path = %entry.path,
              retries = entry.retries,
              error = %e,
              "Queued request failed, requeued"
            );
            self.inner.queue.push(entry);
          } else {
            warn!(
              queue_id = %entry.id,
              path = %entry.path,
              retries = entry.retries,
              error = %e,
              "Queued request failed, dropped"
            );
          }
        }
      }

      if !self.inner.queue.is_empty() {
        tokio::time::sleep(pipeline.queue_pause()).await;
      }
    }
  }

  /// Replay the queue whenever the connection comes back online.
  pub(crate) fn spawn_queue_resumer(&self) -> JoinHandle<()> {
    let mut rx = self.inner.connection.subscribe();
    let client = self.clone();
    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let status = *rx.borrow_and_update();
        if status.is_online() && client.queue_len() > 0 {
          debug!(pending = client.queue_len(), "Back online, replaying queue");
          client.process_queue_in_background();
        }
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::testing::{harness, harness_with, NOW_MS};
  use serde_json::json;
  use std::time::Duration;
  use wiremock::matchers::{body_json, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn entry(timestamp: i64, retries: u32) -> QueuedRequest {
    QueuedRequest {
      id: Uuid::new_v4(),
      method: Method::POST,
      path: "/posts".to_string(),
      options: RequestOptions::new(),
      timestamp,
      retries,
    }
  }

  async fn wait_idle(client: &ApiClient) {
    for _ in 0..500 {
      if client.queue_idle() {
        return;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queue did not drain");
  }

  #[test]
  fn requeue_rule() {
    let max_age = 3_600_000;
    assert!(entry(0, 0).should_requeue(3_599_999, max_age, 3));
    assert!(!entry(0, 0).should_requeue(3_600_000, max_age, 3));
    assert!(entry(0, 2).should_requeue(10, max_age, 3));
    assert!(!entry(0, 3).should_requeue(10, max_age, 3));
  }

  #[tokio::test]
  async fn offline_requests_wait_for_connectivity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/rest/v1/likes"))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    let h = harness(&server);
    h.client.connection().set_online(false);

    let id = h
      .client
      .queue_request(Method::POST, "/likes", RequestOptions::new().json(json!({ "post_id": 1 })));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.client.queue_len(), 1);
    assert_eq!(h.client.pending_requests()[0].id, id);
    assert_eq!(h.client.pending_requests()[0].timestamp, NOW_MS);

    h.client.connection().set_online(true);
    h.client.process_queue().await;
    assert!(h.client.queue_idle());
  }

  #[tokio::test]
  async fn failing_entry_is_dropped_after_retry_cap() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(500))
      .expect(4)
      .mount(&server)
      .await;

    let h = harness_with(&server, |p| p.max_retries = 0);
    h.client
      .queue_request(Method::POST, "/posts", RequestOptions::new().json(json!({})));

    wait_idle(&h.client).await;
    assert_eq!(h.client.queue_len(), 0);
  }

  #[tokio::test]
  async fn stale_entry_is_dropped_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .respond_with(ResponseTemplate::new(503))
      .expect(1)
      .mount(&server)
      .await;

    let h = harness_with(&server, |p| p.max_retries = 0);
    h.client.connection().set_online(false);
    h.client.queue_request(Method::POST, "/posts", RequestOptions::new());

    h.clock.advance_ms(3_600_000);
    h.client.connection().set_online(true);
    h.client.process_queue().await;

    assert_eq!(h.client.queue_len(), 0);
  }

  #[tokio::test]
  async fn client_errors_count_against_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(body_json(json!({ "n": 1 })))
      .respond_with(ResponseTemplate::new(400))
      .expect(4)
      .mount(&server)
      .await;
    Mock::given(method("POST"))
      .and(body_json(json!({ "n": 2 })))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    let h = harness(&server);
    h.client.connection().set_online(false);
    h.client
      .queue_request(Method::POST, "/posts", RequestOptions::new().json(json!({ "n": 1 })));
    h.client
      .queue_request(Method::POST, "/posts", RequestOptions::new().json(json!({ "n": 2 })));

    h.client.connection().set_online(true);
    h.client.process_queue().await;
    assert!(h.client.queue_idle());
  }

  #[tokio::test]
  async fn going_offline_stops_replay() {
    let server = MockServer::start().await;
    let h = harness(&server);
    h.client.connection().set_online(false);
    h.client.queue_request(Method::POST, "/posts", RequestOptions::new());
    h.client.queue_request(Method::POST, "/posts", RequestOptions::new());

    h.client.process_queue().await;
    assert_eq!(h.client.queue_len(), 2);
    assert!(server.received_requests().await.unwrap().is_empty());

    assert_eq!(h.client.clear_queue(), 2);
    assert!(h.client.queue_idle());
  }
}
