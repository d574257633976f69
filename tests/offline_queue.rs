mod common;

use investi::connection::ConnectionStatus;
use investi::RequestOptions;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::client;

async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<wiremock::Request> {
  for _ in 0..300 {
    let requests = server.received_requests().await.unwrap();
    if requests.len() >= count {
      return requests;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("expected {} requests", count);
}

#[tokio::test]
async fn queued_requests_replay_in_order_when_back_online() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .and(path("/rest/v1/posts"))
    .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(30)))
    .expect(3)
    .mount(&server)
    .await;

  let t = client(&server);
  let _tasks = t.client.start();

  t.client.connection().set_online(false);
  for n in 1..=3 {
    t.client.queue_request(
      Method::POST,
      "/posts",
      RequestOptions::new().json(json!({ "contenido": format!("borrador {}", n) })),
    );
  }

  tokio::time::sleep(Duration::from_millis(100)).await;
  assert!(server.received_requests().await.unwrap().is_empty());
  assert_eq!(t.client.queue_len(), 3);

  t.client.connection().set_online(true);
  assert_eq!(t.client.connection().status(), ConnectionStatus::Online);

  let requests = wait_for_requests(&server, 3).await;
  let bodies: Vec<String> = requests
    .iter()
    .map(|r| {
      let body: Value = serde_json::from_slice(&r.body).unwrap();
      body["contenido"].as_str().unwrap().to_string()
    })
    .collect();
  assert_eq!(bodies, vec!["borrador 1", "borrador 2", "borrador 3"]);

  for _ in 0..100 {
    if t.client.queue_idle() {
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  assert!(t.client.queue_idle());
  assert!(t.client.pending_requests().is_empty());
}

#[tokio::test]
async fn replay_pauses_when_connection_drops() {
  let server = MockServer::start().await;
  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(201))
    .mount(&server)
    .await;

  let t = client(&server);
  t.client.connection().set_online(false);
  t.client.queue_request(Method::POST, "/a", RequestOptions::new());
  t.client.queue_request(Method::POST, "/b", RequestOptions::new());

  t.client.process_queue().await;
  assert_eq!(t.client.queue_len(), 2);
  assert!(server.received_requests().await.unwrap().is_empty());

  let pending: Vec<String> = t
    .client
    .pending_requests()
    .into_iter()
    .map(|r| r.path)
    .collect();
  assert_eq!(pending, vec!["/a", "/b"]);
}
