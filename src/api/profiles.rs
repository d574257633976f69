use reqwest::Method;

use super::{eq, first_row, Profile, ProfileUpdate, PREFER, RETURN_REPRESENTATION};
use crate::client::{decode, ApiClient, RequestOptions};
use crate::error::Result;

const USERS: &str = "/users";

impl ApiClient {
  /// A single profile. Missing users surface as [`ApiError::NotFound`](crate::error::ApiError::NotFound).
  pub async fn fetch_profile(&self, user_id: &str) -> Result<Profile> {
    let options = RequestOptions::new()
      .param("select", "*")
      .param("id", eq(user_id))
      .header("Accept", "application/vnd.pgrst.object+json");

    decode(self.request(Method::GET, USERS, &options).await?)
  }

  pub async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<Profile> {
    let options = RequestOptions::new()
      .param("id", eq(user_id))
      .json_from(update)?
      .header(PREFER, RETURN_REPRESENTATION);

    let body = self.request(Method::PATCH, USERS, &options).await?;
    self.invalidate_cache(USERS);
    first_row(body, "update profile")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::client::testing::harness;
  use crate::error::ApiError;
  use serde_json::json;
  use wiremock::matchers::{body_json, header, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  #[tokio::test]
  async fn fetch_single_object() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/rest/v1/users"))
      .and(query_param("id", "eq.u1"))
      .and(header("accept", "application/vnd.pgrst.object+json"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "id": "u1",
        "nombre": "Ana",
        "ubicacion": "Lima"
      })))
      .mount(&server)
      .await;

    let h = harness(&server);
    let profile = h.client.fetch_profile("u1").await.unwrap();
    assert_eq!(profile.name.as_deref(), Some("Ana"));
    assert_eq!(profile.location.as_deref(), Some("Lima"));
    assert_eq!(profile.bio, None);
  }

  #[tokio::test]
  async fn missing_profile_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .respond_with(ResponseTemplate::new(406).set_body_json(json!({
        "code": "PGRST116",
        "message": "JSON object requested, multiple (or no) rows returned"
      })))
      .mount(&server)
      .await;

    let h = harness(&server);
    let err = h.client.fetch_profile("nobody").await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
  }

  #[tokio::test]
  async fn update_sends_only_set_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .and(path("/rest/v1/users"))
      .and(query_param("id", "eq.u1"))
      .and(body_json(json!({ "bio": "Ahorro e inversión" })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
        "id": "u1",
        "bio": "Ahorro e inversión"
      }])))
      .expect(1)
      .mount(&server)
      .await;

    let h = harness(&server);
    let update = ProfileUpdate {
      bio: Some("Ahorro e inversión".to_string()),
      ..Default::default()
    };
    let profile = h.client.update_profile("u1", &update).await.unwrap();
    assert_eq!(profile.bio.as_deref(), Some("Ahorro e inversión"));
  }
}
