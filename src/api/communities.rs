use reqwest::Method;
use serde_json::json;

use super::{Community, WriteOutcome};
use crate::cache::CacheResult;
use crate::client::{decode, ApiClient, RequestOptions};
use crate::error::Result;

const COMMUNITIES: &str = "/communities";
const MEMBERSHIPS: &str = "/user_communities";

impl ApiClient {
  /// All communities, alphabetical.
  pub async fn list_communities(&self) -> Result<CacheResult<Vec<Community>>> {
    let options = RequestOptions::new()
      .param("select", "*")
      .param("order", "nombre.asc");

    self
      .request_with_cache(Method::GET, COMMUNITIES, &options)
      .await?
      .try_map(decode)
  }

  /// Join a community as the signed-in user. Joining twice is not an error.
  pub async fn join_community(&self, community_id: &str) -> Result<WriteOutcome> {
    let user_id = self.require_user()?;
    let outcome = self
      .insert_idempotent(
        MEMBERSHIPS,
        json!({ "community_id": community_id, "user_id": user_id }),
      )
      .await?;

    if outcome == WriteOutcome::Created {
      self.invalidate_cache(COMMUNITIES);
    }
    Ok(outcome)
  }
}
