//! Typed endpoints on top of [`ApiClient::request`].
//!
//! Each function builds the PostgREST query for one screen-level operation
//! and decodes rows into the types in [`types`].

mod communities;
mod posts;
mod profiles;
mod storage;
pub mod types;

pub use types::{
  Community, FeedQuery, NewPost, Post, PostAuthor, Profile, ProfileUpdate, UploadedObject,
  WriteOutcome,
};

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::client::{decode, ApiClient, RequestOptions};
use crate::error::{ApiError, Result};

const PREFER: &str = "Prefer";
const RETURN_REPRESENTATION: &str = "return=representation";

/// PostgREST equality filter value.
fn eq(value: &str) -> String {
  format!("eq.{}", value)
}

/// First row of an array response.
fn first_row<T: DeserializeOwned>(value: Option<Value>, what: &str) -> Result<T> {
  let mut rows: Vec<T> = decode(value)?;
  if rows.is_empty() {
    return Err(ApiError::Decode(format!("{} returned no rows", what)));
  }
  Ok(rows.swap_remove(0))
}

impl ApiClient {
  /// Insert a row, treating a unique-key conflict as success.
  async fn insert_idempotent(&self, path: &str, row: Value) -> Result<WriteOutcome> {
    let options = RequestOptions::new()
      .json(row)
      .header(PREFER, "return=minimal");

    match self.request(Method::POST, path, &options).await {
      Ok(_) => Ok(WriteOutcome::Created),
      Err(ApiError::Conflict(e)) => {
        debug!(path, code = %e.code, "Row already exists");
        Ok(WriteOutcome::AlreadyExisted)
      }
      Err(e) => Err(e),
    }
  }

  /// The signed-in user's id, or an auth error.
  fn require_user(&self) -> Result<String> {
    self
      .auth()
      .current_user_id()?
      .ok_or_else(|| ApiError::Auth("not signed in".to_string()))
  }
}
