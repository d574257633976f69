use reqwest::Method;
use serde_json::json;
use tracing::info;

use super::{eq, first_row, FeedQuery, NewPost, Post, WriteOutcome, PREFER, RETURN_REPRESENTATION};
use crate::cache::CacheResult;
use crate::client::{decode, ApiClient, RequestOptions};
use crate::error::Result;

const POSTS: &str = "/posts";
const POST_LIKES: &str = "/post_likes";
const POST_SELECT: &str = "*,users(id,nombre,username,foto_perfil)";

impl ApiClient {
  /// Newest posts first. Served from cache while fresh, and from a stale
  /// copy when the backend is unreachable.
  pub async fn feed(&self, query: &FeedQuery) -> Result<CacheResult<Vec<Post>>> {
    let options = RequestOptions::new()
      .param("select", POST_SELECT)
      .param("order", "created_at.desc")
      .param("limit", query.limit)
      .param("offset", query.offset)
      .param_opt("community_id", query.community_id.as_deref().map(eq));

    self
      .request_with_cache(Method::GET, POSTS, &options)
      .await?
      .try_map(decode)
  }

  pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
    let options = RequestOptions::new()
      .param("select", POST_SELECT)
      .json_from(post)?
      .header(PREFER, RETURN_REPRESENTATION);

    let body = self.request(Method::POST, POSTS, &options).await?;
    let created: Post = first_row(body, "create post")?;

    self.invalidate_cache(POSTS);
    info!(post_id = %created.id, "Post created");
    Ok(created)
  }

  /// Like a post as the signed-in user. Liking twice is not an error.
  pub async fn like_post(&self, post_id: &str) -> Result<WriteOutcome> {
    let user_id = self.require_user()?;
    let outcome = self
      .insert_idempotent(POST_LIKES, json!({ "post_id": post_id, "user_id": user_id }))
      .await?;

    if outcome == WriteOutcome::Created {
      self.invalidate_cache(POSTS);
    }
    Ok(outcome)
  }

  pub async fn unlike_post(&self, post_id: &str) -> Result<()> {
    let user_id = self.require_user()?;
    let options = RequestOptions::new()
      .param("post_id", eq(post_id))
      .param("user_id", eq(&user_id));

    self.request(Method::DELETE, POST_LIKES, &options).await?;
    self.invalidate_cache(POSTS);
    Ok(())
  }
}
