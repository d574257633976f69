//! Row types for the backend tables.
//!
//! Column names on the wire are Spanish in places; fields here are English
//! and mapped with `#[serde(rename)]`.

use serde::{Deserialize, Serialize};

/// Author info embedded in a post via the `users` foreign key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostAuthor {
  pub id: String,
  #[serde(rename = "nombre", default)]
  pub name: Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(rename = "foto_perfil", default)]
  pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Post {
  pub id: String,
  pub user_id: String,
  #[serde(default)]
  pub community_id: Option<String>,
  #[serde(rename = "contenido", default)]
  pub content: String,
  #[serde(default)]
  pub media_url: Option<String>,
  #[serde(default)]
  pub likes_count: i64,
  #[serde(default)]
  pub comment_count: i64,
  pub created_at: String,
  #[serde(rename = "users", default)]
  pub author: Option<PostAuthor>,
}

/// Payload for creating a post.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
  pub user_id: String,
  #[serde(rename = "contenido")]
  pub content: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub community_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub media_url: Option<String>,
}

/// Feed paging and filtering.
#[derive(Debug, Clone)]
pub struct FeedQuery {
  pub limit: u32,
  pub offset: u32,
  pub community_id: Option<String>,
}

impl Default for FeedQuery {
  fn default() -> Self {
    Self {
      limit: 20,
      offset: 0,
      community_id: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Community {
  pub id: String,
  #[serde(rename = "nombre")]
  pub name: String,
  #[serde(rename = "descripcion", default)]
  pub description: Option<String>,
  #[serde(rename = "icono_url", default)]
  pub icon_url: Option<String>,
  #[serde(default)]
  pub member_count: i64,
  #[serde(default)]
  pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Profile {
  pub id: String,
  #[serde(rename = "nombre", default)]
  pub name: Option<String>,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub bio: Option<String>,
  #[serde(rename = "foto_perfil", default)]
  pub avatar_url: Option<String>,
  #[serde(rename = "ubicacion", default)]
  pub location: Option<String>,
}

/// Partial profile update; unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
  #[serde(rename = "nombre", skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bio: Option<String>,
  #[serde(rename = "foto_perfil", skip_serializing_if = "Option::is_none")]
  pub avatar_url: Option<String>,
  #[serde(rename = "ubicacion", skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
}

/// Outcome of an insert where a duplicate row counts as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
  Created,
  AlreadyExisted,
}

/// Object written to Storage.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedObject {
  /// `bucket/path` as reported by the server.
  pub key: String,
  pub public_url: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn post_maps_spanish_columns() {
    let post: Post = serde_json::from_value(json!({
      "id": "p1",
      "user_id": "u1",
      "contenido": "Hola",
      "likes_count": 3,
      "created_at": "2024-05-01T10:00:00Z",
      "users": { "id": "u1", "nombre": "Ana", "foto_perfil": "https://x/a.png" }
    }))
    .unwrap();

    assert_eq!(post.content, "Hola");
    assert_eq!(post.likes_count, 3);
    assert_eq!(post.comment_count, 0);
    let author = post.author.unwrap();
    assert_eq!(author.name.as_deref(), Some("Ana"));
    assert_eq!(author.avatar_url.as_deref(), Some("https://x/a.png"));
  }

  #[test]
  fn profile_update_skips_unset_fields() {
    let update = ProfileUpdate {
      bio: Some("inversora".to_string()),
      location: Some("Lima".to_string()),
      ..Default::default()
    };
    assert_eq!(
      serde_json::to_value(&update).unwrap(),
      json!({ "bio": "inversora", "ubicacion": "Lima" })
    );
  }
}
