use reqwest::Method;
use serde::Deserialize;

use super::UploadedObject;
use crate::client::{decode, ApiClient, RequestOptions};
use crate::error::Result;

#[derive(Debug, Deserialize)]
struct UploadResponse {
  #[serde(rename = "Key")]
  key: String,
}

impl ApiClient {
  /// Upload bytes to `bucket/object_path`. With `upsert` an existing object is replaced.
  pub async fn upload(
    &self,
    bucket: &str,
    object_path: &str,
    bytes: Vec<u8>,
    content_type: &str,
    upsert: bool,
  ) -> Result<UploadedObject> {
    let object_path = object_path.trim_start_matches('/');
    let options = RequestOptions::new()
      .binary(bytes, content_type)
      .header("x-upsert", upsert.to_string());

    let body = self
      .storage_request(
        Method::POST,
        &format!("/object/{}/{}", bucket, object_path),
        &options,
      )
      .await?;
    let response: UploadResponse = decode(body)?;

    Ok(UploadedObject {
      key: response.key,
      public_url: format!(
        "{}/object/public/{}/{}",
        self.inner.storage_url, bucket, object_path
      ),
    })
  }
}
