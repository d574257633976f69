//! Access-token claim inspection.
//!
//! The client never holds the signing secret, so claims are read without
//! signature verification. The backend remains the authority on validity.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Claims the pipeline cares about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
  /// Subject -- the authenticated user's id.
  pub sub: String,
  /// Expiration time (UTC unix seconds).
  pub exp: i64,
}

/// Decode the claims of `token` without checking its signature.
pub fn decode_claims(token: &str) -> Option<Claims> {
  let mut validation = Validation::default();
  validation.insecure_disable_signature_validation();
  validation.validate_exp = false;
  validation.validate_aud = false;
  validation.required_spec_claims.clear();

  decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
    .map(|data| data.claims)
    .ok()
}

/// A token is usable only while `now + margin < exp`.
///
/// Tokens whose claims cannot be read are treated as expired.
pub fn is_token_expired(token: &str, now_secs: i64, margin_secs: i64) -> bool {
  match decode_claims(token) {
    Some(claims) => claims.exp <= now_secs + margin_secs,
    None => true,
  }
}
