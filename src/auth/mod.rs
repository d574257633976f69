//! Credentials and session management.
//!
//! - `token`: reads claims out of access tokens and decides freshness
//! - `store`: where tokens live between runs
//! - `session`: sign-in/up/out and the single-flight refresh

pub mod session;
pub mod store;
pub mod token;

pub use session::{AuthUser, Session, SignUpOutcome, TokenManager, TokenManagerSettings};
pub use store::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
pub use token::{decode_claims, is_token_expired, Claims};
