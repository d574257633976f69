//! In-memory response cache with offline fallback.
//!
//! - Only successful GET responses are stored
//! - An entry is fresh while its age is below its ttl
//! - When the network fails, any cached entry is served regardless of age

mod key;
mod layer;
mod result;

pub use key::CacheKey;
pub use layer::ResponseCache;
pub use result::{CacheResult, CacheSource};
