//! Credential persistence: a plain get/set/remove key-value interface.
//!
//! Writes to different keys are independent. A crash between storing the
//! access token and the refresh token can leave them mismatched.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{ApiError, Result};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

/// Every key written by the session layer; all are removed on sign-out.
pub const ALL_KEYS: &[&str] = &[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY];

/// Trait for credential storage backends.
pub trait CredentialStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>>;

  fn set(&self, key: &str, value: &str) -> Result<()>;

  fn remove(&self, key: &str) -> Result<()>;

  /// Remove every key the session layer knows about.
  fn clear(&self) -> Result<()> {
    for key in ALL_KEYS {
      self.remove(key)?;
    }
    Ok(())
  }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-local store. Credentials are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CredentialStore for MemoryCredentialStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(lock(&self.values).get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    lock(&self.values).insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    lock(&self.values).remove(key);
    Ok(())
  }
}

/// SQLite-backed store used by the CLI so sessions survive restarts.
pub struct SqliteCredentialStore {
  conn: Mutex<Connection>,
}

const CREDENTIAL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteCredentialStore {
  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        ApiError::Credentials(format!("Failed to create credentials directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      ApiError::Credentials(format!(
        "Failed to open credentials database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// In-memory database, mostly for tests.
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(CREDENTIAL_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }
}

impl CredentialStore for SqliteCredentialStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = lock(&self.conn);
    let value = conn
      .query_row(
        "SELECT value FROM credentials WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = lock(&self.conn);
    conn.execute(
      "INSERT OR REPLACE INTO credentials (key, value, updated_at)
       VALUES (?, ?, datetime('now'))",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = lock(&self.conn);
    conn.execute("DELETE FROM credentials WHERE key = ?", params![key])?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(store: &dyn CredentialStore) {
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);

    store.set(ACCESS_TOKEN_KEY, "a1").unwrap();
    store.set(REFRESH_TOKEN_KEY, "r1").unwrap();
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a1"));

    store.set(ACCESS_TOKEN_KEY, "a2").unwrap();
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a2"));

    store.remove(ACCESS_TOKEN_KEY).unwrap();
    assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
  }

  #[test]
  fn memory_store() {
    exercise(&MemoryCredentialStore::new());
  }

  #[test]
  fn sqlite_store() {
    exercise(&SqliteCredentialStore::open_in_memory().unwrap());
  }

  #[test]
  fn clear_removes_all_keys() {
    let store = MemoryCredentialStore::new();
    for key in ALL_KEYS {
      store.set(key, "v").unwrap();
    }
    store.clear().unwrap();
    for key in ALL_KEYS {
      assert_eq!(store.get(key).unwrap(), None);
    }
  }

  #[test]
  fn sqlite_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("credentials.db");

    {
      let store = SqliteCredentialStore::open(&path).unwrap();
      store.set(REFRESH_TOKEN_KEY, "keep-me").unwrap();
    }

    let store = SqliteCredentialStore::open(&path).unwrap();
    assert_eq!(
      store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
      Some("keep-me")
    );
  }
}
