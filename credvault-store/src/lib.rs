//! DuckDB storage layer for CredVault.
//!
//! Persists user accounts and their per-app credential rows. The store
//! holds only hashed or envelope-encrypted material: plaintext passwords,
//! recovery keys, and credential secrets never reach this layer.
//!
//! # Architecture
//!
//! - One DuckDB database, two tables (`users`, `user_app_credentials`)
//! - [`UserStore`] and [`CredentialStore`] share a single connection
//! - Username uniqueness is a data-layer constraint, so concurrent
//!   registrations resolve to exactly one winner
//! - Deleting a user cascades to its credential rows

mod credential_store;
mod error;
mod user_store;

pub use credential_store::{CredentialRecord, CredentialStore, NewCredential};
pub use error::{StorageError, StorageResult};
pub use user_store::{NewUser, UserRecord, UserStore};

use duckdb::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Opens the store at `path`, creating the schema if missing.
///
/// If the initial open fails and a stale `.wal` file exists alongside the
/// database (unclean shutdown), it is removed and the open retried once.
/// Memory and thread caps keep DuckDB from defaulting to ~80% of system
/// RAM per connection.
pub fn open(path: &Path) -> StorageResult<(UserStore, CredentialStore)> {
    let conn = match Connection::open(path) {
        Ok(c) => c,
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() && std::fs::remove_file(&wal_path).is_ok() {
                warn!("database open failed, removed stale WAL and retrying");
                Connection::open(path)?
            } else {
                return Err(first_err.into());
            }
        }
    };
    conn.execute_batch("PRAGMA memory_limit='64MB'; PRAGMA threads=1;")?;
    initialize_schema(&conn)?;
    Ok(stores_from(conn))
}

/// Opens an in-memory store (for testing).
pub fn open_in_memory() -> StorageResult<(UserStore, CredentialStore)> {
    let conn = Connection::open_in_memory()?;
    initialize_schema(&conn)?;
    Ok(stores_from(conn))
}

fn stores_from(conn: Connection) -> (UserStore, CredentialStore) {
    let conn = Arc::new(Mutex::new(conn));
    (UserStore::new(conn.clone()), CredentialStore::new(conn))
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id VARCHAR PRIMARY KEY,
            username VARCHAR NOT NULL UNIQUE,
            password_hash VARCHAR NOT NULL,
            recovery_key_hash VARCHAR NOT NULL,
            encrypted_user_key VARCHAR NOT NULL,
            kdf_salt VARCHAR NOT NULL,
            created_at BIGINT NOT NULL,
            last_login_at BIGINT
        );
        CREATE TABLE IF NOT EXISTS user_app_credentials (
            id VARCHAR PRIMARY KEY,
            user_id VARCHAR NOT NULL,
            app_id BIGINT NOT NULL,
            app_username VARCHAR NOT NULL,
            app_password VARCHAR NOT NULL,
            app_recovery_key VARCHAR,
            notes VARCHAR,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        );",
    )?;
    Ok(())
}
