//! User account rows.
//!
//! The five security fields (`password_hash`, `recovery_key_hash`,
//! `encrypted_user_key`, `kdf_salt` plus the username) are written in a
//! single INSERT at creation. Only `password_hash` and `last_login_at`
//! ever change afterwards; usernames are immutable.

use crate::error::{StorageError, StorageResult};
use chrono::Utc;
use duckdb::{params, Connection};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A persisted user account.
#[derive(Clone, Debug, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub recovery_key_hash: String,
    pub encrypted_user_key: String,
    pub kdf_salt: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

/// Fields required to create a user. All hashes/ciphertext are produced
/// by the caller; this layer never sees plaintext secrets.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub recovery_key_hash: String,
    pub encrypted_user_key: String,
    pub kdf_salt: String,
}

/// User table access over a shared DuckDB connection.
#[derive(Clone)]
pub struct UserStore {
    conn: Arc<Mutex<Connection>>,
}

impl UserStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Inserts a new user atomically. A duplicate username, including the
    /// loser of a concurrent registration race, surfaces as
    /// [`StorageError::Duplicate`] from the unique constraint.
    pub fn create_user(&self, new: &NewUser) -> StorageResult<UserRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();

        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        conn.execute(
            "INSERT INTO users
                 (id, username, password_hash, recovery_key_hash,
                  encrypted_user_key, kdf_salt, created_at, last_login_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL)",
            params![
                id,
                new.username,
                new.password_hash,
                new.recovery_key_hash,
                new.encrypted_user_key,
                new.kdf_salt,
                now
            ],
        )
        .map_err(|e| map_constraint(e, &new.username))?;

        debug!(user_id = %id, "created user");
        Ok(UserRecord {
            id,
            username: new.username.clone(),
            password_hash: new.password_hash.clone(),
            recovery_key_hash: new.recovery_key_hash.clone(),
            encrypted_user_key: new.encrypted_user_key.clone(),
            kdf_salt: new.kdf_salt.clone(),
            created_at: now,
            last_login_at: None,
        })
    }

    pub fn get_user(&self, id: &str) -> StorageResult<Option<UserRecord>> {
        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        optional_row(conn.query_row(
            &format!("{SELECT_USER} WHERE id = ?"),
            params![id],
            row_to_user,
        ))
    }

    /// Case-sensitive exact lookup; usernames are never normalized.
    pub fn get_user_by_username(&self, username: &str) -> StorageResult<Option<UserRecord>> {
        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        optional_row(conn.query_row(
            &format!("{SELECT_USER} WHERE username = ?"),
            params![username],
            row_to_user,
        ))
    }

    /// Replaces the stored password hash. The envelope fields are
    /// deliberately not touchable through this store.
    pub fn update_password_hash(&self, id: &str, password_hash: &str) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        let affected = conn.execute(
            "UPDATE users SET password_hash = ? WHERE id = ?",
            params![password_hash, id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    pub fn touch_last_login(&self, id: &str) -> StorageResult<()> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        let affected = conn.execute(
            "UPDATE users SET last_login_at = ? WHERE id = ?",
            params![now, id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    /// Deletes a user and cascades to its credential rows in a single
    /// transaction, so a crash can never leave orphaned credential rows
    /// or a half-deleted account.
    pub fn delete_user(&self, id: &str) -> StorageResult<()> {
        let mut conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM user_app_credentials WHERE user_id = ?",
            params![id],
        )?;
        let affected = tx.execute("DELETE FROM users WHERE id = ?", params![id])?;
        if affected == 0 {
            // Dropping the transaction rolls it back
            return Err(StorageError::NotFound(format!("user {id}")));
        }
        tx.commit()?;
        debug!(user_id = %id, "deleted user and credentials");
        Ok(())
    }
}

const SELECT_USER: &str = "SELECT id, username, password_hash, recovery_key_hash,
        encrypted_user_key, kdf_salt, created_at, last_login_at FROM users";

fn row_to_user(row: &duckdb::Row<'_>) -> duckdb::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        recovery_key_hash: row.get(3)?,
        encrypted_user_key: row.get(4)?,
        kdf_salt: row.get(5)?,
        created_at: row.get(6)?,
        last_login_at: row.get(7)?,
    })
}

pub(crate) fn optional_row<T>(result: duckdb::Result<T>) -> StorageResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn map_constraint(e: duckdb::Error, username: &str) -> StorageError {
    let msg = e.to_string();
    if msg.contains("Constraint") || msg.contains("Duplicate") || msg.contains("UNIQUE") {
        StorageError::Duplicate(format!("username {username:?}"))
    } else {
        StorageError::Database(e)
    }
}
