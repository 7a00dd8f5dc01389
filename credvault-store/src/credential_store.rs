//! Per-app credential rows.
//!
//! The sensitive columns (`app_password`, `app_recovery_key`, `notes`)
//! hold ciphertext records produced under the owning user's master key;
//! this layer stores them opaquely. Every read and write is scoped by
//! `user_id`; no operation can touch another user's rows.

use crate::error::{StorageError, StorageResult};
use crate::user_store::optional_row;
use chrono::Utc;
use duckdb::{params, Connection};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A persisted third-party app credential.
#[derive(Clone, Debug, Serialize)]
pub struct CredentialRecord {
    pub id: String,
    pub user_id: String,
    pub app_id: i64,
    /// Plaintext app-side identifier; not a secret.
    pub app_username: String,
    /// Ciphertext record (`nonce.ciphertext.tag`).
    pub app_password: String,
    pub app_recovery_key: Option<String>,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields for creating or replacing a credential. Sensitive fields must
/// already be ciphertext records.
#[derive(Clone, Debug)]
pub struct NewCredential {
    pub app_id: i64,
    pub app_username: String,
    pub app_password: String,
    pub app_recovery_key: Option<String>,
    pub notes: Option<String>,
}

/// Credential table access over a shared DuckDB connection.
#[derive(Clone)]
pub struct CredentialStore {
    conn: Arc<Mutex<Connection>>,
}

impl CredentialStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Creates or replaces the credential for `(user_id, app_id)`.
    ///
    /// The table itself does not enforce the pair's uniqueness; the
    /// overwrite-on-existing check lives here, last writer wins.
    pub fn upsert_credential(
        &self,
        user_id: &str,
        new: &NewCredential,
    ) -> StorageResult<CredentialRecord> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;

        let existing: Option<(String, i64)> = optional_row(conn.query_row(
            "SELECT id, created_at FROM user_app_credentials WHERE user_id = ? AND app_id = ?",
            params![user_id, new.app_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ))?;

        let (id, created_at) = match existing {
            Some((id, created_at)) => {
                conn.execute(
                    "UPDATE user_app_credentials
                         SET app_username = ?, app_password = ?, app_recovery_key = ?,
                             notes = ?, updated_at = ?
                     WHERE id = ?",
                    params![
                        new.app_username,
                        new.app_password,
                        new.app_recovery_key,
                        new.notes,
                        now,
                        id
                    ],
                )?;
                debug!(user_id = %user_id, app_id = new.app_id, "replaced credential");
                (id, created_at)
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO user_app_credentials
                         (id, user_id, app_id, app_username, app_password,
                          app_recovery_key, notes, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        id,
                        user_id,
                        new.app_id,
                        new.app_username,
                        new.app_password,
                        new.app_recovery_key,
                        new.notes,
                        now,
                        now
                    ],
                )?;
                debug!(user_id = %user_id, app_id = new.app_id, "created credential");
                (id, now)
            }
        };

        Ok(CredentialRecord {
            id,
            user_id: user_id.to_string(),
            app_id: new.app_id,
            app_username: new.app_username.clone(),
            app_password: new.app_password.clone(),
            app_recovery_key: new.app_recovery_key.clone(),
            notes: new.notes.clone(),
            created_at,
            updated_at: now,
        })
    }

    pub fn get_credential(
        &self,
        user_id: &str,
        app_id: i64,
    ) -> StorageResult<Option<CredentialRecord>> {
        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        optional_row(conn.query_row(
            &format!("{SELECT_CREDENTIAL} WHERE user_id = ? AND app_id = ?"),
            params![user_id, app_id],
            row_to_credential,
        ))
    }

    pub fn list_credentials(&self, user_id: &str) -> StorageResult<Vec<CredentialRecord>> {
        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_CREDENTIAL} WHERE user_id = ? ORDER BY updated_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![user_id], row_to_credential)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_credential(&self, user_id: &str, app_id: i64) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(|e| StorageError::Internal(e.to_string()))?;
        let affected = conn.execute(
            "DELETE FROM user_app_credentials WHERE user_id = ? AND app_id = ?",
            params![user_id, app_id],
        )?;
        if affected == 0 {
            return Err(StorageError::NotFound(format!(
                "credential for app {app_id}"
            )));
        }
        Ok(())
    }
}

const SELECT_CREDENTIAL: &str = "SELECT id, user_id, app_id, app_username, app_password,
        app_recovery_key, notes, created_at, updated_at FROM user_app_credentials";

fn row_to_credential(row: &duckdb::Row<'_>) -> duckdb::Result<CredentialRecord> {
    Ok(CredentialRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        app_id: row.get(2)?,
        app_username: row.get(3)?,
        app_password: row.get(4)?,
        app_recovery_key: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
