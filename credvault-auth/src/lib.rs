//! Registration and authentication flow controller for CredVault.
//!
//! Orchestrates the crypto core and the store across register, login,
//! vault unlock, and credential operations, against an injected
//! [`SessionHandle`] capability.
//!
//! Security model in brief:
//!
//! - The password gates login only; it never participates in key
//!   derivation for stored credentials.
//! - The recovery key is issued once at registration and returned in the
//!   clear exactly once. The server keeps its verification hash and the
//!   wrapped master key, nothing else.
//! - Credential fields are encrypted server-side under the user's master
//!   key before persisting; the key is only in memory for the specific
//!   session that unlocked the vault with the recovery key (registration
//!   counts, the key was just issued there), and plaintext is never
//!   written to the store. A password-only login never yields the key.
//! - Server-mediated password reset stays disabled; the supported recovery
//!   path proves possession of the recovery key first and leaves the key
//!   envelope untouched.

mod config;
mod error;
mod session;

pub use config::AuthConfig;
pub use error::{AuthError, AuthResult};
pub use session::{MemorySession, SessionHandle};

use credvault_crypto::{
    decrypt_field, encrypt_field, generate_recovery_key, hash_password, hash_recovery_key,
    unwrap_user_key, verify_password, verify_recovery_key, wrap_user_key, CryptoError, FieldClass,
    UserKey,
};
use credvault_store::{
    CredentialRecord, CredentialStore, NewCredential, StorageError, UserRecord, UserStore,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

/// A user as exposed to callers: no hashes, no key material.
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub created_at: i64,
    pub last_login_at: Option<i64>,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            created_at: user.created_at,
            last_login_at: user.last_login_at,
        }
    }
}

/// Successful registration: the only moment the recovery key exists in a
/// response. It cannot be retrieved through any later operation.
#[derive(Clone, Debug, Serialize)]
pub struct Registration {
    pub user: UserProfile,
    pub recovery_key: String,
}

/// Plaintext credential fields supplied by the owner for storage.
#[derive(Clone, Debug)]
pub struct NewAppCredential {
    pub app_id: i64,
    pub app_username: String,
    pub app_password: String,
    pub app_recovery_key: Option<String>,
    pub notes: Option<String>,
}

/// A credential with its sensitive fields decrypted for an unlocked session.
#[derive(Clone, Debug, Serialize)]
pub struct RevealedCredential {
    pub app_id: i64,
    pub app_username: String,
    pub app_password: String,
    pub app_recovery_key: Option<String>,
    pub notes: Option<String>,
}

/// A master key held for one session incarnation. The user id is
/// recorded so a key can never serve a session authenticated as someone
/// else, even if session ids were ever reused.
struct UnlockedKey {
    user_id: String,
    key: UserKey,
}

/// The flow controller.
pub struct AuthService {
    users: UserStore,
    credentials: CredentialStore,
    config: AuthConfig,
    /// Unlocked master keys, keyed by session id (never by user): an
    /// unlock belongs to the session that proved possession of the
    /// recovery key, and a password-only login on another session must
    /// not inherit it. Cleared on lock, logout, and account deletion;
    /// the on-disk counterpart is always the wrapped form.
    unlocked: RwLock<HashMap<String, UnlockedKey>>,
}

impl AuthService {
    pub fn new(users: UserStore, credentials: CredentialStore) -> Self {
        Self::with_config(users, credentials, AuthConfig::default())
    }

    pub fn with_config(users: UserStore, credentials: CredentialStore, config: AuthConfig) -> Self {
        Self {
            users,
            credentials,
            config,
            unlocked: RwLock::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Account lifecycle
    // ------------------------------------------------------------------

    /// Registers a new account.
    ///
    /// Generates the recovery key, hashes both secrets, wraps a fresh
    /// master key, and persists the user atomically. The session is only
    /// established after persistence succeeds, so a failed registration
    /// never leaves a partial user authenticated. The returned recovery
    /// key is shown to the caller exactly once.
    pub fn register(
        &self,
        session: &dyn SessionHandle,
        username: &str,
        password: &str,
    ) -> AuthResult<Registration> {
        if username.trim().is_empty() {
            return Err(AuthError::Invalid("username is required".into()));
        }
        if password.len() < self.config.min_password_len {
            return Err(AuthError::WeakPassword(self.config.min_password_len));
        }
        if self.users.get_user_by_username(username)?.is_some() {
            return Err(AuthError::Conflict);
        }

        let recovery_key = generate_recovery_key().map_err(|e| internal("recovery key", e))?;
        let password_hash =
            hash_password(password, &self.config.kdf).map_err(|e| internal("password hash", e))?;
        let recovery_key_hash = hash_recovery_key(&recovery_key, &self.config.kdf)
            .map_err(|e| internal("recovery key hash", e))?;
        let (user_key, wrapped) = wrap_user_key(&recovery_key, &self.config.kdf)
            .map_err(|e| internal("key envelope", e))?;

        let user = self
            .users
            .create_user(&credvault_store::NewUser {
                username: username.to_string(),
                password_hash,
                recovery_key_hash,
                encrypted_user_key: wrapped.encrypted_user_key,
                kdf_salt: wrapped.kdf_salt,
            })
            .map_err(|e| match e {
                // Lost a concurrent-registration race at the data layer
                StorageError::Duplicate(_) => AuthError::Conflict,
                other => AuthError::Storage(other),
            })?;

        // Any unlock left on this session by a previous principal dies
        // before the new identity is established.
        self.unlocked.write().unwrap().remove(&session.id());
        session.establish(&user.id);
        session.regenerate();

        // The registering session already proved possession of the
        // recovery key (it was just issued), so its vault starts unlocked.
        self.unlocked.write().unwrap().insert(
            session.id(),
            UnlockedKey {
                user_id: user.id.clone(),
                key: user_key,
            },
        );

        debug!(user_id = %user.id, "registered user");
        Ok(Registration {
            user: UserProfile::from(&user),
            recovery_key,
        })
    }

    /// Authenticates a user by password.
    ///
    /// An unknown username and a wrong password both return
    /// [`AuthError::InvalidCredentials`], so the responses are
    /// indistinguishable by design. The vault remains locked until
    /// [`unlock_vault`](Self::unlock_vault).
    pub fn login(
        &self,
        session: &dyn SessionHandle,
        username: &str,
        password: &str,
    ) -> AuthResult<UserProfile> {
        let user = self
            .users
            .get_user_by_username(username)?
            .ok_or(AuthError::InvalidCredentials)?;

        let ok = verify_password(password, &user.password_hash, &self.config.kdf)
            .map_err(|e| internal("stored password hash", e))?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        self.users.touch_last_login(&user.id)?;
        let user = self
            .users
            .get_user(&user.id)?
            .ok_or_else(|| AuthError::NotFound(format!("user {}", user.id)))?;

        // A password proves nothing about the recovery key: drop any
        // unlock a previous principal left on this session.
        self.unlocked.write().unwrap().remove(&session.id());
        session.establish(&user.id);
        // Fresh session id on every successful login (fixation mitigation)
        session.regenerate();

        debug!(user_id = %user.id, "login succeeded");
        Ok(UserProfile::from(&user))
    }

    /// Ends the session and discards any unlocked master key. Idempotent.
    pub fn logout(&self, session: &dyn SessionHandle) {
        self.unlocked.write().unwrap().remove(&session.id());
        session.destroy();
    }

    /// The profile of the session's user, if authenticated.
    pub fn current_user(&self, session: &dyn SessionHandle) -> AuthResult<Option<UserProfile>> {
        let Some(user_id) = session.current_user() else {
            return Ok(None);
        };
        Ok(self.users.get_user(&user_id)?.map(|u| UserProfile::from(&u)))
    }

    /// Server-mediated password reset. Always refuses: the server cannot
    /// re-wrap the master key without the recovery key, and weakening the
    /// envelope to allow it would defeat the design.
    pub fn reset_password(&self) -> AuthResult<()> {
        Err(AuthError::ResetNotSupported)
    }

    /// Sets a new password after proving possession of the recovery key.
    ///
    /// Requires both the verification hash to match *and* the master-key
    /// unwrap to succeed, then replaces only the password hash. The
    /// envelope (`encrypted_user_key`, `kdf_salt`) is untouched: the
    /// wrapping key does not depend on the password.
    pub fn change_password_with_recovery(
        &self,
        username: &str,
        recovery_key: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        if new_password.len() < self.config.min_password_len {
            return Err(AuthError::WeakPassword(self.config.min_password_len));
        }
        let user = self
            .users
            .get_user_by_username(username)?
            .ok_or(AuthError::InvalidCredentials)?;

        let ok = verify_recovery_key(recovery_key, &user.recovery_key_hash, &self.config.kdf)
            .map_err(|e| internal("stored recovery key hash", e))?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        // The hash matched, so the supplied key is the issued one; an
        // unwrap failure now means the stored envelope is damaged.
        self.unwrap_for(&user, recovery_key)?;

        let password_hash = hash_password(new_password, &self.config.kdf)
            .map_err(|e| internal("password hash", e))?;
        self.users.update_password_hash(&user.id, &password_hash)?;

        debug!(user_id = %user.id, "password changed via recovery key");
        Ok(())
    }

    /// Deletes the session's account and all of its credential rows.
    pub fn delete_account(&self, session: &dyn SessionHandle) -> AuthResult<()> {
        let user_id = require_auth(session)?;
        self.unlocked.write().unwrap().remove(&session.id());
        self.users.delete_user(&user_id)?;
        session.destroy();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Vault lock state
    // ------------------------------------------------------------------

    /// Makes the master key available to this user's credential
    /// operations by verifying the recovery key and unwrapping the
    /// envelope.
    pub fn unlock_vault(&self, session: &dyn SessionHandle, recovery_key: &str) -> AuthResult<()> {
        let user_id = require_auth(session)?;
        let user = self
            .users
            .get_user(&user_id)?
            .ok_or_else(|| AuthError::NotFound(format!("user {user_id}")))?;

        let ok = verify_recovery_key(recovery_key, &user.recovery_key_hash, &self.config.kdf)
            .map_err(|e| internal("stored recovery key hash", e))?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        let user_key = self.unwrap_for(&user, recovery_key)?;
        self.unlocked.write().unwrap().insert(
            session.id(),
            UnlockedKey {
                user_id,
                key: user_key,
            },
        );
        Ok(())
    }

    /// Discards this session's in-memory master key. Idempotent.
    pub fn lock_vault(&self, session: &dyn SessionHandle) {
        self.unlocked.write().unwrap().remove(&session.id());
    }

    /// Whether this session currently has its user's master key in memory.
    pub fn is_unlocked(&self, session: &dyn SessionHandle) -> bool {
        session.current_user().is_some_and(|user_id| {
            self.unlocked
                .read()
                .unwrap()
                .get(&session.id())
                .is_some_and(|entry| entry.user_id == user_id)
        })
    }

    // ------------------------------------------------------------------
    // Credential operations
    // ------------------------------------------------------------------

    /// Creates or overwrites the credential for `(user, app)`, encrypting
    /// the sensitive fields under the user's master key before anything
    /// is persisted.
    pub fn save_credential(
        &self,
        session: &dyn SessionHandle,
        new: &NewAppCredential,
    ) -> AuthResult<CredentialRecord> {
        let user_id = require_auth(session)?;
        let key = self.unlocked_key(session, &user_id)?;

        let app_password = encrypt_field(&new.app_password, &key, FieldClass::AppPassword)
            .map_err(|e| internal("credential encryption", e))?;
        let app_recovery_key = new
            .app_recovery_key
            .as_deref()
            .map(|v| encrypt_field(v, &key, FieldClass::AppRecoveryKey))
            .transpose()
            .map_err(|e| internal("credential encryption", e))?;
        let notes = new
            .notes
            .as_deref()
            .map(|v| encrypt_field(v, &key, FieldClass::Notes))
            .transpose()
            .map_err(|e| internal("credential encryption", e))?;

        let record = self.credentials.upsert_credential(
            &user_id,
            &NewCredential {
                app_id: new.app_id,
                app_username: new.app_username.clone(),
                app_password,
                app_recovery_key,
                notes,
            },
        )?;
        Ok(record)
    }

    /// All of the session user's credentials, sensitive fields still as
    /// ciphertext records.
    pub fn list_credentials(&self, session: &dyn SessionHandle) -> AuthResult<Vec<CredentialRecord>> {
        let user_id = require_auth(session)?;
        Ok(self.credentials.list_credentials(&user_id)?)
    }

    /// One credential by app, ciphertext form.
    pub fn get_credential(
        &self,
        session: &dyn SessionHandle,
        app_id: i64,
    ) -> AuthResult<Option<CredentialRecord>> {
        let user_id = require_auth(session)?;
        Ok(self.credentials.get_credential(&user_id, app_id)?)
    }

    /// Decrypts a stored credential for an unlocked session.
    pub fn reveal_credential(
        &self,
        session: &dyn SessionHandle,
        app_id: i64,
    ) -> AuthResult<RevealedCredential> {
        let user_id = require_auth(session)?;
        let key = self.unlocked_key(session, &user_id)?;
        let record = self
            .credentials
            .get_credential(&user_id, app_id)?
            .ok_or_else(|| AuthError::NotFound(format!("credential for app {app_id}")))?;

        let app_password = decrypt_field(&record.app_password, &key, FieldClass::AppPassword)
            .map_err(|e| internal("stored credential record", e))?;
        let app_recovery_key = record
            .app_recovery_key
            .as_deref()
            .map(|v| decrypt_field(v, &key, FieldClass::AppRecoveryKey))
            .transpose()
            .map_err(|e| internal("stored credential record", e))?;
        let notes = record
            .notes
            .as_deref()
            .map(|v| decrypt_field(v, &key, FieldClass::Notes))
            .transpose()
            .map_err(|e| internal("stored credential record", e))?;

        Ok(RevealedCredential {
            app_id: record.app_id,
            app_username: record.app_username,
            app_password,
            app_recovery_key,
            notes,
        })
    }

    pub fn delete_credential(&self, session: &dyn SessionHandle, app_id: i64) -> AuthResult<()> {
        let user_id = require_auth(session)?;
        self.credentials
            .delete_credential(&user_id, app_id)
            .map_err(|e| match e {
                StorageError::NotFound(what) => AuthError::NotFound(what),
                other => AuthError::Storage(other),
            })
    }

    // ------------------------------------------------------------------

    /// The master key this session unlocked, only if it belongs to the
    /// session's current user.
    fn unlocked_key(&self, session: &dyn SessionHandle, user_id: &str) -> AuthResult<UserKey> {
        self.unlocked
            .read()
            .unwrap()
            .get(&session.id())
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.key.clone())
            .ok_or(AuthError::VaultLocked)
    }

    /// Unwraps the stored envelope for a user whose recovery key already
    /// passed hash verification. Failure here is an integrity fault in
    /// self-produced ciphertext, not a wrong secret.
    fn unwrap_for(&self, user: &UserRecord, recovery_key: &str) -> AuthResult<UserKey> {
        unwrap_user_key(
            &user.encrypted_user_key,
            recovery_key,
            &user.kdf_salt,
            &self.config.kdf,
        )
        .map_err(|e| internal("stored key envelope", e))
    }
}

fn require_auth(session: &dyn SessionHandle) -> AuthResult<String> {
    session.current_user().ok_or(AuthError::NotAuthenticated)
}

/// Maps a crypto failure on internally produced material to an integrity
/// fault. The detail goes to the log; the caller sees a generic fault and
/// never any key material.
fn internal(context: &str, e: CryptoError) -> AuthError {
    warn!("integrity fault in {context}: {e}");
    AuthError::Integrity(context.to_string())
}
