//! Session capability.
//!
//! The flow controller never owns session state; the HTTP layer injects
//! an implementation of [`SessionHandle`] per request. This keeps the
//! core testable without a real cookie stack and makes the lifecycle
//! explicit: established at register/login, regenerated on every
//! successful authentication, destroyed at logout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

/// The authenticated-session interface the embedding HTTP layer provides.
pub trait SessionHandle: Send + Sync {
    /// Binds the session to a user.
    fn establish(&self, user_id: &str);

    /// Replaces the session identifier while keeping the bound user,
    /// mitigating session fixation.
    fn regenerate(&self);

    /// Ends the session. Idempotent.
    fn destroy(&self);

    /// The user bound to the current request, if any.
    fn current_user(&self) -> Option<String>;

    /// Opaque identifier for the current session incarnation, replaced by
    /// [`regenerate`](Self::regenerate) and [`destroy`](Self::destroy).
    /// Server-side per-session state (the unlocked vault key) is scoped
    /// by this value, never by the user.
    fn id(&self) -> String;
}

/// In-process session for tests and embedders without an HTTP stack.
pub struct MemorySession {
    user: RwLock<Option<String>>,
    id: RwLock<String>,
    epoch: AtomicU64,
}

impl MemorySession {
    pub fn new() -> Self {
        Self {
            user: RwLock::new(None),
            id: RwLock::new(Uuid::new_v4().to_string()),
            epoch: AtomicU64::new(0),
        }
    }

    /// Monotonic counter bumped on every regeneration; lets tests assert
    /// the fixation mitigation fired without comparing opaque ids.
    pub fn session_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle for MemorySession {
    fn establish(&self, user_id: &str) {
        *self.user.write().unwrap() = Some(user_id.to_string());
    }

    fn regenerate(&self) {
        *self.id.write().unwrap() = Uuid::new_v4().to_string();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy(&self) {
        *self.user.write().unwrap() = None;
        *self.id.write().unwrap() = Uuid::new_v4().to_string();
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn current_user(&self) -> Option<String> {
        self.user.read().unwrap().clone()
    }

    fn id(&self) -> String {
        self.id.read().unwrap().clone()
    }
}
