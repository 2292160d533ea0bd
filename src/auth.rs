//! Auth companions — status observer and sign-in/out dispatcher.
//!
//! DESIGN
//! ======
//! Both consumers take the same explicit [`AuthClient`] handle; neither
//! acquires a client of its own. [`AuthStatus`] republishes the client's
//! change notifications as an `is_authenticated` + `loading` pair, where
//! `loading` latches false on the first notification and never reverts.
//! [`AuthActions`] delegates sign-in/sign-out to the client and records
//! the resulting identity or the failure message — same error-field
//! propagation as the feed: the calls themselves never return `Err`.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// Failures surfaced by an auth backend.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("sign-in rejected: {0}")]
    Rejected(String),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Identity reported by the auth backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl AuthUser {
    #[must_use]
    pub fn new(email: &str) -> Self {
        Self { id: Uuid::new_v4(), email: Some(email.to_string()), display_name: None }
    }
}

/// One auth-state notification from the backend.
///
/// `Unknown` is the state before the backend has determined whether a
/// session exists (e.g. while restoring a persisted session).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthChange {
    #[default]
    Unknown,
    SignedOut,
    SignedIn(AuthUser),
}

/// External auth client seam. Sign-in flow, token refresh, and session
/// persistence are entirely the implementation's concern.
#[async_trait::async_trait]
pub trait AuthClient: Send + Sync {
    /// Change notifications. The receiver observes the current state
    /// immediately and every transition afterwards.
    fn changes(&self) -> watch::Receiver<AuthChange>;

    async fn sign_in(&self) -> Result<AuthUser, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

// =============================================================================
// STATUS OBSERVER
// =============================================================================

/// Observable authentication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStatusSnapshot {
    pub is_authenticated: bool,
    /// True until the backend has determined the auth state once.
    pub loading: bool,
}

impl Default for AuthStatusSnapshot {
    fn default() -> Self {
        Self { is_authenticated: false, loading: true }
    }
}

/// Reactive "is authenticated" flag derived from the client's change
/// notifications. Must be constructed inside a Tokio runtime; the pump
/// task is released by [`AuthStatus::dispose`] or on drop.
pub struct AuthStatus {
    state: watch::Sender<AuthStatusSnapshot>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl AuthStatus {
    #[must_use]
    pub fn new(client: &Arc<dyn AuthClient>) -> Self {
        let mut changes = client.changes();
        let initial = status_of(&changes.borrow());
        let (state, _) = watch::channel(initial);

        let tx = state.clone();
        let pump = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let authenticated = matches!(&*changes.borrow(), AuthChange::SignedIn(_));
                tx.send_modify(|s| {
                    s.is_authenticated = authenticated;
                    // Latched: once determined, never loading again.
                    s.loading = false;
                });
            }
        });

        Self { state, pump: Mutex::new(Some(pump)) }
    }

    /// Observe the status reactively.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthStatusSnapshot> {
        self.state.subscribe()
    }

    /// Point-in-time copy of the status.
    #[must_use]
    pub fn snapshot(&self) -> AuthStatusSnapshot {
        *self.state.borrow()
    }

    /// Stop observing the client. Idempotent; also runs on drop.
    pub fn dispose(&self) {
        if let Some(pump) = self.pump_slot().take() {
            pump.abort();
        }
    }

    fn pump_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pump.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for AuthStatus {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn status_of(change: &AuthChange) -> AuthStatusSnapshot {
    match change {
        AuthChange::Unknown => AuthStatusSnapshot { is_authenticated: false, loading: true },
        AuthChange::SignedOut => AuthStatusSnapshot { is_authenticated: false, loading: false },
        AuthChange::SignedIn(_) => AuthStatusSnapshot { is_authenticated: true, loading: false },
    }
}

// =============================================================================
// ACTION DISPATCHER
// =============================================================================

/// Observable outcome of the most recent auth action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthActionsSnapshot {
    pub user: Option<AuthUser>,
    pub error: Option<String>,
}

/// Sign-in/sign-out dispatcher. Delegates to the client and records the
/// resulting identity or failure; the calls never return `Err`.
pub struct AuthActions {
    client: Arc<dyn AuthClient>,
    state: watch::Sender<AuthActionsSnapshot>,
}

impl AuthActions {
    #[must_use]
    pub fn new(client: Arc<dyn AuthClient>) -> Self {
        let (state, _) = watch::channel(AuthActionsSnapshot::default());
        Self { client, state }
    }

    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthActionsSnapshot> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthActionsSnapshot {
        self.state.borrow().clone()
    }

    pub async fn sign_in(&self) {
        match self.client.sign_in().await {
            Ok(user) => self.state.send_modify(|s| {
                s.user = Some(user);
                s.error = None;
            }),
            Err(err) => {
                warn!(error = %err, "sign-in failed");
                self.state.send_modify(|s| s.error = Some(err.to_string()));
            }
        }
    }

    pub async fn sign_out(&self) {
        match self.client.sign_out().await {
            Ok(()) => self.state.send_modify(|s| {
                s.user = None;
                s.error = None;
            }),
            Err(err) => {
                warn!(error = %err, "sign-out failed");
                self.state.send_modify(|s| s.error = Some(err.to_string()));
            }
        }
    }
}

// =============================================================================
// MEMORY CLIENT
// =============================================================================

/// In-memory [`AuthClient`] used by tests and demos. Starts in the
/// `Unknown` state, like a real backend before session restore resolves.
pub struct MemoryAuth {
    changes: watch::Sender<AuthChange>,
    profile: AuthUser,
    deny_next: Mutex<Option<String>>,
}

impl MemoryAuth {
    #[must_use]
    pub fn new(profile: AuthUser) -> Self {
        let (changes, _) = watch::channel(AuthChange::default());
        Self { changes, profile, deny_next: Mutex::new(None) }
    }

    /// Arm a one-shot denial: the next sign-in is rejected (or the next
    /// sign-out fails) with `message`.
    pub fn deny_next(&self, message: &str) {
        *self.deny_next.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(message.to_string());
    }

    /// Resolve the initial `Unknown` state to signed out, as a backend
    /// does once it finds no persisted session.
    pub fn resolve_signed_out(&self) {
        self.changes.send_replace(AuthChange::SignedOut);
    }

    fn take_denial(&self) -> Option<String> {
        self.deny_next.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

#[async_trait::async_trait]
impl AuthClient for MemoryAuth {
    fn changes(&self) -> watch::Receiver<AuthChange> {
        self.changes.subscribe()
    }

    async fn sign_in(&self) -> Result<AuthUser, AuthError> {
        if let Some(message) = self.take_denial() {
            return Err(AuthError::Rejected(message));
        }
        // send_replace: the state must advance even with no observer attached.
        self.changes.send_replace(AuthChange::SignedIn(self.profile.clone()));
        Ok(self.profile.clone())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(message) = self.take_denial() {
            return Err(AuthError::Backend(message));
        }
        self.changes.send_replace(AuthChange::SignedOut);
        Ok(())
    }
}
