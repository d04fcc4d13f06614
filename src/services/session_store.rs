//! Session Store contract.
//!
//! The session store owns identity: it starts provider sign-in, reports the
//! current session, invalidates it, and pushes `SyncEvent::SessionChanged`
//! to registered listeners whenever the session appears, refreshes, or goes
//! away.

use async_trait::async_trait;

use crate::types::errors::AuthError;
use crate::types::events::{EventSender, Subscription};
use crate::types::session::{AuthProvider, BearerToken, Session};

/// Trait defining the session operations the sync controller consumes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The session restored from storage or established by a sign-in, if any.
    async fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Starts a provider-authenticated sign-in that returns to `return_address`.
    async fn sign_in_with_provider(
        &self,
        provider: AuthProvider,
        return_address: &str,
    ) -> Result<(), AuthError>;

    /// Invalidates the current session.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Registers `sender` for session-changed events.
    fn on_session_change(&self, sender: EventSender) -> Subscription;
}

/// Source of credentials for authenticated record-service requests.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// A token for the signed-in user, renewed first when it is about to
    /// expire. `Ok(None)` when nobody is signed in, including when the
    /// renewal was refused and the session ended.
    async fn bearer_token(&self) -> Result<Option<BearerToken>, AuthError>;
}
