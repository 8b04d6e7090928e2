//! # Session Hook
//!
//! Holds the signed-in user's tokens and announces lifecycle changes.
//!
//! ```text
//!   login screen ──sign_in()──► SessionManager ──SessionEvent::SignedIn──► SyncAgent
//!   token timer  ──refresh()──►      │          ──TokenRefreshed─────────►   │
//!   logout       ──sign_out()─►      │          ──SignedOut──────────────►   │
//!                                    │                                       ▼
//!                                    └──access_token()──► RestRemoteStore  sync_all()
//! ```
//!
//! Obtaining the tokens (password flow, refresh requests) belongs to the
//! login screen; this module only carries them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::info;

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_SKEW_SECONDS: i64 = 60;

const EVENT_CAPACITY: usize = 16;

/// An authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: String,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now() + Duration::seconds(EXPIRY_SKEW_SECONDS)
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Session lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn { user_id: String },
    TokenRefreshed,
    SignedOut,
}

/// Current session plus an event channel.
#[derive(Debug)]
pub struct SessionManager {
    current: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SessionManager {
            current: RwLock::new(None),
            events,
        }
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Stores a fresh session and announces the sign-in.
    pub async fn sign_in(&self, session: AuthSession) {
        let user_id = session.user_id.clone();
        *self.current.write().await = Some(session);

        info!(user_id = %user_id, "Signed in");
        self.publish(SessionEvent::SignedIn { user_id });
    }

    /// Replaces the tokens of the current session.
    pub async fn refresh(&self, session: AuthSession) {
        *self.current.write().await = Some(session);
        info!("Session token refreshed");
        self.publish(SessionEvent::TokenRefreshed);
    }

    pub async fn sign_out(&self) {
        *self.current.write().await = None;
        info!("Signed out");
        self.publish(SessionEvent::SignedOut);
    }

    pub async fn current(&self) -> Option<AuthSession> {
        self.current.read().await.clone()
    }

    /// The bearer token for remote calls; `None` when signed out or expired.
    pub async fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|s| !s.is_expired())
            .map(|s| s.access_token.clone())
    }

    pub async fn is_signed_in(&self) -> bool {
        self.access_token().await.is_some()
    }

    fn publish(&self, event: SessionEvent) {
        // Fails only when nobody is subscribed.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
pub(crate) fn test_session(user_id: &str) -> AuthSession {
    AuthSession {
        access_token: "access-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        expires_at: Utc::now() + Duration::hours(1),
        user_id: user_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_publishes_and_exposes_token() {
        let sessions = SessionManager::new();
        let mut events = sessions.subscribe();

        assert!(sessions.access_token().await.is_none());
        sessions.sign_in(test_session("u-1")).await;

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::SignedIn {
                user_id: "u-1".to_string()
            }
        );
        assert_eq!(sessions.access_token().await.as_deref(), Some("access-token"));

        sessions.sign_out().await;
        assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
        assert!(!sessions.is_signed_in().await);
    }

    #[tokio::test]
    async fn test_expired_session_has_no_token() {
        let sessions = SessionManager::new();
        let mut session = test_session("u-1");
        session.expires_at = Utc::now() + Duration::seconds(10);
        sessions.refresh(session).await;

        assert!(sessions.current().await.is_some());
        assert!(sessions.access_token().await.is_none());
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let rendered = format!("{:?}", test_session("u-1"));
        assert!(!rendered.contains("access-token"));
        assert!(!rendered.contains("refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
