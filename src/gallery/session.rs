//! In-memory session tokens for the gallery.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use uuid::Uuid;

struct SessionEntry {
    username: String,
    created_at: Instant,
}

/// Token store. Sessions last until logout, or until `ttl` when one is set.
pub struct SessionStore {
    ttl: Option<Duration>,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a session and returns its token.
    pub async fn create(&self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let entry = SessionEntry {
            username: username.to_string(),
            created_at: Instant::now(),
        };
        self.sessions.write().await.insert(token.clone(), entry);
        token
    }

    /// True when the token exists and has not expired. Expired tokens are
    /// dropped on the spot.
    pub async fn validate(&self, token: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(token) {
            Some(entry) => {
                if let Some(ttl) = self.ttl {
                    if entry.created_at.elapsed() >= ttl {
                        sessions.remove(token);
                        return false;
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Closes a session, returning the username it belonged to.
    pub async fn remove(&self, token: &str) -> Option<String> {
        self.sessions
            .write()
            .await
            .remove(token)
            .map(|entry| entry.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_created_session_validates() {
        let store = SessionStore::new(None);
        let token = store.create("admin").await;
        assert!(store.validate(&token).await);
        assert!(!store.validate("no-such-token").await);
    }

    #[tokio::test]
    async fn test_remove_invalidates_and_returns_username() {
        let store = SessionStore::new(None);
        let token = store.create("user").await;
        assert_eq!(store.remove(&token).await.as_deref(), Some("user"));
        assert!(!store.validate(&token).await);
        assert_eq!(store.remove(&token).await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let store = SessionStore::new(Some(Duration::ZERO));
        let token = store.create("admin").await;
        assert!(!store.validate(&token).await);
        assert!(!store.validate(&token).await, "expired token must stay gone");
    }

    #[tokio::test]
    async fn test_long_ttl_keeps_session_alive() {
        let store = SessionStore::new(Some(Duration::from_secs(3600)));
        let token = store.create("admin").await;
        assert!(store.validate(&token).await);
    }
}
