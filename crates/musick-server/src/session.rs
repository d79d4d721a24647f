//! Per-connection authentication state.
//!
//! The registry is the only place that answers "is this connection
//! authenticated, and as whom". Keys are issued by the transport.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use musick_shared::{SessionKey, UserId};
use tokio::sync::RwLock;
use tracing::debug;

/// Identity bound to a session by a successful authenticate command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub key: SessionKey,
    pub peer: Option<SocketAddr>,
    pub opened_at: DateTime<Utc>,
    identity: Option<Identity>,
}

impl Session {
    fn new(key: SessionKey, peer: Option<SocketAddr>) -> Self {
        Self {
            key,
            peer,
            opened_at: Utc::now(),
            identity: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the unauthenticated record for a freshly accepted connection.
    pub async fn open(&self, key: SessionKey, peer: Option<SocketAddr>) {
        self.sessions
            .write()
            .await
            .insert(key, Session::new(key, peer));
    }

    /// Record a successful authentication. A second call overwrites the first,
    /// and a key that was never opened is recorded anyway.
    pub async fn bind(&self, key: SessionKey, identity: Identity) {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(key)
            .or_insert_with(|| Session::new(key, None));
        if let Some(previous) = &session.identity {
            debug!(session = %key, user = %previous.user_id, "Rebinding authenticated session");
        }
        session.identity = Some(identity);
    }

    pub async fn lookup(&self, key: SessionKey) -> Option<Session> {
        self.sessions.read().await.get(&key).cloned()
    }

    /// Bound identity, or `None` for absent and unauthenticated sessions.
    pub async fn identity(&self, key: SessionKey) -> Option<Identity> {
        self.sessions
            .read()
            .await
            .get(&key)
            .and_then(|s| s.identity.clone())
    }

    pub async fn is_authenticated(&self, key: SessionKey) -> bool {
        self.sessions
            .read()
            .await
            .get(&key)
            .map(Session::is_authenticated)
            .unwrap_or(false)
    }

    /// Drop the record. Returns whether one was present.
    pub async fn remove(&self, key: SessionKey) -> bool {
        self.sessions.write().await.remove(&key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn authenticated_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.is_authenticated())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            user_id: UserId::new("user-a"),
            email: "a@example.com".into(),
            display_name: "alice".into(),
        }
    }

    #[tokio::test]
    async fn test_open_bind_remove_lifecycle() {
        let registry = SessionRegistry::new();
        let key = SessionKey(1);

        registry.open(key, None).await;
        assert!(!registry.is_authenticated(key).await);
        assert!(registry.lookup(key).await.is_some());

        registry.bind(key, alice()).await;
        assert!(registry.is_authenticated(key).await);
        assert_eq!(registry.identity(key).await, Some(alice()));

        assert!(registry.remove(key).await);
        assert!(!registry.is_authenticated(key).await);
        assert!(registry.lookup(key).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        assert!(!registry.remove(SessionKey(9)).await);
        registry.open(SessionKey(9), None).await;
        assert!(registry.remove(SessionKey(9)).await);
        assert!(!registry.remove(SessionKey(9)).await);
    }

    #[tokio::test]
    async fn test_second_bind_overwrites() {
        let registry = SessionRegistry::new();
        let key = SessionKey(2);
        registry.bind(key, alice()).await;

        let bob = Identity {
            user_id: UserId::new("user-b"),
            email: "b@example.com".into(),
            display_name: "bob".into(),
        };
        registry.bind(key, bob.clone()).await;
        assert_eq!(registry.identity(key).await, Some(bob));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_counts() {
        let registry = SessionRegistry::new();
        registry.open(SessionKey(1), None).await;
        registry.open(SessionKey(2), None).await;
        registry.bind(SessionKey(2), alice()).await;

        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.authenticated_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_sessions() {
        let registry = SessionRegistry::new();
        let mut tasks = Vec::new();
        for n in 0..32u64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let key = SessionKey(n);
                registry.open(key, None).await;
                registry.bind(key, alice()).await;
                if n % 2 == 0 {
                    registry.remove(key).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.len().await, 16);
        assert_eq!(registry.authenticated_count().await, 16);
    }
}
