//! Capability interfaces for the external collaborators the relay depends on.
//!
//! The command handlers only ever talk to these traits; `backend` provides the
//! Supabase and SQLite implementations, and the router tests provide fakes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use musick_shared::{MessageId, MessageKind, RoomId, UserId};

use crate::error::UpstreamError;

/// Identity returned by a successful token verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub id: UserId,
    pub email: String,
    /// May be empty when the provider has no display name on file.
    pub display_name: String,
}

/// Result of creating a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoom {
    pub room_id: RoomId,
    pub code: String,
}

/// Snapshot of a persisted room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomRecord {
    pub room_id: RoomId,
    pub code: String,
    pub owner_id: UserId,
    pub title: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub body: String,
    pub kind: MessageKind,
    pub sent_at: DateTime<Utc>,
}

/// One request against the message store, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub room_id: RoomId,
    /// Only ids strictly below this one are eligible.
    pub before_id: Option<MessageId>,
    /// Rows to fetch; the pager asks for one more than it returns.
    pub limit: u32,
    pub include_system: bool,
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Exchange a caller-supplied token for a verified identity.
    ///
    /// A token the provider refuses yields [`UpstreamError::Rejected`].
    async fn verify(&self, token: &str) -> Result<VerifiedUser, UpstreamError>;
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn create(
        &self,
        owner_id: &UserId,
        title: &str,
        is_private: bool,
    ) -> Result<NewRoom, UpstreamError>;

    /// `Ok(None)` when no room carries `code`.
    async fn find_by_code(&self, code: &str) -> Result<Option<RoomRecord>, UpstreamError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Record that `user_id` belongs to `room_id`. Duplicate rows are ignored.
    async fn upsert(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), UpstreamError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(
        &self,
        room_id: &RoomId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<StoredMessage, UpstreamError>;

    async fn list(&self, query: &HistoryQuery) -> Result<Vec<StoredMessage>, UpstreamError>;
}

#[async_trait]
pub trait DisplayNames: Send + Sync {
    async fn display_name(&self, user_id: &UserId) -> Result<Option<String>, UpstreamError>;
}

/// Every collaborator the command handlers need, injected as one value.
#[derive(Clone)]
pub struct Backend {
    /// Short label reported by the status API.
    pub name: &'static str,
    pub identity: Arc<dyn IdentityVerifier>,
    pub rooms: Arc<dyn RoomStore>,
    pub members: Arc<dyn MembershipStore>,
    pub messages: Arc<dyn MessageStore>,
    pub names: Arc<dyn DisplayNames>,
}

impl Backend {
    /// Build a backend where one value serves every port.
    pub fn uniform<T>(name: &'static str, inner: Arc<T>) -> Self
    where
        T: IdentityVerifier + RoomStore + MembershipStore + MessageStore + DisplayNames + 'static,
    {
        Self {
            name,
            identity: inner.clone(),
            rooms: inner.clone(),
            members: inner.clone(),
            messages: inner.clone(),
            names: inner,
        }
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend").field("name", &self.name).finish()
    }
}
