//! Local backend serving every port from a `musick-store` database.
//!
//! SQLite calls are synchronous, so each one runs on a blocking thread behind
//! a `std::sync::Mutex`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use musick_shared::{MessageKind, RoomId, UserId};
use musick_store::{Database, Message, MessageQuery, Room};

use crate::error::UpstreamError;
use crate::ports::{
    DisplayNames, HistoryQuery, IdentityVerifier, MembershipStore, MessageStore, NewRoom,
    RoomRecord, RoomStore, StoredMessage, VerifiedUser,
};

#[derive(Clone)]
pub struct SqliteBackend {
    db: Arc<Mutex<Database>>,
}

impl SqliteBackend {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open (or create) the database at `path`, or the platform default.
    pub fn open(path: Option<&Path>) -> Result<Self, musick_store::StoreError> {
        let db = match path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        Ok(Self::new(db))
    }

    async fn run<T, F>(&self, op: F) -> Result<T, UpstreamError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> musick_store::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| UpstreamError::Storage(format!("database lock poisoned: {e}")))?;
            op(&guard).map_err(UpstreamError::from)
        })
        .await?
    }
}

fn room_record(room: Room) -> RoomRecord {
    RoomRecord {
        room_id: RoomId(room.id),
        code: room.code,
        owner_id: UserId(room.owner_id),
        title: room.title,
        is_private: room.is_private,
        created_at: room.created_at,
    }
}

fn stored_message(message: Message) -> StoredMessage {
    StoredMessage {
        id: message.id,
        room_id: RoomId(message.room_id),
        sender_id: UserId(message.sender_id),
        body: message.body,
        kind: message.kind,
        sent_at: message.sent_at,
    }
}

#[async_trait]
impl IdentityVerifier for SqliteBackend {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, UpstreamError> {
        if token.is_empty() {
            return Err(UpstreamError::Rejected);
        }
        let token = token.to_string();
        let account = self
            .run(move |db| db.account_by_token(&token))
            .await?
            .ok_or(UpstreamError::Rejected)?;
        Ok(VerifiedUser {
            id: UserId(account.id),
            email: account.email,
            display_name: account.user_name.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl RoomStore for SqliteBackend {
    async fn create(
        &self,
        owner_id: &UserId,
        title: &str,
        is_private: bool,
    ) -> Result<NewRoom, UpstreamError> {
        let owner_id = owner_id.to_string();
        let title = title.to_string();
        let room = self
            .run(move |db| db.create_room(&owner_id, &title, is_private))
            .await?;
        Ok(NewRoom {
            room_id: RoomId(room.id),
            code: room.code,
        })
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<RoomRecord>, UpstreamError> {
        let code = code.to_string();
        let room = self.run(move |db| db.room_by_code(&code)).await?;
        Ok(room.map(room_record))
    }
}

#[async_trait]
impl MembershipStore for SqliteBackend {
    async fn upsert(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), UpstreamError> {
        let room_id = room_id.to_string();
        let user_id = user_id.to_string();
        self.run(move |db| db.upsert_member(&room_id, &user_id))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl MessageStore for SqliteBackend {
    async fn insert(
        &self,
        room_id: &RoomId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<StoredMessage, UpstreamError> {
        let room_id = room_id.to_string();
        let sender_id = sender_id.to_string();
        let body = body.to_string();
        let message = self
            .run(move |db| db.insert_message(&room_id, &sender_id, &body, MessageKind::Text))
            .await?;
        Ok(stored_message(message))
    }

    async fn list(&self, query: &HistoryQuery) -> Result<Vec<StoredMessage>, UpstreamError> {
        let query = MessageQuery {
            room_id: query.room_id.to_string(),
            before_id: query.before_id,
            limit: query.limit,
            include_system: query.include_system,
        };
        let rows = self.run(move |db| db.list_messages(&query)).await?;
        Ok(rows.into_iter().map(stored_message).collect())
    }
}

#[async_trait]
impl DisplayNames for SqliteBackend {
    async fn display_name(&self, user_id: &UserId) -> Result<Option<String>, UpstreamError> {
        let user_id = user_id.to_string();
        self.run(move |db| db.display_name(&user_id)).await
    }
}
