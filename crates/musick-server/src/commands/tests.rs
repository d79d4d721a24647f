use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use musick_shared::{Frame, MessageKind, RoomId, SessionKey, UserId};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{CommandRouter, Connection};
use crate::config::ServerConfig;
use crate::error::UpstreamError;
use crate::ports::{
    Backend, DisplayNames, HistoryQuery, IdentityVerifier, MembershipStore, MessageStore,
    NewRoom, RoomRecord, RoomStore, StoredMessage, VerifiedUser,
};
use crate::state::AppState;

#[derive(Default)]
struct Data {
    rooms: Vec<RoomRecord>,
    members: Vec<(RoomId, UserId)>,
    messages: Vec<StoredMessage>,
}

#[derive(Default)]
struct FakeBackend {
    data: Mutex<Data>,
    fail_upsert: AtomicBool,
}

impl FakeBackend {
    fn message_count(&self) -> usize {
        self.data.lock().unwrap().messages.len()
    }

    fn member_rows(&self) -> usize {
        self.data.lock().unwrap().members.len()
    }
}

#[async_trait]
impl IdentityVerifier for FakeBackend {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, UpstreamError> {
        let (id, name) = match token {
            "tok-a" => ("user-a", "alice"),
            "tok-b" => ("user-b", "bob"),
            _ => return Err(UpstreamError::Rejected),
        };
        Ok(VerifiedUser {
            id: UserId::new(id),
            email: format!("{id}@example.com"),
            display_name: name.into(),
        })
    }
}

#[async_trait]
impl RoomStore for FakeBackend {
    async fn create(
        &self,
        owner_id: &UserId,
        title: &str,
        is_private: bool,
    ) -> Result<NewRoom, UpstreamError> {
        let mut data = self.data.lock().unwrap();
        let n = data.rooms.len() + 1;
        let room = RoomRecord {
            room_id: RoomId::new(format!("room-{n}")),
            code: format!("CODE{n:02}"),
            owner_id: owner_id.clone(),
            title: title.to_string(),
            is_private,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        };
        data.rooms.push(room.clone());
        Ok(NewRoom {
            room_id: room.room_id,
            code: room.code,
        })
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<RoomRecord>, UpstreamError> {
        let data = self.data.lock().unwrap();
        Ok(data.rooms.iter().find(|r| r.code == code).cloned())
    }
}

#[async_trait]
impl MembershipStore for FakeBackend {
    async fn upsert(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), UpstreamError> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(UpstreamError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        let mut data = self.data.lock().unwrap();
        let row = (room_id.clone(), user_id.clone());
        if !data.members.contains(&row) {
            data.members.push(row);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for FakeBackend {
    async fn insert(
        &self,
        room_id: &RoomId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<StoredMessage, UpstreamError> {
        let mut data = self.data.lock().unwrap();
        if !data.rooms.iter().any(|r| &r.room_id == room_id) {
            return Err(UpstreamError::Status {
                status: 409,
                body: "foreign key violation".into(),
            });
        }
        let id = data.messages.len() as i64 + 1;
        let message = StoredMessage {
            id,
            room_id: room_id.clone(),
            sender_id: sender_id.clone(),
            body: body.to_string(),
            kind: MessageKind::Text,
            sent_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(id),
        };
        data.messages.push(message.clone());
        Ok(message)
    }

    async fn list(&self, query: &HistoryQuery) -> Result<Vec<StoredMessage>, UpstreamError> {
        let data = self.data.lock().unwrap();
        let mut rows: Vec<StoredMessage> = data
            .messages
            .iter()
            .filter(|m| m.room_id == query.room_id)
            .filter(|m| query.before_id.map_or(true, |b| m.id < b))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        rows.truncate(query.limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl DisplayNames for FakeBackend {
    async fn display_name(&self, user_id: &UserId) -> Result<Option<String>, UpstreamError> {
        Ok(match user_id.as_str() {
            "user-a" => Some("alice".into()),
            _ => None,
        })
    }
}

struct Harness {
    router: CommandRouter,
    backend: Arc<FakeBackend>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    fn with_config(config: ServerConfig) -> Self {
        let backend = Arc::new(FakeBackend::default());
        let state = AppState::new(config, Backend::uniform("fake", backend.clone()));
        Self {
            router: CommandRouter::new(state),
            backend,
        }
    }

    async fn connect(&self, n: u64) -> (Connection, mpsc::Receiver<Frame>) {
        let (outbox, rx) = mpsc::channel(16);
        let key = SessionKey(n);
        self.router.state().sessions.open(key, None).await;
        let conn = Connection {
            key,
            peer: format!("127.0.0.{n}:4000").parse().unwrap(),
            outbox,
        };
        (conn, rx)
    }

    async fn call(&self, conn: &Connection, id: u32, payload: Value) -> Value {
        let frame = Frame::json(id, &payload).unwrap();
        let reply = self.router.dispatch(conn, frame).await.expect("reply");
        assert_eq!(reply.id, id, "reply must reuse the request id");
        reply.parse().unwrap()
    }

    async fn login(&self, conn: &Connection, token: &str) -> Value {
        self.call(conn, 10, json!({ "token": token })).await
    }

    async fn room(&self, owner: &Connection, user: &str, name: &str) -> Value {
        self.call(
            owner,
            201,
            json!({ "user_id": user, "room_name": name, "is_private": false }),
        )
        .await
    }
}

fn assert_failure(reply: &Value, reason: &str) {
    assert_eq!(reply["success"], false, "{reply}");
    assert_eq!(reply["message"], reason, "{reply}");
}

#[tokio::test]
async fn test_echo_needs_no_session() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    let reply = h.call(&a, 1, json!({ "ping": 7 })).await;
    assert_eq!(reply, json!({ "ping": 7 }));
}

#[tokio::test]
async fn test_unknown_and_server_only_ids_get_no_reply() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    assert!(h.router.dispatch(&a, Frame::new(999, &b"{}"[..])).await.is_none());
    assert!(h.router.dispatch(&a, Frame::new(302, &b"{}"[..])).await.is_none());
}

#[tokio::test]
async fn test_authenticate_binds_session() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    let sessions = &h.router.state().sessions;
    assert!(!sessions.is_authenticated(a.key).await);

    let reply = h.login(&a, "tok-a").await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["message"], "authenticated");
    assert_eq!(reply["user_id"], "user-a");
    assert_eq!(reply["user_name"], "alice");

    let identity = sessions.identity(a.key).await.unwrap();
    assert_eq!(identity.email, "user-a@example.com");
}

#[tokio::test]
async fn test_authenticate_failures() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;

    assert_failure(&h.login(&a, "forged").await, "authentication failed");
    assert_failure(&h.call(&a, 10, json!({})).await, "token is required");

    let garbage = h.router.dispatch(&a, Frame::new(10, &b"not json"[..])).await.unwrap();
    assert_failure(&garbage.parse().unwrap(), "invalid request format");

    assert!(!h.router.state().sessions.is_authenticated(a.key).await);
}

#[tokio::test]
async fn test_auth_gate_runs_before_payload_checks() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;

    for id in [201, 202, 301, 310] {
        let reply = h.router.dispatch(&a, Frame::new(id, &b"{bad"[..])).await.unwrap();
        assert_failure(&reply.parse().unwrap(), "not authenticated");
    }
    assert_eq!(h.backend.message_count(), 0);
}

#[tokio::test]
async fn test_payload_gates_in_order() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    h.login(&a, "tok-a").await;

    let reply = h.router.dispatch(&a, Frame::new(202, &b"[1,2"[..])).await.unwrap();
    assert_failure(&reply.parse().unwrap(), "invalid request format");

    assert_failure(
        &h.call(&a, 201, json!({ "user_id": "user-a" })).await,
        "room_name is required",
    );
    assert_failure(
        &h.call(&a, 201, json!({ "room_name": "R1" })).await,
        "user_id is required",
    );
    assert_failure(
        &h.call(&a, 202, json!({ "code": "CODE01" })).await,
        "code and user_id are required",
    );
    assert_failure(
        &h.call(&a, 301, json!({ "user_id": "user-a", "room_id": "room-1" })).await,
        "user_id, room_id, and body are required",
    );
    assert_failure(
        &h.call(&a, 310, json!({ "user_id": "user-a" })).await,
        "room_id and user_id are required",
    );
}

#[tokio::test]
async fn test_null_body_is_an_empty_request() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;

    assert_failure(&h.call(&a, 10, Value::Null).await, "token is required");

    h.login(&a, "tok-a").await;
    assert_failure(&h.call(&a, 201, Value::Null).await, "room_name is required");
    assert_failure(&h.call(&a, 202, Value::Null).await, "code and user_id are required");
    assert_failure(
        &h.call(&a, 301, Value::Null).await,
        "user_id, room_id, and body are required",
    );
    assert_failure(&h.call(&a, 310, Value::Null).await, "room_id and user_id are required");
    assert_eq!(h.backend.message_count(), 0);
}

#[tokio::test]
async fn test_create_room_does_not_subscribe_creator() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    h.login(&a, "tok-a").await;

    let reply = h.room(&a, "user-a", "R1").await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["message"], "room created successfully");
    assert_eq!(reply["room_id"], "room-1");
    assert_eq!(reply["room_code"], "CODE01");
    assert_eq!(reply["room_name"], "R1");
    assert_eq!(reply["is_private"], false);

    let rooms = &h.router.state().rooms;
    assert!(!rooms.is_subscribed(&RoomId::new("room-1"), a.key).await);
}

#[tokio::test]
async fn test_mismatched_user_is_rejected_without_side_effects() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    let (b, mut b_rx) = h.connect(2).await;
    h.login(&a, "tok-a").await;
    h.login(&b, "tok-b").await;
    let code = h.room(&a, "user-a", "R1").await["room_code"].clone();
    h.call(&b, 202, json!({ "code": code, "user_id": "user-b" })).await;

    assert_failure(&h.room(&a, "user-b", "R2").await, "user_id mismatch");
    assert_failure(
        &h.call(&a, 202, json!({ "code": code, "user_id": "user-b" })).await,
        "user_id mismatch",
    );
    assert_failure(
        &h.call(&a, 301, json!({ "user_id": "user-b", "room_id": "room-1", "body": "spoof" }))
            .await,
        "user_id mismatch",
    );

    assert_eq!(h.backend.message_count(), 0);
    assert!(b_rx.try_recv().is_err());
    assert!(!h.router.state().rooms.is_subscribed(&RoomId::new("room-1"), a.key).await);
}

#[tokio::test]
async fn test_join_subscribes_and_reports_room() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    let (b, _) = h.connect(2).await;
    h.login(&a, "tok-a").await;
    h.login(&b, "tok-b").await;
    let created = h.room(&a, "user-a", "R1").await;

    let joined = h
        .call(&b, 202, json!({ "code": created["room_code"], "user_id": "user-b" }))
        .await;
    assert_eq!(joined["success"], true);
    assert_eq!(joined["message"], "joined room");
    assert_eq!(joined["room_id"], created["room_id"]);
    assert_eq!(joined["title"], "R1");
    assert_eq!(joined["owner_id"], "user-a");
    assert_eq!(joined["created_at"], "2024-05-01T12:00:00Z");

    // joining again is a no-op
    h.call(&b, 202, json!({ "code": created["room_code"], "user_id": "user-b" }))
        .await;
    let room = RoomId::new("room-1");
    assert_eq!(h.router.state().rooms.subscriber_count(&room).await, 1);
    assert_eq!(h.backend.member_rows(), 1);
}

#[tokio::test]
async fn test_join_failures_leave_index_untouched() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    h.login(&a, "tok-a").await;
    let code = h.room(&a, "user-a", "R1").await["room_code"].clone();

    assert_failure(
        &h.call(&a, 202, json!({ "code": "NOPE", "user_id": "user-a" })).await,
        "room not found",
    );

    h.backend.fail_upsert.store(true, Ordering::SeqCst);
    assert_failure(
        &h.call(&a, 202, json!({ "code": code, "user_id": "user-a" })).await,
        "failed to join room",
    );
    assert_eq!(h.router.state().rooms.room_count().await, 0);
}

#[tokio::test]
async fn test_send_broadcasts_to_room_including_sender() {
    let h = Harness::new();
    let (a, mut a_rx) = h.connect(1).await;
    let (b, mut b_rx) = h.connect(2).await;
    h.login(&a, "tok-a").await;
    h.login(&b, "tok-b").await;
    let code = h.room(&a, "user-a", "R1").await["room_code"].clone();
    h.call(&b, 202, json!({ "code": code, "user_id": "user-b" })).await;

    let reply = h
        .call(&a, 301, json!({ "user_id": "user-a", "room_id": "room-1", "body": "hi" }))
        .await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["message"], "message sent");
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["sender_id"], "user-a");
    assert_eq!(reply["sender_name"], "alice");
    assert_eq!(reply["body"], "hi");
    assert_eq!(reply["sent_at"], "2024-05-01T12:00:01Z");

    for rx in [&mut a_rx, &mut b_rx] {
        let delivery = rx.try_recv().expect("302 delivery");
        assert_eq!(delivery.id, 302);
        let body: Value = delivery.parse().unwrap();
        assert_eq!(body["message"], "message delivered");
        assert_eq!(body["id"], 1);
        assert_eq!(body["body"], "hi");
    }

    // sending subscribed the sender implicitly
    assert!(h.router.state().rooms.is_subscribed(&RoomId::new("room-1"), a.key).await);
}

#[tokio::test]
async fn test_sender_can_be_excluded_from_its_own_broadcast() {
    let h = Harness::with_config(ServerConfig {
        broadcast_to_sender: false,
        ..ServerConfig::default()
    });
    let (a, mut a_rx) = h.connect(1).await;
    let (b, mut b_rx) = h.connect(2).await;
    h.login(&a, "tok-a").await;
    h.login(&b, "tok-b").await;
    let code = h.room(&a, "user-a", "R1").await["room_code"].clone();
    h.call(&b, 202, json!({ "code": code, "user_id": "user-b" })).await;

    h.call(&a, 301, json!({ "user_id": "user-a", "room_id": "room-1", "body": "hi" }))
        .await;
    assert!(a_rx.try_recv().is_err());
    assert_eq!(b_rx.try_recv().unwrap().id, 302);
}

#[tokio::test]
async fn test_failed_insert_neither_subscribes_nor_broadcasts() {
    let h = Harness::new();
    let (a, mut a_rx) = h.connect(1).await;
    h.login(&a, "tok-a").await;

    assert_failure(
        &h.call(&a, 301, json!({ "user_id": "user-a", "room_id": "ghost", "body": "hi" }))
            .await,
        "failed to send message",
    );
    assert_eq!(h.router.state().rooms.room_count().await, 0);
    assert!(a_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_fetch_pages_with_string_cursor() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    h.login(&a, "tok-a").await;
    h.room(&a, "user-a", "R1").await;
    for n in 1..=10 {
        h.call(
            &a,
            301,
            json!({ "user_id": "user-a", "room_id": "room-1", "body": format!("m{n}") }),
        )
        .await;
    }

    let first = h
        .call(&a, 310, json!({ "room_id": "room-1", "user_id": "user-a", "limit": 3 }))
        .await;
    assert_eq!(first["message"], "messages fetched");
    let ids: Vec<i64> = first["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![10, 9, 8]);
    assert_eq!(first["has_more"], true);
    assert_eq!(first["next_before_id"], "8");
    assert_eq!(first["next_before_created_at"], "2024-05-01T12:00:08Z");
    assert_eq!(first["messages"][0]["sender_name"], "alice");
    assert_eq!(first["messages"][0]["created_at"], "2024-05-01T12:00:10Z");

    let second = h
        .call(
            &a,
            310,
            json!({ "room_id": "room-1", "user_id": "user-a", "limit": 3, "before_id": "8" }),
        )
        .await;
    let ids: Vec<i64> = second["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![7, 6, 5]);
}

#[tokio::test]
async fn test_fetch_empty_room_and_bad_cursor() {
    let h = Harness::new();
    let (a, _) = h.connect(1).await;
    h.login(&a, "tok-a").await;

    let empty = h
        .call(&a, 310, json!({ "room_id": "room-9", "user_id": "user-a" }))
        .await;
    assert_eq!(empty["success"], true);
    assert_eq!(empty["messages"], json!([]));
    assert_eq!(empty["has_more"], false);
    assert!(empty.get("next_before_id").is_none());

    assert_failure(
        &h.call(
            &a,
            310,
            json!({ "room_id": "room-9", "user_id": "user-a", "before_id": "abc" }),
        )
        .await,
        "before_id must be a numeric message id",
    );
}

#[tokio::test]
async fn test_exhausted_bucket_refuses_commands() {
    let h = Harness::with_config(ServerConfig {
        command_rate: 0.0,
        command_burst: 2.0,
        ..ServerConfig::default()
    });
    let (a, _) = h.connect(1).await;

    h.call(&a, 1, json!({})).await;
    h.login(&a, "tok-a").await;
    assert_failure(&h.login(&a, "tok-a").await, "rate limit exceeded");
}
