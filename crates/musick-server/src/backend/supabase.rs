//! Supabase-hosted identity and persistence over its REST and auth APIs.
//!
//! Calls are never retried; any status other than the expected one becomes
//! [`UpstreamError::Status`] carrying the response body.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use musick_shared::{MessageKind, RoomId, UserId};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::ServerConfig;
use crate::error::UpstreamError;
use crate::ports::{
    DisplayNames, HistoryQuery, IdentityVerifier, MembershipStore, MessageStore, NewRoom,
    RoomRecord, RoomStore, StoredMessage, VerifiedUser,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const ROOM_COLUMNS: &str = "id,code,owner_id,title,is_private,created_at";
const MESSAGE_COLUMNS: &str = "id,room_id,sender_id,body,type,sent_at";

#[derive(Clone)]
pub struct SupabaseBackend {
    client: Client,
    base_url: String,
    anon_key: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<Map<String, Value>>,
    #[serde(default)]
    raw_user_meta_data: Option<Map<String, Value>>,
}

impl AuthUser {
    fn user_name(&self) -> Option<&str> {
        [&self.user_metadata, &self.raw_user_meta_data]
            .into_iter()
            .flatten()
            .find_map(|meta| meta.get("user_name").and_then(Value::as_str))
    }
}

#[derive(Debug, Deserialize)]
struct CreatedRoom {
    room_id: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct RoomRow {
    id: String,
    code: String,
    owner_id: String,
    title: String,
    #[serde(default)]
    is_private: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct MessageRow {
    id: i64,
    room_id: String,
    sender_id: String,
    body: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    sent_at: DateTime<Utc>,
}

impl From<MessageRow> for StoredMessage {
    fn from(row: MessageRow) -> Self {
        StoredMessage {
            id: row.id,
            room_id: RoomId(row.room_id),
            sender_id: UserId(row.sender_id),
            body: row.body,
            kind: row
                .kind
                .as_deref()
                .map(MessageKind::from_str_lossy)
                .unwrap_or_default(),
            sent_at: row.sent_at,
        }
    }
}

impl SupabaseBackend {
    pub fn new(
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_key: service_key.into(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.supabase_url.clone(),
            config.supabase_anon_key.clone(),
            config.service_key().to_string(),
        )
    }

    fn rest(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn with_key(&self, request: RequestBuilder, key: &str) -> RequestBuilder {
        request.bearer_auth(key).header("apikey", key)
    }

    fn with_service_key(&self, request: RequestBuilder) -> RequestBuilder {
        self.with_key(request, &self.service_key)
    }
}

/// Pass `response` through if its status is one of `expected`.
async fn expect_status(
    response: Response,
    expected: &[StatusCode],
) -> Result<Response, UpstreamError> {
    let status = response.status();
    if expected.contains(&status) {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IdentityVerifier for SupabaseBackend {
    async fn verify(&self, token: &str) -> Result<VerifiedUser, UpstreamError> {
        if token.is_empty() {
            return Err(UpstreamError::Rejected);
        }
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .bearer_auth(token)
            .header("apikey", &self.anon_key)
            .send()
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(UpstreamError::Rejected);
        }
        let user: AuthUser = expect_status(response, &[StatusCode::OK])
            .await?
            .json()
            .await?;

        Ok(VerifiedUser {
            display_name: user.user_name().unwrap_or_default().to_string(),
            id: UserId(user.id),
            email: user.email.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl RoomStore for SupabaseBackend {
    async fn create(
        &self,
        owner_id: &UserId,
        title: &str,
        is_private: bool,
    ) -> Result<NewRoom, UpstreamError> {
        let request = self.client.post(self.rest("rpc/create_room_with_owner")).json(&json!({
            "_owner_id": owner_id,
            "_title": title,
            "_is_private": is_private,
        }));
        let response = self.with_key(request, &self.anon_key).send().await?;
        let created: CreatedRoom = expect_status(response, &[StatusCode::OK])
            .await?
            .json()
            .await?;

        Ok(NewRoom {
            room_id: RoomId(created.room_id),
            code: created.code,
        })
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<RoomRecord>, UpstreamError> {
        let request = self.client.get(self.rest("rooms")).query(&[
            ("code", format!("eq.{code}").as_str()),
            ("select", ROOM_COLUMNS),
            ("limit", "1"),
        ]);
        let response = self.with_service_key(request).send().await?;
        let rows: Vec<RoomRow> = expect_status(response, &[StatusCode::OK])
            .await?
            .json()
            .await?;

        Ok(rows.into_iter().next().map(|row| RoomRecord {
            room_id: RoomId(row.id),
            code: row.code,
            owner_id: UserId(row.owner_id),
            title: row.title,
            is_private: row.is_private,
            created_at: row.created_at,
        }))
    }
}

#[async_trait]
impl MembershipStore for SupabaseBackend {
    async fn upsert(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), UpstreamError> {
        let request = self
            .client
            .post(self.rest("room_members"))
            .header("Prefer", "resolution=ignore-duplicates")
            .json(&json!({
                "room_id": room_id,
                "account_id": user_id,
                "role": "member",
            }));
        let response = self.with_service_key(request).send().await?;
        expect_status(response, &[StatusCode::CREATED, StatusCode::NO_CONTENT]).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SupabaseBackend {
    async fn insert(
        &self,
        room_id: &RoomId,
        sender_id: &UserId,
        body: &str,
    ) -> Result<StoredMessage, UpstreamError> {
        let request = self
            .client
            .post(self.rest("messages"))
            .header("Prefer", "return=representation")
            .json(&json!({
                "room_id": room_id,
                "sender_id": sender_id,
                "body": body,
            }));
        let response = self.with_service_key(request).send().await?;
        let rows: Vec<MessageRow> = expect_status(response, &[StatusCode::CREATED])
            .await?
            .json()
            .await?;

        rows.into_iter()
            .next()
            .map(StoredMessage::from)
            .ok_or_else(|| UpstreamError::Decode("message insert returned no rows".into()))
    }

    async fn list(&self, query: &HistoryQuery) -> Result<Vec<StoredMessage>, UpstreamError> {
        let mut params: Vec<(&str, String)> = vec![
            ("room_id", format!("eq.{}", query.room_id)),
            ("select", MESSAGE_COLUMNS.to_string()),
            ("order", "sent_at.desc,id.desc".to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(before) = query.before_id {
            params.push(("id", format!("lt.{before}")));
        }
        if !query.include_system {
            params.push(("type", "eq.text".to_string()));
        }

        let request = self.client.get(self.rest("messages")).query(&params);
        let response = self.with_service_key(request).send().await?;
        let rows: Vec<MessageRow> = expect_status(response, &[StatusCode::OK])
            .await?
            .json()
            .await?;
        Ok(rows.into_iter().map(StoredMessage::from).collect())
    }
}

#[async_trait]
impl DisplayNames for SupabaseBackend {
    async fn display_name(&self, user_id: &UserId) -> Result<Option<String>, UpstreamError> {
        let request = self
            .client
            .get(format!("{}/auth/v1/admin/users/{}", self.base_url, user_id));
        let response = self.with_service_key(request).send().await?;
        let user: AuthUser = expect_status(response, &[StatusCode::OK])
            .await?
            .json()
            .await?;
        Ok(user.user_name().map(str::to_string))
    }
}
