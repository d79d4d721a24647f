use musick_shared::protocol::{
    wire_timestamp, ChatMessage, FetchMessagesRequest, HistoryEntry, MessagePage,
    SendMessageRequest,
};
use musick_shared::{Command, Frame, MessageId, RoomId};
use tracing::debug;

use super::{gate, success, Connection};
use crate::error::CommandError;
use crate::history::HistoryPager;
use crate::state::AppState;

/// 301: persist, subscribe the sender, fan out as 302, then reply.
pub(super) async fn send_message(
    state: &AppState,
    conn: &Connection,
    frame: &Frame,
) -> Result<Frame, CommandError> {
    let identity = gate::authenticated(&state.sessions, conn.key).await?;
    let req: SendMessageRequest = gate::payload(frame)?;
    gate::required(
        &[req.user_id.as_str(), req.room_id.as_str(), req.body.as_str()],
        "user_id, room_id, and body are required",
    )?;
    gate::same_user(&identity, &req.user_id)?;

    let room_id = RoomId::new(req.room_id);
    let saved = state
        .backend
        .messages
        .insert(&room_id, &identity.user_id, &req.body)
        .await
        .map_err(CommandError::upstream("failed to send message"))?;

    state.rooms.join(&saved.room_id, conn.key, &conn.outbox).await;

    let message = ChatMessage {
        id: saved.id,
        room_id: saved.room_id.to_string(),
        sender_id: saved.sender_id.to_string(),
        sender_name: identity.display_name.clone(),
        body: saved.body,
        sent_at: wire_timestamp(&saved.sent_at),
    };

    let delivery = success(
        Command::MessageBroadcast.id(),
        "message delivered",
        message.clone(),
    );
    let exclude = (!state.config.broadcast_to_sender).then_some(conn.key);
    let recipients = state.rooms.broadcast(&saved.room_id, delivery, exclude).await;
    debug!(session = %conn.key, room = %saved.room_id, id = saved.id, recipients, "Message broadcast");

    Ok(success(frame.id, "message sent", message))
}

/// 310: one page of history, newest first.
pub(super) async fn fetch_messages(
    state: &AppState,
    conn: &Connection,
    frame: &Frame,
) -> Result<Frame, CommandError> {
    let identity = gate::authenticated(&state.sessions, conn.key).await?;
    let req: FetchMessagesRequest = gate::payload(frame)?;
    gate::required(&[req.room_id.as_str(), req.user_id.as_str()], "room_id and user_id are required")?;
    gate::same_user(&identity, &req.user_id)?;

    let before_id = parse_cursor(&req.before_id)?;
    let pager = HistoryPager::new(
        state.backend.messages.clone(),
        state.backend.names.clone(),
    );
    let page = pager
        .list(&RoomId::new(req.room_id), before_id, req.limit, req.include_system)
        .await
        .map_err(CommandError::upstream("failed to fetch messages"))?;

    let cursor = page.next_cursor().map(|last| (last.id, last.sent_at));
    let messages = page
        .messages
        .into_iter()
        .map(|entry| HistoryEntry {
            id: entry.message.id,
            room_id: entry.message.room_id.to_string(),
            sender_id: entry.message.sender_id.to_string(),
            sender_name: entry.sender_name.unwrap_or_default(),
            body: entry.message.body,
            created_at: wire_timestamp(&entry.message.sent_at),
        })
        .collect();

    Ok(success(
        frame.id,
        "messages fetched",
        MessagePage {
            messages,
            has_more: page.has_more,
            next_before_id: cursor.map(|(id, _)| id.to_string()),
            next_before_created_at: cursor.map(|(_, at)| wire_timestamp(&at)),
        },
    ))
}

/// Empty means "newest page".
fn parse_cursor(raw: &str) -> Result<Option<MessageId>, CommandError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| CommandError::Validation("before_id must be a numeric message id"))
}
