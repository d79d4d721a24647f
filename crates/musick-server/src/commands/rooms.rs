use musick_shared::protocol::{wire_timestamp, CreateRoomRequest, JoinRoomRequest, RoomCreated, RoomJoined};
use musick_shared::{Frame, UserId};
use tracing::info;

use super::{gate, success, Connection};
use crate::error::CommandError;
use crate::state::AppState;

/// 201: create a room owned by the caller. The creator is not subscribed.
pub(super) async fn create_room(
    state: &AppState,
    conn: &Connection,
    frame: &Frame,
) -> Result<Frame, CommandError> {
    let identity = gate::authenticated(&state.sessions, conn.key).await?;
    let req: CreateRoomRequest = gate::payload(frame)?;
    gate::required(&[req.room_name.as_str()], "room_name is required")?;
    gate::required(&[req.user_id.as_str()], "user_id is required")?;
    gate::same_user(&identity, &req.user_id)?;

    let room = state
        .backend
        .rooms
        .create(&UserId::new(req.user_id), req.room_name.as_str(), req.is_private)
        .await
        .map_err(CommandError::upstream("failed to create room"))?;

    info!(session = %conn.key, user = %identity.user_id, room = %room.room_id, code = %room.code, "Room created");

    Ok(success(
        frame.id,
        "room created successfully",
        RoomCreated {
            room_id: room.room_id.to_string(),
            room_code: room.code,
            room_name: req.room_name,
            is_private: req.is_private,
        },
    ))
}

/// 202: look the room up by code, persist the membership, then subscribe.
pub(super) async fn join_room(
    state: &AppState,
    conn: &Connection,
    frame: &Frame,
) -> Result<Frame, CommandError> {
    let identity = gate::authenticated(&state.sessions, conn.key).await?;
    let req: JoinRoomRequest = gate::payload(frame)?;
    gate::required(&[req.code.as_str(), req.user_id.as_str()], "code and user_id are required")?;
    gate::same_user(&identity, &req.user_id)?;

    let room = state
        .backend
        .rooms
        .find_by_code(&req.code)
        .await
        .map_err(CommandError::upstream("failed to join room"))?
        .ok_or(CommandError::RoomNotFound)?;

    state
        .backend
        .members
        .upsert(&room.room_id, &identity.user_id)
        .await
        .map_err(CommandError::upstream("failed to join room"))?;

    state.rooms.join(&room.room_id, conn.key, &conn.outbox).await;
    info!(session = %conn.key, user = %identity.user_id, room = %room.room_id, "Joined room");

    Ok(success(
        frame.id,
        "joined room",
        RoomJoined {
            room_id: room.room_id.to_string(),
            code: room.code,
            title: room.title,
            owner_id: room.owner_id.to_string(),
            is_private: room.is_private,
            created_at: wire_timestamp(&room.created_at),
        },
    ))
}
