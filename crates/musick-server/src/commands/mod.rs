//! Numeric command routing.
//!
//! Every request frame is dispatched by id to one handler. Handlers pass the
//! same gates in the same order (authentication, payload shape, required
//! fields, identity consistency) before calling into the room index, the
//! backend or the broadcast path. A rejected command changes nothing.

mod auth;
mod gate;
mod messages;
mod rooms;

use std::net::SocketAddr;

use musick_shared::protocol::{Failure, Reply};
use musick_shared::{Command, Frame, SessionKey};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::CommandError;
use crate::rooms::Outbox;
use crate::state::AppState;

/// The connection a command arrived on.
#[derive(Debug, Clone)]
pub struct Connection {
    pub key: SessionKey,
    pub peer: SocketAddr,
    pub outbox: Outbox,
}

#[derive(Clone)]
pub struct CommandRouter {
    state: AppState,
}

impl CommandRouter {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run one request. `None` means no reply is sent.
    pub async fn dispatch(&self, conn: &Connection, frame: Frame) -> Option<Frame> {
        let command = match Command::try_from(frame.id) {
            Ok(command) => command,
            Err(e) => {
                warn!(session = %conn.key, peer = %conn.peer, error = %e, "Dropping unrouted frame");
                return None;
            }
        };
        debug!(session = %conn.key, %command, request_id = frame.id, bytes = frame.data.len(), "Command received");

        let state = &self.state;
        let result = if !state.rate_limiter.check(conn.peer.ip()).await {
            Err(CommandError::RateLimited)
        } else {
            match command {
                Command::Echo => Ok(Frame::new(frame.id, frame.data.clone())),
                Command::Authenticate => auth::authenticate(state, conn, &frame).await,
                Command::CreateRoom => rooms::create_room(state, conn, &frame).await,
                Command::JoinRoom => rooms::join_room(state, conn, &frame).await,
                Command::SendMessage => messages::send_message(state, conn, &frame).await,
                Command::FetchMessages => messages::fetch_messages(state, conn, &frame).await,
                Command::MessageBroadcast => {
                    warn!(session = %conn.key, peer = %conn.peer, "Client sent a server-only command");
                    return None;
                }
            }
        };

        Some(match result {
            Ok(reply) => reply,
            Err(err) => {
                err.log(command, conn.key);
                failure(frame.id, &err)
            }
        })
    }
}

/// Encode a reply body; the envelope types always serialize.
fn encode<T: Serialize>(id: u32, value: &T) -> Frame {
    Frame::json(id, value).unwrap_or_else(|e| {
        error!(request_id = id, error = %e, "Failed to encode reply");
        Frame::new(id, &br#"{"success":false,"message":"internal error"}"#[..])
    })
}

fn success<T: Serialize>(id: u32, message: &str, body: T) -> Frame {
    encode(id, &Reply::ok(message, body))
}

fn failure(id: u32, err: &CommandError) -> Frame {
    encode(id, &Failure::new(err.to_string()))
}

#[cfg(test)]
mod tests;
