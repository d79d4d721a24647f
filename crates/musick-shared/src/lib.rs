//! # musick-shared
//!
//! Types shared by the musick relay and its clients: the numeric command
//! table, JSON request/response payloads, the length-prefixed frame codec and
//! the identifier newtypes used throughout the workspace.

pub mod constants;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use frame::{Frame, FrameCodec};
pub use protocol::Command;
pub use types::{MessageId, MessageKind, RoomId, SessionKey, UserId};
