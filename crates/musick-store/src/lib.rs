//! # musick-store
//!
//! Local SQLite persistence for the musick relay.
//!
//! Holds the durable side of the chat domain: rooms, room memberships,
//! message history and the local account table used as a development
//! identity provider. The crate exposes a synchronous `Database` handle that
//! wraps a `rusqlite::Connection`; async callers are expected to move work
//! onto a blocking thread.

pub mod accounts;
pub mod database;
pub mod members;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod rooms;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
