//! # musick-server
//!
//! Real-time relay for room-based chat.
//!
//! Clients hold a TCP connection, authenticate with an externally issued
//! token, create or join rooms by code, send messages and page through
//! history. The crate provides:
//! - **Session registry** answering who each live connection is
//! - **Room index** of live subscribers with best-effort broadcast fan-out
//! - **Command router** dispatching numeric command ids through the same gates
//! - **History pager** with a stable message-id cursor
//! - **Backends** for the external collaborators (Supabase over HTTP, or a
//!   local SQLite database)
//! - **HTTP status API** and per-IP command rate limiting

pub mod api;
pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod history;
pub mod ports;
pub mod rate_limit;
pub mod rooms;
pub mod session;
pub mod state;
pub mod transport;

pub use commands::{CommandRouter, Connection};
pub use config::{BackendKind, ServerConfig};
pub use error::{CommandError, ServerError, UpstreamError};
pub use ports::Backend;
pub use rooms::RoomIndex;
pub use session::{Identity, SessionRegistry};
pub use state::AppState;
