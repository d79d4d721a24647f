//! Concrete implementations of the collaborator ports.

pub mod sqlite;
pub mod supabase;

use std::sync::Arc;

use tracing::info;

use crate::config::{BackendKind, ServerConfig};
use crate::error::ServerError;
use crate::ports::Backend;

pub use sqlite::SqliteBackend;
pub use supabase::SupabaseBackend;

/// Build the backend selected by `config`.
pub fn connect(config: &ServerConfig) -> Result<Backend, ServerError> {
    config.validate()?;
    match config.backend {
        BackendKind::Supabase => {
            let supabase = SupabaseBackend::from_config(config)?;
            info!(url = %config.supabase_url, "Using Supabase backend");
            Ok(Backend::uniform(BackendKind::Supabase.as_str(), Arc::new(supabase)))
        }
        BackendKind::Sqlite => {
            let sqlite = SqliteBackend::open(config.database_path.as_deref())?;
            info!(path = ?config.database_path, "Using SQLite backend");
            Ok(Backend::uniform(BackendKind::Sqlite.as_str(), Arc::new(sqlite)))
        }
    }
}
