//! Server configuration loaded from environment variables.
//!
//! Everything has a default so a local SQLite relay starts with nothing set.
//! Invalid values are logged and replaced by the default.

use std::net::SocketAddr;
use std::path::PathBuf;

use musick_shared::constants::{DEFAULT_HTTP_PORT, DEFAULT_MAX_FRAME_SIZE, DEFAULT_TCP_PORT};

use crate::error::ServerError;

/// Which collaborator implementation backs the ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Supabase,
    Sqlite,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Supabase => "supabase",
            BackendKind::Sqlite => "sqlite",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" => Some(BackendKind::Supabase),
            "sqlite" => Some(BackendKind::Sqlite),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    /// TCP command listener.
    /// Env: `LISTEN_ADDR`
    /// Default: `0.0.0.0:5896`
    pub listen_addr: SocketAddr,

    /// Socket address for the HTTP status API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Largest accepted frame payload in bytes.
    /// Env: `MAX_FRAME_SIZE`
    pub max_frame_size: usize,

    /// Whether the sender of a message also receives its 302 delivery.
    /// Env: `BROADCAST_TO_SENDER` (true/false, yes/no, on/off, 1/0)
    /// Default: `true`
    pub broadcast_to_sender: bool,

    /// Env: `BACKEND` (`supabase` | `sqlite`)
    /// Default: `supabase`
    pub backend: BackendKind,

    /// Env: `SUPABASE_URL`
    pub supabase_url: String,

    /// Key used for token verification and RPC calls.
    /// Env: `SUPABASE_ANON_KEY`
    pub supabase_anon_key: String,

    /// Key used for REST and admin lookups; falls back to the anon key.
    /// Env: `SUPABASE_SERVICE_KEY`
    pub supabase_service_key: Option<String>,

    /// SQLite file for the `sqlite` backend. `None` uses the platform data dir.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Sustained commands per second allowed per client IP. Must be positive.
    /// Env: `COMMAND_RATE`
    pub command_rate: f64,

    /// Burst size of the per-IP command bucket. At least 1.
    /// Env: `COMMAND_BURST`
    pub command_burst: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: ([0, 0, 0, 0], DEFAULT_TCP_PORT).into(),
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            broadcast_to_sender: true,
            backend: BackendKind::Supabase,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: None,
            database_path: None,
            command_rate: 20.0,
            command_burst: 60.0,
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("LISTEN_ADDR") {
            parse_into(&mut config.listen_addr, "LISTEN_ADDR", &addr);
        }

        if let Some(addr) = lookup("HTTP_ADDR") {
            parse_into(&mut config.http_addr, "HTTP_ADDR", &addr);
        }

        if let Some(val) = lookup("MAX_FRAME_SIZE") {
            parse_into(&mut config.max_frame_size, "MAX_FRAME_SIZE", &val);
        }

        if let Some(val) = lookup("BROADCAST_TO_SENDER") {
            match parse_bool(&val) {
                Some(flag) => config.broadcast_to_sender = flag,
                None => tracing::warn!(value = %val, "Invalid BROADCAST_TO_SENDER, using default"),
            }
        }

        if let Some(val) = lookup("BACKEND") {
            match BackendKind::parse(&val) {
                Some(kind) => config.backend = kind,
                None => tracing::warn!(value = %val, "Unknown BACKEND, using default"),
            }
        }

        if let Some(url) = lookup("SUPABASE_URL") {
            config.supabase_url = url.trim_end_matches('/').to_string();
        }

        if let Some(key) = lookup("SUPABASE_ANON_KEY") {
            config.supabase_anon_key = key;
        }

        if let Some(key) = lookup("SUPABASE_SERVICE_KEY") {
            if !key.is_empty() {
                config.supabase_service_key = Some(key);
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("COMMAND_RATE") {
            parse_bounded(&mut config.command_rate, "COMMAND_RATE", &val, |v| v > 0.0);
        }

        if let Some(val) = lookup("COMMAND_BURST") {
            parse_bounded(&mut config.command_burst, "COMMAND_BURST", &val, |v| v >= 1.0);
        }

        config
    }

    /// Key for REST and admin calls.
    pub fn service_key(&self) -> &str {
        self.supabase_service_key
            .as_deref()
            .unwrap_or(&self.supabase_anon_key)
    }

    /// Reject combinations the server cannot start with.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.backend == BackendKind::Supabase && self.supabase_url.is_empty() {
            return Err(ServerError::Config(
                "BACKEND=supabase requires SUPABASE_URL".into(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(ServerError::Config("MAX_FRAME_SIZE must be positive".into()));
        }
        Ok(())
    }
}

// Keys stay out of logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen_addr", &self.listen_addr)
            .field("http_addr", &self.http_addr)
            .field("max_frame_size", &self.max_frame_size)
            .field("broadcast_to_sender", &self.broadcast_to_sender)
            .field("backend", &self.backend)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &redacted(&self.supabase_anon_key))
            .field(
                "supabase_service_key",
                &self.supabase_service_key.as_deref().map(redacted),
            )
            .field("database_path", &self.database_path)
            .field("command_rate", &self.command_rate)
            .field("command_burst", &self.command_burst)
            .finish()
    }
}

fn redacted(key: &str) -> &'static str {
    if key.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

fn parse_into<T: std::str::FromStr>(slot: &mut T, name: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(value) => *slot = value,
        Err(_) => tracing::warn!(value = %raw, "Invalid {name}, using default"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// NaN and infinities always keep the default.
fn parse_bounded(slot: &mut f64, name: &str, raw: &str, accept: impl Fn(f64) -> bool) {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && accept(value) => *slot = value,
        _ => tracing::warn!(value = %raw, "Invalid {name}, using default"),
    }
}
