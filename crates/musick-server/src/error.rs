use musick_shared::{Command, SessionKey};
use musick_store::StoreError;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Failure of an external collaborator (identity provider or store).
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Credentials rejected")]
    Rejected,

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

impl From<StoreError> for UpstreamError {
    fn from(e: StoreError) -> Self {
        UpstreamError::Storage(e.to_string())
    }
}

impl From<tokio::task::JoinError> for UpstreamError {
    fn from(e: tokio::task::JoinError) -> Self {
        UpstreamError::Storage(format!("blocking task failed: {e}"))
    }
}

/// Why a command was rejected. `Display` is the reason sent to the client.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid request format")]
    InvalidFormat,

    #[error("{0}")]
    Validation(&'static str),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("authentication failed")]
    AuthenticationFailed(#[source] UpstreamError),

    #[error("user_id mismatch")]
    IdentityMismatch,

    #[error("room not found")]
    RoomNotFound,

    #[error("rate limit exceeded")]
    RateLimited,

    /// `context` is the generic reason shown to the client; details stay in the log.
    #[error("{context}")]
    Upstream {
        context: &'static str,
        #[source]
        source: UpstreamError,
    },
}

impl CommandError {
    pub fn upstream(context: &'static str) -> impl FnOnce(UpstreamError) -> Self {
        move |source| CommandError::Upstream { context, source }
    }

    /// Log the rejection at a level matching its severity.
    pub fn log(&self, command: Command, session: SessionKey) {
        match self {
            CommandError::IdentityMismatch => {
                warn!(%session, %command, "user_id does not match authenticated session");
            }
            CommandError::AuthenticationFailed(source) => {
                warn!(%session, %command, error = %source, "token verification failed");
            }
            CommandError::Upstream { context, source } => {
                error!(%session, %command, error = %source, "{context}");
            }
            CommandError::RateLimited => {
                warn!(%session, %command, "rate limit exceeded");
            }
            other => {
                debug!(%session, %command, reason = %other, "command rejected");
            }
        }
    }
}

/// Startup / wiring errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
