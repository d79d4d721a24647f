use std::sync::Arc;

use crate::config::ServerConfig;
use crate::ports::Backend;
use crate::rate_limit::RateLimiter;
use crate::rooms::RoomIndex;
use crate::session::SessionRegistry;

/// Process-wide services shared by every connection and the status API.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub rooms: RoomIndex,
    pub backend: Backend,
    pub rate_limiter: RateLimiter,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig, backend: Backend) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            rooms: RoomIndex::new(),
            backend,
            rate_limiter: RateLimiter::new(config.command_rate, config.command_burst),
            config: Arc::new(config),
        }
    }
}
