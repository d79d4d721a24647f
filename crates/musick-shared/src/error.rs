use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Unknown command id: {0}")]
    UnknownCommand(u32),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
