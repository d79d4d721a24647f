/// Application name
pub const APP_NAME: &str = "musick";

/// Frame header: `data_len: u32 LE` followed by `id: u32 LE`
pub const FRAME_HEADER_LEN: usize = 8;

/// Maximum frame payload size in bytes (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Default TCP port for the command listener
pub const DEFAULT_TCP_PORT: u16 = 5896;

/// Default HTTP status API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Page size used when a history request carries no positive limit
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Upper bound on a single history page
pub const MAX_HISTORY_LIMIT: u32 = 200;

/// Per-connection outbound queue depth (replies + broadcasts)
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Length of generated room codes
pub const ROOM_CODE_LEN: usize = 6;
