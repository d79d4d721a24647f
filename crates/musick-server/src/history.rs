//! Cursor pagination over a room's message history.

use std::collections::HashMap;
use std::sync::Arc;

use musick_shared::constants::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
use musick_shared::{MessageId, RoomId, UserId};
use tracing::debug;

use crate::error::UpstreamError;
use crate::ports::{DisplayNames, HistoryQuery, MessageStore, StoredMessage};

/// A message plus its sender's resolved display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedMessage {
    pub message: StoredMessage,
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    pub messages: Vec<PagedMessage>,
    pub has_more: bool,
}

impl HistoryPage {
    /// Id to pass as `before_id` for the next older page.
    pub fn next_cursor(&self) -> Option<&StoredMessage> {
        self.messages.last().map(|m| &m.message)
    }
}

/// Page size actually used for a requested `limit`.
pub fn clamp_limit(limit: i64) -> u32 {
    if limit <= 0 {
        DEFAULT_HISTORY_LIMIT
    } else {
        limit.min(MAX_HISTORY_LIMIT as i64) as u32
    }
}

pub struct HistoryPager {
    messages: Arc<dyn MessageStore>,
    names: Arc<dyn DisplayNames>,
}

impl HistoryPager {
    pub fn new(messages: Arc<dyn MessageStore>, names: Arc<dyn DisplayNames>) -> Self {
        Self { messages, names }
    }

    /// Up to `limit` messages of `room_id` older than `before_id`, newest first.
    pub async fn list(
        &self,
        room_id: &RoomId,
        before_id: Option<MessageId>,
        limit: i64,
        include_system: bool,
    ) -> Result<HistoryPage, UpstreamError> {
        let page_size = clamp_limit(limit);
        let query = HistoryQuery {
            room_id: room_id.clone(),
            before_id,
            limit: page_size + 1,
            include_system,
        };

        let mut rows = self.messages.list(&query).await?;
        let has_more = rows.len() > page_size as usize;
        rows.truncate(page_size as usize);

        // One lookup per distinct sender, failures included.
        let mut resolved: HashMap<UserId, Option<String>> = HashMap::new();
        let mut messages = Vec::with_capacity(rows.len());
        for message in rows {
            let sender_name = match resolved.get(&message.sender_id) {
                Some(name) => name.clone(),
                None => {
                    let name = match self.names.display_name(&message.sender_id).await {
                        Ok(name) => name.filter(|n| !n.is_empty()),
                        Err(e) => {
                            debug!(user = %message.sender_id, error = %e, "Display name lookup failed");
                            None
                        }
                    };
                    resolved.insert(message.sender_id.clone(), name.clone());
                    name
                }
            };
            messages.push(PagedMessage {
                message,
                sender_name,
            });
        }

        Ok(HistoryPage { messages, has_more })
    }
}
