//! Room subscriber index and broadcast fan-out.
//!
//! Tracks which live sessions receive deliveries for which rooms. This is
//! ephemeral presence: it starts empty and only grows from joins and sends on
//! live connections. Durable membership lives in the store.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use musick_shared::{Frame, RoomId, SessionKey};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Outbound queue of one connection, drained by its writer task.
pub type Outbox = mpsc::Sender<Frame>;

#[derive(Default)]
struct Index {
    /// room -> subscribers and their queues
    subscribers: HashMap<RoomId, HashMap<SessionKey, Outbox>>,
    /// session -> rooms it is subscribed to
    memberships: HashMap<SessionKey, HashSet<RoomId>>,
}

#[derive(Clone, Default)]
pub struct RoomIndex {
    index: Arc<RwLock<Index>>,
}

impl RoomIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `session` to `room`. Returns `false` if it already was.
    pub async fn join(&self, room: &RoomId, session: SessionKey, outbox: &Outbox) -> bool {
        let mut index = self.index.write().await;
        let subscribers = index.subscribers.entry(room.clone()).or_default();
        if subscribers.contains_key(&session) {
            return false;
        }
        subscribers.insert(session, outbox.clone());
        let count = subscribers.len();
        index
            .memberships
            .entry(session)
            .or_default()
            .insert(room.clone());

        info!(%room, %session, subscribers = count, "Session joined room");
        true
    }

    /// Unsubscribe `session` from every room it is in. Safe to call repeatedly.
    ///
    /// Cost is proportional to the session's own rooms via the reverse index.
    pub async fn leave_all(&self, session: SessionKey) -> usize {
        let mut index = self.index.write().await;
        let Some(rooms) = index.memberships.remove(&session) else {
            return 0;
        };

        for room in &rooms {
            let now_empty = match index.subscribers.get_mut(room) {
                Some(subscribers) => {
                    subscribers.remove(&session);
                    subscribers.is_empty()
                }
                None => false,
            };
            if now_empty {
                index.subscribers.remove(room);
                debug!(%room, "Removed empty room");
            }
        }

        debug!(%session, rooms = rooms.len(), "Session left all rooms");
        rooms.len()
    }

    /// Enqueue `frame` for every subscriber of `room` except `exclude`.
    ///
    /// The subscriber set is copied under the read lock; queues are fed after
    /// it is released. A full or closed queue drops the frame for that
    /// recipient only. Returns how many recipients it was enqueued for.
    pub async fn broadcast(
        &self,
        room: &RoomId,
        frame: Frame,
        exclude: Option<SessionKey>,
    ) -> usize {
        let targets: Vec<(SessionKey, Outbox)> = {
            let index = self.index.read().await;
            match index.subscribers.get(room) {
                Some(subscribers) => subscribers
                    .iter()
                    .filter(|(key, _)| Some(**key) != exclude)
                    .map(|(key, tx)| (*key, tx.clone()))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (target, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(%room, %target, "Dropping broadcast for slow session");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(%room, %target, "Dropping broadcast for closed session");
                }
            }
        }
        delivered
    }

    #[cfg(test)]
    pub(crate) async fn subscriber_count(&self, room: &RoomId) -> usize {
        self.index
            .read()
            .await
            .subscribers
            .get(room)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) async fn is_subscribed(&self, room: &RoomId, session: SessionKey) -> bool {
        self.index
            .read()
            .await
            .subscribers
            .get(room)
            .is_some_and(|s| s.contains_key(&session))
    }

    /// Rooms with at least one live subscriber.
    pub async fn room_count(&self) -> usize {
        self.index.read().await.subscribers.len()
    }
}
