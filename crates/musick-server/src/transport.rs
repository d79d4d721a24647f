//! TCP listener and per-connection pumps.
//!
//! Each connection gets a reader loop that runs commands one at a time and a
//! writer task draining its bounded outbound queue. Replies are enqueued with
//! back-pressure; broadcasts go through `RoomIndex::broadcast`, which never
//! waits on a queue.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use musick_shared::constants::OUTBOUND_QUEUE_CAPACITY;
use musick_shared::{Frame, FrameCodec, SessionKey};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::commands::{CommandRouter, Connection};
use crate::state::AppState;

const WRITER_DRAIN: Duration = Duration::from_secs(5);

/// Hands out session keys; never reuses one within the process.
#[derive(Debug, Default)]
pub struct SessionKeys(AtomicU64);

impl SessionKeys {
    pub fn next(&self) -> SessionKey {
        SessionKey(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Accept connections on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let router = CommandRouter::new(state);
    let keys = Arc::new(SessionKeys::default());
    info!(addr = %listener.local_addr()?, "Command listener ready");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "Accept failed");
                continue;
            }
        };
        let key = keys.next();
        let router = router.clone();
        tokio::spawn(async move {
            handle_connection(stream, peer, key, router).await;
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    key: SessionKey,
    router: CommandRouter,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(session = %key, error = %e, "Could not set TCP_NODELAY");
    }
    let state = router.state().clone();
    let max_frame = state.config.max_frame_size;

    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, FrameCodec::new(max_frame));
    let mut sink = FramedWrite::new(write_half, FrameCodec::new(max_frame));

    let (outbox, mut queue) = mpsc::channel::<Frame>(OUTBOUND_QUEUE_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(e) = sink.send(frame).await {
                debug!(session = %key, error = %e, "Write failed");
                break;
            }
        }
    });

    state.sessions.open(key, Some(peer)).await;
    info!(session = %key, %peer, "Client connected");

    let conn = Connection {
        key,
        peer,
        outbox,
    };

    loop {
        tokio::select! {
            next = frames.next() => match next {
                Some(Ok(frame)) => {
                    if let Some(reply) = router.dispatch(&conn, frame).await {
                        if conn.outbox.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(session = %key, %peer, error = %e, "Closing connection on protocol error");
                    break;
                }
                None => break,
            },
            _ = conn.outbox.closed() => {
                debug!(session = %key, "Writer stopped");
                break;
            }
        }
    }

    // Teardown: subscriptions first, then the session record.
    let rooms = state.rooms.leave_all(key).await;
    state.sessions.remove(key).await;
    drop(conn);
    // Give the writer a moment to flush what is already queued.
    let abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN, writer).await.is_err() {
        debug!(session = %key, "Writer did not drain in time");
        abort.abort();
    }
    info!(session = %key, %peer, rooms, "Client disconnected");
}
