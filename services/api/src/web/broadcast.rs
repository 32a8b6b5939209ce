//! services/api/src/web/broadcast.rs
//!
//! The live broadcast channel: an encapsulated registry of WebSocket
//! subscribers with synchronized add/remove/iterate. Delivery is best-effort
//! and non-blocking per recipient; a subscriber whose channel is closed or
//! full is dropped from the registry and never blocks the others.

use crate::web::protocol::ServerMessage;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-subscriber buffer. A client that falls this many events behind is
/// treated as dead and dropped rather than ever blocking a broadcast.
const SUBSCRIBER_BUFFER: usize = 32;

/// Manages all active notification subscribers.
///
/// Broadcast snapshots the subscriber set before delivering, so subscribers
/// added or removed mid-broadcast never invalidate the iteration.
#[derive(Default)]
pub struct NotificationBroadcaster {
    subscribers: RwLock<HashMap<Uuid, mpsc::Sender<ServerMessage>>>,
}

impl NotificationBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber.
    ///
    /// Returns the subscriber's id and the receiving end of its channel; the
    /// caller forwards received messages to the client's socket.
    pub async fn subscribe(&self) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.write().await.insert(id, tx);
        debug!(subscriber_id = %id, "Notification subscriber connected");
        (id, rx)
    }

    /// Removes a subscriber when its client disconnects.
    pub async fn unsubscribe(&self, id: Uuid) {
        self.subscribers.write().await.remove(&id);
        debug!(subscriber_id = %id, "Notification subscriber disconnected");
    }

    /// Current number of active subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Delivers `message` to every current subscriber.
    ///
    /// Each delivery result is handled explicitly: a failed send (closed or
    /// full channel) removes that subscriber and delivery to the rest
    /// continues. Never returns an error; the number of successful
    /// deliveries is returned for logging.
    pub async fn broadcast(&self, message: ServerMessage) -> usize {
        // Snapshot the set so delivery never holds the lock and
        // iteration-while-mutating cannot occur.
        let snapshot: Vec<(Uuid, mpsc::Sender<ServerMessage>)> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();

        for (id, tx) in snapshot {
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(subscriber_id = %id, "Dropping notification subscriber: {}", e);
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in dead {
                subscribers.remove(&id);
            }
        }

        delivered
    }
}
