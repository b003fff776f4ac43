//! Room-scoped pub/sub.
//!
//! Each connection owns one outbound queue. Subscribing a connection to a
//! room adds its queue to the room's channel; a broadcast clones the event
//! into every queue on the channel. Queues whose receiver has gone away
//! are pruned on the next broadcast.

use std::collections::HashMap;

use bingohall_protocol::{Event, RoomCode};
use bingohall_transport::ConnectionId;
use tokio::sync::{RwLock, mpsc};

/// The sending half of a connection's outbound queue.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// A connection as the gateway sees it: an id and a queue to write to.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: ConnectionId,
    sender: EventSender,
}

impl Subscriber {
    /// Creates a subscriber and the receiver its writer task drains.
    pub fn new(id: ConnectionId) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { id, sender }, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues an event for this connection only. Returns `false` if the
    /// connection is gone.
    pub fn send(&self, event: Event) -> bool {
        self.sender.send(event).is_ok()
    }
}

#[derive(Default)]
pub struct RoomChannels {
    rooms: RwLock<HashMap<RoomCode, HashMap<ConnectionId, EventSender>>>,
}

impl RoomChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `subscriber` to `code`. Returns `false` if it was already there.
    pub async fn subscribe(&self, code: &RoomCode, subscriber: &Subscriber) -> bool {
        self.rooms
            .write()
            .await
            .entry(code.clone())
            .or_default()
            .insert(subscriber.id, subscriber.sender.clone())
            .is_none()
    }

    pub async fn unsubscribe(&self, code: &RoomCode, conn: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(channel) = rooms.get_mut(code) else {
            return false;
        };
        let removed = channel.remove(&conn).is_some();
        if channel.is_empty() {
            rooms.remove(code);
        }
        removed
    }

    /// Removes `conn` from every room and returns the rooms it was in.
    pub async fn unsubscribe_all(&self, conn: ConnectionId) -> Vec<RoomCode> {
        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();
        rooms.retain(|code, channel| {
            if channel.remove(&conn).is_some() {
                left.push(code.clone());
            }
            !channel.is_empty()
        });
        left.sort();
        left
    }

    pub async fn is_subscribed(&self, code: &RoomCode, conn: ConnectionId) -> bool {
        self.rooms
            .read()
            .await
            .get(code)
            .is_some_and(|channel| channel.contains_key(&conn))
    }

    pub async fn subscriber_count(&self, code: &RoomCode) -> usize {
        self.rooms.read().await.get(code).map_or(0, HashMap::len)
    }

    /// Sends `event` to every subscriber of `code`. Returns how many
    /// received it.
    pub async fn broadcast(&self, code: &RoomCode, event: Event) -> usize {
        let mut rooms = self.rooms.write().await;
        let Some(channel) = rooms.get_mut(code) else {
            return 0;
        };
        channel.retain(|_, sender| sender.send(event.clone()).is_ok());
        let delivered = channel.len();
        if channel.is_empty() {
            rooms.remove(code);
        }
        tracing::trace!(room_code = %code, delivered, "broadcast");
        delivered
    }
}
