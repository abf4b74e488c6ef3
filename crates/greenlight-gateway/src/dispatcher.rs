use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use uuid::Uuid;

use greenlight_types::events::RealtimeEvent;

/// Routes realtime events to connected clients.
///
/// Light-scoped events go out on a single broadcast channel and every
/// connection filters them against its own subscriptions. Per-user events
/// (notifications, a user's own RSVP changes) go through targeted channels.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<RealtimeEvent>,

    /// user_id -> [(conn_id, sender)]; one entry per open socket
    user_channels: RwLock<HashMap<Uuid, Vec<(Uuid, mpsc::UnboundedSender<RealtimeEvent>)>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish a light-scoped event. Dropped silently when nobody listens.
    pub fn broadcast(&self, event: RealtimeEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a targeted channel for one connection. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<RealtimeEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push((conn_id, tx));
        (conn_id, rx)
    }

    /// Drop the channel belonging to `conn_id`, leaving the user's other sockets alone.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.retain(|(cid, _)| *cid != conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Send an event to every open connection of `user_id`.
    pub async fn send_to_user(&self, user_id: Uuid, event: RealtimeEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some(conns) = channels.get(&user_id) {
            for (_, tx) in conns {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }
}
