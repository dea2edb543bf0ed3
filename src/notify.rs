use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::metrics::{EVENTS_PUBLISHED, WS_SUBSCRIBERS};

/// Events a lagging subscriber may fall behind by before it skips ahead.
pub const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub event: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

struct Registry {
    subscribers: DashMap<u64, DateTime<Utc>>,
    next_id: AtomicU64,
}

// Fire-and-forget fan-out to whoever is subscribed at publish time
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
    registry: Arc<Registry>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            registry: Arc::new(Registry {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Send `event` to everyone currently subscribed. Returns how many
    /// receivers got it; zero subscribers is not an error.
    pub fn publish(&self, event: &str, payload: Value) -> usize {
        EVENTS_PUBLISHED.inc();
        let delivered = self.tx.send(Notification::new(event, payload)).unwrap_or(0);
        debug!(event, delivered, "event published");
        delivered
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.tx.subscribe();
        self.registry.subscribers.insert(id, Utc::now());
        WS_SUBSCRIBERS.inc();
        info!(subscriber = id, "client connected");

        Subscription {
            id,
            rx,
            registry: Arc::clone(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.len()
    }

    pub fn is_subscribed(&self, id: u64) -> bool {
        self.registry.subscribers.contains_key(&id)
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Live subscription. Dropping it unregisters the subscriber.
pub struct Subscription {
    id: u64,
    rx: broadcast::Receiver<Notification>,
    registry: Arc<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Result<Notification, broadcast::error::RecvError> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some((id, connected_at)) = self.registry.subscribers.remove(&self.id) {
            WS_SUBSCRIBERS.dec();
            let connected_secs = (Utc::now() - connected_at).num_seconds();
            info!(subscriber = id, connected_secs, "client disconnected");
        }
    }
}
