use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use spark_types::events::GatewayEvent;

/// Broadcast buffer per receiver. A receiver that falls further behind than
/// this observes `RecvError::Lagged`.
const DEFAULT_CAPACITY: usize = 1024;

/// Fans out gateway events to every subscriber in the process.
///
/// The dispatcher is the realtime transport: it does not filter. Consumers
/// (WebSocket connections, in-process subscriptions) pick the events they
/// care about.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    broadcast_tx: broadcast::Sender<GatewayEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(DispatcherInner { broadcast_tx }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all current subscribers. Returns how many
    /// receivers it was queued for; zero is not an error.
    pub fn broadcast(&self, event: GatewayEvent) -> usize {
        match self.inner.broadcast_tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                trace!("Broadcast with no subscribers");
                0
            }
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.inner.broadcast_tx.receiver_count()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
