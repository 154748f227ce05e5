use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound messages buffered per viewer before it is considered dead
pub const VIEWER_CHANNEL_CAPACITY: usize = 32;

/// Receiving half handed to the connection task of a viewer
pub type ViewerReceiver = mpsc::Receiver<Arc<str>>;

/// In-memory registry of connected live viewers
#[derive(Clone, Default)]
pub struct ViewerRegistry {
    viewers: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Arc<str>>>>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new viewer and return its id plus the payload stream
    pub fn register(&self) -> (Uuid, ViewerReceiver) {
        let (tx, rx) = mpsc::channel(VIEWER_CHANNEL_CAPACITY);
        let id = Uuid::new_v4();
        self.viewers.write().insert(id, tx);
        (id, rx)
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        self.viewers.write().remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.viewers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.read().is_empty()
    }

    /// Send a payload to every viewer.
    ///
    /// A viewer whose channel is closed or backed up is removed and never
    /// retried; the rest still receive this payload. Returns the number of
    /// viewers the payload was queued for.
    pub fn broadcast(&self, payload: Arc<str>) -> usize {
        let targets: Vec<(Uuid, mpsc::Sender<Arc<str>>)> = self
            .viewers
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Closed(_)) => {
                    debug!("Viewer {} disconnected, dropping", id);
                    dead.push(id);
                }
                Err(TrySendError::Full(_)) => {
                    warn!("Viewer {} is not keeping up, dropping", id);
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut viewers = self.viewers.write();
            for id in dead {
                viewers.remove(&id);
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_viewers() {
        let registry = ViewerRegistry::new();
        let (_a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        assert_eq!(registry.broadcast(Arc::from("hello")), 2);
        assert_eq!(&*rx_a.recv().await.unwrap(), "hello");
        assert_eq!(&*rx_b.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_failed_viewer_is_removed_others_still_receive() {
        let registry = ViewerRegistry::new();
        let (_dead, rx_dead) = registry.register();
        let (_alive, mut rx_alive) = registry.register();
        drop(rx_dead);

        assert_eq!(registry.broadcast(Arc::from("tick")), 1);
        assert_eq!(registry.count(), 1);
        assert_eq!(&*rx_alive.recv().await.unwrap(), "tick");
    }

    #[test]
    fn test_slow_viewer_is_removed() {
        let registry = ViewerRegistry::new();
        let (_id, _rx) = registry.register();
        for _ in 0..VIEWER_CHANNEL_CAPACITY {
            assert_eq!(registry.broadcast(Arc::from("x")), 1);
        }
        assert_eq!(registry.broadcast(Arc::from("x")), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove() {
        let registry = ViewerRegistry::new();
        let (id, _rx) = registry.register();
        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert_eq!(registry.count(), 0);
    }
}
