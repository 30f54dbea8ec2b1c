//! Live-reload subscriber registry

use futures_util::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Token pushed to browsers after a rebuild
pub const RELOAD_TOKEN: &str = "reload";

type Subscribers = HashMap<u64, UnboundedSender<String>>;

/// Shared registry of connected reload clients.
///
/// Cloning is cheap; all clones share one registry.
#[derive(Debug, Clone, Default)]
pub struct ReloadHub {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl ReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // The map stays consistent even if a holder panicked
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new client
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().insert(id, sender);
        tracing::debug!(id, "reload subscriber connected");

        Subscription {
            id,
            hub: self.clone(),
            receiver,
        }
    }

    /// Send `token` to every subscriber.
    ///
    /// Returns the number of subscribers reached; closed channels are dropped.
    pub fn broadcast(&self, token: &str) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|_, sender| sender.send(token.to_string()).is_ok());
        tracing::debug!(token, reached = subscribers.len(), "broadcast");
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn unsubscribe(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            tracing::debug!(id, "reload subscriber disconnected");
        }
    }
}

/// One client's reload feed; unregisters itself when dropped
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    hub: ReloadHub,
    receiver: UnboundedReceiver<String>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next token
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Next queued token, without waiting
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let hub = ReloadHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        assert_eq!(hub.broadcast(RELOAD_TOKEN), 2);
        assert_eq!(first.recv().await.as_deref(), Some(RELOAD_TOKEN));
        assert_eq!(second.recv().await.as_deref(), Some(RELOAD_TOKEN));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let hub = ReloadHub::new();
        let subscription = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.broadcast(RELOAD_TOKEN), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let hub = ReloadHub::new();
        let a = hub.subscribe();
        let b = hub.clone().subscribe();
        assert_ne!(a.id(), b.id());
        assert_eq!(hub.subscriber_count(), 2);
    }
}
