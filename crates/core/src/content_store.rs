//! In-process publish/subscribe for generated content pages.
//!
//! A tool invocation only knows the session identifier it runs under; viewer
//! connections subscribe under the same identifier. The store connects the
//! two without either side holding a reference to the other.
//!
//! Delivery is a single fan-out attempt at publish time. Pages published while
//! nobody is subscribed are dropped, and a late subscriber never sees earlier
//! pages.

use crate::page::ContentPage;
use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Pages are shared between every queue they are fanned out to.
pub type SharedPage = Arc<ContentPage>;

struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<SharedPage>,
}

/// The receiving end of one viewer's queue.
pub struct Subscription {
    id: u64,
    session_id: String,
    receiver: mpsc::UnboundedReceiver<SharedPage>,
}

impl Subscription {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Waits for the next page. Returns `None` once the store has dropped
    /// this queue's sender.
    pub async fn recv(&mut self) -> Option<SharedPage> {
        self.receiver.recv().await
    }

    /// Takes the next page if one is already queued.
    pub fn try_recv(&mut self) -> Option<SharedPage> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Default)]
pub struct ContentStore {
    /// Session ID -> queues in registration order
    subscribers: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh, unbounded queue under `session_id`.
    pub fn subscribe(&self, session_id: &str) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(session_id.to_string())
            .or_default()
            .push(Subscriber { id, sender });
        info!(session_id, subscription = id, "Content subscriber registered");

        Subscription {
            id,
            session_id: session_id.to_string(),
            receiver,
        }
    }

    /// Removes exactly this subscription. The session's entry is dropped once
    /// its last queue is gone.
    pub fn unsubscribe(&self, session_id: &str, subscription: &Subscription) {
        if let Some(mut subscribers) = self.subscribers.get_mut(session_id) {
            subscribers.retain(|s| s.id != subscription.id);
        }
        if self
            .subscribers
            .remove_if(session_id, |_, subscribers| subscribers.is_empty())
            .is_some()
        {
            debug!(session_id, "Last content subscriber left; entry removed");
        }
        info!(
            session_id,
            subscription = subscription.id,
            "Content subscriber removed"
        );
    }

    /// Pushes `page` onto every queue registered under `session_id`, in
    /// registration order, without blocking.
    ///
    /// Returns how many queues accepted the page. Queues whose receiver was
    /// dropped without unsubscribing are pruned here.
    pub fn publish(&self, session_id: &str, page: ContentPage) -> usize {
        let Some(mut subscribers) = self.subscribers.get_mut(session_id) else {
            debug!(session_id, topic = %page.topic, "No content subscribers; page dropped");
            return 0;
        };

        let page = Arc::new(page);
        let before = subscribers.len();
        subscribers.retain(|s| s.sender.send(page.clone()).is_ok());
        let delivered = subscribers.len();
        drop(subscribers);

        if delivered < before {
            debug!(session_id, pruned = before - delivered, "Pruned closed content queues");
            self.subscribers
                .remove_if(session_id, |_, subscribers| subscribers.is_empty());
        }
        info!(session_id, topic = %page.topic, delivered, "Published content page");
        delivered
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.subscribers
            .get(session_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Number of session identifiers with at least one subscriber.
    pub fn session_count(&self) -> usize {
        self.subscribers.len()
    }
}
