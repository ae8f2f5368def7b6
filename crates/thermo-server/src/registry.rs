use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use thermo_core::{ServerEvent, SubscriberId};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A connected subscriber channel.
pub struct Subscriber {
    pub id: SubscriberId,
    tx: mpsc::Sender<ServerEvent>,
    cancel: CancellationToken,
    last_pong: Mutex<Instant>,
}

impl Subscriber {
    fn new(id: SubscriberId, tx: mpsc::Sender<ServerEvent>, cancel: CancellationToken) -> Self {
        Self {
            id,
            tx,
            cancel,
            last_pong: Mutex::new(Instant::now()),
        }
    }

    pub fn record_pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    fn silent_for(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}

/// What a new subscriber gets back from [`SubscriberRegistry::register`].
pub struct Registration {
    pub id: SubscriberId,
    /// Events queued for this subscriber by the hub.
    pub rx: mpsc::Receiver<ServerEvent>,
    /// Cancelled when the subscriber is unregistered.
    pub cancel: CancellationToken,
}

/// Registry of all connected subscribers.
pub struct SubscriberRegistry {
    subscribers: DashMap<SubscriberId, Subscriber>,
    max_send_queue: usize,
    client_timeout: Duration,
}

impl SubscriberRegistry {
    /// `client_timeout` is how long a subscriber may go without a pong before
    /// the cleanup task drops it. Keep it well above the ping period.
    pub fn new(max_send_queue: usize, client_timeout: Duration) -> Self {
        Self {
            subscribers: DashMap::new(),
            max_send_queue,
            client_timeout,
        }
    }

    /// Register a new subscriber.
    pub fn register(&self) -> Registration {
        let id = SubscriberId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let cancel = CancellationToken::new();
        self.subscribers
            .insert(id.clone(), Subscriber::new(id.clone(), tx, cancel.clone()));
        Registration { id, rx, cancel }
    }

    /// Remove a subscriber and cancel everything scheduled for it.
    pub fn unregister(&self, id: &SubscriberId) -> bool {
        match self.subscribers.remove(id) {
            Some((_, subscriber)) => {
                subscriber.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Queue an event for every registered subscriber. Returns how many
    /// subscribers accepted it. A full queue drops the event for that
    /// subscriber only.
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        subscriber_id = %subscriber.id,
                        event = event.name(),
                        "Send queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn record_pong(&self, id: &SubscriberId) {
        if let Some(subscriber) = self.subscribers.get(id) {
            subscriber.record_pong();
        }
    }

    /// Number of connected subscribers.
    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    /// Remove subscribers that haven't answered a ping within the timeout.
    pub fn cleanup_dead_subscribers(&self) -> usize {
        let dead: Vec<SubscriberId> = self
            .subscribers
            .iter()
            .filter(|entry| entry.value().silent_for() >= self.client_timeout)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in dead {
            if self.unregister(&id) {
                removed += 1;
                tracing::info!(subscriber_id = %id, "Cleaned up dead subscriber");
            }
        }
        removed
    }
}

/// Start a background task that periodically cleans up dead subscribers.
/// The first sweep runs one `interval` after start.
pub fn start_cleanup_task(
    registry: Arc<SubscriberRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let removed = registry.cleanup_dead_subscribers();
            if removed > 0 {
                tracing::info!(removed = removed, "Dead subscriber cleanup");
            }
        }
    })
}
