use std::sync::Arc;
use std::time::Duration;

use thermo_core::{ServerEvent, StatusMailbox};
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::registry::SubscriberRegistry;

/// Drains the status mailbox and fans the reading out to subscribers.
///
/// The mailbox is taken once per tick and the same value goes to every
/// registered subscriber, so no subscriber starves another.
pub struct BroadcastHub {
    registry: Arc<SubscriberRegistry>,
    mailbox: Arc<StatusMailbox>,
}

impl BroadcastHub {
    pub fn new(registry: Arc<SubscriberRegistry>, mailbox: Arc<StatusMailbox>) -> Self {
        Self { registry, mailbox }
    }

    /// Run one broadcast tick. Returns how many subscribers got a status event.
    ///
    /// With nobody connected the mailbox is left alone, so the next
    /// subscriber still sees the latest unconsumed reading.
    pub fn tick(&self) -> usize {
        if self.registry.count() == 0 {
            return 0;
        }
        let Some(status) = self.mailbox.take_if_present() else {
            return 0;
        };
        self.registry.broadcast(&ServerEvent::status(status))
    }

    /// Spawn the periodic fan-out. The first tick fires one `period` after start.
    pub fn start(self, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let delivered = self.tick();
                if delivered > 0 {
                    tracing::trace!(subscribers = delivered, "status broadcast");
                }
            }
        })
    }
}
