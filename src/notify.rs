use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for per-property change notifications. Embedding servers
/// subscribe to push availability changes out to search/calendar views.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a property. Creates the channel if needed.
    pub fn subscribe(&self, property_id: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(property_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, property_id: Ulid, event: &Event) {
        if let Some(sender) = self.channels.get(&property_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Remove a channel (e.g. when a property is delisted).
    pub fn remove(&self, property_id: &Ulid) {
        self.channels.remove(property_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PropertyStatus;

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        let mut rx = hub.subscribe(pid);

        let event = Event::PropertyStatusChanged {
            id: pid,
            status: PropertyStatus::Unlisted,
        };
        hub.send(pid, &event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        let pid = Ulid::new();
        // No subscriber — should not panic
        hub.send(pid, &Event::PropertyDelisted { id: pid });
    }
}
