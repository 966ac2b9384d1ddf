//! In-process event bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use tripwire_domain::event::Event;

/// In-process event bus using a tokio [`broadcast`] channel.
///
/// Publishing succeeds even when there are no active subscribers
/// (the event is simply dropped). Slow subscribers lag and lose the
/// oldest events rather than blocking publishers.
#[derive(Debug, Clone)]
pub struct InProcessEventBus {
    sender: broadcast::Sender<Event>,
}

impl InProcessEventBus {
    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events published *after* this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Publish an event; usable from synchronous trigger callbacks.
    ///
    /// Returns the number of subscribers that received the event.
    pub fn emit(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripwire_domain::event::EventKind;

    fn watcher_event() -> Event {
        Event::new(
            EventKind::WatcherFired,
            "light.bedroom",
            serde_json::json!({"state": "off", "previous": "on"}),
        )
    }

    #[tokio::test]
    async fn should_deliver_event_to_subscriber() {
        let bus = InProcessEventBus::new(16);
        let mut rx = bus.subscribe();

        let event = watcher_event();
        let event_id = event.id;
        bus.emit(event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event_id);
        assert_eq!(received.kind, EventKind::WatcherFired);
    }

    #[tokio::test]
    async fn should_deliver_event_to_multiple_subscribers() {
        let bus = InProcessEventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = Event::new(EventKind::ScheduleFired, "morning", serde_json::json!({}));
        let event_id = event.id;
        assert_eq!(bus.emit(event), 2);

        assert_eq!(rx1.recv().await.unwrap().id, event_id);
        assert_eq!(rx2.recv().await.unwrap().id, event_id);
    }

    #[test]
    fn should_drop_event_when_no_subscribers() {
        let bus = InProcessEventBus::new(16);
        assert_eq!(bus.emit(watcher_event()), 0);
    }

    #[tokio::test]
    async fn should_not_deliver_events_published_before_subscription() {
        let bus = InProcessEventBus::new(16);
        bus.emit(watcher_event());

        let mut rx = bus.subscribe();
        let later = watcher_event();
        let later_id = later.id;
        bus.emit(later);

        assert_eq!(rx.recv().await.unwrap().id, later_id);
    }
}
