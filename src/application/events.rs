use crate::domain::event::{DomainEvent, Outcome};
use crate::domain::ports::NotificationSinkRef;
use tracing::warn;

/// Forwards the events an operation produced to the notification sink.
///
/// Delivery is best effort. A failing sink is logged and skipped; it never
/// turns a committed transition into an error.
#[derive(Clone)]
pub struct EventDispatcher {
    sink: NotificationSinkRef,
}

impl EventDispatcher {
    pub fn new(sink: NotificationSinkRef) -> Self {
        Self { sink }
    }

    /// Delivers `events` in order and returns how many were accepted.
    pub async fn dispatch(&self, events: &[DomainEvent]) -> usize {
        let mut delivered = 0;
        for event in events {
            match self.sink.deliver(event).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(error = %e, ?event, "notification delivery failed"),
            }
        }
        delivered
    }

    /// Dispatches the outcome's events and hands back its value.
    pub async fn publish<T>(&self, outcome: Outcome<T>) -> T {
        let (value, events) = outcome.into_parts();
        self.dispatch(&events).await;
        value
    }
}
