//! Event publishing over NATS.
//!
//! Events are always logged. When a NATS client is configured they are also
//! published as JSON on the event's subject; publish failures are logged and
//! never fail the operation that produced the event.

use serde::Serialize;

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Publisher that only logs.
    pub fn disabled() -> Self { Self::default() }

    pub async fn publish(&self, event: &DomainEvent) {
        tracing::info!(subject = event.subject(), ?event, "domain event");
        self.publish_json(event.subject(), event).await;
    }

    pub async fn publish_json<T: Serialize + ?Sized>(&self, subject: &str, payload: &T) {
        let Some(client) = &self.nats else { return };
        let bytes = match serde_json::to_vec(payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(subject, error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.to_string(), bytes.into()).await {
            tracing::warn!(subject, error = %e, "failed to publish event");
        }
    }
}
