//! Outbound domain events.
//!
//! Events are published only after the unit of work that produced them has
//! committed. A failed publish is logged and otherwise ignored.

use crate::domain::events::DomainEvent;

const SUBJECT_PREFIX: &str = "shop.events";

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Log-only publisher.
    pub fn disabled() -> Self { Self::default() }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            tracing::info!(kind = event.kind(), "domain event");
            let Some(client) = &self.nats else { continue };
            let payload = match serde_json::to_vec(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, kind = event.kind(), "failed to encode event");
                    continue;
                }
            };
            let subject = format!("{SUBJECT_PREFIX}.{}", event.kind());
            if let Err(e) = client.publish(subject, payload.into()).await {
                tracing::warn!(error = %e, kind = event.kind(), "failed to publish event");
            }
        }
    }
}
