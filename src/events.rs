//! Listing lifecycle notifications for downstream consumers
//! (messaging, notifications, gamification, cache invalidation).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ListingEvent {
    Created {
        listing_id: Uuid,
        owner_id: String,
        at: DateTime<Utc>,
    },
    Collected {
        listing_id: Uuid,
        owner_id: String,
        collector_id: String,
        at: DateTime<Utc>,
    },
    Expired {
        listing_id: Uuid,
        at: DateTime<Utc>,
    },
    Deleted {
        listing_id: Uuid,
        owner_id: String,
        at: DateTime<Utc>,
    },
}

impl ListingEvent {
    pub fn listing_id(&self) -> Uuid {
        match self {
            ListingEvent::Created { listing_id, .. }
            | ListingEvent::Collected { listing_id, .. }
            | ListingEvent::Expired { listing_id, .. }
            | ListingEvent::Deleted { listing_id, .. } => *listing_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ListingEvent::Created { .. } => "created",
            ListingEvent::Collected { .. } => "collected",
            ListingEvent::Expired { .. } => "expired",
            ListingEvent::Deleted { .. } => "deleted",
        }
    }
}

/// Sink for lifecycle events. Publishing never fails the transition that
/// produced the event.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: ListingEvent);
}

/// Fan-out publisher backed by a tokio broadcast channel.
#[derive(Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<ListingEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ListingEvent> {
        self.sender.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: ListingEvent) {
        let kind = event.kind();
        let listing_id = event.listing_id();
        // No subscribers is fine
        match self.sender.send(event) {
            Ok(receivers) => debug!(kind, %listing_id, receivers, "Published listing event"),
            Err(_) => debug!(kind, %listing_id, "Listing event dropped; no subscribers"),
        }
    }
}

/// Drain a subscription into the log until the channel closes.
pub async fn log_events(mut receiver: broadcast::Receiver<ListingEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => info!(kind = event.kind(), listing_id = %event.listing_id(), "Listing event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log consumer lagged")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
