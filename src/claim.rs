//! Atomic Active -> Collected transition.
//!
//! A claim reads the listing, checks it is still claimable, then issues one
//! conditional write keyed on the version it read. Exactly one writer can
//! match a given version, so at most one claim per listing succeeds. A lost
//! race is reported as a conflict and is never retried here.

use crate::clock::Clock;
use crate::domain::{ClaimAttempt, ClaimOutcome, Listing, ListingStatus};
use crate::error::{CurbsideError, Result};
use crate::events::{EventPublisher, ListingEvent};
use crate::geo::GeospatialIndex;
use crate::metrics::ClaimMetrics;
use crate::storage::{CasOutcome, ListingStore};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub struct ClaimCoordinator {
    store: Arc<dyn ListingStore>,
    index: Arc<GeospatialIndex>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl ClaimCoordinator {
    pub fn new(
        store: Arc<dyn ListingStore>,
        index: Arc<GeospatialIndex>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, index, events, clock }
    }

    pub async fn claim(&self, listing_id: Uuid, collector_id: &str) -> Result<Listing> {
        let mut attempt = ClaimAttempt {
            listing_id,
            collector_id: collector_id.to_string(),
            expected_version: None,
            outcome: ClaimOutcome::Rejected,
        };
        let result = self.try_claim(&mut attempt).await;

        attempt.outcome = match &result {
            Ok(_) => ClaimOutcome::Success,
            Err(CurbsideError::Conflict(_)) => ClaimOutcome::Conflict,
            Err(CurbsideError::AlreadyResolved { .. }) => ClaimOutcome::AlreadyClaimed,
            Err(CurbsideError::Expired(_)) => ClaimOutcome::Expired,
            Err(CurbsideError::NotFound(_)) => ClaimOutcome::NotFound,
            Err(_) => ClaimOutcome::Rejected,
        };
        ClaimMetrics::record_outcome(attempt.outcome);
        info!(
            listing_id = %attempt.listing_id,
            collector_id = %attempt.collector_id,
            expected_version = ?attempt.expected_version,
            outcome = ?attempt.outcome,
            "Claim attempt"
        );
        result
    }

    async fn try_claim(&self, attempt: &mut ClaimAttempt) -> Result<Listing> {
        let id = attempt.listing_id;
        if attempt.collector_id.trim().is_empty() {
            return Err(CurbsideError::validation("collector id is required"));
        }

        let current = self.store.get(id).await?.ok_or(CurbsideError::NotFound(id))?;
        attempt.expected_version = Some(current.version);

        match current.status {
            ListingStatus::Active => {}
            ListingStatus::Expired => return Err(CurbsideError::Expired(id)),
            status => return Err(CurbsideError::AlreadyResolved { id, status }),
        }

        let now = self.clock.now();
        if current.is_expired_at(now) {
            return Err(CurbsideError::Expired(id));
        }
        if current.owner_id == attempt.collector_id {
            return Err(CurbsideError::Forbidden("finders cannot collect their own listing".into()));
        }

        let next = current.collected(&attempt.collector_id, now)?;
        match self.store.compare_and_swap(current.version, next).await? {
            CasOutcome::Applied(collected) => {
                self.index.remove(&id);
                self.events.publish(ListingEvent::Collected {
                    listing_id: id,
                    owner_id: collected.owner_id.clone(),
                    collector_id: attempt.collector_id.clone(),
                    at: now,
                });
                Ok(collected)
            }
            CasOutcome::VersionMismatch(winner) => {
                warn!(listing_id = %id, status = %winner.status, "Claim lost version race");
                Err(CurbsideError::Conflict(id))
            }
            CasOutcome::Missing => Err(CurbsideError::NotFound(id)),
        }
    }
}
