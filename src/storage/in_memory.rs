use super::{CasOutcome, ListingStore};
use crate::domain::{Listing, ListingStatus};
use crate::error::{CurbsideError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// In-memory listing store for development and tests.
///
/// The map lock is held only for the duration of a single read or
/// compare-and-swap, never across an await point.
#[derive(Clone, Default)]
pub struct InMemoryListingStore {
    listings: Arc<Mutex<HashMap<Uuid, Listing>>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Listing>>> {
        self.listings
            .lock()
            .map_err(|_| CurbsideError::Storage("listing map lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ListingStore for InMemoryListingStore {
    async fn insert(&self, listing: Listing) -> Result<()> {
        let mut listings = self.lock()?;
        if listings.contains_key(&listing.id) {
            return Err(CurbsideError::Storage(format!("listing {} already exists", listing.id)));
        }
        debug!("Stored listing: {} with id {}", listing.title, listing.id);
        listings.insert(listing.id, listing);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Listing>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Listing>> {
        let listings = self.lock()?;
        Ok(ids.iter().filter_map(|id| listings.get(id).cloned()).collect())
    }

    async fn compare_and_swap(&self, expected_version: u64, mut next: Listing) -> Result<CasOutcome> {
        let mut listings = self.lock()?;
        let Some(current) = listings.get(&next.id) else {
            return Ok(CasOutcome::Missing);
        };
        if current.version != expected_version {
            debug!(
                listing_id = %next.id,
                expected_version,
                actual_version = current.version,
                "Version mismatch on conditional write"
            );
            return Ok(CasOutcome::VersionMismatch(current.clone()));
        }
        if current.expires_at != next.expires_at {
            return Err(CurbsideError::validation("expiresAt is immutable"));
        }

        next.version = expected_version + 1;
        listings.insert(next.id, next.clone());
        Ok(CasOutcome::Applied(next))
    }

    async fn list_expired_active(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Listing>> {
        let listings = self.lock()?;
        let mut expired: Vec<Listing> = listings
            .values()
            .filter(|l| l.status == ListingStatus::Active && l.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at));
        expired.truncate(limit);
        Ok(expired)
    }

    async fn list_discoverable(&self, now: DateTime<Utc>) -> Result<Vec<Listing>> {
        let listings = self.lock()?;
        Ok(listings.values().filter(|l| l.is_discoverable_at(now)).cloned().collect())
    }
}
