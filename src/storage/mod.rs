pub mod in_memory;

pub use in_memory::InMemoryListingStore;

use crate::domain::Listing;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of a version-gated write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// The write landed; carries the stored record.
    Applied(Listing),
    /// Someone else wrote first; carries the record as it is now.
    VersionMismatch(Listing),
    Missing,
}

/// Durable keyed storage of listings with optimistic concurrency.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Insert a brand new listing. Fails if the id already exists.
    async fn insert(&self, listing: Listing) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Listing>>;

    /// Fetch several listings; unknown ids are skipped.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Listing>>;

    /// Replace the stored record with `next` iff its version is still
    /// `expected_version`. The stored version becomes `expected_version + 1`.
    async fn compare_and_swap(&self, expected_version: u64, next: Listing) -> Result<CasOutcome>;

    /// Active listings whose TTL is up, oldest expiry first.
    async fn list_expired_active(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Listing>>;

    /// Every Active listing still inside its TTL.
    async fn list_discoverable(&self, now: DateTime<Utc>) -> Result<Vec<Listing>>;
}
