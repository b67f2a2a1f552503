//! Listing state machine: creation, owner soft-delete and the TTL sweep.
//!
//! Every status change is a version-gated write against the store. The
//! spatial index is updated only after that write lands, and removal on the
//! way out of Active is unconditional once it has.

use crate::clock::Clock;
use crate::config::LifecycleConfig;
use crate::constants::MAX_TTL_DAYS;
use crate::domain::{Category, Listing, ListingStatus, NewListing};
use crate::error::{CurbsideError, Result};
use crate::events::{EventPublisher, ListingEvent};
use crate::geo::GeospatialIndex;
use crate::metrics::core::time_operation;
use crate::metrics::lifecycle::SWEEP_DURATION;
use crate::metrics::LifecycleMetrics;
use crate::storage::{CasOutcome, ListingStore};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How long a listing stays discoverable, optionally varying by category.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    default: Duration,
    by_category: HashMap<Category, Duration>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::fixed(Duration::days(crate::constants::DEFAULT_TTL_DAYS))
    }
}

impl TtlPolicy {
    pub fn fixed(ttl: Duration) -> Self {
        Self { default: ttl, by_category: HashMap::new() }
    }

    pub fn with_override(mut self, category: Category, ttl: Duration) -> Self {
        self.by_category.insert(category, ttl);
        self
    }

    pub fn from_config(config: &LifecycleConfig) -> Result<Self> {
        let mut policy = Self::fixed(ttl_days(config.ttl_days)?);
        for (name, days) in &config.ttl_days_by_category {
            let category: Category = name
                .parse()
                .map_err(|_| CurbsideError::Config(format!("unknown category: {name}")))?;
            policy = policy.with_override(category, ttl_days(*days)?);
        }
        Ok(policy)
    }

    pub fn ttl_for(&self, category: Category) -> Duration {
        self.by_category.get(&category).copied().unwrap_or(self.default)
    }
}

fn ttl_days(days: i64) -> Result<Duration> {
    if !(1..=MAX_TTL_DAYS).contains(&days) {
        return Err(CurbsideError::Config(format!("ttl of {days} days is outside 1..={MAX_TTL_DAYS}")));
    }
    Ok(Duration::days(days))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub expired: usize,
    /// Lost the version race to a claim or delete; nothing to do.
    pub conflicts: usize,
    /// Storage failures; those listings are picked up next cycle.
    pub failures: usize,
}

pub struct ListingLifecycleManager {
    store: Arc<dyn ListingStore>,
    index: Arc<GeospatialIndex>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    ttl: TtlPolicy,
    sweep_batch_size: usize,
}

impl ListingLifecycleManager {
    pub fn new(
        store: Arc<dyn ListingStore>,
        index: Arc<GeospatialIndex>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        ttl: TtlPolicy,
        sweep_batch_size: usize,
    ) -> Self {
        Self {
            store,
            index,
            events,
            clock,
            ttl,
            sweep_batch_size: sweep_batch_size.max(1),
        }
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Persist and index a new listing handed over by the creation flow.
    pub async fn create_listing(&self, input: NewListing) -> Result<Listing> {
        input.validate()?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl.ttl_for(input.category))
            .ok_or_else(|| CurbsideError::Config(format!("ttl for {} overflows the calendar", input.category.as_str())))?;
        let listing = Listing {
            id: Uuid::new_v4(),
            owner_id: input.owner_id,
            title: input.title.trim().to_string(),
            description: input.description,
            category: input.category,
            condition: input.condition,
            location: input.location,
            status: ListingStatus::Active,
            image_urls: input.image_urls,
            ai_tags: input.ai_tags,
            confidence_score: input.confidence_score,
            created_at: now,
            expires_at,
            collected_by: None,
            collected_at: None,
            version: 1,
        };

        self.store.insert(listing.clone()).await?;
        self.index.insert(listing.id, listing.location.point)?;

        LifecycleMetrics::record_created();
        info!(listing_id = %listing.id, owner_id = %listing.owner_id, expires_at = %listing.expires_at, "Listing created");
        self.events.publish(ListingEvent::Created {
            listing_id: listing.id,
            owner_id: listing.owner_id.clone(),
            at: now,
        });
        Ok(listing)
    }

    pub async fn get_listing(&self, id: Uuid) -> Result<Listing> {
        self.store.get(id).await?.ok_or(CurbsideError::NotFound(id))
    }

    /// Owner-initiated Active -> Deleted.
    pub async fn delete_listing(&self, id: Uuid, requester_id: &str) -> Result<Listing> {
        let current = self.get_listing(id).await?;
        if current.owner_id != requester_id {
            return Err(CurbsideError::Forbidden("only the owner can delete a listing".into()));
        }
        let next = current.transitioned(ListingStatus::Deleted)?;

        match self.store.compare_and_swap(current.version, next).await? {
            CasOutcome::Applied(deleted) => {
                self.index.remove(&id);
                LifecycleMetrics::record_deleted();
                info!(listing_id = %id, "Listing soft-deleted by owner");
                self.events.publish(ListingEvent::Deleted {
                    listing_id: id,
                    owner_id: deleted.owner_id.clone(),
                    at: self.clock.now(),
                });
                Ok(deleted)
            }
            CasOutcome::VersionMismatch(winner) => {
                debug!(listing_id = %id, status = %winner.status, "Delete lost version race");
                Err(CurbsideError::Conflict(id))
            }
            CasOutcome::Missing => Err(CurbsideError::NotFound(id)),
        }
    }

    /// Move every Active listing past its TTL to Expired.
    ///
    /// Individual write failures are counted once and left for the next run;
    /// only a failure to list candidates fails the whole run.
    pub async fn sweep_expired(&self) -> Result<SweepReport> {
        let timer = time_operation(SWEEP_DURATION);
        let now = self.clock.now();
        let mut report = SweepReport::default();
        // Listings left Active by this run keep coming back at the head of
        // the listing, so widen each fetch past them.
        let mut left_active: HashSet<Uuid> = HashSet::new();

        loop {
            let limit = self.sweep_batch_size + left_active.len();
            let batch = self.store.list_expired_active(now, limit).await?;
            let fetched = batch.len();
            let fresh: Vec<Listing> = batch.into_iter().filter(|l| !left_active.contains(&l.id)).collect();
            if fresh.is_empty() {
                break;
            }

            for listing in fresh {
                let id = listing.id;
                report.examined += 1;
                if !self.expire_one(listing, &mut report).await {
                    left_active.insert(id);
                }
            }

            if fetched < limit {
                break;
            }
        }

        LifecycleMetrics::record_sweep(report.expired, report.failures);
        info!(
            examined = report.examined,
            expired = report.expired,
            conflicts = report.conflicts,
            failures = report.failures,
            duration_secs = timer.elapsed_secs(),
            "TTL sweep finished"
        );
        Ok(report)
    }

    /// Returns false when the listing is still Active afterwards.
    async fn expire_one(&self, listing: Listing, report: &mut SweepReport) -> bool {
        let id = listing.id;
        let next = match listing.transitioned(ListingStatus::Expired) {
            Ok(next) => next,
            Err(_) => {
                report.conflicts += 1;
                return true;
            }
        };

        match self.store.compare_and_swap(listing.version, next).await {
            Ok(CasOutcome::Applied(expired)) => {
                self.index.remove(&id);
                report.expired += 1;
                debug!(listing_id = %id, expires_at = %expired.expires_at, "Listing expired");
                self.events.publish(ListingEvent::Expired { listing_id: id, at: self.clock.now() });
            }
            Ok(CasOutcome::VersionMismatch(winner)) => {
                report.conflicts += 1;
                debug!(listing_id = %id, status = %winner.status, "Expiry lost version race");
                return winner.status != ListingStatus::Active;
            }
            Ok(CasOutcome::Missing) => {
                report.conflicts += 1;
            }
            Err(e) => {
                report.failures += 1;
                warn!(listing_id = %id, error = %e, "Failed to expire listing; retrying next cycle");
                return false;
            }
        }
        true
    }

    /// Repopulate the index from the store (startup, or after index loss).
    pub async fn rebuild_index(&self) -> Result<usize> {
        let now = self.clock.now();
        let live = self.store.list_discoverable(now).await?;
        for listing in &live {
            self.index.insert(listing.id, listing.location.point)?;
        }
        info!(indexed = live.len(), "Spatial index rebuilt from store");
        Ok(live.len())
    }

    /// Run the sweep every `interval` until `shutdown` flips to true.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "TTL sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_expired().await {
                            warn!(error = %e, "TTL sweep run failed; retrying next cycle");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("TTL sweeper stopped");
        })
    }
}
