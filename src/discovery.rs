//! Read-only "what's near me" queries.
//!
//! The index supplies a candidate superset; each candidate is hydrated from
//! the store, dropped unless it is Active and inside its TTL, then filtered
//! by exact haversine distance. Nothing here mutates state.

use crate::clock::Clock;
use crate::config::DiscoveryConfig;
use crate::constants;
use crate::domain::{Category, Listing};
use crate::error::{CurbsideError, Result};
use crate::geo::{GeoPoint, GeospatialIndex};
use crate::metrics::core::time_operation;
use crate::metrics::discovery::QUERY_DURATION;
use crate::metrics::DiscoveryMetrics;
use crate::storage::ListingStore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Whether a listing exactly `radius` away counts as inside.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    #[default]
    Inclusive,
    Exclusive,
}

impl BoundaryPolicy {
    pub fn admits(self, distance_m: f64, radius_m: f64) -> bool {
        match self {
            BoundaryPolicy::Inclusive => distance_m <= radius_m,
            BoundaryPolicy::Exclusive => distance_m < radius_m,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NearbyQuery {
    pub center: GeoPoint,
    pub radius_m: f64,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub category: Option<Category>,
}

impl NearbyQuery {
    pub fn new(center: GeoPoint, radius_m: f64) -> Self {
        Self {
            center,
            radius_m,
            page: 1,
            page_size: constants::DEFAULT_PAGE_SIZE,
            category: None,
        }
    }

    pub fn page(mut self, page: usize, page_size: usize) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub distance_meters: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyPage {
    pub listings: Vec<NearbyListing>,
    pub page: usize,
    pub page_size: usize,
    /// Matches across all pages.
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub max_radius_m: f64,
    pub max_page_size: usize,
    pub boundary: BoundaryPolicy,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_radius_m: constants::MAX_RADIUS_M,
            max_page_size: constants::MAX_PAGE_SIZE,
            boundary: BoundaryPolicy::Inclusive,
        }
    }
}

impl From<&DiscoveryConfig> for DiscoverySettings {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            max_radius_m: config.max_radius_m,
            max_page_size: config.max_page_size,
            boundary: config.boundary,
        }
    }
}

pub struct DiscoveryService {
    store: Arc<dyn ListingStore>,
    index: Arc<GeospatialIndex>,
    clock: Arc<dyn Clock>,
    settings: DiscoverySettings,
}

impl DiscoveryService {
    pub fn new(
        store: Arc<dyn ListingStore>,
        index: Arc<GeospatialIndex>,
        clock: Arc<dyn Clock>,
        settings: DiscoverySettings,
    ) -> Self {
        Self { store, index, clock, settings }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    /// Validate a query, clamping the page size to the configured maximum.
    fn normalize(&self, query: &NearbyQuery) -> Result<NearbyQuery> {
        query.center.validate()?;
        if !query.radius_m.is_finite()
            || query.radius_m <= 0.0
            || query.radius_m > self.settings.max_radius_m
        {
            return Err(CurbsideError::Validation(format!(
                "radius must be in (0, {}] meters, got {}",
                self.settings.max_radius_m, query.radius_m
            )));
        }
        if query.page == 0 {
            return Err(CurbsideError::validation("page must be at least 1"));
        }
        if query.page_size == 0 {
            return Err(CurbsideError::validation("pageSize must be at least 1"));
        }
        let mut normalized = query.clone();
        normalized.page_size = query.page_size.min(self.settings.max_page_size);
        Ok(normalized)
    }

    pub async fn nearby(&self, query: &NearbyQuery) -> Result<NearbyPage> {
        let query = self.normalize(query).map_err(|e| {
            DiscoveryMetrics::record_validation_error();
            e
        })?;
        let _timer = time_operation(QUERY_DURATION);

        let candidate_ids: Vec<_> = self
            .index
            .candidates_in_radius(&query.center, query.radius_m)?
            .into_iter()
            .collect();
        let hydrated = self.store.get_many(&candidate_ids).await?;
        let now = self.clock.now();

        let mut matches: Vec<NearbyListing> = hydrated
            .into_iter()
            .filter(|l| l.is_discoverable_at(now))
            .filter(|l| query.category.map_or(true, |c| l.category == c))
            .filter_map(|listing| {
                let distance_meters = query.center.distance_to(&listing.location.point);
                self.settings
                    .boundary
                    .admits(distance_meters, query.radius_m)
                    .then_some(NearbyListing { listing, distance_meters })
            })
            .collect();

        matches.sort_by(compare_results);
        let total = matches.len();
        DiscoveryMetrics::record_query(candidate_ids.len(), total);

        let listings: Vec<NearbyListing> = matches
            .into_iter()
            .skip((query.page - 1).saturating_mul(query.page_size))
            .take(query.page_size)
            .collect();

        debug!(
            lat = query.center.latitude,
            lon = query.center.longitude,
            radius_m = query.radius_m,
            candidates = candidate_ids.len(),
            total,
            returned = listings.len(),
            "Nearby query"
        );

        Ok(NearbyPage {
            listings,
            page: query.page,
            page_size: query.page_size,
            total,
        })
    }
}

/// Ascending distance, newest first on ties, id as a final tiebreak so
/// pagination is stable.
fn compare_results(a: &NearbyListing, b: &NearbyListing) -> Ordering {
    a.distance_meters
        .total_cmp(&b.distance_meters)
        .then_with(|| b.listing.created_at.cmp(&a.listing.created_at))
        .then_with(|| a.listing.id.cmp(&b.listing.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::fixtures::listing_at;
    use crate::domain::ListingStatus;
    use crate::storage::InMemoryListingStore;
    use chrono::{Duration, Utc};

    struct Harness {
        service: DiscoveryService,
        store: Arc<InMemoryListingStore>,
        index: Arc<GeospatialIndex>,
        clock: Arc<ManualClock>,
    }

    fn harness(settings: DiscoverySettings) -> Harness {
        let store = Arc::new(InMemoryListingStore::new());
        let index = Arc::new(GeospatialIndex::new(7, 36).unwrap());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let service = DiscoveryService::new(store.clone(), index.clone(), clock.clone(), settings);
        Harness { service, store, index, clock }
    }

    impl Harness {
        async fn add(&self, listing: Listing) -> Listing {
            self.store.insert(listing.clone()).await.unwrap();
            self.index.insert(listing.id, listing.location.point).unwrap();
            listing
        }
    }

    fn center() -> GeoPoint {
        GeoPoint::new(37.7749, -122.4194).unwrap()
    }

    #[tokio::test]
    async fn includes_inside_and_excludes_outside() {
        let h = harness(DiscoverySettings::default());
        let now = h.clock.now();
        let here = h.add(listing_at(37.7749, -122.4194, now)).await;
        let ten_km = h.add(listing_at(37.8649, -122.4194, now)).await;

        let page = h.service.nearby(&NearbyQuery::new(center(), 5_000.0)).await.unwrap();
        let ids: Vec<_> = page.listings.iter().map(|l| l.listing.id).collect();
        assert_eq!(ids, vec![here.id]);
        assert!(page.listings[0].distance_meters < 1e-6);
        assert!(!ids.contains(&ten_km.id));
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn sorted_by_distance_then_newest() {
        let h = harness(DiscoverySettings::default());
        let now = h.clock.now();
        let far = h.add(listing_at(37.7849, -122.4194, now)).await;
        let older = h.add(listing_at(37.7759, -122.4194, now - Duration::hours(2))).await;
        let newer = h.add(listing_at(37.7759, -122.4194, now - Duration::hours(1))).await;

        let page = h.service.nearby(&NearbyQuery::new(center(), 5_000.0)).await.unwrap();
        let ids: Vec<_> = page.listings.iter().map(|l| l.listing.id).collect();
        assert_eq!(ids, vec![newer.id, older.id, far.id]);
        assert!(page
            .listings
            .windows(2)
            .all(|w| w[0].distance_meters <= w[1].distance_meters));
    }

    #[tokio::test]
    async fn lazily_drops_expired_and_resolved_listings() {
        let h = harness(DiscoverySettings::default());
        let now = h.clock.now();
        let stale = h.add(listing_at(37.7749, -122.4194, now - Duration::days(7))).await;
        let mut collected = listing_at(37.7750, -122.4194, now);
        collected.status = ListingStatus::Collected;
        h.add(collected).await;
        let live = h.add(listing_at(37.7751, -122.4194, now)).await;

        // Both stale entries are still indexed; the query must hide them anyway
        assert!(h.index.contains(&stale.id));
        let page = h.service.nearby(&NearbyQuery::new(center(), 1_000.0)).await.unwrap();
        let ids: Vec<_> = page.listings.iter().map(|l| l.listing.id).collect();
        assert_eq!(ids, vec![live.id]);
    }

    #[tokio::test]
    async fn paginates_and_caps_page_size() {
        let h = harness(DiscoverySettings { max_page_size: 3, ..DiscoverySettings::default() });
        let now = h.clock.now();
        for i in 0..7 {
            h.add(listing_at(37.7749 + i as f64 * 0.0005, -122.4194, now)).await;
        }

        let first = h.service.nearby(&NearbyQuery::new(center(), 5_000.0).page(1, 50)).await.unwrap();
        assert_eq!(first.page_size, 3);
        assert_eq!(first.listings.len(), 3);
        assert_eq!(first.total, 7);

        let third = h.service.nearby(&NearbyQuery::new(center(), 5_000.0).page(3, 3)).await.unwrap();
        assert_eq!(third.listings.len(), 1);

        let beyond = h.service.nearby(&NearbyQuery::new(center(), 5_000.0).page(9, 3)).await.unwrap();
        assert!(beyond.listings.is_empty());
        assert_eq!(beyond.total, 7);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let h = harness(DiscoverySettings::default());
        let bad_center = GeoPoint { latitude: 91.0, longitude: 0.0 };
        for query in [
            NearbyQuery::new(center(), 0.0),
            NearbyQuery::new(center(), -5.0),
            NearbyQuery::new(center(), 50_001.0),
            NearbyQuery::new(center(), f64::INFINITY),
            NearbyQuery::new(bad_center, 100.0),
            NearbyQuery::new(center(), 100.0).page(0, 10),
            NearbyQuery::new(center(), 100.0).page(1, 0),
        ] {
            let err = h.service.nearby(&query).await.unwrap_err();
            assert!(matches!(err, CurbsideError::Validation(_)), "{query:?}");
        }
        let ok = h.service.nearby(&NearbyQuery::new(center(), 50_000.0)).await.unwrap();
        assert!(ok.listings.is_empty());
    }

    #[tokio::test]
    async fn boundary_policy_decides_exact_radius() {
        let now = Utc::now();
        let listing = listing_at(37.7849, -122.4194, now);
        let radius = center().distance_to(&listing.location.point);

        let inclusive = harness(DiscoverySettings::default());
        inclusive.clock.set(now);
        inclusive.add(listing.clone()).await;
        let page = inclusive.service.nearby(&NearbyQuery::new(center(), radius)).await.unwrap();
        assert_eq!(page.total, 1);

        let exclusive = harness(DiscoverySettings {
            boundary: BoundaryPolicy::Exclusive,
            ..DiscoverySettings::default()
        });
        exclusive.clock.set(now);
        exclusive.add(listing).await;
        let page = exclusive.service.nearby(&NearbyQuery::new(center(), radius)).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn filters_by_category() {
        let h = harness(DiscoverySettings::default());
        let now = h.clock.now();
        let mut lamp = listing_at(37.7749, -122.4194, now);
        lamp.category = Category::Lighting;
        let lamp = h.add(lamp).await;
        h.add(listing_at(37.7749, -122.4194, now)).await;

        let page = h
            .service
            .nearby(&NearbyQuery::new(center(), 1_000.0).category(Category::Lighting))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.listings[0].listing.id, lamp.id);
    }

    #[test]
    fn nearby_listing_serializes_flat() {
        let listing = listing_at(37.0, -122.0, Utc::now());
        let json = serde_json::to_value(NearbyListing { listing, distance_meters: 12.5 }).unwrap();
        assert_eq!(json["distanceMeters"], 12.5);
        assert!(json.get("ownerId").is_some());
        let back: NearbyListing = serde_json::from_value(json).unwrap();
        assert_eq!(back.distance_meters, 12.5);
    }
}
