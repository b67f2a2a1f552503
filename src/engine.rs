//! Wiring of the server-side components around one store, index and clock.

use crate::claim::ClaimCoordinator;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::constants;
use crate::discovery::{DiscoveryService, DiscoverySettings};
use crate::error::Result;
use crate::events::BroadcastPublisher;
use crate::geo::GeospatialIndex;
use crate::lifecycle::{ListingLifecycleManager, TtlPolicy};
use crate::server::AppState;
use crate::storage::{InMemoryListingStore, ListingStore};
use std::sync::Arc;

pub struct Engine {
    pub store: Arc<dyn ListingStore>,
    pub index: Arc<GeospatialIndex>,
    pub events: Arc<BroadcastPublisher>,
    pub clock: Arc<dyn Clock>,
    pub lifecycle: Arc<ListingLifecycleManager>,
    pub claims: Arc<ClaimCoordinator>,
    pub discovery: Arc<DiscoveryService>,
    default_page_size: usize,
}

impl Engine {
    pub fn new(config: &Config, store: Arc<dyn ListingStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let index = Arc::new(GeospatialIndex::new(
            config.index.precision,
            config.index.max_cover_cells,
        )?);
        let events = Arc::new(BroadcastPublisher::new(constants::EVENT_CHANNEL_CAPACITY));

        let lifecycle = Arc::new(ListingLifecycleManager::new(
            store.clone(),
            index.clone(),
            events.clone(),
            clock.clone(),
            TtlPolicy::from_config(&config.lifecycle)?,
            config.lifecycle.sweep_batch_size,
        ));
        let claims = Arc::new(ClaimCoordinator::new(
            store.clone(),
            index.clone(),
            events.clone(),
            clock.clone(),
        ));
        let discovery = Arc::new(DiscoveryService::new(
            store.clone(),
            index.clone(),
            clock.clone(),
            DiscoverySettings::from(&config.discovery),
        ));

        Ok(Self {
            store,
            index,
            events,
            clock,
            lifecycle,
            claims,
            discovery,
            default_page_size: config.discovery.default_page_size,
        })
    }

    /// In-memory store on the system clock.
    pub fn in_memory(config: &Config) -> Result<Self> {
        Self::new(config, Arc::new(InMemoryListingStore::new()), Arc::new(SystemClock))
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            discovery: self.discovery.clone(),
            claims: self.claims.clone(),
            lifecycle: self.lifecycle.clone(),
            index: self.index.clone(),
            default_page_size: self.default_page_size,
        }
    }
}
