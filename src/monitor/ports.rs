use crate::discovery::{DiscoveryService, NearbyPage, NearbyQuery};
use crate::error::Result;
use crate::geo::GeoPoint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where the monitor sends its nearby queries.
#[async_trait]
pub trait NearbyClient: Send + Sync {
    async fn nearby(&self, query: &NearbyQuery) -> Result<NearbyPage>;
}

/// Platform geofencing. Registering an id that already exists replaces it.
pub trait GeofenceRegistrar: Send + Sync {
    fn register(&self, region: GeofenceRegion) -> Result<()>;
    fn unregister(&self, region_id: &str);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceRegion {
    pub id: String,
    pub center: GeoPoint,
    pub radius_m: f64,
}

impl GeofenceRegion {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_to(point) <= self.radius_m
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceTransition {
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceEvent {
    pub region_id: String,
    pub transition: GeofenceTransition,
}

/// In-process client that queries a [`DiscoveryService`] directly.
pub struct LocalDiscoveryClient {
    service: Arc<DiscoveryService>,
}

impl LocalDiscoveryClient {
    pub fn new(service: Arc<DiscoveryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl NearbyClient for LocalDiscoveryClient {
    async fn nearby(&self, query: &NearbyQuery) -> Result<NearbyPage> {
        self.service.nearby(query).await
    }
}
