//! Client-side location monitoring: decides when to re-run the nearby query
//! as the user moves, and keeps only the freshest answer.

pub mod geofence;
pub mod http_client;
pub mod location;
pub mod ports;
pub mod runtime;

pub use geofence::InMemoryGeofences;
pub use http_client::HttpDiscoveryClient;
pub use location::{LocationMonitor, MonitorState, RefreshReason, RefreshRequest, SEARCH_REGION_ID};
pub use ports::{
    GeofenceEvent, GeofenceRegion, GeofenceRegistrar, GeofenceTransition, LocalDiscoveryClient,
    NearbyClient,
};
pub use runtime::{
    fetch_with_retry, MonitorCommand, MonitorEvent, MonitorHandle, MonitorRuntime, NearbyUpdate,
    QueryOptions,
};
