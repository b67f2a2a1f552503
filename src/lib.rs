pub mod claim;
pub mod clock;
pub mod config;
pub mod constants;
pub mod discovery;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod geo;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod server;
pub mod storage;

pub use claim::ClaimCoordinator;
pub use discovery::{DiscoveryService, NearbyPage, NearbyQuery};
pub use engine::Engine;
pub use error::{CurbsideError, Result};
pub use geo::{GeoPoint, GeospatialIndex};
pub use lifecycle::ListingLifecycleManager;
