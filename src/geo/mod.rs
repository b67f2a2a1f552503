pub mod geohash;
pub mod index;
pub mod point;

pub use index::GeospatialIndex;
pub use point::{bounding_box, haversine_distance_m, BoundingBox, GeoPoint, EARTH_RADIUS_M};
