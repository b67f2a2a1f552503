//! Great-circle distance and bounding-box helpers.

use crate::error::{CurbsideError, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate. Construct through [`GeoPoint::new`] to get range checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let point = Self { latitude, longitude };
        point.validate()?;
        Ok(point)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(CurbsideError::Validation(format!(
                "coordinates out of range: lat={}, lon={}",
                self.latitude, self.longitude
            )))
        }
    }

    /// Haversine distance in meters.
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        haversine_distance_m(self, other)
    }
}

pub fn haversine_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Axis-aligned box in degrees. `min_lon > max_lon` means the box wraps the
/// antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn wraps_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    /// Split into one or two non-wrapping longitude ranges.
    pub fn lon_ranges(&self) -> Vec<(f64, f64)> {
        if self.wraps_antimeridian() {
            vec![(self.min_lon, 180.0), (-180.0, self.max_lon)]
        } else {
            vec![(self.min_lon, self.max_lon)]
        }
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        if p.latitude < self.min_lat || p.latitude > self.max_lat {
            return false;
        }
        self.lon_ranges()
            .iter()
            .any(|(lo, hi)| p.longitude >= *lo && p.longitude <= *hi)
    }
}

/// Smallest lat/lon box enclosing the circle of `radius_m` around `center`.
///
/// Near the poles the box widens to every longitude.
pub fn bounding_box(center: &GeoPoint, radius_m: f64) -> BoundingBox {
    let angular = radius_m / EARTH_RADIUS_M;
    let lat = center.latitude.to_radians();
    let lon = center.longitude.to_radians();

    let mut min_lat = lat - angular;
    let mut max_lat = lat + angular;
    let half_pi = std::f64::consts::FRAC_PI_2;

    let (min_lon, max_lon);
    if min_lat > -half_pi && max_lat < half_pi {
        let delta_lon = (angular.sin() / lat.cos()).clamp(-1.0, 1.0).asin();
        let mut lo = lon - delta_lon;
        let mut hi = lon + delta_lon;
        if lo < -std::f64::consts::PI {
            lo += 2.0 * std::f64::consts::PI;
        }
        if hi > std::f64::consts::PI {
            hi -= 2.0 * std::f64::consts::PI;
        }
        min_lon = lo.to_degrees();
        max_lon = hi.to_degrees();
    } else {
        min_lat = min_lat.max(-half_pi);
        max_lat = max_lat.min(half_pi);
        min_lon = -180.0;
        max_lon = 180.0;
    }

    BoundingBox {
        min_lat: min_lat.to_degrees().max(-90.0),
        max_lat: max_lat.to_degrees().min(90.0),
        min_lon,
        max_lon,
    }
}
