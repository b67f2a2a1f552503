//! Geohash-bucketed proximity index of active listing ids.
//!
//! Listings are stored under their cell at a fixed, per-deployment precision.
//! Radius queries pick a (possibly coarser) cover precision so the number of
//! cells scanned stays bounded, then range-scan each cover cell as a prefix.
//! Results over-approximate the circle; callers filter by exact distance.

use crate::error::{CurbsideError, Result};
use crate::geo::geohash;
use crate::geo::point::{bounding_box, GeoPoint};
use crate::metrics::index::IndexMetrics;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct IndexInner {
    cells: BTreeMap<String, HashSet<Uuid>>,
    positions: HashMap<Uuid, String>,
}

impl IndexInner {
    fn detach(&mut self, id: &Uuid) -> bool {
        let Some(cell) = self.positions.remove(id) else {
            return false;
        };
        if let Some(members) = self.cells.get_mut(&cell) {
            members.remove(id);
            if members.is_empty() {
                self.cells.remove(&cell);
            }
        }
        true
    }
}

pub struct GeospatialIndex {
    precision: usize,
    max_cover_cells: usize,
    inner: RwLock<IndexInner>,
}

impl GeospatialIndex {
    pub fn new(precision: usize, max_cover_cells: usize) -> Result<Self> {
        geohash::validate_precision(precision)?;
        if max_cover_cells == 0 {
            return Err(CurbsideError::Config("max_cover_cells must be positive".into()));
        }
        Ok(Self {
            precision,
            max_cover_cells,
            inner: RwLock::new(IndexInner::default()),
        })
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    /// Add `id` at `point`. Re-inserting an indexed id moves it.
    pub fn insert(&self, id: Uuid, point: GeoPoint) -> Result<()> {
        point.validate()?;
        let cell = geohash::encode(&point, self.precision);

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.detach(&id);
        inner.cells.entry(cell.clone()).or_default().insert(id);
        inner.positions.insert(id, cell);
        IndexMetrics::set_indexed_listings(inner.positions.len());
        Ok(())
    }

    /// Move an indexed listing. Unknown ids are inserted.
    pub fn update(&self, id: Uuid, point: GeoPoint) -> Result<()> {
        self.insert(id, point)
    }

    /// Drop `id` from the index; returns whether it was present.
    pub fn remove(&self, id: &Uuid) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = inner.detach(id);
        if removed {
            IndexMetrics::set_indexed_listings(inner.positions.len());
        }
        removed
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .positions
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Superset of the ids within `radius_m` of `center`.
    pub fn candidates_in_radius(&self, center: &GeoPoint, radius_m: f64) -> Result<HashSet<Uuid>> {
        center.validate()?;
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(CurbsideError::validation(format!("invalid radius: {radius_m}")));
        }

        let bbox = bounding_box(center, radius_m);
        let cover_precision =
            geohash::choose_cover_precision(&bbox, self.precision, self.max_cover_cells);
        let cover = geohash::covering_cells(&bbox, cover_precision);

        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut candidates = HashSet::new();
        for prefix in &cover {
            for (cell, members) in inner.cells.range(prefix.clone()..) {
                if !cell.starts_with(prefix.as_str()) {
                    break;
                }
                candidates.extend(members.iter().copied());
            }
        }

        IndexMetrics::record_cells_scanned(cover.len());
        debug!(
            cover_precision,
            cells = cover.len(),
            candidates = candidates.len(),
            "Index radius lookup"
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn index() -> GeospatialIndex {
        GeospatialIndex::new(7, 36).unwrap()
    }

    #[test]
    fn finds_nearby_and_skips_far_listings() {
        let idx = index();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        idx.insert(near, pt(37.7760, -122.4180)).unwrap();
        idx.insert(far, pt(40.7128, -74.0060)).unwrap();

        let found = idx.candidates_in_radius(&pt(37.7749, -122.4194), 1_000.0).unwrap();
        assert!(found.contains(&near));
        assert!(!found.contains(&far));
    }

    #[test]
    fn every_listing_inside_radius_is_a_candidate() {
        let idx = index();
        let center = pt(47.6062, -122.3321);
        let mut inside = Vec::new();
        // Ring of points at ~90% of the radius in eight directions
        for step in 0..8 {
            let bearing = (step as f64) * std::f64::consts::FRAC_PI_4;
            let d_lat = 0.9 * 0.0449 * bearing.cos();
            let d_lon = 0.9 * 0.0449 * bearing.sin() / center.latitude.to_radians().cos();
            let id = Uuid::new_v4();
            let p = pt(center.latitude + d_lat, center.longitude + d_lon);
            assert!(center.distance_to(&p) <= 5_000.0);
            idx.insert(id, p).unwrap();
            inside.push(id);
        }

        let found = idx.candidates_in_radius(&center, 5_000.0).unwrap();
        for id in inside {
            assert!(found.contains(&id));
        }
    }

    #[test]
    fn remove_and_update_change_membership() {
        let idx = index();
        let id = Uuid::new_v4();
        let sf = pt(37.7749, -122.4194);
        let nyc = pt(40.7128, -74.0060);

        idx.insert(id, sf).unwrap();
        assert_eq!(idx.len(), 1);

        idx.update(id, nyc).unwrap();
        assert_eq!(idx.len(), 1);
        assert!(idx.candidates_in_radius(&sf, 1_000.0).unwrap().is_empty());
        assert!(idx.candidates_in_radius(&nyc, 1_000.0).unwrap().contains(&id));

        assert!(idx.remove(&id));
        assert!(!idx.remove(&id));
        assert!(idx.is_empty());
        assert!(!idx.contains(&id));
    }

    #[test]
    fn large_radius_still_returns_candidates() {
        let idx = GeospatialIndex::new(9, 16).unwrap();
        let id = Uuid::new_v4();
        idx.insert(id, pt(37.90, -122.30)).unwrap();
        let found = idx.candidates_in_radius(&pt(37.7749, -122.4194), 50_000.0).unwrap();
        assert!(found.contains(&id));
    }

    #[test]
    fn rejects_invalid_configuration_and_input() {
        assert!(GeospatialIndex::new(0, 10).is_err());
        assert!(GeospatialIndex::new(7, 0).is_err());
        let idx = index();
        assert!(idx.insert(Uuid::new_v4(), GeoPoint { latitude: 95.0, longitude: 0.0 }).is_err());
        assert!(idx.candidates_in_radius(&pt(0.0, 0.0), f64::NAN).is_err());
    }
}
