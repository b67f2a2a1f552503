//! Software geofencing for platforms (and tests) without an OS facility.
//!
//! Regions are checked against each location fix; a transition is reported
//! only when the inside/outside state flips. The first fix after a region is
//! registered establishes its state silently.

use super::ports::{GeofenceEvent, GeofenceRegion, GeofenceRegistrar, GeofenceTransition};
use crate::error::Result;
use crate::geo::GeoPoint;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[derive(Debug)]
struct Tracked {
    region: GeofenceRegion,
    inside: Option<bool>,
}

#[derive(Debug, Default)]
pub struct InMemoryGeofences {
    regions: Mutex<HashMap<String, Tracked>>,
}

impl InMemoryGeofences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn regions(&self) -> Vec<GeofenceRegion> {
        let regions = self.regions.lock().unwrap_or_else(PoisonError::into_inner);
        regions.values().map(|t| t.region.clone()).collect()
    }

    pub fn region(&self, id: &str) -> Option<GeofenceRegion> {
        let regions = self.regions.lock().unwrap_or_else(PoisonError::into_inner);
        regions.get(id).map(|t| t.region.clone())
    }

    /// Feed a location fix; returns the transitions it caused.
    pub fn evaluate(&self, point: &GeoPoint) -> Vec<GeofenceEvent> {
        let mut regions = self.regions.lock().unwrap_or_else(PoisonError::into_inner);
        let mut events = Vec::new();
        for tracked in regions.values_mut() {
            let inside = tracked.region.contains(point);
            let previous = tracked.inside.replace(inside);
            if previous.is_some_and(|was| was != inside) {
                let transition = if inside {
                    GeofenceTransition::Enter
                } else {
                    GeofenceTransition::Exit
                };
                debug!(region = %tracked.region.id, ?transition, "Geofence transition");
                events.push(GeofenceEvent { region_id: tracked.region.id.clone(), transition });
            }
        }
        events
    }
}

impl GeofenceRegistrar for InMemoryGeofences {
    fn register(&self, region: GeofenceRegion) -> Result<()> {
        region.center.validate()?;
        let mut regions = self.regions.lock().unwrap_or_else(PoisonError::into_inner);
        regions.insert(region.id.clone(), Tracked { region, inside: None });
        Ok(())
    }

    fn unregister(&self, region_id: &str) {
        let mut regions = self.regions.lock().unwrap_or_else(PoisonError::into_inner);
        regions.remove(region_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(radius_m: f64) -> GeofenceRegion {
        GeofenceRegion {
            id: "home".into(),
            center: GeoPoint::new(37.7749, -122.4194).unwrap(),
            radius_m,
        }
    }

    #[test]
    fn reports_exit_then_enter() {
        let fences = InMemoryGeofences::new();
        fences.register(region(500.0)).unwrap();

        let inside = GeoPoint::new(37.7750, -122.4194).unwrap();
        let outside = GeoPoint::new(37.7849, -122.4194).unwrap();

        assert!(fences.evaluate(&inside).is_empty());
        assert!(fences.evaluate(&inside).is_empty());

        let events = fences.evaluate(&outside);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transition, GeofenceTransition::Exit);

        let events = fences.evaluate(&inside);
        assert_eq!(events[0].transition, GeofenceTransition::Enter);
    }

    #[test]
    fn re_registering_replaces_and_resets() {
        let fences = InMemoryGeofences::new();
        fences.register(region(500.0)).unwrap();
        fences.evaluate(&GeoPoint::new(37.7750, -122.4194).unwrap());

        fences.register(region(2_000.0)).unwrap();
        assert_eq!(fences.regions().len(), 1);
        assert_eq!(fences.region("home").unwrap().radius_m, 2_000.0);
        // State is re-established silently after replacement
        assert!(fences.evaluate(&GeoPoint::new(37.7849, -122.4194).unwrap()).is_empty());

        fences.unregister("home");
        assert!(fences.regions().is_empty());
    }
}
