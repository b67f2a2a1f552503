//! Client-side monitor deciding when the nearby list must be re-queried.
//!
//! Pure state machine: it never performs I/O besides geofence registration.
//! Each decision to query yields a [`RefreshRequest`] carrying a generation
//! number; only a response for the latest generation may be applied.

use super::ports::{GeofenceEvent, GeofenceRegion, GeofenceRegistrar};
use crate::error::{CurbsideError, Result};
use crate::geo::GeoPoint;
use std::sync::Arc;
use tracing::{debug, info};

pub const SEARCH_REGION_ID: &str = "curbside.search-area";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Stopped,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    Started,
    Moved,
    Geofence,
    RadiusChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshRequest {
    pub generation: u64,
    pub center: GeoPoint,
    pub radius_m: f64,
    pub reason: RefreshReason,
}

pub struct LocationMonitor {
    registrar: Arc<dyn GeofenceRegistrar>,
    state: MonitorState,
    radius_m: f64,
    refresh_fraction: f64,
    last_known: Option<GeoPoint>,
    query_center: Option<GeoPoint>,
    generation: u64,
}

fn validate_radius(radius_m: f64) -> Result<()> {
    if radius_m.is_finite() && radius_m > 0.0 {
        Ok(())
    } else {
        Err(CurbsideError::Validation(format!("search radius must be positive, got {radius_m}")))
    }
}

impl LocationMonitor {
    pub fn new(registrar: Arc<dyn GeofenceRegistrar>, radius_m: f64, refresh_fraction: f64) -> Result<Self> {
        validate_radius(radius_m)?;
        if !(refresh_fraction > 0.0 && refresh_fraction <= 1.0) {
            return Err(CurbsideError::Validation(format!(
                "refresh fraction must be in (0, 1], got {refresh_fraction}"
            )));
        }
        Ok(Self {
            registrar,
            state: MonitorState::Stopped,
            radius_m,
            refresh_fraction,
            last_known: None,
            query_center: None,
            generation: 0,
        })
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn query_center(&self) -> Option<GeoPoint> {
        self.query_center
    }

    /// Distance the user must move away from the last query center.
    pub fn movement_threshold_m(&self) -> f64 {
        self.radius_m * self.refresh_fraction
    }

    /// True when a response for `generation` is still current.
    pub fn accepts(&self, generation: u64) -> bool {
        self.state == MonitorState::Monitoring && generation == self.generation
    }

    /// Begin monitoring. With a known position this registers the search
    /// geofence and asks for the first query; otherwise that waits for the
    /// first fix. Starting twice is a no-op.
    pub fn start(&mut self, last_known: Option<GeoPoint>) -> Result<Option<RefreshRequest>> {
        if self.state == MonitorState::Monitoring {
            return Ok(None);
        }
        if let Some(point) = last_known {
            point.validate()?;
            self.last_known = Some(point);
        }
        self.state = MonitorState::Monitoring;
        self.query_center = None;
        info!(radius_m = self.radius_m, "Location monitoring started");

        match self.last_known {
            Some(point) => self.refresh(point, RefreshReason::Started).map(Some),
            None => Ok(None),
        }
    }

    /// Stop monitoring and drop the geofence. Responses still in flight
    /// are rejected by [`accepts`](Self::accepts) from here on.
    pub fn stop(&mut self) {
        if self.state == MonitorState::Stopped {
            return;
        }
        self.registrar.unregister(SEARCH_REGION_ID);
        self.state = MonitorState::Stopped;
        self.query_center = None;
        info!(generation = self.generation, "Location monitoring stopped");
    }

    pub fn on_location(&mut self, point: GeoPoint) -> Result<Option<RefreshRequest>> {
        point.validate()?;
        if self.state == MonitorState::Stopped {
            return Ok(None);
        }
        self.last_known = Some(point);

        let Some(center) = self.query_center else {
            return self.refresh(point, RefreshReason::Started).map(Some);
        };
        let moved = center.distance_to(&point);
        if moved > self.movement_threshold_m() {
            debug!(moved_m = moved, threshold_m = self.movement_threshold_m(), "Moved past refresh threshold");
            return self.refresh(point, RefreshReason::Moved).map(Some);
        }
        Ok(None)
    }

    pub fn on_geofence(&mut self, event: &GeofenceEvent) -> Result<Option<RefreshRequest>> {
        if self.state == MonitorState::Stopped || event.region_id != SEARCH_REGION_ID {
            return Ok(None);
        }
        match self.last_known.or(self.query_center) {
            Some(point) => self.refresh(point, RefreshReason::Geofence).map(Some),
            None => Ok(None),
        }
    }

    /// Change the search radius. While monitoring with a known position the
    /// geofence is re-registered and a refresh is requested right away.
    pub fn update_search_radius(&mut self, radius_m: f64) -> Result<Option<RefreshRequest>> {
        validate_radius(radius_m)?;
        self.radius_m = radius_m;
        if self.state == MonitorState::Stopped {
            return Ok(None);
        }
        match self.last_known {
            Some(point) => self.refresh(point, RefreshReason::RadiusChanged).map(Some),
            None => Ok(None),
        }
    }

    fn refresh(&mut self, center: GeoPoint, reason: RefreshReason) -> Result<RefreshRequest> {
        self.registrar.register(GeofenceRegion {
            id: SEARCH_REGION_ID.to_string(),
            center,
            radius_m: self.radius_m,
        })?;
        self.generation += 1;
        self.query_center = Some(center);
        Ok(RefreshRequest {
            generation: self.generation,
            center,
            radius_m: self.radius_m,
            reason,
        })
    }
}
