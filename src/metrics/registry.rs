//! Catalog of every metric the service exports.
//!
//! Built once when the recorder is installed. Each component registers its
//! series and contributes its docs; a name claimed twice is reported rather
//! than silently merged.

use crate::metrics::{
    ClaimMetrics, ComponentMetrics, DiscoveryMetrics, IndexMetrics, LifecycleMetrics, MetricDoc,
};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct MetricCatalog {
    /// Metric name -> (owning component, doc)
    entries: BTreeMap<&'static str, (&'static str, MetricDoc)>,
    /// Names a second component tried to claim.
    collisions: Vec<(&'static str, &'static str)>,
}

impl MetricCatalog {
    /// Catalog of the discovery, index, lifecycle and claims components.
    pub fn curbside() -> Self {
        let mut catalog = Self::default();
        catalog.add::<DiscoveryMetrics>();
        catalog.add::<IndexMetrics>();
        catalog.add::<LifecycleMetrics>();
        catalog.add::<ClaimMetrics>();
        catalog
    }

    pub fn add<T: ComponentMetrics>(&mut self) {
        let component = T::component();
        for doc in T::metrics_documentation() {
            match self.entries.entry(doc.name) {
                Entry::Occupied(existing) => {
                    warn!(metric = doc.name, owner = existing.get().0, component, "Metric name already claimed");
                    self.collisions.push((doc.name, component));
                }
                Entry::Vacant(slot) => {
                    slot.insert((component, doc));
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collisions(&self) -> &[(&'static str, &'static str)] {
        &self.collisions
    }

    pub fn owner_of(&self, metric: &str) -> Option<&'static str> {
        self.entries.get(metric).map(|(owner, _)| *owner)
    }

    pub fn component_count(&self, component: &str) -> usize {
        self.entries.values().filter(|(owner, _)| *owner == component).count()
    }
}

/// Describe every component's series to the installed recorder and log the
/// resulting catalog.
pub fn register_all_metrics() -> MetricCatalog {
    DiscoveryMetrics::register_metrics();
    IndexMetrics::register_metrics();
    LifecycleMetrics::register_metrics();
    ClaimMetrics::register_metrics();

    let catalog = MetricCatalog::curbside();
    for (name, (component, doc)) in &catalog.entries {
        debug!(metric = *name, component = *component, kind = ?doc.metric_type, help = doc.help, "Metric registered");
    }
    info!(metrics = catalog.len(), collisions = catalog.collisions().len(), "Metrics catalog built");
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_no_collisions() {
        let catalog = MetricCatalog::curbside();
        assert!(catalog.collisions().is_empty(), "{:?}", catalog.collisions());
        assert_eq!(catalog.owner_of("curbside_claims_attempts_total"), Some("claims"));
        assert_eq!(catalog.owner_of("curbside_lifecycle_sweep_failures_total"), Some("lifecycle"));
        assert_eq!(catalog.owner_of("curbside_unknown"), None);
    }

    #[test]
    fn every_metric_is_prefixed_by_its_component() {
        let catalog = MetricCatalog::curbside();
        for (name, (component, _)) in &catalog.entries {
            assert!(name.starts_with(&format!("curbside_{component}_")), "{name} not owned by {component}");
        }
        for component in ["discovery", "index", "lifecycle", "claims"] {
            assert!(catalog.component_count(component) > 0, "{component} exports nothing");
        }
    }

    #[test]
    fn adding_a_component_twice_reports_every_name() {
        let mut catalog = MetricCatalog::curbside();
        let before = catalog.len();
        catalog.add::<IndexMetrics>();
        assert_eq!(catalog.len(), before);
        assert_eq!(catalog.collisions().len(), catalog.component_count("index"));
    }
}
